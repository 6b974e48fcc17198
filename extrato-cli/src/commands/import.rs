//! Import command - preview a statement, pick what to keep, store it

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use colored::Colorize;
use dialoguer::MultiSelect;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use super::{get_context, get_logger, log_event, resolve_account};
use crate::output;
use extrato_core::services::logging::events;
use extrato_core::services::LogEvent;
use extrato_core::{BankFormat, ImportPreview, ImportTarget, ReviewItem, TransactionType};

/// Rows shown in the preview table
const PREVIEW_ROWS: usize = 25;

pub struct ImportArgs {
    pub file: PathBuf,
    pub account: String,
    pub bank: Option<String>,
    pub credit_card_id: Option<String>,
    pub preview: bool,
    pub yes: bool,
    pub include_fuzzy: bool,
    pub json: bool,
}

pub async fn run(args: ImportArgs) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();

    let format = match args.bank.as_deref() {
        Some(b) => BankFormat::from_str(b).map_err(|e| anyhow!(e))?,
        None => ctx.config.default_bank_format,
    };
    let account = resolve_account(ctx, &args.account)?;
    let mut target = ImportTarget::new(ctx.config.user_id.clone(), account.id);
    if let Some(card) = args.credit_card_id.as_deref() {
        let card_id =
            Uuid::parse_str(card.trim()).map_err(|_| anyhow!("Invalid credit card id: {}", card))?;
        target = target.with_credit_card(card_id);
    }

    let spinner = (!args.json).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Reading {}...", args.file.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = ctx
        .import_service
        .preview_file(&args.file, format, &target)
        .await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let mut preview = match result {
        Ok(p) => p,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new(events::IMPORT_FAILED)
                    .with_command("import")
                    .with_bank_format(format.as_str())
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    log_event(
        &logger,
        LogEvent::new(events::IMPORT_PREVIEWED)
            .with_command("import")
            .with_bank_format(format.as_str())
            .with_count(preview.preview.len()),
    );
    if preview.classifier_fallback && !preview.preview.is_empty() {
        log_event(
            &logger,
            LogEvent::new(events::CLASSIFIER_FALLBACK).with_command("import"),
        );
    }

    if args.preview {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        } else {
            println!("{}", "PREVIEW MODE - nothing stored".yellow());
            print_summary(&preview, &account.name);
            print_table(&preview.preview);
        }
        return Ok(());
    }

    if preview.preview.is_empty() {
        if args.json {
            println!("{}", serde_json::json!({"importedCount": 0, "confirmedCount": 0}));
        } else {
            print_summary(&preview, &account.name);
            output::info("Nothing new to import.");
        }
        return Ok(());
    }

    if args.yes {
        if args.include_fuzzy {
            preview.select_all();
        }
        if !args.json {
            print_summary(&preview, &account.name);
        }
        warn_held_back(&preview, args.json);
    } else if !args.json && atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout) {
        print_summary(&preview, &account.name);
        if !choose_items(&mut preview)? {
            println!("Cancelled.");
            return Ok(());
        }
    } else {
        bail!("Not running interactively: pass --yes to store the new items, or --preview to inspect them");
    }

    let confirmed = preview.selected().count();
    let commit = match ctx.import_service.commit_selected(&target, preview).await {
        Ok(c) => c,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new(events::IMPORT_FAILED)
                    .with_command("import")
                    .with_bank_format(format.as_str())
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    log_event(
        &logger,
        LogEvent::new(events::IMPORT_COMMITTED)
            .with_command("import")
            .with_bank_format(format.as_str())
            .with_count(commit.imported_count),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&commit)?);
        return Ok(());
    }

    output::success(&format!(
        "Imported {} of {} confirmed transactions into {}",
        commit.imported_count, confirmed, account.name
    ));
    if commit.imported_count < confirmed {
        output::warning(&format!(
            "{} were already stored and left untouched",
            confirmed - commit.imported_count
        ));
    }
    if let Some(batch) = &commit.batch_id {
        println!("  Batch: {}", batch.dimmed());
    }
    Ok(())
}

fn print_summary(preview: &ImportPreview, account_name: &str) {
    println!("Statement for {}", account_name.bold());
    println!("  Parsed:            {}", preview.parsed_count);
    println!("  Already imported:  {}", preview.skipped_count);
    println!("  To review:         {}", preview.preview.len());
    if preview.fuzzy_count() > 0 {
        println!(
            "  Possible duplicates: {}",
            preview.fuzzy_count().to_string().yellow()
        );
    }
    if preview.unreadable_count > 0 {
        println!(
            "  Unreadable lines:  {}",
            preview.unreadable_count.to_string().red()
        );
    }
    if preview.classifier_fallback {
        output::warning("Classifier unavailable; suggestions use the default category");
    }
    println!();
}

/// Possible duplicates are never dropped without saying so
fn warn_held_back(preview: &ImportPreview, json: bool) {
    let held_back = preview.held_back_count();
    if held_back == 0 {
        return;
    }
    let msg = format!(
        "{} possible duplicate(s) left out; rerun with --include-fuzzy to store them, or --preview to inspect them",
        held_back
    );
    if json {
        eprintln!("{}", msg);
    } else {
        output::warning(&msg);
    }
}

fn print_table(items: &[ReviewItem]) {
    if items.is_empty() {
        return;
    }
    let mut table = output::create_table();
    table.set_header(vec!["", "Date", "Amount", "Description", "Suggestion", "Rule"]);
    for item in items.iter().take(PREVIEW_ROWS) {
        table.add_row(vec![
            marker(item),
            item.transaction.date.format("%d/%m/%Y").to_string(),
            output::format_amount(item.transaction.amount, item.transaction.transaction_type),
            item.description().to_string(),
            format!("{} {}", item.suggested_icon, item.suggested_category),
            item.suggested_rule.label().to_string(),
        ]);
    }
    println!("{}", table);
    if items.len() > PREVIEW_ROWS {
        println!("  ... and {} more", items.len() - PREVIEW_ROWS);
    }
}

fn marker(item: &ReviewItem) -> String {
    if item.is_fuzzy_duplicate {
        "?".yellow().to_string()
    } else {
        String::new()
    }
}

/// Let the user toggle items. Returns false when nothing was chosen.
fn choose_items(preview: &mut ImportPreview) -> Result<bool> {
    let labels: Vec<String> = preview
        .preview
        .iter()
        .map(|item| {
            let sign = match item.transaction.transaction_type {
                TransactionType::Income => "+",
                TransactionType::Expense => "-",
            };
            format!(
                "{} {}{} {}{}",
                item.transaction.date.format("%d/%m/%Y"),
                sign,
                item.transaction.amount,
                item.description(),
                if item.is_fuzzy_duplicate { "  (possible duplicate)" } else { "" }
            )
        })
        .collect();
    let defaults: Vec<bool> = preview.preview.iter().map(|i| i.selected).collect();

    let chosen = MultiSelect::new()
        .with_prompt("Select transactions to import (space to toggle, enter to confirm)")
        .items(&labels)
        .defaults(&defaults)
        .interact()?;

    for item in &mut preview.preview {
        item.selected = false;
    }
    for index in &chosen {
        if let Some(item) = preview.preview.get_mut(*index) {
            item.selected = true;
        }
    }
    Ok(!chosen.is_empty())
}
