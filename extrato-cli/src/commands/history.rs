//! History command - committed import batches and stored transactions

use anyhow::Result;
use colored::Colorize;

use super::{get_context, resolve_account};
use crate::output;

pub fn run(account: Option<&str>, limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user_id = &ctx.config.user_id;

    let account_id = match account {
        Some(a) => Some(resolve_account(ctx, a)?.id),
        None => None,
    };

    let batches = ctx.repository.get_import_batches(user_id)?;
    let batches: Vec<_> = batches
        .into_iter()
        .filter(|b| account_id.map_or(true, |id| b.account_id == id))
        .collect();
    let total = ctx.repository.transaction_count(user_id)?;
    let mut transactions = ctx.repository.get_transactions(user_id, account_id)?;
    transactions.truncate(limit);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "totalTransactions": total,
                "batches": batches,
                "transactions": transactions,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Imports".bold());
    if batches.is_empty() {
        println!("  No imports yet.");
    } else {
        let accounts = ctx.account_service.list(user_id)?;
        let mut table = output::create_table();
        table.set_header(vec!["When", "Account", "Confirmed", "Stored", "Batch"]);
        for batch in &batches {
            let name = accounts
                .iter()
                .find(|a| a.id == batch.account_id)
                .map(|a| a.name.clone())
                .unwrap_or_else(|| batch.account_id.to_string());
            table.add_row(vec![
                batch.created_at.format("%Y-%m-%d %H:%M").to_string(),
                name,
                batch.confirmed_count.to_string(),
                batch.imported_count.to_string(),
                batch.batch_id.clone(),
            ]);
        }
        println!("{}", table);
    }

    println!();
    println!("{} ({} stored)", "Latest transactions".bold(), total);
    if transactions.is_empty() {
        return Ok(());
    }
    let mut table = output::create_table();
    table.set_header(vec!["Date", "Amount", "Description", "Category"]);
    for tx in &transactions {
        table.add_row(vec![
            tx.date.format("%d/%m/%Y").to_string(),
            output::format_amount(tx.amount, tx.transaction_type),
            tx.description.clone(),
            tx.category.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{}", table);
    Ok(())
}
