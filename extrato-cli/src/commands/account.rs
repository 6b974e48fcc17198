//! Account command - register and list destination accounts

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Input;

use super::{get_context, get_logger, log_event};
use crate::output;
use extrato_core::services::logging::events;
use extrato_core::services::{LogEvent, NewAccount};

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Register a new account
    Add {
        /// Account name (prompted when omitted)
        name: Option<String>,
        /// Account type, e.g. checking, savings, credit
        #[arg(long = "type")]
        account_type: Option<String>,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
        /// ISO currency code
        #[arg(long, default_value = "BRL")]
        currency: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Add {
            name,
            account_type,
            institution,
            currency,
            json,
        } => run_add(name, account_type, institution, currency, json),
        AccountCommands::List { json } => run_list(json),
    }
}

fn run_add(
    name: Option<String>,
    account_type: Option<String>,
    institution: Option<String>,
    currency: String,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;

    let name = match name {
        Some(n) => n,
        None => Input::new().with_prompt("Account name").interact_text()?,
    };

    let account = ctx.account_service.add(
        &ctx.config.user_id,
        NewAccount {
            name,
            account_type,
            institution,
            currency: Some(currency),
        },
    )?;

    log_event(
        &get_logger(),
        LogEvent::new(events::ACCOUNT_ADDED).with_command("account add"),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        println!("{}", "Account created".green());
        println!("  Name: {}", account.name);
        println!("  ID:   {}", account.id);
    }
    Ok(())
}

fn run_list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let accounts = ctx.account_service.list(&ctx.config.user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts yet. Create one with `extrato account add`.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Name", "Type", "Institution", "Currency", "ID"]);
    for account in &accounts {
        table.add_row(vec![
            account.name.clone(),
            account.account_type.clone().unwrap_or_else(|| "-".to_string()),
            account.institution.clone().unwrap_or_else(|| "-".to_string()),
            account.currency.clone(),
            account.id.to_string(),
        ]);
    }
    println!("{}", table);
    Ok(())
}
