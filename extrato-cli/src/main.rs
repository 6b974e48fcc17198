//! Extrato CLI - bank statement import in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod output;

use commands::{account, history, import, logs};

/// Extrato - import bank statements without duplicates
#[derive(Parser)]
#[command(name = "extrato", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage destination accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Import a CSV or OFX statement
    Import {
        /// Path to the statement file
        file: PathBuf,
        /// Account id or name to import into
        #[arg(long, short)]
        account: String,
        /// Bank layout for CSV files (inter, nubank, bb). OFX is detected automatically
        #[arg(long, short)]
        bank: Option<String>,
        /// Credit card the statement belongs to
        #[arg(long)]
        credit_card_id: Option<String>,
        /// Show the review list without storing anything
        #[arg(long)]
        preview: bool,
        /// Store every new item without prompting
        #[arg(long, short)]
        yes: bool,
        /// Keep possible duplicates selected when storing with --yes
        #[arg(long)]
        include_fuzzy: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show committed imports and stored transactions
    History {
        /// Limit stored transactions to this account (id or name)
        #[arg(long, short)]
        account: Option<String>,
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

/// Diagnostics go to stderr, filtered by EXTRATO_LOG (default "warn")
fn init_tracing() {
    let filter = EnvFilter::try_from_env("EXTRATO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Account { command } => account::run(command),
        Commands::Import {
            file,
            account,
            bank,
            credit_card_id,
            preview,
            yes,
            include_fuzzy,
            json,
        } => {
            import::run(import::ImportArgs {
                file,
                account,
                bank,
                credit_card_id,
                preview,
                yes,
                include_fuzzy,
                json,
            })
            .await
        }
        Commands::History { account, limit, json } => history::run(account.as_deref(), limit, json),
        Commands::Logs { command } => logs::run(command),
    }
}
