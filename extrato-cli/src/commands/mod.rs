//! CLI command implementations

pub mod account;
pub mod history;
pub mod import;
pub mod logs;

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use extrato_core::domain::Account;
use extrato_core::services::{EntryPoint, LogEvent, LoggingService};
use extrato_core::ExtratoContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "event log write failed");
        }
    }
}

/// EXTRATO_DIR, or ~/.extrato
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("EXTRATO_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".extrato"))
        .ok_or_else(|| anyhow!("Could not find home directory; set EXTRATO_DIR"))
}

static CONTEXT: OnceLock<ExtratoContext> = OnceLock::new();

/// Open the context on first use; later calls share it
pub fn get_context() -> Result<&'static ExtratoContext> {
    if let Some(ctx) = CONTEXT.get() {
        return Ok(ctx);
    }
    let data_dir = get_data_dir()?;
    let ctx = ExtratoContext::new(&data_dir).context("Failed to open the extrato database")?;
    // Lost race: the first value stays
    let _ = CONTEXT.set(ctx);
    CONTEXT
        .get()
        .ok_or_else(|| anyhow!("extrato context was not initialized"))
}

/// Find an account of the configured user by id or name
pub fn resolve_account(ctx: &ExtratoContext, id_or_name: &str) -> Result<Account> {
    ctx.account_service
        .resolve(&ctx.config.user_id, id_or_name)?
        .ok_or_else(|| {
            anyhow!(
                "Account not found: {} (see `extrato account list`)",
                id_or_name
            )
        })
}
