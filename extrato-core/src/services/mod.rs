//! Service layer - business logic orchestration
//!
//! The import pipeline runs parse -> normalize -> dedup -> enrich for a
//! preview, then commits the confirmed items. Supporting services manage
//! accounts, schema migrations and the usage log.

mod account;
pub mod dedup;
pub mod enrich;
pub mod import;
pub mod logging;
pub mod migration;
pub mod normalize;
pub mod parser;

pub use account::{AccountService, NewAccount};
pub use dedup::{detect_duplicates, Detection, DuplicateDetector, ExistingTransactionIndex};
pub use enrich::{ClassificationEnricher, Enrichment};
pub use import::{decode_statement, ImportService};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use normalize::normalize_batch;
pub use parser::{parse_statement, BankFormat, ParseReport, ParserOptions, StatementKind};
