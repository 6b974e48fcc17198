//! Extrato Core - bank statement import, deduplication and classification
//!
//! This crate follows hexagonal architecture:
//!
//! - **domain**: Core entities (Account, CanonicalTransaction, ReviewItem, etc.)
//! - **ports**: Trait definitions for external dependencies (TransactionStore, Classifier)
//! - **services**: Import pipeline and supporting services
//! - **adapters**: Concrete implementations (DuckDB, HTTP and keyword classifiers)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::classifier::{HttpClassifier, StaticClassifier};
use adapters::duckdb::DuckDbRepository;
use config::Config;
use ports::{Classifier, TransactionStore};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Account, BudgetRule, CanonicalTransaction, Classification, CommitResult, ImportPreview,
    ImportTarget, ReviewItem, TransactionType,
};
pub use services::parser::BankFormat;

/// Database file inside the data directory
pub const DB_FILENAME: &str = "extrato.duckdb";

/// Main context for Extrato operations
///
/// Holds the configuration, the database and the services built on it.
pub struct ExtratoContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub import_service: ImportService,
    pub account_service: AccountService,
}

impl ExtratoContext {
    /// Open (or create) the database in `data_dir` and wire up the services
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;

        Self::with_repository(config, repository)
    }

    /// Build the services over an already opened repository
    pub fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Result<Self> {
        let classifier = build_classifier(&config);
        let enricher = ClassificationEnricher::new(classifier);
        let store: Arc<dyn TransactionStore> = repository.clone();
        let import_service = ImportService::new(store, enricher, config.parser);
        let account_service = AccountService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            import_service,
            account_service,
        })
    }
}

/// Pick the classifier the configuration asks for.
///
/// A remote endpoint wins. Without one, local keyword rules are used when
/// enabled or when custom rules exist. Otherwise there is no classifier and
/// every suggestion is the fallback. An endpoint that cannot be used is
/// logged and treated as no classifier.
pub fn build_classifier(config: &Config) -> Option<Arc<dyn Classifier>> {
    let settings = &config.classifier;

    if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        return match HttpClassifier::new(endpoint, settings.api_key.clone(), settings.timeout_secs) {
            Ok(client) => {
                let classifier: Arc<dyn Classifier> = Arc::new(client);
                Some(classifier)
            }
            Err(e) => {
                tracing::warn!(error = %e, "invalid classifier endpoint, using default suggestions");
                None
            }
        };
    }

    if settings.use_local_rules || !settings.rules.is_empty() {
        let mut rules = settings.rules.clone();
        if settings.use_local_rules {
            rules.extend(StaticClassifier::with_defaults().rules().iter().cloned());
        }
        let classifier: Arc<dyn Classifier> = Arc::new(StaticClassifier::new(rules));
        return Some(classifier);
    }

    None
}
