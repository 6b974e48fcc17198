//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the TransactionStore port
//! - HTTP client and local keyword rules for the Classifier port

pub mod classifier;
pub mod duckdb;

#[cfg(test)]
pub mod classifier_mock;
