//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The import pipeline
//! depends only on these traits, not on concrete implementations.

mod classifier;
mod repository;

pub use classifier::Classifier;
pub use repository::{ConflictPolicy, DateRange, TransactionStore};
