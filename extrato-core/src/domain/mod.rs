//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod classification;
pub mod result;
pub mod review;
pub mod transaction;

pub use account::Account;
pub use classification::{BudgetRule, Classification};
pub use review::{CommitResult, ImportPreview, ImportTarget, ReviewItem};
pub use transaction::{
    CanonicalTransaction, RawStatementRecord, StoredTransaction, TransactionType, TypeHint,
};
