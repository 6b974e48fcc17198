//! Duplicate detection against stored transactions
//!
//! Exact matches (same external id for the user) are dropped silently.
//! Fuzzy matches (same date and amount in the same account, different id) are
//! kept and flagged for the user to decide.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{CanonicalTransaction, ImportTarget, ReviewItem, StoredTransaction};
use crate::ports::{DateRange, TransactionStore};

/// Lookup structure over the stored transactions relevant to one batch
///
/// Built once per import and never mutated.
#[derive(Debug, Default)]
pub struct ExistingTransactionIndex {
    external_ids: HashSet<String>,
    date_amounts: HashSet<(NaiveDate, Decimal)>,
}

impl ExistingTransactionIndex {
    /// `in_range` feeds both lookups; `by_id` only the external-id lookup,
    /// since those rows may belong to other accounts or dates.
    pub fn build(in_range: &[StoredTransaction], by_id: &[StoredTransaction]) -> Self {
        let external_ids = in_range
            .iter()
            .chain(by_id)
            .map(|t| t.external_id.clone())
            .collect();
        let date_amounts = in_range
            .iter()
            .map(|t| (t.date, fuzzy_amount(t.amount)))
            .collect();
        Self {
            external_ids,
            date_amounts,
        }
    }

    pub fn contains_id(&self, external_id: &str) -> bool {
        self.external_ids.contains(external_id)
    }

    pub fn matches_date_amount(&self, date: NaiveDate, amount: Decimal) -> bool {
        self.date_amounts.contains(&(date, fuzzy_amount(amount)))
    }

    pub fn len(&self) -> usize {
        self.external_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external_ids.is_empty()
    }
}

/// Stored amounts may be signed and carry a different scale
fn fuzzy_amount(amount: Decimal) -> Decimal {
    amount.abs().normalize()
}

/// Batch split into what the user reviews and what was already stored
#[derive(Debug, Default)]
pub struct Detection {
    pub review: Vec<ReviewItem>,
    pub skipped_count: usize,
}

/// Classify each incoming transaction against the index.
///
/// Incoming records are never compared with each other.
pub fn detect_duplicates(
    batch: Vec<CanonicalTransaction>,
    index: &ExistingTransactionIndex,
) -> Detection {
    let mut detection = Detection::default();
    for tx in batch {
        if index.contains_id(&tx.external_id) {
            detection.skipped_count += 1;
            continue;
        }
        let fuzzy = index.matches_date_amount(tx.date, tx.amount);
        detection.review.push(ReviewItem::new(tx, fuzzy));
    }
    detection
}

/// Builds the index from storage and runs detection
pub struct DuplicateDetector {
    store: Arc<dyn TransactionStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Read the stored rows that could collide with the batch.
    ///
    /// The date-range scan is scoped to the target account; the id lookup
    /// covers every account of the user because external ids are unique per user.
    pub async fn build_index(
        &self,
        target: &ImportTarget,
        batch: &[CanonicalTransaction],
    ) -> Result<ExistingTransactionIndex> {
        let Some(range) = DateRange::spanning(batch.iter().map(|t| t.date)) else {
            return Ok(ExistingTransactionIndex::default());
        };

        let in_range = self
            .store
            .find_in_range(&target.user_id, range, Some(target.account_id))
            .await?;

        let ids: Vec<String> = batch
            .iter()
            .map(|t| t.external_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let by_id = self
            .store
            .find_by_external_ids(&target.user_id, &ids)
            .await?;

        tracing::debug!(
            in_range = in_range.len(),
            by_id = by_id.len(),
            start = %range.start,
            end = %range.end,
            "built duplicate index"
        );
        Ok(ExistingTransactionIndex::build(&in_range, &by_id))
    }

    pub async fn detect(
        &self,
        target: &ImportTarget,
        batch: Vec<CanonicalTransaction>,
    ) -> Result<Detection> {
        let index = self.build_index(target, &batch).await?;
        Ok(detect_duplicates(batch, &index))
    }
}
