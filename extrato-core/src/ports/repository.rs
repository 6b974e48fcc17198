//! Transaction store port - storage read and write used by the import pipeline

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{CanonicalTransaction, StoredTransaction};

/// Inclusive calendar-date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Smallest range covering every date, or None for an empty input
    pub fn spanning<I>(dates: I) -> Option<Self>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut iter = dates.into_iter();
        let first = iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// What a bulk write does when a row's (user_id, external_id) already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Leave the stored row alone and do not count the incoming one
    #[default]
    Skip,
    /// Abort the whole batch
    Fail,
    /// Overwrite the stored row's mutable fields
    Upsert,
}

/// Storage abstraction for the import pipeline
///
/// Reads never mutate; `bulk_insert` is the only write and must be atomic.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Whether the account exists and belongs to the user
    async fn account_exists(&self, user_id: &str, account_id: Uuid) -> Result<bool>;

    /// Stored transactions of the user within the range, optionally for one account
    async fn find_in_range(
        &self,
        user_id: &str,
        range: DateRange,
        account_id: Option<Uuid>,
    ) -> Result<Vec<StoredTransaction>>;

    /// Stored transactions of the user whose external id is in the list
    async fn find_by_external_ids(
        &self,
        user_id: &str,
        external_ids: &[String],
    ) -> Result<Vec<StoredTransaction>>;

    /// Insert all records in one atomic write, resolving (user_id, external_id)
    /// conflicts per `policy`. Returns the number of rows inserted or updated.
    async fn bulk_insert(
        &self,
        user_id: &str,
        records: &[CanonicalTransaction],
        policy: ConflictPolicy,
        batch_id: Option<&str>,
    ) -> Result<usize>;
}
