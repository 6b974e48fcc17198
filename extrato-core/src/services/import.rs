//! Import service - statement preview and commit
//!
//! Two phases. `preview` parses, normalizes, checks for duplicates and attaches
//! classification suggestions without writing anything. `commit` stores the
//! items the user confirmed in one atomic write.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{CommitResult, ImportPreview, ImportTarget, ReviewItem};
use crate::ports::{ConflictPolicy, TransactionStore};
use crate::services::dedup::DuplicateDetector;
use crate::services::enrich::ClassificationEnricher;
use crate::services::normalize::normalize_batch;
use crate::services::parser::{parse_statement, BankFormat, ParserOptions};

pub struct ImportService {
    store: Arc<dyn TransactionStore>,
    detector: DuplicateDetector,
    enricher: ClassificationEnricher,
    options: ParserOptions,
}

impl ImportService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        enricher: ClassificationEnricher,
        options: ParserOptions,
    ) -> Self {
        Self {
            detector: DuplicateDetector::new(Arc::clone(&store)),
            store,
            enricher,
            options,
        }
    }

    pub fn parser_options(&self) -> &ParserOptions {
        &self.options
    }

    /// Preview a statement file. Non UTF-8 files are read as Latin-1.
    pub async fn preview_file(
        &self,
        path: &Path,
        format: BankFormat,
        target: &ImportTarget,
    ) -> Result<ImportPreview> {
        let bytes = tokio::fs::read(path).await?;
        let content = decode_statement(bytes);
        self.preview(&content, format, target).await
    }

    /// Parse, normalize, detect duplicates and enrich. Writes nothing.
    pub async fn preview(
        &self,
        content: &str,
        format: BankFormat,
        target: &ImportTarget,
    ) -> Result<ImportPreview> {
        self.check_target(target).await?;

        let report = parse_statement(content, format, &self.options);
        if report.is_empty() {
            return Err(Error::EmptyStatement);
        }
        let parsed_count = report.records.len();
        let unreadable_count = report.skipped;

        let batch = normalize_batch(report.records, target);
        let detection = self.detector.detect(target, batch).await?;

        let mut preview = detection.review;
        let enrichment = self.enricher.enrich(&mut preview).await;

        tracing::info!(
            format = %format,
            kind = ?report.kind,
            parsed = parsed_count,
            unreadable = unreadable_count,
            balance_rows = report.balance_rows,
            skipped = detection.skipped_count,
            review = preview.len(),
            classified = enrichment.classified,
            "import preview ready"
        );

        Ok(ImportPreview {
            preview,
            skipped_count: detection.skipped_count,
            parsed_count,
            unreadable_count,
            classifier_fallback: enrichment.fallback,
        })
    }

    /// Store the confirmed items. An empty confirmation touches nothing.
    pub async fn commit(&self, target: &ImportTarget, items: Vec<ReviewItem>) -> Result<CommitResult> {
        target.validate()?;
        if items.is_empty() {
            return Ok(CommitResult::default());
        }

        if let Some(stray) = items
            .iter()
            .find(|i| i.transaction.account_id != target.account_id)
        {
            return Err(Error::validation(format!(
                "item '{}' belongs to account {}, not {}",
                stray.transaction.external_id, stray.transaction.account_id, target.account_id
            )));
        }

        let confirmed_count = items.len();
        let records: Vec<_> = items.into_iter().map(ReviewItem::into_transaction).collect();
        let batch_id = new_batch_id();

        let imported_count = self
            .store
            .bulk_insert(&target.user_id, &records, ConflictPolicy::Skip, Some(&batch_id))
            .await?;

        tracing::info!(
            batch_id = %batch_id,
            confirmed = confirmed_count,
            imported = imported_count,
            "import committed"
        );

        Ok(CommitResult {
            imported_count,
            confirmed_count,
            batch_id: Some(batch_id),
        })
    }

    /// Commit whatever is still selected in a preview
    pub async fn commit_selected(
        &self,
        target: &ImportTarget,
        preview: ImportPreview,
    ) -> Result<CommitResult> {
        let items = preview.preview.into_iter().filter(|i| i.selected).collect();
        self.commit(target, items).await
    }

    async fn check_target(&self, target: &ImportTarget) -> Result<()> {
        target.validate()?;
        if !self
            .store
            .account_exists(&target.user_id, target.account_id)
            .await?
        {
            return Err(Error::validation(format!(
                "Account not found: {}",
                target.account_id
            )));
        }
        Ok(())
    }
}

/// `import_YYYYMMDD_HHMMSS_xxxxxxxx`
fn new_batch_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "import_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

/// Statement bytes as text; invalid UTF-8 is treated as Latin-1
pub fn decode_statement(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_id_shape() {
        let id = new_batch_id();
        assert!(id.starts_with("import_"));
        // import_ + 8 + _ + 6 + _ + 8
        assert_eq!(id.len(), 7 + 8 + 1 + 6 + 1 + 8);
        assert_ne!(id, new_batch_id());
    }

    #[test]
    fn test_decode_latin1_fallback() {
        let latin1 = vec![b'S', b'a', b'l', 0xE1, b'r', b'i', b'o'];
        assert_eq!(decode_statement(latin1), "Salário");
        assert_eq!(decode_statement("Saída".as_bytes().to_vec()), "Saída");
    }
}
