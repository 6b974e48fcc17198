//! Review and commit models returned to callers of the import pipeline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classification::{BudgetRule, Classification};
use super::result::{Error, Result};
use super::transaction::CanonicalTransaction;

/// Where an import lands: who owns it and which account (or card) it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTarget {
    pub user_id: String,
    pub account_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_card_id: Option<Uuid>,
}

impl ImportTarget {
    pub fn new(user_id: impl Into<String>, account_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            credit_card_id: None,
        }
    }

    pub fn with_credit_card(mut self, credit_card_id: Uuid) -> Self {
        self.credit_card_id = Some(credit_card_id);
        self
    }

    /// Reject targets that cannot own transactions
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::validation("user id is required"));
        }
        if self.account_id.is_nil() {
            return Err(Error::validation("a destination account is required"));
        }
        Ok(())
    }
}

/// A transaction surfaced for user review, with its suggestion attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    #[serde(flatten)]
    pub transaction: CanonicalTransaction,
    /// Same date and amount as a stored transaction with a different id
    pub is_fuzzy_duplicate: bool,
    pub suggested_category: String,
    pub suggested_rule: BudgetRule,
    pub suggested_icon: String,
    pub selected: bool,
}

impl ReviewItem {
    /// Wrap a transaction; fuzzy duplicates start unselected but stay selectable
    pub fn new(transaction: CanonicalTransaction, is_fuzzy_duplicate: bool) -> Self {
        let fallback = Classification::fallback();
        Self {
            transaction,
            is_fuzzy_duplicate,
            suggested_category: fallback.category,
            suggested_rule: fallback.rule,
            suggested_icon: fallback.icon,
            selected: !is_fuzzy_duplicate,
        }
    }

    pub fn apply_suggestion(&mut self, suggestion: Classification) {
        self.suggested_category = suggestion.category;
        self.suggested_rule = suggestion.rule;
        self.suggested_icon = suggestion.icon;
    }

    pub fn description(&self) -> &str {
        &self.transaction.description
    }

    /// The transaction to persist: suggestion applied unless the user already
    /// set a category or rule on it.
    pub fn into_transaction(self) -> CanonicalTransaction {
        let mut tx = self.transaction;
        if tx.category.is_none() && tx.category_id.is_none() {
            tx.category = Some(self.suggested_category);
            tx.classification_rule = self.suggested_rule;
        }
        tx
    }
}

/// Output of the detection + enrichment phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub preview: Vec<ReviewItem>,
    /// Records dropped because their external id is already stored
    pub skipped_count: usize,
    /// Records the parser produced
    pub parsed_count: usize,
    /// Lines or blocks the parser could not read
    pub unreadable_count: usize,
    /// True when suggestions came from the fallback instead of the classifier
    pub classifier_fallback: bool,
}

impl ImportPreview {
    pub fn fuzzy_count(&self) -> usize {
        self.preview.iter().filter(|i| i.is_fuzzy_duplicate).count()
    }

    pub fn selected(&self) -> impl Iterator<Item = &ReviewItem> {
        self.preview.iter().filter(|i| i.selected)
    }

    /// Possible duplicates that are currently left out of the commit
    pub fn held_back_count(&self) -> usize {
        self.preview
            .iter()
            .filter(|i| i.is_fuzzy_duplicate && !i.selected)
            .count()
    }

    /// Select every item, possible duplicates included
    pub fn select_all(&mut self) {
        for item in &mut self.preview {
            item.selected = true;
        }
    }
}

/// Output of the commit phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub imported_count: usize,
    /// Items the caller confirmed; may exceed imported_count when storage skipped some
    pub confirmed_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}
