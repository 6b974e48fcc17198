//! Raw records -> canonical transactions
//!
//! Resolves type and sign, cleans descriptions and assigns the external id
//! every later stage keys on.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::domain::{
    BudgetRule, CanonicalTransaction, ImportTarget, RawStatementRecord, TransactionType,
};

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid whitespace regex"))
}

/// Trim and collapse internal runs of whitespace
pub fn clean_description(description: &str) -> String {
    whitespace().replace_all(description.trim(), " ").into_owned()
}

/// The string hashed into a content id: `{YYYY-MM-DD}_{amount}_{description}`
///
/// Amount is absolute with trailing zeros removed, description trimmed and lower-cased.
pub fn content_key(record: &RawStatementRecord) -> String {
    format!(
        "{}_{}_{}",
        record.date.format("%Y-%m-%d"),
        record.amount.abs().normalize(),
        record.description.trim().to_lowercase()
    )
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Content-derived id for a record without a source id
pub fn content_external_id(record: &RawStatementRecord) -> String {
    sha256_hex(&content_key(record))
}

/// Normalize a parsed batch for the given target.
///
/// Records with a zero amount are dropped. Identical rows repeated inside the
/// batch get distinct ids: the n-th repeat hashes `{key}_{n}`, the first keeps
/// the plain hash.
pub fn normalize_batch(
    records: Vec<RawStatementRecord>,
    target: &ImportTarget,
) -> Vec<CanonicalTransaction> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(records.len());

    for mut record in records {
        if record.amount.is_zero() {
            tracing::debug!(date = %record.date, "dropping zero-amount record");
            continue;
        }
        record.description = clean_description(&record.description);

        let external_id = match record.external_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let key = content_key(&record);
                let occurrence = seen.entry(key.clone()).or_insert(0);
                *occurrence += 1;
                if *occurrence == 1 {
                    sha256_hex(&key)
                } else {
                    sha256_hex(&format!("{}_{}", key, occurrence))
                }
            }
        };

        let transaction_type = record
            .type_hint
            .map(|hint| hint.resolve())
            .unwrap_or_else(|| TransactionType::from_sign(record.amount));

        out.push(CanonicalTransaction {
            date: record.date,
            description: record.description,
            amount: record.amount.abs(),
            transaction_type,
            external_id,
            account_id: target.account_id,
            credit_card_id: target.credit_card_id,
            category_id: None,
            category: None,
            is_fixed: false,
            classification_rule: default_rule(transaction_type),
        });
    }

    out
}

fn default_rule(transaction_type: TransactionType) -> BudgetRule {
    match transaction_type {
        TransactionType::Income => BudgetRule::Income,
        TransactionType::Expense => BudgetRule::Wants,
    }
}
