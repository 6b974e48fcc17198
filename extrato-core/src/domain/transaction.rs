//! Transaction domain models
//!
//! A statement row goes through three shapes:
//! - [`RawStatementRecord`]: what the parser read, sign and type still ambiguous
//! - [`CanonicalTransaction`]: absolute amount, resolved type, stable external id
//! - [`StoredTransaction`]: the slice of a persisted row the dedup index needs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classification::BudgetRule;

/// Direction of money movement. Amounts are always positive; this carries the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Derive the type from a signed amount (zero counts as income)
    pub fn from_sign(amount: Decimal) -> Self {
        if amount >= Decimal::ZERO {
            TransactionType::Income
        } else {
            TransactionType::Expense
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "INCOME",
            TransactionType::Expense => "EXPENSE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INCOME" => Some(TransactionType::Income),
            "EXPENSE" => Some(TransactionType::Expense),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type information a statement carries explicitly, in whatever vocabulary the bank uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeHint {
    Income,
    Expense,
    Entrada,
    Saida,
    Credit,
    Debit,
}

impl TypeHint {
    /// Recognise a bank type label ("Entrada", "Saída", "CREDIT", BB's "C"/"D", ...)
    ///
    /// Matching is case-insensitive and ignores the accent in "saída".
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase().replace('í', "i");
        if lower.is_empty() {
            return None;
        }
        if lower.contains("entrada") {
            Some(TypeHint::Entrada)
        } else if lower.contains("saida") {
            Some(TypeHint::Saida)
        } else {
            match lower.as_str() {
                "income" => Some(TypeHint::Income),
                "expense" => Some(TypeHint::Expense),
                "credit" | "dep" | "c" => Some(TypeHint::Credit),
                "debit" | "payment" | "d" => Some(TypeHint::Debit),
                _ => None,
            }
        }
    }

    pub fn resolve(self) -> TransactionType {
        match self {
            TypeHint::Income | TypeHint::Entrada | TypeHint::Credit => TransactionType::Income,
            TypeHint::Expense | TypeHint::Saida | TypeHint::Debit => TransactionType::Expense,
        }
    }
}

/// One row as read from a statement, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatementRecord {
    pub date: NaiveDate,
    pub description: String,
    /// Signed or unsigned, depending on the bank
    pub amount: Decimal,
    pub type_hint: Option<TypeHint>,
    /// Bank-assigned id (OFX FITID) when the format has one
    pub external_id: Option<String>,
}

/// A transaction in the shape it is reviewed and stored in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Always > 0
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Deduplication key, unique per user
    pub external_id: String,
    pub account_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_card_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    /// Free-text category name, used when no category id is assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub is_fixed: bool,
    pub classification_rule: BudgetRule,
}

impl CanonicalTransaction {
    /// Timestamp for the transaction date, anchored at noon UTC so that
    /// converting to any local zone keeps the same calendar day.
    pub fn posted_at(&self) -> DateTime<Utc> {
        anchor_at_noon(self.date)
    }

    /// Amount with the direction applied (expenses negative)
    pub fn signed_amount(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Income => self.amount,
            TransactionType::Expense => -self.amount,
        }
    }
}

/// Noon UTC on the given date
pub fn anchor_at_noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc()
}

/// A persisted transaction, as much as the duplicate index needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub external_id: String,
}
