//! Account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A destination account that statements are imported into
/// Note: account_type is freeform ("checking", "savings", "credit"...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Owner of the account; external ids are unique within this scope
    pub user_id: String,
    pub name: String,
    pub account_type: Option<String>,
    /// Institution name, e.g. "Banco Inter"
    pub institution: Option<String>,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with required fields
    pub fn new(id: Uuid, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            name: name.into(),
            account_type: None,
            institution: None,
            currency: "BRL".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.user_id.trim().is_empty() {
            return Err("user id cannot be empty");
        }
        if self.name.trim().is_empty() {
            return Err("account name cannot be empty");
        }
        if self.currency.trim().is_empty() {
            return Err("currency cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        assert_eq!(Account::normalize_currency("brl"), "BRL");
        assert_eq!(Account::normalize_currency(" usd "), "USD");
    }

    #[test]
    fn test_account_validation() {
        let mut account = Account::new(Uuid::new_v4(), "local", "Conta Inter");
        assert!(account.validate().is_ok());

        account.name = "".to_string();
        assert!(account.validate().is_err());

        let orphan = Account::new(Uuid::new_v4(), " ", "Conta");
        assert!(orphan.validate().is_err());
    }
}
