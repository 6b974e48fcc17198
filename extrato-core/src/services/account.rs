//! Account service - destination accounts for imports

use std::sync::Arc;

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::Account;

/// Fields accepted when registering an account
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub account_type: Option<String>,
    pub institution: Option<String>,
    pub currency: Option<String>,
}

pub struct AccountService {
    repository: Arc<DuckDbRepository>,
}

impl AccountService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Register an account for the user and return it with its generated id
    pub fn add(&self, user_id: &str, new: NewAccount) -> Result<Account> {
        let mut account = Account::new(Uuid::new_v4(), user_id, new.name.trim());
        account.account_type = new.account_type.filter(|t| !t.trim().is_empty());
        account.institution = new.institution.filter(|i| !i.trim().is_empty());
        if let Some(currency) = new.currency {
            account.currency = Account::normalize_currency(&currency);
        }
        if let Err(reason) = account.validate() {
            bail!("Invalid account: {}", reason);
        }

        self.repository.upsert_account(&account)?;
        tracing::info!(account_id = %account.id, user_id, "account added");
        Ok(account)
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<Account>> {
        self.repository.get_accounts(user_id)
    }

    /// Look up an account by id or by exact (case-insensitive) name
    pub fn resolve(&self, user_id: &str, id_or_name: &str) -> Result<Option<Account>> {
        if let Ok(id) = Uuid::parse_str(id_or_name.trim()) {
            return self.repository.get_account_by_id(user_id, id);
        }
        let wanted = id_or_name.trim().to_lowercase();
        let mut matches: Vec<Account> = self
            .list(user_id)?
            .into_iter()
            .filter(|a| a.name.to_lowercase() == wanted)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => bail!("{} accounts are named '{}', use the account id", n, id_or_name.trim()),
        }
    }
}
