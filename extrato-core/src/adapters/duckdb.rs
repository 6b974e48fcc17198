//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result as CoreResult};
use crate::domain::{
    Account, BudgetRule, CanonicalTransaction, StoredTransaction, TransactionType,
};
use crate::ports::{ConflictPolicy, DateRange, TransactionStore};
use crate::services::migration::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Rows per multi-row INSERT and ids per IN (...) lookup
const CHUNK_SIZE: usize = 500;

/// Columns bound per inserted transaction row
const INSERT_COLUMNS: &str = "transaction_id, user_id, account_id, credit_card_id, external_id, \
     transaction_date, posted_at, description, amount, transaction_type, category_id, category, \
     classification_rule, is_fixed, import_batch_id, created_at, updated_at";

const INSERT_ROW: &str = "(?, ?, ?, ?, ?, CAST(? AS DATE), CAST(? AS TIMESTAMP), ?, \
     CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// A committed import as recorded in sys_import_batches
#[derive(Debug, Clone, Serialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub account_id: Uuid,
    pub confirmed_count: i64,
    pub imported_count: i64,
    pub created_at: DateTime<Utc>,
}

/// DuckDB repository implementation
///
/// The synchronous methods serve the CLI directly. The `TransactionStore`
/// methods move their queries onto tokio's blocking pool.
pub struct DuckDbRepository {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file.
    ///
    /// Retries with exponential backoff while another process holds the file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Arc::new(Mutex::new(conn)),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Throwaway database, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs an extension
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    // === Account operations ===

    /// Insert or update an account. The owner of an existing account never changes.
    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_accounts (account_id, user_id, name, account_type, institution,
                                       currency, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
             ON CONFLICT (account_id) DO UPDATE SET
                name = EXCLUDED.name,
                account_type = COALESCE(EXCLUDED.account_type, sys_accounts.account_type),
                institution = COALESCE(EXCLUDED.institution, sys_accounts.institution),
                currency = EXCLUDED.currency,
                updated_at = EXCLUDED.updated_at",
            params![
                account.id.to_string(),
                account.user_id,
                account.name,
                account.account_type,
                account.institution,
                Account::normalize_currency(&account.currency),
                format_timestamp(&account.created_at),
                format_timestamp(&account.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, user_id, name, account_type, institution, currency,
                    created_at::VARCHAR, updated_at::VARCHAR
             FROM sys_accounts WHERE user_id = ? ORDER BY name",
        )?;
        let rows = stmt
            .query_map([user_id], AccountRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    pub fn get_account_by_id(&self, user_id: &str, account_id: Uuid) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, user_id, name, account_type, institution, currency,
                    created_at::VARCHAR, updated_at::VARCHAR
             FROM sys_accounts WHERE user_id = ? AND account_id = ?",
        )?;
        let mut rows = stmt
            .query_map(params![user_id, account_id.to_string()], AccountRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.pop().map(AccountRow::into_account).transpose()
    }

    // === Transaction reads ===

    /// Stored transactions of the user, newest first
    pub fn get_transactions(
        &self,
        user_id: &str,
        account_id: Option<Uuid>,
    ) -> Result<Vec<CanonicalTransaction>> {
        let conn = self.lock()?;
        let mut sql = String::from(
            "SELECT transaction_date::VARCHAR, description, amount::VARCHAR, transaction_type,
                    external_id, account_id, credit_card_id, category_id, category,
                    is_fixed, classification_rule
             FROM sys_transactions WHERE user_id = ?",
        );
        let mut args = vec![user_id.to_string()];
        if let Some(account_id) = account_id {
            sql.push_str(" AND account_id = ?");
            args.push(account_id.to_string());
        }
        sql.push_str(" ORDER BY transaction_date DESC, external_id");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(TransactionRow {
                    date: row.get(0)?,
                    description: row.get(1)?,
                    amount: row.get(2)?,
                    transaction_type: row.get(3)?,
                    external_id: row.get(4)?,
                    account_id: row.get(5)?,
                    credit_card_id: row.get(6)?,
                    category_id: row.get(7)?,
                    category: row.get(8)?,
                    is_fixed: row.get(9)?,
                    classification_rule: row.get(10)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    pub fn transaction_count(&self, user_id: &str) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_transactions WHERE user_id = ?",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_import_batches(&self, user_id: &str) -> Result<Vec<ImportBatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT batch_id, account_id, confirmed_count, imported_count, created_at::VARCHAR
             FROM sys_import_batches WHERE user_id = ? ORDER BY created_at DESC, batch_id DESC",
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(batch_id, account_id, confirmed_count, imported_count, created)| {
                Ok(ImportBatch {
                    batch_id,
                    account_id: parse_uuid(&account_id)?,
                    confirmed_count,
                    imported_count,
                    created_at: parse_timestamp(&created),
                })
            })
            .collect()
    }

    /// Run `f` with the connection on the blocking pool
    async fn run_blocking<T, F>(&self, f: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
            f(&mut guard)
        })
        .await;

        match joined {
            Ok(result) => result.map_err(db_error),
            Err(e) => Err(Error::database(format!("database task failed: {}", e))),
        }
    }
}

fn account_exists(conn: &Connection, user_id: &str, account_id: Uuid) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sys_accounts WHERE user_id = ? AND account_id = ?",
        params![user_id, account_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn find_in_range(
    conn: &Connection,
    user_id: &str,
    range: DateRange,
    account_id: Option<Uuid>,
) -> Result<Vec<StoredTransaction>> {
    let mut sql = String::from(
        "SELECT transaction_id, account_id, transaction_date::VARCHAR, amount::VARCHAR,
                description, external_id
         FROM sys_transactions
         WHERE user_id = ?
           AND transaction_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)",
    );
    let mut args = vec![
        user_id.to_string(),
        range.start.format("%Y-%m-%d").to_string(),
        range.end.format("%Y-%m-%d").to_string(),
    ];
    if let Some(account_id) = account_id {
        sql.push_str(" AND account_id = ?");
        args.push(account_id.to_string());
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), StoredRow::from_row)?
        .collect::<duckdb::Result<Vec<_>>>()?;
    rows.into_iter().map(StoredRow::into_stored).collect()
}

fn find_by_external_ids(
    conn: &Connection,
    user_id: &str,
    external_ids: &[String],
) -> Result<Vec<StoredTransaction>> {
    if external_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();

    for chunk in external_ids.chunks(CHUNK_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT transaction_id, account_id, transaction_date::VARCHAR, amount::VARCHAR,
                    description, external_id
             FROM sys_transactions
             WHERE user_id = ? AND external_id IN ({})",
            placeholders
        );
        let args = std::iter::once(user_id).chain(chunk.iter().map(String::as_str));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), StoredRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        for row in rows {
            found.push(row.into_stored()?);
        }
    }

    Ok(found)
}

/// One atomic write: transaction rows plus the batch record.
fn bulk_insert(
    conn: &mut Connection,
    user_id: &str,
    records: &[CanonicalTransaction],
    policy: ConflictPolicy,
    batch_id: Option<&str>,
) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    // ON CONFLICT cannot touch the same key twice in one statement
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<&CanonicalTransaction> = records
        .iter()
        .filter(|r| seen.insert(r.external_id.as_str()))
        .collect();

    let conflict_clause = match policy {
        ConflictPolicy::Skip => " ON CONFLICT (user_id, external_id) DO NOTHING",
        ConflictPolicy::Fail => "",
        ConflictPolicy::Upsert => {
            " ON CONFLICT (user_id, external_id) DO UPDATE SET
                description = EXCLUDED.description,
                amount = EXCLUDED.amount,
                transaction_type = EXCLUDED.transaction_type,
                category_id = EXCLUDED.category_id,
                category = EXCLUDED.category,
                classification_rule = EXCLUDED.classification_rule,
                is_fixed = EXCLUDED.is_fixed,
                import_batch_id = EXCLUDED.import_batch_id,
                updated_at = EXCLUDED.updated_at"
        }
    };

    let tx = conn.transaction()?;

    let count_sql = "SELECT COUNT(*) FROM sys_transactions WHERE user_id = ?";
    let before: i64 = tx.query_row(count_sql, [user_id], |row| row.get(0))?;

    let now = format_timestamp(&Utc::now());
    for chunk in unique.chunks(CHUNK_SIZE) {
        let rows = vec![INSERT_ROW; chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO sys_transactions ({}) VALUES {}{}",
            INSERT_COLUMNS, rows, conflict_clause
        );
        let values: Vec<Value> = chunk
            .iter()
            .flat_map(|record| insert_values(user_id, record, batch_id, &now))
            .collect();
        tx.execute(&sql, params_from_iter(values.iter()))
            .with_context(|| format!("Failed to insert {} transactions", chunk.len()))?;
    }

    let after: i64 = tx.query_row(count_sql, [user_id], |row| row.get(0))?;
    let written = match policy {
        ConflictPolicy::Skip => (after - before).max(0) as usize,
        ConflictPolicy::Fail | ConflictPolicy::Upsert => unique.len(),
    };

    if let Some(batch_id) = batch_id {
        let account_id = unique
            .first()
            .map(|r| r.account_id.to_string())
            .unwrap_or_default();
        tx.execute(
            "INSERT INTO sys_import_batches
                (batch_id, user_id, account_id, confirmed_count, imported_count, created_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                batch_id,
                user_id,
                account_id,
                records.len() as i64,
                written as i64,
                now
            ],
        )?;
    }

    tx.commit()?;
    Ok(written)
}

fn insert_values(
    user_id: &str,
    record: &CanonicalTransaction,
    batch_id: Option<&str>,
    now: &str,
) -> Vec<Value> {
    let text = |s: &str| Value::Text(s.to_string());
    let opt_text = |s: Option<String>| s.map(Value::Text).unwrap_or(Value::Null);

    vec![
        Value::Text(Uuid::new_v4().to_string()),
        text(user_id),
        Value::Text(record.account_id.to_string()),
        opt_text(record.credit_card_id.map(|id| id.to_string())),
        text(&record.external_id),
        Value::Text(record.date.format("%Y-%m-%d").to_string()),
        Value::Text(format_timestamp(&record.posted_at())),
        text(&record.description),
        Value::Text(record.amount.to_string()),
        text(record.transaction_type.as_str()),
        opt_text(record.category_id.map(|id| id.to_string())),
        opt_text(record.category.clone()),
        Value::Int(record.classification_rule.value() as i32),
        Value::Boolean(record.is_fixed),
        opt_text(batch_id.map(str::to_string)),
        text(now),
        text(now),
    ]
}

#[async_trait]
impl TransactionStore for DuckDbRepository {
    async fn account_exists(&self, user_id: &str, account_id: Uuid) -> CoreResult<bool> {
        let user_id = user_id.to_string();
        self.run_blocking(move |conn| account_exists(conn, &user_id, account_id))
            .await
    }

    async fn find_in_range(
        &self,
        user_id: &str,
        range: DateRange,
        account_id: Option<Uuid>,
    ) -> CoreResult<Vec<StoredTransaction>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |conn| find_in_range(conn, &user_id, range, account_id))
            .await
    }

    async fn find_by_external_ids(
        &self,
        user_id: &str,
        external_ids: &[String],
    ) -> CoreResult<Vec<StoredTransaction>> {
        let user_id = user_id.to_string();
        let external_ids = external_ids.to_vec();
        self.run_blocking(move |conn| find_by_external_ids(conn, &user_id, &external_ids))
            .await
    }

    async fn bulk_insert(
        &self,
        user_id: &str,
        records: &[CanonicalTransaction],
        policy: ConflictPolicy,
        batch_id: Option<&str>,
    ) -> CoreResult<usize> {
        let user_id = user_id.to_string();
        let records = records.to_vec();
        let batch_id = batch_id.map(str::to_string);
        self.run_blocking(move |conn| {
            bulk_insert(conn, &user_id, &records, policy, batch_id.as_deref())
        })
        .await
    }
}

fn db_error(e: anyhow::Error) -> Error {
    Error::database(format!("{:#}", e))
}

// Row shapes read as text and converted outside the row closure

struct AccountRow {
    id: String,
    user_id: String,
    name: String,
    account_type: Option<String>,
    institution: Option<String>,
    currency: String,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            account_type: row.get(3)?,
            institution: row.get(4)?,
            currency: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        Ok(Account {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id,
            name: self.name,
            account_type: self.account_type,
            institution: self.institution,
            currency: self.currency,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

struct StoredRow {
    id: String,
    account_id: String,
    date: String,
    amount: String,
    description: String,
    external_id: String,
}

impl StoredRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            date: row.get(2)?,
            amount: row.get(3)?,
            description: row.get(4)?,
            external_id: row.get(5)?,
        })
    }

    fn into_stored(self) -> Result<StoredTransaction> {
        Ok(StoredTransaction {
            id: parse_uuid(&self.id)?,
            account_id: parse_uuid(&self.account_id)?,
            date: parse_date(&self.date)?,
            amount: parse_decimal(&self.amount)?,
            description: self.description,
            external_id: self.external_id,
        })
    }
}

struct TransactionRow {
    date: String,
    description: String,
    amount: String,
    transaction_type: String,
    external_id: String,
    account_id: String,
    credit_card_id: Option<String>,
    category_id: Option<String>,
    category: Option<String>,
    is_fixed: bool,
    classification_rule: i32,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<CanonicalTransaction> {
        Ok(CanonicalTransaction {
            date: parse_date(&self.date)?,
            description: self.description,
            amount: parse_decimal(&self.amount)?,
            transaction_type: TransactionType::parse(&self.transaction_type)
                .ok_or_else(|| anyhow!("Invalid transaction type: {}", self.transaction_type))?,
            external_id: self.external_id,
            account_id: parse_uuid(&self.account_id)?,
            credit_card_id: self.credit_card_id.as_deref().map(parse_uuid).transpose()?,
            category_id: self.category_id.as_deref().map(parse_uuid).transpose()?,
            category: self.category,
            is_fixed: self.is_fixed,
            classification_rule: BudgetRule::try_from(self.classification_rule as i64)
                .map_err(|e| anyhow!(e))?,
        })
    }
}

// Helper functions

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid UUID in database: {}", s))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date: {}", s))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("Invalid amount: {}", s))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Timestamps come back from DuckDB as `YYYY-MM-DD HH:MM:SS[.ffffff]` in UTC
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn account(repo: &DuckDbRepository, user: &str) -> Uuid {
        let account = Account::new(Uuid::new_v4(), user, "Conta Corrente");
        repo.upsert_account(&account).unwrap();
        account.id
    }

    fn tx(account_id: Uuid, day: u32, cents: i64, external_id: &str) -> CanonicalTransaction {
        CanonicalTransaction {
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            description: format!("tx {}", external_id),
            amount: Decimal::new(cents, 2),
            transaction_type: TransactionType::Expense,
            external_id: external_id.to_string(),
            account_id,
            credit_card_id: None,
            category_id: None,
            category: Some("Mercado".to_string()),
            is_fixed: false,
            classification_rule: BudgetRule::Necessities,
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("database is locked"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_account_roundtrip_is_user_scoped() {
        let repo = repo();
        let id = account(&repo, "ana");

        let accounts = repo.get_accounts("ana").unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].currency, "BRL");
        assert!(repo.get_account_by_id("ana", id).unwrap().is_some());
        assert!(repo.get_account_by_id("bruno", id).unwrap().is_none());
        assert!(repo.get_accounts("bruno").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_exists() {
        let repo = repo();
        let id = account(&repo, "ana");
        assert!(repo.account_exists("ana", id).await.unwrap());
        assert!(!repo.account_exists("bruno", id).await.unwrap());
        assert!(!repo.account_exists("ana", Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_bulk_insert_skip_counts_only_new_rows() {
        let repo = repo();
        let acc = account(&repo, "ana");

        let first = vec![tx(acc, 10, 120000, "a"), tx(acc, 11, 500, "b")];
        let n = repo
            .bulk_insert("ana", &first, ConflictPolicy::Skip, Some("import_1"))
            .await
            .unwrap();
        assert_eq!(n, 2);

        let second = vec![tx(acc, 10, 120000, "a"), tx(acc, 12, 700, "c")];
        let n = repo
            .bulk_insert("ana", &second, ConflictPolicy::Skip, Some("import_2"))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(repo.transaction_count("ana").unwrap(), 3);

        let batches = repo.get_import_batches("ana").unwrap();
        assert_eq!(batches.len(), 2);
        let second_batch = batches.iter().find(|b| b.batch_id == "import_2").unwrap();
        assert_eq!(second_batch.confirmed_count, 2);
        assert_eq!(second_batch.imported_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_store_calls_run_off_the_async_workers() {
        let repo = Arc::new(repo());
        let acc = account(&repo, "ana");

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    let record = tx(acc, 10 + i, 100 * (i as i64 + 1), &format!("w{}", i));
                    repo.bulk_insert("ana", &[record], ConflictPolicy::Skip, None)
                        .await
                })
            })
            .collect();
        for writer in writers {
            assert_eq!(writer.await.unwrap().unwrap(), 1);
        }

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
        );
        let (found, exists) = tokio::join!(
            repo.find_in_range("ana", range, Some(acc)),
            repo.account_exists("ana", acc)
        );
        assert_eq!(found.unwrap().len(), 4);
        assert!(exists.unwrap());
    }

    #[tokio::test]
    async fn test_bulk_insert_fail_rolls_back() {
        let repo = repo();
        let acc = account(&repo, "ana");
        repo.bulk_insert("ana", &[tx(acc, 10, 100, "a")], ConflictPolicy::Skip, None)
            .await
            .unwrap();

        let result = repo
            .bulk_insert(
                "ana",
                &[tx(acc, 11, 200, "new"), tx(acc, 10, 100, "a")],
                ConflictPolicy::Fail,
                Some("import_fail"),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(repo.transaction_count("ana").unwrap(), 1);
        assert!(repo.get_import_batches("ana").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_insert_upsert_overwrites() {
        let repo = repo();
        let acc = account(&repo, "ana");
        repo.bulk_insert("ana", &[tx(acc, 10, 100, "a")], ConflictPolicy::Skip, None)
            .await
            .unwrap();

        let mut changed = tx(acc, 10, 100, "a");
        changed.category = Some("Restaurantes".to_string());
        changed.classification_rule = BudgetRule::Wants;
        repo.bulk_insert("ana", &[changed], ConflictPolicy::Upsert, None)
            .await
            .unwrap();

        let stored = repo.get_transactions("ana", Some(acc)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category.as_deref(), Some("Restaurantes"));
        assert_eq!(stored[0].classification_rule, BudgetRule::Wants);
    }

    #[tokio::test]
    async fn test_external_id_unique_per_user_not_global() {
        let repo = repo();
        let ana = account(&repo, "ana");
        let bruno = account(&repo, "bruno");
        repo.bulk_insert("ana", &[tx(ana, 10, 100, "same")], ConflictPolicy::Skip, None)
            .await
            .unwrap();
        let n = repo
            .bulk_insert("bruno", &[tx(bruno, 10, 100, "same")], ConflictPolicy::Skip, None)
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_range_and_id_lookups() {
        let repo = repo();
        let acc = account(&repo, "ana");
        let other = account(&repo, "ana");
        repo.bulk_insert(
            "ana",
            &[tx(acc, 5, 100, "a"), tx(acc, 15, 200, "b"), tx(acc, 25, 300, "c")],
            ConflictPolicy::Skip,
            None,
        )
        .await
        .unwrap();
        repo.bulk_insert("ana", &[tx(other, 15, 200, "d")], ConflictPolicy::Skip, None)
            .await
            .unwrap();

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
        );
        let in_account = repo.find_in_range("ana", range, Some(acc)).await.unwrap();
        assert_eq!(in_account.len(), 1);
        assert_eq!(in_account[0].external_id, "b");
        assert_eq!(in_account[0].amount, Decimal::new(200, 2));

        let all_accounts = repo.find_in_range("ana", range, None).await.unwrap();
        assert_eq!(all_accounts.len(), 2);

        let by_id = repo
            .find_by_external_ids("ana", &["a".to_string(), "d".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(by_id.len(), 2);
        assert!(repo.find_by_external_ids("ana", &[]).await.unwrap().is_empty());
        assert!(repo
            .find_by_external_ids("bruno", &["a".to_string()])
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2026-02-05 12:00:00");
        assert_eq!(ts.hour(), 12);
        let ts = parse_timestamp("2026-02-05 12:30:00.123456");
        assert_eq!(ts.minute(), 30);
    }
}
