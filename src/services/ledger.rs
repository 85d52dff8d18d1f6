// Ledger Service - deposits, withdrawals and transfers
//
// The system of record for money movement. Every admitted command produces
// one transaction row plus a balanced DEBIT/CREDIT pair of append-only
// ledger entries inside a single database transaction. Idempotency keys make
// commands at-most-once: a replay returns the stored transaction unchanged
// and publishes nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as DbTransaction};
use uuid::Uuid;

use crate::error::{Result, WalletError};
use crate::events::{EventBus, EventEnvelope, EventType, TransactionEventPayload};
use crate::models::{
    wallet_account, EntryType, Transaction, TransactionStatus, TransactionType, WalletStatus,
    CASH_ACCOUNT,
};
use crate::services::limits::LimitEngine;
use crate::validation;

pub struct LedgerService {
    db: PgPool,
    limits: Arc<LimitEngine>,
    bus: Arc<EventBus>,
}

/// One side of the double entry before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub wallet_id: Option<Uuid>,
    pub account: String,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

/// Build the DEBIT/CREDIT pair for a command. Wallet endpoints carry their
/// `balance_before` (the sum of their existing entries); the cash
/// counter-account records `balance_after = amount` as a placeholder since it
/// is not a tracked account.
pub fn build_entries(
    transaction_type: TransactionType,
    amount: Decimal,
    from: Option<(Uuid, Decimal)>,
    to: Option<(Uuid, Decimal)>,
) -> Result<(EntryDraft, EntryDraft)> {
    let cash = |entry_type: EntryType| EntryDraft {
        wallet_id: None,
        account: CASH_ACCOUNT.to_string(),
        entry_type,
        amount,
        balance_after: amount,
    };

    let debit_wallet = |(id, balance_before): (Uuid, Decimal)| -> Result<EntryDraft> {
        if balance_before < amount {
            return Err(WalletError::InsufficientBalance);
        }
        Ok(EntryDraft {
            wallet_id: Some(id),
            account: wallet_account(id),
            entry_type: EntryType::Debit,
            amount,
            balance_after: balance_before - amount,
        })
    };

    let credit_wallet = |(id, balance_before): (Uuid, Decimal)| EntryDraft {
        wallet_id: Some(id),
        account: wallet_account(id),
        entry_type: EntryType::Credit,
        amount,
        balance_after: balance_before + amount,
    };

    let (debit, credit) = match transaction_type {
        TransactionType::Deposit => {
            let to = to.ok_or_else(|| {
                WalletError::InvalidInput("Deposit requires a destination wallet".into())
            })?;
            (cash(EntryType::Debit), credit_wallet(to))
        }
        TransactionType::Withdrawal => {
            let from = from.ok_or_else(|| {
                WalletError::InvalidInput("Withdrawal requires a source wallet".into())
            })?;
            (debit_wallet(from)?, cash(EntryType::Credit))
        }
        TransactionType::Transfer => {
            let from = from.ok_or_else(|| {
                WalletError::InvalidInput("Transfer requires a source wallet".into())
            })?;
            let to = to.ok_or_else(|| {
                WalletError::InvalidInput("Transfer requires a destination wallet".into())
            })?;
            (debit_wallet(from)?, credit_wallet(to))
        }
    };

    // Double-entry invariant: the pair must balance before it is written.
    if debit.amount != credit.amount {
        return Err(WalletError::Internal(
            "Double-entry invariant violated: debit and credit amounts differ".into(),
        ));
    }

    Ok((debit, credit))
}

struct Command {
    transaction_type: TransactionType,
    from_wallet_id: Option<Uuid>,
    to_wallet_id: Option<Uuid>,
    amount: Decimal,
    currency: String,
    idempotency_key: String,
    metadata: Option<serde_json::Value>,
}

impl LedgerService {
    pub fn new(db: PgPool, limits: Arc<LimitEngine>, bus: Arc<EventBus>) -> Self {
        Self { db, limits, bus }
    }

    pub async fn deposit(
        &self,
        to_wallet_id: Uuid,
        amount: Decimal,
        currency: String,
        idempotency_key: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<Transaction> {
        self.execute(Command {
            transaction_type: TransactionType::Deposit,
            from_wallet_id: None,
            to_wallet_id: Some(to_wallet_id),
            amount,
            currency,
            idempotency_key,
            metadata,
        })
        .await
    }

    pub async fn withdraw(
        &self,
        from_wallet_id: Uuid,
        amount: Decimal,
        currency: String,
        idempotency_key: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<Transaction> {
        self.execute(Command {
            transaction_type: TransactionType::Withdrawal,
            from_wallet_id: Some(from_wallet_id),
            to_wallet_id: None,
            amount,
            currency,
            idempotency_key,
            metadata,
        })
        .await
    }

    pub async fn transfer(
        &self,
        from_wallet_id: Uuid,
        to_wallet_id: Uuid,
        amount: Decimal,
        currency: String,
        idempotency_key: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<Transaction> {
        self.execute(Command {
            transaction_type: TransactionType::Transfer,
            from_wallet_id: Some(from_wallet_id),
            to_wallet_id: Some(to_wallet_id),
            amount,
            currency,
            idempotency_key,
            metadata,
        })
        .await
    }

    async fn execute(&self, cmd: Command) -> Result<Transaction> {
        // 1. Shape validation
        validation::validate_amount(cmd.amount)?;
        validation::validate_currency(&cmd.currency)?;
        validation::validate_idempotency_key(&cmd.idempotency_key)?;
        if cmd.transaction_type == TransactionType::Transfer
            && cmd.from_wallet_id == cmd.to_wallet_id
        {
            return Err(WalletError::InvalidInput(
                "Transfer endpoints must be distinct wallets".into(),
            ));
        }

        // 2. Idempotent replay: return the stored outcome, publish nothing
        if let Some(existing) = self.find_by_idempotency_key(&cmd.idempotency_key).await? {
            tracing::debug!(
                "Idempotent replay for key {}: returning transaction {}",
                cmd.idempotency_key,
                existing.id
            );
            return Ok(existing);
        }

        // 3. Resolve wallet state for every named endpoint (read-only view of
        //    the wallet core)
        for wallet_id in [cmd.from_wallet_id, cmd.to_wallet_id].into_iter().flatten() {
            self.require_active_wallet(wallet_id).await?;
        }

        // 4. Admission control for every named endpoint (both ends of a
        //    transfer count)
        for wallet_id in [cmd.from_wallet_id, cmd.to_wallet_id].into_iter().flatten() {
            self.limits
                .check(Some(wallet_id), cmd.amount, cmd.transaction_type)
                .await?;
        }

        // 5. One storage transaction for the row plus the double entry
        let transaction_id = Uuid::new_v4();
        let initiated_at = Utc::now();

        let mut tx = self.db.begin().await.map_err(WalletError::from_db_error)?;

        if let Err(e) = self
            .insert_pending(&mut tx, transaction_id, &cmd, initiated_at)
            .await
        {
            // A concurrent command with the same key won the unique index;
            // observe its outcome instead (silent replay).
            if is_unique_violation(&e) {
                drop(tx);
                if let Some(existing) =
                    self.find_by_idempotency_key(&cmd.idempotency_key).await?
                {
                    return Ok(existing);
                }
            }
            return Err(WalletError::from(e));
        }

        self.publish_transaction_event(
            EventType::TransactionInitiated,
            transaction_id,
            &cmd,
            TransactionStatus::Pending,
            None,
            None,
        )
        .await;

        // 6-7. Double entry and completion; any failure reifies a FAILED row
        let completed_at = Utc::now();
        match self
            .write_double_entry(&mut tx, transaction_id, &cmd, completed_at)
            .await
        {
            Ok(()) => {
                tx.commit().await.map_err(WalletError::from_db_error)?;
            }
            Err(e) => {
                tx.rollback().await.ok();
                self.reify_failure(transaction_id, &cmd, initiated_at, &e).await;
                self.publish_transaction_event(
                    EventType::TransactionFailed,
                    transaction_id,
                    &cmd,
                    TransactionStatus::Failed,
                    None,
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
        }

        // 8. Completed event after the durable write
        self.publish_transaction_event(
            EventType::TransactionCompleted,
            transaction_id,
            &cmd,
            TransactionStatus::Completed,
            Some(completed_at),
            None,
        )
        .await;

        self.get_transaction(transaction_id).await
    }

    async fn insert_pending(
        &self,
        tx: &mut DbTransaction<'_, Postgres>,
        transaction_id: Uuid,
        cmd: &Command,
        initiated_at: DateTime<Utc>,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO transactions
            (id, transaction_type, status, amount, currency, from_wallet_id, to_wallet_id,
             initiated_at, idempotency_key, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transaction_id)
        .bind(cmd.transaction_type.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .bind(cmd.amount)
        .bind(&cmd.currency)
        .bind(cmd.from_wallet_id)
        .bind(cmd.to_wallet_id)
        .bind(initiated_at)
        .bind(&cmd.idempotency_key)
        .bind(&cmd.metadata)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn write_double_entry(
        &self,
        tx: &mut DbTransaction<'_, Postgres>,
        transaction_id: Uuid,
        cmd: &Command,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        // Lock the named wallet rows in a stable order so concurrent
        // transfers over the same pair cannot deadlock, then derive each
        // endpoint's balance from its entry history inside this transaction.
        let mut endpoints: Vec<Uuid> = [cmd.from_wallet_id, cmd.to_wallet_id]
            .into_iter()
            .flatten()
            .collect();
        endpoints.sort();

        for wallet_id in &endpoints {
            sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
                .bind(wallet_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(WalletError::from_db_error)?
                .ok_or_else(|| WalletError::NotFound(format!("Wallet {} not found", wallet_id)))?;
        }

        let from = match cmd.from_wallet_id {
            Some(id) => Some((id, self.ledger_balance(tx, id).await?)),
            None => None,
        };
        let to = match cmd.to_wallet_id {
            Some(id) => Some((id, self.ledger_balance(tx, id).await?)),
            None => None,
        };

        let (debit, credit) = build_entries(cmd.transaction_type, cmd.amount, from, to)?;

        for entry in [&debit, &credit] {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries
                (id, transaction_id, wallet_id, account, entry_type, amount, balance_after, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(transaction_id)
            .bind(entry.wallet_id)
            .bind(&entry.account)
            .bind(entry.entry_type.as_str())
            .bind(entry.amount)
            .bind(entry.balance_after)
            .bind(completed_at)
            .execute(&mut **tx)
            .await
            .map_err(WalletError::from_db_error)?;
        }

        sqlx::query(
            "UPDATE transactions SET status = $1, completed_at = $2 WHERE id = $3",
        )
        .bind(TransactionStatus::Completed.as_str())
        .bind(completed_at)
        .bind(transaction_id)
        .execute(&mut **tx)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(())
    }

    /// Net position of a wallet from its entry history: credits minus debits.
    async fn ledger_balance(
        &self,
        tx: &mut DbTransaction<'_, Postgres>,
        wallet_id: Uuid,
    ) -> Result<Decimal> {
        let (balance,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(CASE WHEN entry_type = 'CREDIT' THEN amount ELSE -amount END), 0)
            FROM ledger_entries
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(balance)
    }

    /// Record the failed outcome outside the aborted transaction so the
    /// failure is observable and the idempotency key stays claimed.
    async fn reify_failure(
        &self,
        transaction_id: Uuid,
        cmd: &Command,
        initiated_at: DateTime<Utc>,
        error: &WalletError,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
            (id, transaction_type, status, amount, currency, from_wallet_id, to_wallet_id,
             initiated_at, failure_reason, idempotency_key, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(transaction_id)
        .bind(cmd.transaction_type.as_str())
        .bind(TransactionStatus::Failed.as_str())
        .bind(cmd.amount)
        .bind(&cmd.currency)
        .bind(cmd.from_wallet_id)
        .bind(cmd.to_wallet_id)
        .bind(initiated_at)
        .bind(error.to_string())
        .bind(&cmd.idempotency_key)
        .bind(&cmd.metadata)
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            tracing::error!(
                "Failed to record FAILED transaction {} for key {}: {}",
                transaction_id,
                cmd.idempotency_key,
                e
            );
        }
    }

    async fn require_active_wallet(&self, wallet_id: Uuid) -> Result<()> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM wallets WHERE id = $1")
                .bind(wallet_id)
                .fetch_optional(&self.db)
                .await
                .map_err(WalletError::from_db_error)?;

        let (status,) = status
            .ok_or_else(|| WalletError::NotFound(format!("Wallet {} not found", wallet_id)))?;

        if WalletStatus::try_from(status.clone()) != Ok(WalletStatus::Active) {
            return Err(WalletError::WalletInactive(format!(
                "Wallet {} is {}",
                wallet_id, status
            )));
        }

        Ok(())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
        let existing = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, transaction_type, status, amount, currency, from_wallet_id, to_wallet_id,
                   initiated_at, completed_at, failure_reason, idempotency_key, metadata
            FROM transactions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(existing)
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, transaction_type, status, amount, currency, from_wallet_id, to_wallet_id,
                   initiated_at, completed_at, failure_reason, idempotency_key, metadata
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?
        .ok_or_else(|| WalletError::NotFound(format!("Transaction {} not found", transaction_id)))
    }

    /// History for one wallet with filters, a sort whitelist and pagination.
    /// Returns the page plus the total row count for the filter.
    pub async fn list_wallet_transactions(
        &self,
        wallet_id: Uuid,
        filter: &TransactionFilter,
        page: &PageRequest,
    ) -> Result<(Vec<Transaction>, i64)> {
        let where_clause = r#"
            (from_wallet_id = $1 OR to_wallet_id = $1)
            AND ($2::timestamptz IS NULL OR initiated_at >= $2)
            AND ($3::timestamptz IS NULL OR initiated_at <= $3)
            AND ($4::text IS NULL OR status = $4)
            AND ($5::text IS NULL OR transaction_type = $5)
        "#;

        let query = format!(
            r#"
            SELECT id, transaction_type, status, amount, currency, from_wallet_id, to_wallet_id,
                   initiated_at, completed_at, failure_reason, idempotency_key, metadata
            FROM transactions
            WHERE {}
            ORDER BY {} {}
            LIMIT $6 OFFSET $7
            "#,
            where_clause,
            page.sort_by.column(),
            page.sort_direction.sql(),
        );

        let transactions = sqlx::query_as::<_, Transaction>(&query)
            .bind(wallet_id)
            .bind(filter.from_date)
            .bind(filter.to_date)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.transaction_type.map(|t| t.as_str()))
            .bind(page.size)
            .bind(page.page * page.size)
            .fetch_all(&self.db)
            .await
            .map_err(WalletError::from_db_error)?;

        let count_query = format!("SELECT COUNT(*) FROM transactions WHERE {}", where_clause);
        let (total,): (i64,) = sqlx::query_as(&count_query)
            .bind(wallet_id)
            .bind(filter.from_date)
            .bind(filter.to_date)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.transaction_type.map(|t| t.as_str()))
            .fetch_one(&self.db)
            .await
            .map_err(WalletError::from_db_error)?;

        Ok((transactions, total))
    }

    async fn publish_transaction_event(
        &self,
        event_type: EventType,
        transaction_id: Uuid,
        cmd: &Command,
        status: TransactionStatus,
        completed_at: Option<DateTime<Utc>>,
        failure_reason: Option<String>,
    ) {
        let payload = TransactionEventPayload {
            transaction_id,
            transaction_type: cmd.transaction_type.as_str().to_string(),
            status: status.as_str().to_string(),
            amount: cmd.amount,
            currency: cmd.currency.clone(),
            from_wallet_id: cmd.from_wallet_id,
            to_wallet_id: cmd.to_wallet_id,
            completed_at,
            failure_reason,
        };

        let envelope = match EventEnvelope::new(event_type, transaction_id.to_string(), &payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("Failed to build {} event: {}", event_type.as_str(), e);
                return;
            }
        };

        // Publication is best-effort: the ledger is the system of record and
        // the projector can be rebuilt from it.
        if let Err(e) = self.bus.publish(envelope).await {
            tracing::warn!(
                "Failed to publish {} for transaction {}: {}",
                event_type.as_str(),
                transaction_id,
                e
            );
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Filters for the wallet history listing.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    InitiatedAt,
    CompletedAt,
    Amount,
    Status,
    TransactionType,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(SortField::Id),
            "initiatedAt" => Some(SortField::InitiatedAt),
            "completedAt" => Some(SortField::CompletedAt),
            "amount" => Some(SortField::Amount),
            "status" => Some(SortField::Status),
            "transactionType" => Some(SortField::TransactionType),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::InitiatedAt => "initiated_at",
            SortField::CompletedAt => "completed_at",
            SortField::Amount => "amount",
            SortField::Status => "status",
            SortField::TransactionType => "transaction_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Validated pagination parameters. `size` defaults to 20 and is capped at
/// 100; sorting defaults to `initiatedAt desc`.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
}

impl PageRequest {
    pub const DEFAULT_SIZE: i64 = 20;
    pub const MAX_SIZE: i64 = 100;

    pub fn from_params(
        page: Option<i64>,
        size: Option<i64>,
        sort_by: Option<&str>,
        sort_direction: Option<&str>,
    ) -> Result<Self> {
        let page = page.unwrap_or(0);
        if page < 0 {
            return Err(WalletError::InvalidInput("Page must be non-negative".into()));
        }

        let size = size.unwrap_or(Self::DEFAULT_SIZE);
        if size < 1 {
            return Err(WalletError::InvalidInput("Size must be at least 1".into()));
        }
        let size = size.min(Self::MAX_SIZE);

        let sort_by = match sort_by {
            Some(s) => SortField::parse(s).ok_or_else(|| {
                WalletError::InvalidInput(format!("Unsupported sort field: {}", s))
            })?,
            None => SortField::InitiatedAt,
        };

        let sort_direction = match sort_direction {
            Some(s) => SortDirection::parse(s).ok_or_else(|| {
                WalletError::InvalidInput(format!("Unsupported sort direction: {}", s))
            })?,
            None => SortDirection::Desc,
        };

        Ok(Self {
            page,
            size,
            sort_by,
            sort_direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_deposit_entries() {
        let wallet = Uuid::new_v4();
        let (debit, credit) =
            build_entries(TransactionType::Deposit, dec("100.00"), None, Some((wallet, dec("0"))))
                .unwrap();

        assert_eq!(debit.account, CASH_ACCOUNT);
        assert_eq!(debit.entry_type, EntryType::Debit);
        assert_eq!(debit.balance_after, dec("100.00"));
        assert_eq!(credit.wallet_id, Some(wallet));
        assert_eq!(credit.entry_type, EntryType::Credit);
        assert_eq!(credit.balance_after, dec("100.00"));
        assert_eq!(debit.amount, credit.amount);
    }

    #[test]
    fn test_withdrawal_entries() {
        let wallet = Uuid::new_v4();
        let (debit, credit) = build_entries(
            TransactionType::Withdrawal,
            dec("40.00"),
            Some((wallet, dec("100.00"))),
            None,
        )
        .unwrap();

        assert_eq!(debit.wallet_id, Some(wallet));
        assert_eq!(debit.balance_after, dec("60.00"));
        assert_eq!(credit.account, CASH_ACCOUNT);
        assert_eq!(credit.balance_after, dec("40.00"));
    }

    #[test]
    fn test_transfer_entries() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let (debit, credit) = build_entries(
            TransactionType::Transfer,
            dec("150.00"),
            Some((from, dec("500.00"))),
            Some((to, dec("0"))),
        )
        .unwrap();

        assert_eq!(debit.wallet_id, Some(from));
        assert_eq!(debit.balance_after, dec("350.00"));
        assert_eq!(credit.wallet_id, Some(to));
        assert_eq!(credit.balance_after, dec("150.00"));
    }

    #[test]
    fn test_withdrawal_rejects_overdraft() {
        let wallet = Uuid::new_v4();
        let result = build_entries(
            TransactionType::Withdrawal,
            dec("100.01"),
            Some((wallet, dec("100.00"))),
            None,
        );
        assert!(matches!(result, Err(WalletError::InsufficientBalance)));
    }

    #[test]
    fn test_transfer_rejects_overdraft() {
        let result = build_entries(
            TransactionType::Transfer,
            dec("1.00"),
            Some((Uuid::new_v4(), dec("0.50"))),
            Some((Uuid::new_v4(), dec("0"))),
        );
        assert!(matches!(result, Err(WalletError::InsufficientBalance)));
    }

    #[test]
    fn test_page_request_defaults_and_cap() {
        let page = PageRequest::from_params(None, None, None, None).unwrap();
        assert_eq!(page.page, 0);
        assert_eq!(page.size, PageRequest::DEFAULT_SIZE);
        assert_eq!(page.sort_by, SortField::InitiatedAt);
        assert_eq!(page.sort_direction, SortDirection::Desc);

        let page = PageRequest::from_params(Some(2), Some(500), None, None).unwrap();
        assert_eq!(page.size, PageRequest::MAX_SIZE);

        assert!(PageRequest::from_params(Some(-1), None, None, None).is_err());
        assert!(PageRequest::from_params(None, Some(0), None, None).is_err());
    }

    #[test]
    fn test_sort_whitelist() {
        assert_eq!(SortField::parse("initiatedAt"), Some(SortField::InitiatedAt));
        assert_eq!(SortField::parse("transactionType"), Some(SortField::TransactionType));
        assert_eq!(SortField::parse("idempotencyKey"), None);
        assert!(PageRequest::from_params(None, None, Some("balance"), None).is_err());
        assert!(PageRequest::from_params(None, None, None, Some("sideways")).is_err());
    }
}
