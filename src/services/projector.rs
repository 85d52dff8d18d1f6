// Balance Projector - materializes wallet balances from completed transactions
//
// Consumes TRANSACTION_COMPLETED and applies the deltas to the wallet rows.
// Duplicate deliveries are discarded against the per-wallet
// projected_transactions set, so the projector is safe under at-least-once
// delivery. A delta that would drive a balance negative, or that names an
// unknown wallet, is a data-integrity fault: it is logged and not retried,
// since the ledger core should never have admitted it.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as DbTransaction};
use uuid::Uuid;

use crate::cache::BalanceCache;
use crate::error::{Result, WalletError};
use crate::events::{EventEnvelope, EventHandler, EventType, TransactionEventPayload};
use crate::models::{BalanceSnapshot, TransactionType};

pub struct BalanceProjector {
    db: PgPool,
    cache: BalanceCache,
}

/// The per-wallet deltas implied by a completed transaction.
pub fn wallet_deltas(payload: &TransactionEventPayload) -> Result<Vec<(Uuid, Decimal)>> {
    let transaction_type = TransactionType::parse(&payload.transaction_type).ok_or_else(|| {
        WalletError::Internal(format!(
            "Unknown transaction type in event: {}",
            payload.transaction_type
        ))
    })?;

    let missing = |side: &str| {
        WalletError::Internal(format!(
            "{} event for {} is missing its {} wallet",
            payload.status, payload.transaction_id, side
        ))
    };

    match transaction_type {
        TransactionType::Deposit => {
            let to = payload.to_wallet_id.ok_or_else(|| missing("destination"))?;
            Ok(vec![(to, payload.amount)])
        }
        TransactionType::Withdrawal => {
            let from = payload.from_wallet_id.ok_or_else(|| missing("source"))?;
            Ok(vec![(from, -payload.amount)])
        }
        TransactionType::Transfer => {
            let from = payload.from_wallet_id.ok_or_else(|| missing("source"))?;
            let to = payload.to_wallet_id.ok_or_else(|| missing("destination"))?;
            Ok(vec![(from, -payload.amount), (to, payload.amount)])
        }
    }
}

enum ApplyOutcome {
    Applied,
    Duplicate,
    /// Integrity fault: logged, never retried.
    Rejected(String),
}

impl BalanceProjector {
    pub fn new(db: PgPool, cache: BalanceCache) -> Self {
        Self { db, cache }
    }

    async fn project(&self, payload: &TransactionEventPayload) -> Result<()> {
        let deltas = wallet_deltas(payload)?;

        let mut tx = self.db.begin().await.map_err(WalletError::from_db_error)?;

        let mut touched = Vec::new();
        for (wallet_id, delta) in &deltas {
            match self
                .apply_delta(&mut tx, *wallet_id, *delta, payload.transaction_id)
                .await?
            {
                ApplyOutcome::Applied => touched.push(*wallet_id),
                ApplyOutcome::Duplicate => {
                    tracing::debug!(
                        "Skipping duplicate delivery of {} for wallet {}",
                        payload.transaction_id,
                        wallet_id
                    );
                }
                ApplyOutcome::Rejected(reason) => {
                    // Data-integrity fault. Abort the whole event so neither
                    // side of a transfer is half-recorded, log, and drop.
                    tx.rollback().await.ok();
                    tracing::error!(
                        "Projection of {} rejected: {}",
                        payload.transaction_id,
                        reason
                    );
                    return Ok(());
                }
            }
        }

        tx.commit().await.map_err(WalletError::from_db_error)?;

        // Write-through the fresh snapshots; caching is best-effort
        for wallet_id in touched {
            self.refresh_snapshot(wallet_id).await;
        }

        Ok(())
    }

    async fn apply_delta(
        &self,
        tx: &mut DbTransaction<'_, Postgres>,
        wallet_id: Uuid,
        delta: Decimal,
        transaction_id: Uuid,
    ) -> Result<ApplyOutcome> {
        // Per-wallet dedup set: zero rows inserted means this transaction was
        // already applied to this wallet.
        let inserted = sqlx::query(
            r#"
            INSERT INTO projected_transactions (wallet_id, transaction_id)
            VALUES ($1, $2)
            ON CONFLICT (wallet_id, transaction_id) DO NOTHING
            "#,
        )
        .bind(wallet_id)
        .bind(transaction_id)
        .execute(&mut **tx)
        .await
        .map_err(WalletError::from_db_error)?;

        if inserted.rows_affected() == 0 {
            return Ok(ApplyOutcome::Duplicate);
        }

        // Guarded mutation: the WHERE clause is the compare-and-set that
        // refuses to take a balance negative.
        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance + $1, version = version + 1, updated_at = $2
            WHERE id = $3 AND balance + $1 >= 0
            "#,
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(wallet_id)
        .execute(&mut **tx)
        .await
        .map_err(WalletError::from_db_error)?;

        if updated.rows_affected() == 1 {
            return Ok(ApplyOutcome::Applied);
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(WalletError::from_db_error)?;

        if exists.is_none() {
            Ok(ApplyOutcome::Rejected(format!(
                "unknown wallet {} referenced by transaction {}",
                wallet_id, transaction_id
            )))
        } else {
            Ok(ApplyOutcome::Rejected(format!(
                "delta {} would take wallet {} balance negative",
                delta, wallet_id
            )))
        }
    }

    async fn refresh_snapshot(&self, wallet_id: Uuid) {
        let row: std::result::Result<Option<(Decimal, String, chrono::DateTime<Utc>)>, sqlx::Error> =
            sqlx::query_as("SELECT balance, currency, updated_at FROM wallets WHERE id = $1")
                .bind(wallet_id)
                .fetch_optional(&self.db)
                .await;

        match row {
            Ok(Some((balance, currency, updated_at))) => {
                let snapshot = BalanceSnapshot {
                    balance,
                    currency: currency.trim().to_string(),
                    last_updated: updated_at,
                };
                self.cache.put(wallet_id, &snapshot).await;
            }
            Ok(None) => {
                tracing::warn!("Wallet {} vanished before snapshot refresh", wallet_id);
            }
            Err(e) => {
                tracing::warn!("Snapshot refresh read failed for {}: {}", wallet_id, e);
            }
        }
    }
}

#[async_trait]
impl EventHandler for BalanceProjector {
    fn name(&self) -> &'static str {
        "balance-projector"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        // Only completed transactions move the projection; initiated/failed
        // records carry no balance information.
        if event.event_type != EventType::TransactionCompleted {
            return Ok(());
        }

        let payload: TransactionEventPayload = event.decode_payload()?;
        self.project(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(
        transaction_type: &str,
        from: Option<Uuid>,
        to: Option<Uuid>,
        amount: &str,
    ) -> TransactionEventPayload {
        TransactionEventPayload {
            transaction_id: Uuid::new_v4(),
            transaction_type: transaction_type.to_string(),
            status: "COMPLETED".to_string(),
            amount: amount.parse().unwrap(),
            currency: "KES".to_string(),
            from_wallet_id: from,
            to_wallet_id: to,
            completed_at: Some(Utc::now()),
            failure_reason: None,
        }
    }

    #[test]
    fn test_deposit_credits_destination() {
        let to = Uuid::new_v4();
        let deltas = wallet_deltas(&payload("DEPOSIT", None, Some(to), "100.00")).unwrap();
        assert_eq!(deltas, vec![(to, "100.00".parse().unwrap())]);
    }

    #[test]
    fn test_withdrawal_debits_source() {
        let from = Uuid::new_v4();
        let deltas = wallet_deltas(&payload("WITHDRAWAL", Some(from), None, "40.00")).unwrap();
        assert_eq!(deltas, vec![(from, "-40.00".parse().unwrap())]);
    }

    #[test]
    fn test_transfer_moves_both_sides() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let deltas =
            wallet_deltas(&payload("TRANSFER", Some(from), Some(to), "150.00")).unwrap();
        assert_eq!(
            deltas,
            vec![
                (from, "-150.00".parse().unwrap()),
                (to, "150.00".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn test_malformed_event_is_non_retryable() {
        let err = wallet_deltas(&payload("DEPOSIT", None, None, "100.00")).unwrap_err();
        assert!(!err.is_transient());

        let err = wallet_deltas(&payload("SETTLEMENT", None, None, "1.00")).unwrap_err();
        assert!(!err.is_transient());
    }
}
