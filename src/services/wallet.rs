// Wallet Service - wallet lifecycle, balance reads and event-driven provisioning
//
// Exclusive writer of the wallets table (balances excepted: the projector
// mutates those through the same pool). Wallets are created explicitly or
// auto-provisioned from CUSTOMER_CREATED; KYC_VERIFIED raises limits for all
// of a customer's wallets, deduplicated durably per check id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::BalanceCache;
use crate::error::{Result, WalletError};
use crate::events::{
    CustomerCreatedPayload, EventBus, EventEnvelope, EventHandler, EventType, KycEventPayload,
    WalletCreatedPayload,
};
use crate::models::{limit_tiers, BalanceSnapshot, Wallet, WalletStatus, SUPPORTED_CURRENCY};
use crate::validation;

const WALLET_COLUMNS: &str =
    "id, customer_id, currency, status, balance, daily_limit, monthly_limit, version, created_at, updated_at";

pub struct WalletService {
    db: PgPool,
    cache: BalanceCache,
    bus: Arc<EventBus>,
}

impl WalletService {
    pub fn new(db: PgPool, cache: BalanceCache, bus: Arc<EventBus>) -> Self {
        Self { db, cache, bus }
    }

    /// Create a wallet explicitly. Rejects a duplicate (customer, currency)
    /// pair and starts at the default limit tier.
    pub async fn create_wallet(&self, customer_id: i64, currency: &str) -> Result<Wallet> {
        validation::validate_currency(currency)?;

        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM wallets WHERE customer_id = $1 AND currency = $2",
        )
        .bind(customer_id)
        .bind(currency)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        if existing.is_some() {
            return Err(WalletError::Conflict(format!(
                "Customer {} already has a {} wallet",
                customer_id, currency
            )));
        }

        let wallet = self
            .insert_wallet(
                customer_id,
                currency,
                limit_tiers::default_daily(),
                limit_tiers::default_monthly(),
            )
            .await?;

        self.publish_wallet_created(&wallet).await;

        Ok(wallet)
    }

    /// Auto-provision from CUSTOMER_CREATED. Idempotent: a customer that
    /// already owns a wallet gets it back unchanged and no event is emitted.
    /// New wallets start at the KYC-pending (low) limit tier.
    pub async fn provision_for_customer(&self, customer_id: i64) -> Result<Wallet> {
        if let Some(existing) = self.find_customer_wallet(customer_id).await? {
            tracing::debug!(
                "Customer {} already owns wallet {}, skipping provisioning",
                customer_id,
                existing.id
            );
            return Ok(existing);
        }

        match self
            .insert_wallet(
                customer_id,
                SUPPORTED_CURRENCY,
                limit_tiers::pending_daily(),
                limit_tiers::pending_monthly(),
            )
            .await
        {
            Ok(wallet) => {
                tracing::info!(
                    "Provisioned wallet {} for customer {}",
                    wallet.id,
                    customer_id
                );
                self.publish_wallet_created(&wallet).await;
                Ok(wallet)
            }
            // A concurrent delivery created it first; return the winner.
            Err(WalletError::Conflict(_)) => self
                .find_customer_wallet(customer_id)
                .await?
                .ok_or_else(|| WalletError::Internal("Wallet vanished after conflict".into())),
            Err(e) => Err(e),
        }
    }

    /// Get a wallet, enforcing ownership against the requesting customer.
    pub async fn get_wallet(&self, wallet_id: Uuid, customer_id: i64) -> Result<Wallet> {
        let wallet = self.find_wallet(wallet_id).await?;

        if wallet.customer_id != customer_id {
            return Err(WalletError::Forbidden(format!(
                "Wallet {} is not owned by the requesting customer",
                wallet_id
            )));
        }

        Ok(wallet)
    }

    pub async fn get_my_wallets(&self, customer_id: i64) -> Result<Vec<Wallet>> {
        let wallets = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE customer_id = $1 ORDER BY created_at",
            WALLET_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(wallets)
    }

    /// Balance read path: the cache snapshot wins, the wallet row is the
    /// fallback and refreshes the cache on a miss.
    pub async fn get_balance(&self, wallet_id: Uuid, customer_id: i64) -> Result<BalanceSnapshot> {
        let wallet = self.get_wallet(wallet_id, customer_id).await?;

        if let Some(snapshot) = self.cache.get(wallet_id).await {
            return Ok(snapshot);
        }

        let snapshot = BalanceSnapshot {
            balance: wallet.balance,
            currency: wallet.currency.trim().to_string(),
            last_updated: wallet.updated_at,
        };
        self.cache.put(wallet_id, &snapshot).await;

        Ok(snapshot)
    }

    pub async fn suspend(&self, wallet_id: Uuid, customer_id: i64) -> Result<Wallet> {
        self.transition_status(wallet_id, customer_id, WalletStatus::Suspended)
            .await
    }

    pub async fn activate(&self, wallet_id: Uuid, customer_id: i64) -> Result<Wallet> {
        self.transition_status(wallet_id, customer_id, WalletStatus::Active)
            .await
    }

    async fn transition_status(
        &self,
        wallet_id: Uuid,
        customer_id: i64,
        target: WalletStatus,
    ) -> Result<Wallet> {
        let wallet = self.get_wallet(wallet_id, customer_id).await?;

        // CLOSED is terminal; ACTIVE <-> SUSPENDED are the only live moves.
        if wallet.status == WalletStatus::Closed {
            return Err(WalletError::Conflict(format!(
                "Wallet {} is closed",
                wallet_id
            )));
        }

        if wallet.status == target {
            return Ok(wallet);
        }

        sqlx::query("UPDATE wallets SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(target.as_str())
            .bind(Utc::now())
            .bind(wallet_id)
            .execute(&self.db)
            .await
            .map_err(WalletError::from_db_error)?;

        // Suspended wallets fall off the balance read fast path
        if target == WalletStatus::Suspended {
            self.cache.invalidate(wallet_id).await;
        }

        tracing::info!(
            "Wallet {} transitioned {} -> {}",
            wallet_id,
            wallet.status.as_str(),
            target.as_str()
        );

        self.find_wallet(wallet_id).await
    }

    /// Raise all of a customer's wallets to the verified limit tier. Replays
    /// of the same check id are discarded against the durable dedup table.
    async fn raise_limits_on_kyc(&self, payload: &KycEventPayload) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_events (event_type, entity_id)
            VALUES ($1, $2)
            ON CONFLICT (event_type, entity_id) DO NOTHING
            "#,
        )
        .bind(EventType::KycVerified.as_str())
        .bind(payload.kyc_check_id.to_string())
        .execute(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        if inserted.rows_affected() == 0 {
            tracing::debug!(
                "KYC check {} already processed, skipping limit raise",
                payload.kyc_check_id
            );
            return Ok(());
        }

        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET daily_limit = $1, monthly_limit = $2, updated_at = $3
            WHERE customer_id = $4
            "#,
        )
        .bind(limit_tiers::verified_daily())
        .bind(limit_tiers::verified_monthly())
        .bind(Utc::now())
        .bind(payload.customer_id)
        .execute(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        tracing::info!(
            "Raised limits on {} wallet(s) of customer {} after KYC check {}",
            updated.rows_affected(),
            payload.customer_id,
            payload.kyc_check_id
        );

        Ok(())
    }

    // Internal helpers

    async fn insert_wallet(
        &self,
        customer_id: i64,
        currency: &str,
        daily_limit: Decimal,
        monthly_limit: Decimal,
    ) -> Result<Wallet> {
        let wallet_id = Uuid::new_v4();
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO wallets
            (id, customer_id, currency, status, balance, daily_limit, monthly_limit, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $7)
            "#,
        )
        .bind(wallet_id)
        .bind(customer_id)
        .bind(currency)
        .bind(WalletStatus::Active.as_str())
        .bind(daily_limit)
        .bind(monthly_limit)
        .bind(now)
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                return Err(WalletError::Conflict(format!(
                    "Customer {} already has a {} wallet",
                    customer_id, currency
                )));
            }
            return Err(WalletError::from(e));
        }

        self.find_wallet(wallet_id).await
    }

    async fn find_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE id = $1",
            WALLET_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?
        .ok_or_else(|| WalletError::NotFound(format!("Wallet {} not found", wallet_id)))
    }

    async fn find_customer_wallet(&self, customer_id: i64) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE customer_id = $1 AND currency = $2",
            WALLET_COLUMNS
        ))
        .bind(customer_id)
        .bind(SUPPORTED_CURRENCY)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(wallet)
    }

    async fn publish_wallet_created(&self, wallet: &Wallet) {
        let user_id: Option<(String,)> =
            match sqlx::query_as("SELECT user_id FROM customer_user_mapping WHERE customer_id = $1")
                .bind(wallet.customer_id)
                .fetch_optional(&self.db)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(
                        "Could not resolve subject for customer {}: {}",
                        wallet.customer_id,
                        e
                    );
                    None
                }
            };

        let payload = WalletCreatedPayload {
            wallet_id: wallet.id,
            customer_id: wallet.customer_id,
            user_id: user_id.map(|(u,)| u).unwrap_or_default(),
            currency: wallet.currency.trim().to_string(),
            balance: wallet.balance,
        };

        let envelope =
            match EventEnvelope::new(EventType::WalletCreated, wallet.customer_id.to_string(), &payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!("Failed to build WALLET_CREATED event: {}", e);
                    return;
                }
            };

        if let Err(e) = self.bus.publish(envelope).await {
            tracing::warn!(
                "Failed to publish WALLET_CREATED for wallet {}: {}",
                wallet.id,
                e
            );
        }
    }
}

// Consumes customer-events (auto-provisioning) and kyc-events (limit raise)
#[async_trait]
impl EventHandler for WalletService {
    fn name(&self) -> &'static str {
        "wallet-service"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        match event.event_type {
            EventType::CustomerCreated => {
                let payload: CustomerCreatedPayload = event.decode_payload()?;
                self.provision_for_customer(payload.customer_id).await?;
                Ok(())
            }
            EventType::KycVerified => {
                let payload: KycEventPayload = event.decode_payload()?;
                self.raise_limits_on_kyc(&payload).await
            }
            // Rejected or repeated non-verified checks keep the low tier
            EventType::KycInitiated | EventType::KycRejected => Ok(()),
            _ => Ok(()),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
