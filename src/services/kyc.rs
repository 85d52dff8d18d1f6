// KYC Service - verification lifecycle
//
// A check is created IN_PROGRESS by initiate and transitioned by the
// provider webhook. VERIFIED and REJECTED are terminal; at most one check
// per customer may be IN_PROGRESS (also enforced by a partial unique index).
// Limit raises happen downstream in the wallet core, driven by KYC_VERIFIED.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, WalletError};
use crate::events::{EventBus, EventEnvelope, EventType, KycEventPayload};
use crate::models::{KycCheck, KycStatus};

const KYC_COLUMNS: &str =
    "id, customer_id, status, provider_reference, documents, initiated_at, verified_at, rejection_reason";

pub struct KycService {
    db: PgPool,
    bus: Arc<EventBus>,
}

/// Status view returned by the read endpoint. Customers with no check yet
/// default to PENDING.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycStatusView {
    pub status: KycStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl KycService {
    pub fn new(db: PgPool, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    /// Start a verification check. Rejected while another check is still in
    /// progress for the customer.
    pub async fn initiate(&self, customer_id: i64, documents: serde_json::Value) -> Result<KycCheck> {
        let non_empty = documents
            .as_object()
            .map(|map| !map.is_empty())
            .unwrap_or(false);
        if !non_empty {
            return Err(WalletError::InvalidInput(
                "At least one document is required to initiate KYC".into(),
            ));
        }

        let in_progress: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM kyc_checks WHERE customer_id = $1 AND status = $2",
        )
        .bind(customer_id)
        .bind(KycStatus::InProgress.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        if in_progress.is_some() {
            return Err(WalletError::Conflict(
                "A KYC check is already in progress for this customer".into(),
            ));
        }

        let check_id = Uuid::new_v4();
        let provider_reference = format!("KYC-{}", Uuid::new_v4());
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO kyc_checks
            (id, customer_id, status, provider_reference, documents, initiated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(check_id)
        .bind(customer_id)
        .bind(KycStatus::InProgress.as_str())
        .bind(&provider_reference)
        .bind(&documents)
        .bind(now)
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            // The partial unique index caught a concurrent initiate
            if is_unique_violation(&e) {
                return Err(WalletError::Conflict(
                    "A KYC check is already in progress for this customer".into(),
                ));
            }
            return Err(WalletError::from(e));
        }

        let check = self.find_check(check_id).await?;
        tracing::info!(
            "KYC check {} initiated for customer {} (ref {})",
            check.id,
            customer_id,
            provider_reference
        );

        self.publish_kyc_event(EventType::KycInitiated, &check).await;

        Ok(check)
    }

    /// Provider webhook: transition the customer's latest check to VERIFIED
    /// or REJECTED. Terminal checks reject further transitions.
    pub async fn apply_webhook(
        &self,
        customer_id: i64,
        status: &str,
        verified_at: Option<&str>,
        rejection_reason: Option<&str>,
    ) -> Result<KycCheck> {
        let target = match status {
            "VERIFIED" => KycStatus::Verified,
            "REJECTED" => KycStatus::Rejected,
            other => {
                return Err(WalletError::InvalidInput(format!(
                    "Unknown KYC status: {}",
                    other
                )))
            }
        };

        let check = self
            .latest_check(customer_id)
            .await?
            .ok_or_else(|| {
                WalletError::NotFound(format!("No KYC record for customer {}", customer_id))
            })?;

        if check.status.is_terminal() {
            return Err(WalletError::Conflict(format!(
                "KYC check {} is already {}",
                check.id,
                check.status.as_str()
            )));
        }

        // Provider timestamps arrive as ISO strings; fall back to now when
        // the value does not parse.
        let verified_at = match target {
            KycStatus::Verified => Some(
                verified_at
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
            ),
            _ => None,
        };

        let rejection_reason = match target {
            KycStatus::Rejected => Some(
                rejection_reason
                    .unwrap_or("Rejected by verification provider")
                    .to_string(),
            ),
            _ => None,
        };

        sqlx::query(
            r#"
            UPDATE kyc_checks
            SET status = $1, verified_at = $2, rejection_reason = $3
            WHERE id = $4
            "#,
        )
        .bind(target.as_str())
        .bind(verified_at)
        .bind(&rejection_reason)
        .bind(check.id)
        .execute(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        let check = self.find_check(check.id).await?;
        tracing::info!(
            "KYC check {} for customer {} transitioned to {}",
            check.id,
            customer_id,
            target.as_str()
        );

        let event_type = match target {
            KycStatus::Verified => EventType::KycVerified,
            _ => EventType::KycRejected,
        };
        self.publish_kyc_event(event_type, &check).await;

        Ok(check)
    }

    /// Latest check status for a customer, defaulting to PENDING when no
    /// check exists yet.
    pub async fn status(&self, customer_id: i64) -> Result<KycStatusView> {
        let check = self.latest_check(customer_id).await?;

        Ok(match check {
            Some(check) => KycStatusView {
                status: check.status,
                verified_at: check.verified_at,
                rejection_reason: check.rejection_reason,
            },
            None => KycStatusView {
                status: KycStatus::Pending,
                verified_at: None,
                rejection_reason: None,
            },
        })
    }

    // Internal helpers

    async fn find_check(&self, check_id: Uuid) -> Result<KycCheck> {
        sqlx::query_as::<_, KycCheck>(&format!(
            "SELECT {} FROM kyc_checks WHERE id = $1",
            KYC_COLUMNS
        ))
        .bind(check_id)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?
        .ok_or_else(|| WalletError::NotFound(format!("KYC check {} not found", check_id)))
    }

    async fn latest_check(&self, customer_id: i64) -> Result<Option<KycCheck>> {
        let check = sqlx::query_as::<_, KycCheck>(&format!(
            "SELECT {} FROM kyc_checks WHERE customer_id = $1 ORDER BY initiated_at DESC LIMIT 1",
            KYC_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(check)
    }

    async fn publish_kyc_event(&self, event_type: EventType, check: &KycCheck) {
        let user_id: Option<(String,)> =
            match sqlx::query_as("SELECT user_id FROM customer_user_mapping WHERE customer_id = $1")
                .bind(check.customer_id)
                .fetch_optional(&self.db)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(
                        "Could not resolve subject for customer {}: {}",
                        check.customer_id,
                        e
                    );
                    None
                }
            };

        let payload = KycEventPayload {
            kyc_check_id: check.id,
            customer_id: check.customer_id,
            user_id: user_id.map(|(u,)| u).unwrap_or_default(),
            status: check.status.as_str().to_string(),
            provider_reference: check.provider_reference.clone(),
            initiated_at: check.initiated_at,
            verified_at: check.verified_at,
            rejection_reason: check.rejection_reason.clone(),
            documents: check.documents.clone(),
        };

        let envelope =
            match EventEnvelope::new(event_type, check.customer_id.to_string(), &payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!("Failed to build {} event: {}", event_type.as_str(), e);
                    return;
                }
            };

        if let Err(e) = self.bus.publish(envelope).await {
            tracing::warn!(
                "Failed to publish {} for check {}: {}",
                event_type.as_str(),
                check.id,
                e
            );
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
