// Customer Service - profiles, subject mapping and onboarding provisioning
//
// Exclusive writer of customers and customer_user_mapping. A profile exists
// either because the user created it explicitly or because USER_REGISTERED
// was consumed (partial profile, phone null). The subject mapping is written
// in the same database transaction as the customer row so the resolver can
// never observe one without the other.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::error::{Result, WalletError};
use crate::events::{
    CustomerCreatedPayload, EventBus, EventEnvelope, EventHandler, EventType, UserEventPayload,
};
use crate::models::{Customer, CustomerStatus};
use crate::validation;

const CUSTOMER_COLUMNS: &str =
    "id, user_id, first_name, last_name, email, phone, address, status, created_at, updated_at";

pub struct CustomerService {
    db: PgPool,
    bus: Arc<EventBus>,
}

/// Fields for explicit profile creation.
#[derive(Debug, Clone)]
pub struct CreateCustomerData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Partial update: `None` leaves the existing value untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateCustomerData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Derive first/last names from a username: split on underscore, capitalize
/// each part. A single-token username yields an empty last name.
pub fn derive_names(username: &str) -> (String, String) {
    fn capitalize(part: &str) -> String {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    let mut parts = username.split('_').filter(|p| !p.is_empty());
    let first = parts.next().map(capitalize).unwrap_or_default();
    let last = parts.map(capitalize).collect::<Vec<_>>().join(" ");
    (first, last)
}

impl CustomerService {
    pub fn new(db: PgPool, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    /// Explicit profile creation for an authenticated subject.
    pub async fn create_customer(&self, subject: &str, data: CreateCustomerData) -> Result<Customer> {
        validation::validate_name(&data.first_name, "First name")?;
        validation::validate_name(&data.last_name, "Last name")?;
        validation::validate_email(&data.email)?;
        if let Some(ref phone) = data.phone {
            validation::validate_phone(phone)?;
        }
        if let Some(ref address) = data.address {
            validation::validate_address(address)?;
        }

        if self.find_by_subject(subject).await?.is_some() {
            return Err(WalletError::Conflict(
                "A profile already exists for this user".into(),
            ));
        }

        self.ensure_email_free(&data.email, None).await?;
        if let Some(ref phone) = data.phone {
            self.ensure_phone_free(phone, None).await?;
        }

        let customer = self
            .insert_customer(
                subject,
                &data.first_name,
                &data.last_name,
                &data.email,
                data.phone.as_deref(),
                data.address.as_deref(),
            )
            .await?;

        self.publish_customer_created(&customer).await;

        Ok(customer)
    }

    /// Auto-provision a partial profile from USER_REGISTERED. Idempotent: an
    /// existing profile for the subject is returned unchanged and no event is
    /// emitted.
    pub async fn provision_from_registration(&self, payload: &UserEventPayload) -> Result<Customer> {
        if let Some(existing) = self.find_by_subject(&payload.user_id).await? {
            tracing::debug!(
                "Subject {} already has customer {}, skipping provisioning",
                payload.user_id,
                existing.id
            );
            return Ok(existing);
        }

        let email = payload.email.as_deref().ok_or_else(|| {
            WalletError::Internal(format!(
                "USER_REGISTERED for {} carries no email",
                payload.user_id
            ))
        })?;

        let (first_name, last_name) = derive_names(&payload.username);

        match self
            .insert_customer(&payload.user_id, &first_name, &last_name, email, None, None)
            .await
        {
            Ok(customer) => {
                tracing::info!(
                    "Provisioned customer {} for subject {}",
                    customer.id,
                    payload.user_id
                );
                self.publish_customer_created(&customer).await;
                Ok(customer)
            }
            // Concurrent delivery created the profile first
            Err(WalletError::Conflict(_)) => self
                .find_by_subject(&payload.user_id)
                .await?
                .ok_or_else(|| WalletError::Internal("Customer vanished after conflict".into())),
            Err(e) => Err(e),
        }
    }

    pub async fn get_profile(&self, subject: &str) -> Result<Customer> {
        self.find_by_subject(subject)
            .await?
            .ok_or_else(|| WalletError::NotFound("Customer profile not found".into()))
    }

    /// Partial profile update: null fields keep their existing values.
    pub async fn update_profile(&self, subject: &str, data: UpdateCustomerData) -> Result<Customer> {
        let existing = self.get_profile(subject).await?;

        if let Some(ref first_name) = data.first_name {
            validation::validate_name(first_name, "First name")?;
        }
        if let Some(ref last_name) = data.last_name {
            validation::validate_name(last_name, "Last name")?;
        }
        if let Some(ref email) = data.email {
            validation::validate_email(email)?;
            self.ensure_email_free(email, Some(existing.id)).await?;
        }
        if let Some(ref phone) = data.phone {
            validation::validate_phone(phone)?;
            self.ensure_phone_free(phone, Some(existing.id)).await?;
        }
        if let Some(ref address) = data.address {
            validation::validate_address(address)?;
        }

        sqlx::query(
            r#"
            UPDATE customers
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.address)
        .bind(Utc::now())
        .bind(existing.id)
        .execute(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        self.get_profile(subject).await
    }

    /// Subject resolver: maps an external subject to the internal customer id.
    pub async fn resolve_customer_id(&self, subject: &str) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT customer_id FROM customer_user_mapping WHERE user_id = $1")
                .bind(subject)
                .fetch_optional(&self.db)
                .await
                .map_err(WalletError::from_db_error)?;

        row.map(|(id,)| id)
            .ok_or_else(|| WalletError::NotFound("Customer profile not found".into()))
    }

    // Internal helpers

    async fn insert_customer(
        &self,
        subject: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> Result<Customer> {
        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(WalletError::from_db_error)?;

        let inserted: std::result::Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO customers
            (user_id, first_name, last_name, email, phone, address, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id
            "#,
        )
        .bind(subject)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(phone)
        .bind(address)
        .bind(CustomerStatus::Active.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let (customer_id,) = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(WalletError::Conflict(
                    "Customer with this subject, email or phone already exists".into(),
                ));
            }
            Err(e) => return Err(WalletError::from(e)),
        };

        // The mapping rides the same transaction as the customer row
        sqlx::query(
            r#"
            INSERT INTO customer_user_mapping (user_id, customer_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET customer_id = EXCLUDED.customer_id
            "#,
        )
        .bind(subject)
        .bind(customer_id)
        .execute(&mut *tx)
        .await
        .map_err(WalletError::from_db_error)?;

        tx.commit().await.map_err(WalletError::from_db_error)?;

        self.find_by_subject(subject)
            .await?
            .ok_or_else(|| WalletError::Internal("Customer vanished after insert".into()))
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE user_id = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(subject)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        Ok(customer)
    }

    async fn ensure_email_free(&self, email: &str, exclude: Option<i64>) -> Result<()> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM customers WHERE LOWER(email) = LOWER($1) AND ($2::bigint IS NULL OR id <> $2)",
        )
        .bind(email)
        .bind(exclude)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        if row.is_some() {
            return Err(WalletError::Conflict("Email is already in use".into()));
        }
        Ok(())
    }

    async fn ensure_phone_free(&self, phone: &str, exclude: Option<i64>) -> Result<()> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM customers WHERE phone = $1 AND ($2::bigint IS NULL OR id <> $2)",
        )
        .bind(phone)
        .bind(exclude)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        if row.is_some() {
            return Err(WalletError::Conflict("Phone number is already in use".into()));
        }
        Ok(())
    }

    async fn publish_customer_created(&self, customer: &Customer) {
        let payload = CustomerCreatedPayload {
            customer_id: customer.id,
            user_id: customer.user_id.clone(),
        };

        let envelope =
            match EventEnvelope::new(EventType::CustomerCreated, customer.id.to_string(), &payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::error!("Failed to build CUSTOMER_CREATED event: {}", e);
                    return;
                }
            };

        if let Err(e) = self.bus.publish(envelope).await {
            tracing::warn!(
                "Failed to publish CUSTOMER_CREATED for customer {}: {}",
                customer.id,
                e
            );
        }
    }
}

// Consumes user-events for onboarding auto-provisioning
#[async_trait]
impl EventHandler for CustomerService {
    fn name(&self) -> &'static str {
        "customer-service"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        match event.event_type {
            EventType::UserRegistered => {
                let payload: UserEventPayload = event.decode_payload()?;
                self.provision_from_registration(&payload).await?;
                Ok(())
            }
            // Login/logout events feed side-consumers, not this core
            _ => Ok(()),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_names_from_compound_username() {
        assert_eq!(
            derive_names("john_doe"),
            ("John".to_string(), "Doe".to_string())
        );
        assert_eq!(
            derive_names("mary_anne_smith"),
            ("Mary".to_string(), "Anne Smith".to_string())
        );
    }

    #[test]
    fn test_derive_names_from_single_token() {
        assert_eq!(derive_names("testuser"), ("Testuser".to_string(), String::new()));
    }

    #[test]
    fn test_derive_names_ignores_empty_segments() {
        assert_eq!(
            derive_names("jane__doe"),
            ("Jane".to_string(), "Doe".to_string())
        );
    }
}
