// Event Envelope - JSON wire format for the event bus
//
// Every event carries the common envelope (type, id, timestamp, metadata)
// plus a type-specific payload. Partition keys follow the ownership chain:
// user events key on the subject, customer/KYC/wallet events on the customer
// id, transaction events on the transaction id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WalletError};

pub const EVENT_SOURCE: &str = "pesa-wallet";
pub const EVENT_VERSION: &str = "1.0";

/// Topics carried by the bus. Ordering is preserved per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    UserEvents,
    CustomerEvents,
    KycEvents,
    WalletEvents,
    TransactionEvents,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::UserEvents,
        Topic::CustomerEvents,
        Topic::KycEvents,
        Topic::WalletEvents,
        Topic::TransactionEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::UserEvents => "user-events",
            Topic::CustomerEvents => "customer-events",
            Topic::KycEvents => "kyc-events",
            Topic::WalletEvents => "wallet-events",
            Topic::TransactionEvents => "transaction-events",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserRegistered,
    UserLogin,
    UserLogout,
    CustomerCreated,
    KycInitiated,
    KycVerified,
    KycRejected,
    WalletCreated,
    TransactionInitiated,
    TransactionCompleted,
    TransactionFailed,
}

impl EventType {
    pub fn topic(&self) -> Topic {
        match self {
            EventType::UserRegistered | EventType::UserLogin | EventType::UserLogout => {
                Topic::UserEvents
            }
            EventType::CustomerCreated => Topic::CustomerEvents,
            EventType::KycInitiated | EventType::KycVerified | EventType::KycRejected => {
                Topic::KycEvents
            }
            EventType::WalletCreated => Topic::WalletEvents,
            EventType::TransactionInitiated
            | EventType::TransactionCompleted
            | EventType::TransactionFailed => Topic::TransactionEvents,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserRegistered => "USER_REGISTERED",
            EventType::UserLogin => "USER_LOGIN",
            EventType::UserLogout => "USER_LOGOUT",
            EventType::CustomerCreated => "CUSTOMER_CREATED",
            EventType::KycInitiated => "KYC_INITIATED",
            EventType::KycVerified => "KYC_VERIFIED",
            EventType::KycRejected => "KYC_REJECTED",
            EventType::WalletCreated => "WALLET_CREATED",
            EventType::TransactionInitiated => "TRANSACTION_INITIATED",
            EventType::TransactionCompleted => "TRANSACTION_COMPLETED",
            EventType::TransactionFailed => "TRANSACTION_FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub source: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: EventType,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub partition_key: String,
    pub metadata: EventMetadata,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new<P: Serialize>(
        event_type: EventType,
        partition_key: impl Into<String>,
        payload: &P,
    ) -> Result<Self> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| WalletError::Internal(format!("Failed to encode event payload: {}", e)))?;

        Ok(Self {
            event_type,
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            partition_key: partition_key.into(),
            metadata: EventMetadata {
                source: EVENT_SOURCE.to_string(),
                version: EVENT_VERSION.to_string(),
                action: None,
            },
            payload,
        })
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.metadata.action = Some(action.to_string());
        self
    }

    /// Decode the type-specific payload. Consumers treat a malformed payload
    /// as a non-retryable error.
    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            WalletError::Internal(format!(
                "Malformed {} payload: {}",
                self.event_type.as_str(),
                e
            ))
        })
    }
}

// Type-specific payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEventPayload {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCreatedPayload {
    pub customer_id: i64,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycEventPayload {
    pub kyc_check_id: Uuid,
    pub customer_id: i64,
    pub user_id: String,
    pub status: String,
    pub provider_reference: String,
    pub initiated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub documents: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCreatedPayload {
    pub wallet_id: Uuid,
    pub customer_id: i64,
    pub user_id: String,
    pub currency: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEventPayload {
    pub transaction_id: Uuid,
    pub transaction_type: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_wallet_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_wallet_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_routing() {
        assert_eq!(EventType::UserRegistered.topic(), Topic::UserEvents);
        assert_eq!(EventType::CustomerCreated.topic(), Topic::CustomerEvents);
        assert_eq!(EventType::KycVerified.topic(), Topic::KycEvents);
        assert_eq!(EventType::WalletCreated.topic(), Topic::WalletEvents);
        assert_eq!(
            EventType::TransactionCompleted.topic(),
            Topic::TransactionEvents
        );
    }

    #[test]
    fn test_envelope_wire_format() {
        let payload = UserEventPayload {
            user_id: "subj-1".to_string(),
            username: "testuser".to_string(),
            email: Some("test@example.com".to_string()),
        };
        let envelope = EventEnvelope::new(EventType::UserRegistered, "subj-1", &payload)
            .unwrap()
            .with_action("register");

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["eventType"], "USER_REGISTERED");
        assert_eq!(value["partitionKey"], "subj-1");
        assert_eq!(value["metadata"]["source"], EVENT_SOURCE);
        assert_eq!(value["metadata"]["action"], "register");
        assert_eq!(value["payload"]["userId"], "subj-1");
        assert_eq!(value["payload"]["email"], "test@example.com");
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = TransactionEventPayload {
            transaction_id: Uuid::new_v4(),
            transaction_type: "DEPOSIT".to_string(),
            status: "COMPLETED".to_string(),
            amount: "100.00".parse().unwrap(),
            currency: "KES".to_string(),
            from_wallet_id: None,
            to_wallet_id: Some(Uuid::new_v4()),
            completed_at: Some(Utc::now()),
            failure_reason: None,
        };

        let envelope = EventEnvelope::new(
            EventType::TransactionCompleted,
            payload.transaction_id.to_string(),
            &payload,
        )
        .unwrap();

        let decoded: TransactionEventPayload = envelope.decode_payload().unwrap();
        assert_eq!(decoded.transaction_id, payload.transaction_id);
        assert_eq!(decoded.amount, payload.amount);
        assert!(decoded.from_wallet_id.is_none());
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let envelope = EventEnvelope::new(
            EventType::CustomerCreated,
            "1",
            &serde_json::json!({"unexpected": true}),
        )
        .unwrap();

        let result: Result<CustomerCreatedPayload> = envelope.decode_payload();
        assert!(result.is_err());
    }
}
