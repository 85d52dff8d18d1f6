// Pesa Wallet - Core Data Models
// Entities owned by the customer, KYC, wallet and ledger cores

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The single currency supported by the MVP.
pub const SUPPORTED_CURRENCY: &str = "KES";

/// Limit tiers. Wallets provisioned from onboarding events start at the
/// KYC-pending tier; verified customers are raised to the verified tier.
pub mod limit_tiers {
    use rust_decimal::Decimal;

    pub fn default_daily() -> Decimal {
        Decimal::new(100_000, 0)
    }
    pub fn default_monthly() -> Decimal {
        Decimal::new(1_000_000, 0)
    }
    pub fn pending_daily() -> Decimal {
        Decimal::new(5_000, 0)
    }
    pub fn pending_monthly() -> Decimal {
        Decimal::new(20_000, 0)
    }
    pub fn verified_daily() -> Decimal {
        Decimal::new(50_000, 0)
    }
    pub fn verified_monthly() -> Decimal {
        Decimal::new(200_000, 0)
    }
}

// ============================================================================
// 1. CUSTOMER CORE
// ============================================================================

/// Customer profile. The internal id is dense and monotonic; the external
/// subject (`user_id`) comes from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: i64,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerStatus {
    Active,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "ACTIVE",
        }
    }
}

impl TryFrom<String> for CustomerStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "ACTIVE" => Ok(CustomerStatus::Active),
            other => Err(format!("unknown customer status: {}", other)),
        }
    }
}

// ============================================================================
// 2. KYC CORE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct KycCheck {
    pub id: Uuid,
    pub customer_id: i64,
    #[sqlx(try_from = "String")]
    pub status: KycStatus,
    pub provider_reference: String,
    pub documents: serde_json::Value,
    pub initiated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Pending,
    InProgress,
    Verified,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Pending => "PENDING",
            KycStatus::InProgress => "IN_PROGRESS",
            KycStatus::Verified => "VERIFIED",
            KycStatus::Rejected => "REJECTED",
        }
    }

    /// VERIFIED and REJECTED are terminal for a check.
    pub fn is_terminal(&self) -> bool {
        matches!(self, KycStatus::Verified | KycStatus::Rejected)
    }
}

impl TryFrom<String> for KycStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "PENDING" => Ok(KycStatus::Pending),
            "IN_PROGRESS" => Ok(KycStatus::InProgress),
            "VERIFIED" => Ok(KycStatus::Verified),
            "REJECTED" => Ok(KycStatus::Rejected),
            other => Err(format!("unknown KYC status: {}", other)),
        }
    }
}

// ============================================================================
// 3. WALLET CORE
// ============================================================================

/// Wallet row. `balance` is a projection of the wallet's ledger entries; the
/// authoritative value is always recoverable by summing them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub customer_id: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: WalletStatus,
    pub balance: Decimal,
    pub daily_limit: Decimal,
    pub monthly_limit: Decimal,
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletStatus {
    Active,
    Suspended,
    Closed,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "ACTIVE",
            WalletStatus::Suspended => "SUSPENDED",
            WalletStatus::Closed => "CLOSED",
        }
    }
}

impl TryFrom<String> for WalletStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "ACTIVE" => Ok(WalletStatus::Active),
            "SUSPENDED" => Ok(WalletStatus::Suspended),
            "CLOSED" => Ok(WalletStatus::Closed),
            other => Err(format!("unknown wallet status: {}", other)),
        }
    }
}

/// Balance snapshot stored in the cache and returned by the balance read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub balance: Decimal,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

// ============================================================================
// 4. LEDGER CORE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub transaction_type: TransactionType,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub from_wallet_id: Option<Uuid>,
    pub to_wallet_id: Option<Uuid>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAWAL" => Some(TransactionType::Withdrawal),
            "TRANSFER" => Some(TransactionType::Transfer),
            _ => None,
        }
    }
}

impl TryFrom<String> for TransactionType {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        TransactionType::parse(&s).ok_or_else(|| format!("unknown transaction type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            "CANCELLED" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        TransactionStatus::parse(&s).ok_or_else(|| format!("unknown transaction status: {}", s))
    }
}

/// One side of a double-entry pair. `wallet_id` is null for the cash
/// counter-account; `account` is "WALLET_<id>" or "CASH_ACCOUNT".
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub account: String,
    #[sqlx(try_from = "String")]
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// The notional counter-party account for deposits and withdrawals.
pub const CASH_ACCOUNT: &str = "CASH_ACCOUNT";

pub fn wallet_account(wallet_id: Uuid) -> String {
    format!("WALLET_{}", wallet_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }
}

impl TryFrom<String> for EntryType {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "DEBIT" => Ok(EntryType::Debit),
            "CREDIT" => Ok(EntryType::Credit),
            other => Err(format!("unknown entry type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransactionStatus::parse("SETTLED"), None);
    }

    #[test]
    fn test_kyc_terminal_states() {
        assert!(KycStatus::Verified.is_terminal());
        assert!(KycStatus::Rejected.is_terminal());
        assert!(!KycStatus::InProgress.is_terminal());
        assert!(!KycStatus::Pending.is_terminal());
    }

    #[test]
    fn test_wallet_account_naming() {
        let id = Uuid::nil();
        assert_eq!(
            wallet_account(id),
            "WALLET_00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let tx = Transaction {
            id: Uuid::nil(),
            transaction_type: TransactionType::Deposit,
            status: TransactionStatus::Completed,
            amount: Decimal::new(10_000, 2),
            currency: SUPPORTED_CURRENCY.to_string(),
            from_wallet_id: None,
            to_wallet_id: Some(Uuid::nil()),
            initiated_at: Utc::now(),
            completed_at: Some(Utc::now()),
            failure_reason: None,
            idempotency_key: "dep-1".to_string(),
            metadata: None,
        };
        let value = serde_json::to_value(&tx).unwrap();
        assert!(value.get("transactionType").is_some());
        assert!(value.get("toWalletId").is_some());
        assert!(value.get("initiatedAt").is_some());
        assert_eq!(value["status"], "COMPLETED");
    }
}
