// Balance Snapshot Cache
//
// Redis-backed key/value store for wallet balance snapshots. The cache is
// strictly best-effort: a missing or failing Redis never fails a caller, it
// only degrades balance reads to the database path. When REDIS_URL is unset
// the cache runs disabled.

use redis::{AsyncCommands, Client};
use uuid::Uuid;

use crate::models::BalanceSnapshot;

const KEY_PREFIX: &str = "wallet:balance:";
const SNAPSHOT_TTL_SECS: u64 = 3600;

#[derive(Clone)]
pub struct BalanceCache {
    client: Option<Client>,
}

impl BalanceCache {
    /// Create a cache against the given Redis URL.
    pub fn new(redis_url: &str) -> Self {
        match Client::open(redis_url) {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                tracing::warn!("Balance cache disabled, invalid Redis URL: {}", e);
                Self { client: None }
            }
        }
    }

    /// Create from environment. Missing REDIS_URL disables the cache.
    pub fn from_env() -> Self {
        match std::env::var("REDIS_URL") {
            Ok(url) => Self::new(&url),
            Err(_) => {
                tracing::info!("REDIS_URL not set, balance cache disabled");
                Self { client: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    fn key(wallet_id: Uuid) -> String {
        format!("{}{}", KEY_PREFIX, wallet_id)
    }

    /// Read a snapshot. None on miss, on any Redis failure, or when disabled.
    pub async fn get(&self, wallet_id: Uuid) -> Option<BalanceSnapshot> {
        let client = self.client.as_ref()?;

        let mut con = match client.get_multiplexed_async_connection().await {
            Ok(con) => con,
            Err(e) => {
                tracing::warn!("Balance cache unavailable for read: {}", e);
                return None;
            }
        };

        let raw: Option<String> = match con.get(Self::key(wallet_id)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Balance cache read failed for {}: {}", wallet_id, e);
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str::<BalanceSnapshot>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("Discarding corrupt balance snapshot for {}: {}", wallet_id, e);
                None
            }
        }
    }

    /// Write-through a fresh snapshot. Failures are logged and swallowed.
    pub async fn put(&self, wallet_id: Uuid, snapshot: &BalanceSnapshot) {
        let Some(client) = self.client.as_ref() else {
            return;
        };

        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode balance snapshot for {}: {}", wallet_id, e);
                return;
            }
        };

        let mut con = match client.get_multiplexed_async_connection().await {
            Ok(con) => con,
            Err(e) => {
                tracing::warn!("Balance cache unavailable for write: {}", e);
                return;
            }
        };

        let result: redis::RedisResult<()> = con
            .set_ex(Self::key(wallet_id), json, SNAPSHOT_TTL_SECS)
            .await;
        if let Err(e) = result {
            tracing::warn!("Balance cache write failed for {}: {}", wallet_id, e);
        }
    }

    /// Drop a snapshot (used when a wallet is suspended or closed).
    pub async fn invalidate(&self, wallet_id: Uuid) {
        let Some(client) = self.client.as_ref() else {
            return;
        };

        let mut con = match client.get_multiplexed_async_connection().await {
            Ok(con) => con,
            Err(e) => {
                tracing::warn!("Balance cache unavailable for invalidation: {}", e);
                return;
            }
        };

        let result: redis::RedisResult<()> = con.del(Self::key(wallet_id)).await;
        if let Err(e) = result {
            tracing::warn!("Balance cache invalidation failed for {}: {}", wallet_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[test]
    fn test_disabled_cache_is_inert() {
        let cache = BalanceCache { client: None };
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_cache_reads_miss() {
        let cache = BalanceCache { client: None };
        assert!(cache.get(Uuid::new_v4()).await.is_none());
        // writes are no-ops rather than errors
        let snapshot = BalanceSnapshot {
            balance: Decimal::new(10_000, 2),
            currency: "KES".to_string(),
            last_updated: Utc::now(),
        };
        cache.put(Uuid::new_v4(), &snapshot).await;
    }

    #[test]
    fn test_key_namespacing() {
        let id = Uuid::nil();
        assert_eq!(
            BalanceCache::key(id),
            "wallet:balance:00000000-0000-0000-0000-000000000000"
        );
    }
}
