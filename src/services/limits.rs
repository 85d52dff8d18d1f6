// Limit Engine - rolling daily/monthly admission control
//
// Usage is derived from the transaction log at decision time rather than
// from a cached counter, so admission decisions always agree with the
// durable ledger. Transfers count against both endpoints; deposits against
// the receiver only, withdrawals against the sender only (the engine is
// invoked once per named wallet).

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, WalletError};
use crate::models::{TransactionStatus, TransactionType};

pub struct LimitEngine {
    db: PgPool,
}

/// Start of the UTC day and calendar month containing `now`.
pub fn window_starts(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .expect("first of month is always a valid date")
        .and_time(NaiveTime::MIN)
        .and_utc();
    (day_start, month_start)
}

/// Pure admission decision over already-computed usage.
pub fn admit(
    amount: Decimal,
    daily_used: Decimal,
    daily_limit: Decimal,
    monthly_used: Decimal,
    monthly_limit: Decimal,
) -> std::result::Result<(), &'static str> {
    if daily_used + amount > daily_limit {
        return Err("daily");
    }
    if monthly_used + amount > monthly_limit {
        return Err("monthly");
    }
    Ok(())
}

impl LimitEngine {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Decide whether a command touching `wallet_id` for `amount` may be
    /// admitted. A `None` wallet is the cash side of a deposit/withdrawal and
    /// is always allowed.
    pub async fn check(
        &self,
        wallet_id: Option<Uuid>,
        amount: Decimal,
        transaction_type: TransactionType,
    ) -> Result<()> {
        let Some(wallet_id) = wallet_id else {
            return Ok(());
        };

        // 1. Read the wallet's limits (read-only view of the wallet core)
        let limits: Option<(Decimal, Decimal)> = sqlx::query_as(
            "SELECT daily_limit, monthly_limit FROM wallets WHERE id = $1",
        )
        .bind(wallet_id)
        .fetch_optional(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        let (daily_limit, monthly_limit) = limits
            .ok_or_else(|| WalletError::NotFound(format!("Wallet {} not found", wallet_id)))?;

        // 2. Window bounds in the service's canonical timezone (UTC)
        let now = Utc::now();
        let (day_start, month_start) = window_starts(now);

        // 3. Usage over COMPLETED transactions touching this wallet.
        //    The day window is a subset of the month window, so one scan
        //    produces both sums.
        let (daily_used, monthly_used): (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE initiated_at >= $2), 0),
                COALESCE(SUM(amount), 0)
            FROM transactions
            WHERE status = $4
              AND (from_wallet_id = $1 OR to_wallet_id = $1)
              AND initiated_at >= $3
              AND initiated_at <= $5
            "#,
        )
        .bind(wallet_id)
        .bind(day_start)
        .bind(month_start)
        .bind(TransactionStatus::Completed.as_str())
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(WalletError::from_db_error)?;

        // 4. Admit iff both windows stay within their caps
        admit(amount, daily_used, daily_limit, monthly_used, monthly_limit).map_err(|window| {
            tracing::info!(
                "Limit rejection for wallet {} ({:?}, amount {}): {} window",
                wallet_id,
                transaction_type,
                amount,
                window
            );
            match window {
                "daily" => WalletError::LimitExceeded(format!(
                    "Daily limit of {} exceeded for wallet {}",
                    daily_limit, wallet_id
                )),
                _ => WalletError::LimitExceeded(format!(
                    "Monthly limit of {} exceeded for wallet {}",
                    monthly_limit, wallet_id
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_window_starts() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 13, 45, 12).unwrap();
        let (day, month) = window_starts(now);
        assert_eq!(day, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(month, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_starts_on_month_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let (day, month) = window_starts(now);
        assert_eq!(day, month);
    }

    #[test]
    fn test_admit_within_limits() {
        assert!(admit(dec("100"), dec("0"), dec("5000"), dec("0"), dec("20000")).is_ok());
        // exactly at the cap is allowed
        assert!(admit(dec("5000"), dec("0"), dec("5000"), dec("0"), dec("20000")).is_ok());
    }

    #[test]
    fn test_admit_daily_breach() {
        assert_eq!(
            admit(dec("5000.01"), dec("0"), dec("5000"), dec("0"), dec("20000")),
            Err("daily")
        );
        assert_eq!(
            admit(dec("1"), dec("5000"), dec("5000"), dec("0"), dec("20000")),
            Err("daily")
        );
    }

    #[test]
    fn test_admit_monthly_breach_named() {
        // daily headroom present, monthly exhausted
        assert_eq!(
            admit(
                dec("100"),
                dec("0"),
                dec("5000"),
                dec("19950"),
                dec("20000")
            ),
            Err("monthly")
        );
    }
}
