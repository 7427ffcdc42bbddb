//! 余额与余额快照仓储

use sqlx::SqlitePool;

use alpha_arena_domain::VenueBalance;

#[derive(Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
}

impl BalanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 同时写 balances 与 balance_snapshots（快照带 raw_payload）
    pub async fn record(
        &self,
        exchange: &str,
        account_id: &str,
        ts: i64,
        balance: &VenueBalance,
    ) -> anyhow::Result<()> {
        let mut transaction = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO balances (currency, ts, total, free, used)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (currency, ts) DO NOTHING
            "#,
        )
        .bind(&balance.currency)
        .bind(ts)
        .bind(balance.total.to_string())
        .bind(balance.free.map(|v| v.to_string()))
        .bind(balance.used.map(|v| v.to_string()))
        .execute(&mut *transaction)
        .await?;

        let payload = serde_json::json!({
            "currency": balance.currency,
            "total": balance.total,
            "free": balance.free,
            "used": balance.used,
            "ts": ts,
        });
        sqlx::query(
            r#"
            INSERT INTO balance_snapshots (exchange, account_id, currency, ts, total, available, used, raw_payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(exchange)
        .bind(account_id)
        .bind(&balance.currency)
        .bind(ts)
        .bind(balance.total.to_string())
        .bind(balance.free.map(|v| v.to_string()))
        .bind(balance.used.map(|v| v.to_string()))
        .bind(payload.to_string())
        .execute(&mut *transaction)
        .await?;
        transaction.commit().await?;
        Ok(())
    }

    /// 指定币种最新 total
    pub async fn latest_total(&self, currency: &str) -> anyhow::Result<Option<f64>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT total FROM balances
            WHERE currency = ?
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|(t,)| t.parse::<f64>().ok()))
    }
}
