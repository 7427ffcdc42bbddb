//! 资金费率仓储

use sqlx::SqlitePool;

use alpha_arena_domain::FundingRate;

use super::parse_dec;

#[derive(sqlx::FromRow)]
struct FundingRow {
    symbol: String,
    ts: i64,
    funding_rate: String,
    next_funding_ts: Option<i64>,
}

impl FundingRow {
    fn into_entity(self) -> anyhow::Result<FundingRate> {
        Ok(FundingRate {
            symbol: self.symbol,
            ts: self.ts,
            rate: parse_dec(&self.funding_rate)?,
            next_funding_ts: self.next_funding_ts,
        })
    }
}

#[derive(Clone)]
pub struct FundingRepository {
    pool: SqlitePool,
}

impl FundingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, rate: &FundingRate) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO funding_rates (symbol, ts, funding_rate, next_funding_ts)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (symbol, ts) DO NOTHING
            "#,
        )
        .bind(&rate.symbol)
        .bind(rate.ts)
        .bind(rate.rate.to_string())
        .bind(rate.next_funding_ts)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn latest(&self, symbol: &str) -> anyhow::Result<Option<FundingRate>> {
        let row: Option<FundingRow> = sqlx::query_as(
            r#"
            SELECT symbol, ts, funding_rate, next_funding_ts
            FROM funding_rates
            WHERE symbol = ?
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(FundingRow::into_entity).transpose()
    }

    /// 最近 limit 期，升序
    pub async fn history(&self, symbol: &str, limit: usize) -> anyhow::Result<Vec<FundingRate>> {
        let rows: Vec<FundingRow> = sqlx::query_as(
            r#"
            SELECT symbol, ts, funding_rate, next_funding_ts
            FROM funding_rates
            WHERE symbol = ?
            ORDER BY ts DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut rates = rows
            .into_iter()
            .map(FundingRow::into_entity)
            .collect::<anyhow::Result<Vec<_>>>()?;
        rates.reverse();
        Ok(rates)
    }
}
