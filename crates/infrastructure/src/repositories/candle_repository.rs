//! K线仓储
//!
//! 写路径只允许 Ingest 与修复工作者；insert-or-ignore 保证
//! 同一 (symbol, timeframe, ts) 不会被覆盖，重复拉取天然幂等

use std::str::FromStr;

use sqlx::SqlitePool;

use alpha_arena_common::utils::time::now_s;
use alpha_arena_domain::{Candle, Timeframe};

use super::parse_dec;

#[derive(sqlx::FromRow)]
struct CandleRow {
    symbol: String,
    timeframe: String,
    ts: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl CandleRow {
    fn into_candle(self) -> anyhow::Result<Candle> {
        Ok(Candle {
            symbol: self.symbol,
            timeframe: Timeframe::from_str(&self.timeframe)?,
            ts: self.ts,
            open: parse_dec(&self.open)?,
            high: parse_dec(&self.high)?,
            low: parse_dec(&self.low)?,
            close: parse_dec(&self.close)?,
            volume: parse_dec(&self.volume)?,
        })
    }
}

#[derive(Clone)]
pub struct CandleRepository {
    pool: SqlitePool,
}

impl CandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 批量写入，冲突行忽略，返回实际插入条数
    pub async fn upsert_candles(&self, candles: &[Candle]) -> anyhow::Result<u64> {
        if candles.is_empty() {
            return Ok(0);
        }
        for candle in candles {
            candle.validate()?;
        }

        let mut transaction = self.pool.begin().await?;
        let mut inserted = 0u64;
        let created_at = now_s();
        for candle in candles {
            let result = sqlx::query(
                r#"
                INSERT INTO market_data (symbol, timeframe, ts, open, high, low, close, volume, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (symbol, timeframe, ts) DO NOTHING
                "#,
            )
            .bind(&candle.symbol)
            .bind(candle.timeframe.as_str())
            .bind(candle.ts)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .bind(created_at)
            .execute(&mut *transaction)
            .await?;
            inserted += result.rows_affected();
        }
        transaction.commit().await?;
        Ok(inserted)
    }

    /// 最新一根K线的 ts
    pub async fn latest_ts(&self, symbol: &str, timeframe: Timeframe) -> anyhow::Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(ts) FROM market_data WHERE symbol = ? AND timeframe = ?",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// 最近 limit 根，按 ts 升序返回
    pub async fn recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows: Vec<CandleRow> = sqlx::query_as(
            r#"
            SELECT symbol, timeframe, ts, open, high, low, close, volume
            FROM market_data
            WHERE symbol = ? AND timeframe = ?
            ORDER BY ts DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = rows
            .into_iter()
            .map(CandleRow::into_candle)
            .collect::<anyhow::Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// [start_ts, end_ts] 闭区间内的K线，升序
    pub async fn range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ts: i64,
        end_ts: i64,
    ) -> anyhow::Result<Vec<Candle>> {
        let rows: Vec<CandleRow> = sqlx::query_as(
            r#"
            SELECT symbol, timeframe, ts, open, high, low, close, volume
            FROM market_data
            WHERE symbol = ? AND timeframe = ? AND ts BETWEEN ? AND ?
            ORDER BY ts ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CandleRow::into_candle).collect()
    }

    /// 区间内的全部 ts（含重复行时只出现一次，表有唯一约束）
    pub async fn timestamps_in_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ts: i64,
        end_ts: i64,
    ) -> anyhow::Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT ts FROM market_data
            WHERE symbol = ? AND timeframe = ? AND ts BETWEEN ? AND ?
            ORDER BY ts ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn count(&self, symbol: &str, timeframe: Timeframe) -> anyhow::Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM market_data WHERE symbol = ? AND timeframe = ?",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;

    fn candle(ts: i64, close: &str) -> Candle {
        Candle {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            ts,
            open: "100".parse().unwrap(),
            high: "110".parse().unwrap(),
            low: "90".parse().unwrap(),
            close: close.parse().unwrap(),
            volume: "5".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let repo = CandleRepository::new(pool);

        let candles = vec![candle(0, "101"), candle(3_600_000, "102")];
        assert_eq!(repo.upsert_candles(&candles).await.unwrap(), 2);
        // 同一范围再次写入：0 行插入，数据不变
        assert_eq!(repo.upsert_candles(&candles).await.unwrap(), 0);
        assert_eq!(repo.count("BTC-USDT-SWAP", Timeframe::H1).await.unwrap(), 2);

        let loaded = repo.recent("BTC-USDT-SWAP", Timeframe::H1, 10).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ts, 0);
        assert_eq!(loaded[1].close, "102".parse().unwrap());
    }

    #[tokio::test]
    async fn invalid_candle_is_rejected() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let repo = CandleRepository::new(pool);

        let mut bad = candle(0, "101");
        bad.high = "50".parse().unwrap();
        assert!(repo.upsert_candles(&[bad]).await.is_err());
    }

    #[tokio::test]
    async fn range_and_latest_ts() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let repo = CandleRepository::new(pool);

        let candles: Vec<Candle> = (0..10).map(|i| candle(i * 3_600_000, "100")).collect();
        repo.upsert_candles(&candles).await.unwrap();

        assert_eq!(
            repo.latest_ts("BTC-USDT-SWAP", Timeframe::H1).await.unwrap(),
            Some(9 * 3_600_000)
        );
        let window = repo
            .range("BTC-USDT-SWAP", Timeframe::H1, 2 * 3_600_000, 5 * 3_600_000)
            .await
            .unwrap();
        assert_eq!(window.len(), 4);
    }
}
