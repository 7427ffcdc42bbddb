//! 行情拉取工作者
//!
//! K线按批次向前补齐到当前K线为止，正在形成的K线永不落库；
//! 衍生品（资金费率、价格快照）独立节拍拉取。
//! 每次拉取写一条 ingestion_runs 审计，重试耗尽升级为风险事件。

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use alpha_arena_common::utils::time::{now_ms, now_s};
use alpha_arena_domain::{
    Candle, Exchange, IngestStatus, RiskEvent, RiskLevel, Timeframe,
};
use alpha_arena_infrastructure::{
    retry_with_backoff, BackoffPolicy, CandleRepository, FundingRepository,
    IngestionRunRepository, PriceSnapshotRepository, RiskEventRepository,
};

/// 拉取配置
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_limit: usize,
    pub initial_backfill_days: i64,
    pub max_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_limit: 300,
            initial_backfill_days: 30,
            max_retries: 5,
        }
    }
}

pub struct IngestService {
    exchange: Arc<dyn Exchange>,
    candles: CandleRepository,
    funding: FundingRepository,
    prices: PriceSnapshotRepository,
    runs: IngestionRunRepository,
    risk_events: RiskEventRepository,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(pool: SqlitePool, exchange: Arc<dyn Exchange>, config: IngestConfig) -> Self {
        Self {
            exchange,
            candles: CandleRepository::new(pool.clone()),
            funding: FundingRepository::new(pool.clone()),
            prices: PriceSnapshotRepository::new(pool.clone()),
            runs: IngestionRunRepository::new(pool.clone()),
            risk_events: RiskEventRepository::new(pool),
            config,
        }
    }

    /// 同步一个 (symbol, timeframe) 的K线，返回新插入条数
    pub async fn sync_candles(&self, symbol: &str, timeframe: Timeframe) -> anyhow::Result<u64> {
        let interval = timeframe.interval_ms();
        let since = match self.candles.latest_ts(symbol, timeframe).await? {
            Some(latest) => latest + interval,
            None => now_ms() - self.config.initial_backfill_days * 24 * 60 * 60 * 1000,
        };

        let run_id = self
            .runs
            .start(self.exchange.name(), symbol, Some(timeframe), "ohlcv")
            .await?;

        match self.pull_candle_batches(symbol, timeframe, since).await {
            Ok(total) => {
                self.runs
                    .finish(run_id, IngestStatus::Success, total as i64, None)
                    .await?;
                if total > 0 {
                    info!("ingest {} {}: {} bars", symbol, timeframe, total);
                }
                Ok(total)
            }
            Err(err) => {
                self.runs
                    .finish(run_id, IngestStatus::Failed, 0, Some(&err.to_string()))
                    .await?;
                self.escalate_if_stalled(symbol).await?;
                Err(err)
            }
        }
    }

    async fn pull_candle_batches(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        mut since: i64,
    ) -> anyhow::Result<u64> {
        let interval = timeframe.interval_ms();
        let policy = BackoffPolicy::with_retries(self.config.max_retries);
        let mut total = 0u64;

        loop {
            let batch = retry_with_backoff(&policy, "fetch_ohlcv", || {
                self.exchange
                    .fetch_ohlcv(symbol, timeframe, Some(since), self.config.batch_limit)
            })
            .await
            .map_err(|e| anyhow::anyhow!("fetch_ohlcv {} {}: {}", symbol, timeframe, e))?;

            if batch.is_empty() {
                break;
            }

            // 当前正在形成的K线绝不落库
            let cutoff = now_ms();
            let closed: Vec<Candle> = batch
                .iter()
                .filter(|c| c.ts + interval <= cutoff)
                .cloned()
                .collect();
            let batch_len = batch.len();
            let tail_ts = batch.last().map(|c| c.ts).unwrap_or(since);

            total += self.candles.upsert_candles(&closed).await?;

            // 批次未满说明已追到最新
            if batch_len < self.config.batch_limit {
                break;
            }
            since = tail_ts + interval;
        }
        Ok(total)
    }

    /// 拉取资金费率与价格快照（独立节拍）
    pub async fn sync_derivatives(&self, symbol: &str) -> anyhow::Result<()> {
        let policy = BackoffPolicy::with_retries(self.config.max_retries);

        let run_id = self
            .runs
            .start(self.exchange.name(), symbol, None, "funding_rate")
            .await?;
        match retry_with_backoff(&policy, "fetch_funding", || self.exchange.fetch_funding(symbol))
            .await
        {
            Ok(rate) => {
                let inserted = self.funding.upsert(&rate).await?;
                self.runs
                    .finish(run_id, IngestStatus::Success, inserted as i64, None)
                    .await?;
            }
            Err(err) => {
                warn!("funding ingest failed for {}: {}", symbol, err);
                self.runs
                    .finish(run_id, IngestStatus::Failed, 0, Some(&err.to_string()))
                    .await?;
            }
        }

        let run_id = self
            .runs
            .start(self.exchange.name(), symbol, None, "price_snapshot")
            .await?;
        match retry_with_backoff(&policy, "fetch_prices", || {
            self.exchange.fetch_mark_index_last(symbol)
        })
        .await
        {
            Ok(snapshot) => {
                let inserted = self.prices.upsert(&snapshot).await?;
                self.runs
                    .finish(run_id, IngestStatus::Success, inserted as i64, None)
                    .await?;
            }
            Err(err) => {
                warn!("price ingest failed for {}: {}", symbol, err);
                self.runs
                    .finish(run_id, IngestStatus::Failed, 0, Some(&err.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    /// 连续失败达到阈值时写 INGEST_STALL 风险事件
    async fn escalate_if_stalled(&self, symbol: &str) -> anyhow::Result<()> {
        let failures = self.runs.consecutive_failures(symbol, "ohlcv").await?;
        if failures >= 3 {
            self.risk_events
                .insert(&RiskEvent::new(
                    now_s(),
                    symbol,
                    RiskLevel::Warn,
                    "INGEST_STALL",
                    format!("{} consecutive ohlcv ingest failures", failures),
                ))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;
    use alpha_arena_infrastructure::SimulatedExchange;

    fn candle(ts: i64) -> Candle {
        Candle {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            ts,
            open: "100".parse().unwrap(),
            high: "101".parse().unwrap(),
            low: "99".parse().unwrap(),
            close: "100".parse().unwrap(),
            volume: "1".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn ingest_twice_produces_identical_rows() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();

        let exchange = Arc::new(SimulatedExchange::new(false));
        // 60根已收盘K线，对齐到当前小时之前
        let interval = Timeframe::H1.interval_ms();
        let head = (now_ms() / interval - 61) * interval;
        exchange.seed_candles((0..60).map(|i| candle(head + i * interval)).collect());

        let service = IngestService::new(pool.clone(), exchange, IngestConfig::default());
        let first = service.sync_candles("BTC-USDT-SWAP", Timeframe::H1).await.unwrap();
        assert_eq!(first, 60);

        let second = service.sync_candles("BTC-USDT-SWAP", Timeframe::H1).await.unwrap();
        assert_eq!(second, 0, "re-ingest must not insert or update rows");

        let repo = CandleRepository::new(pool);
        assert_eq!(repo.count("BTC-USDT-SWAP", Timeframe::H1).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn forming_bar_is_never_persisted() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();

        let exchange = Arc::new(SimulatedExchange::new(false));
        let interval = Timeframe::H1.interval_ms();
        let current_bar = now_ms() / interval * interval;
        // 两根已收盘 + 一根形成中
        exchange.seed_candles(vec![
            candle(current_bar - 2 * interval),
            candle(current_bar - interval),
            candle(current_bar),
        ]);

        let service = IngestService::new(pool.clone(), exchange, IngestConfig::default());
        service.sync_candles("BTC-USDT-SWAP", Timeframe::H1).await.unwrap();

        let repo = CandleRepository::new(pool);
        let stored = repo.recent("BTC-USDT-SWAP", Timeframe::H1, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|c| c.ts < current_bar));
    }
}
