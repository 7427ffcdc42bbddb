//! 修复工作者
//!
//! 每次处理一个 PENDING 任务（claim 时串行化，同 key 不会并发重拉），
//! 用拉取原语回补区间后写 REPAIR 完整性事件。

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{error, info};

use alpha_arena_common::utils::time::now_s;
use alpha_arena_domain::{
    Candle, Exchange, IntegrityEvent, IntegrityEventType, IntegritySeverity, RepairJob,
    RepairStatus,
};
use alpha_arena_infrastructure::{
    retry_with_backoff, BackoffPolicy, CandleRepository, IntegrityRepository,
};

pub struct RepairWorker {
    exchange: Arc<dyn Exchange>,
    candles: CandleRepository,
    integrity: IntegrityRepository,
    batch_limit: usize,
}

impl RepairWorker {
    pub fn new(pool: SqlitePool, exchange: Arc<dyn Exchange>, batch_limit: usize) -> Self {
        Self {
            exchange,
            candles: CandleRepository::new(pool.clone()),
            integrity: IntegrityRepository::new(pool),
            batch_limit,
        }
    }

    /// 处理一个待修复任务；队列为空时返回 None
    pub async fn run_once(&self) -> anyhow::Result<Option<String>> {
        let job = match self.integrity.claim_next_pending().await? {
            Some(job) => job,
            None => return Ok(None),
        };
        let job_id = job.job_id.clone();

        match self.refetch_range(&job).await {
            Ok(repaired) => {
                self.integrity
                    .finish_job(&job_id, RepairStatus::Done, repaired, None)
                    .await?;
                self.emit_repair_event(&job, repaired, IntegritySeverity::Low, None)
                    .await?;
                info!(
                    "repair job {} done: {} bars for {} {}",
                    job_id, repaired, job.symbol, job.timeframe
                );
            }
            Err(err) => {
                error!("repair job {} failed: {}", job_id, err);
                self.integrity
                    .finish_job(&job_id, RepairStatus::Failed, 0, Some(&err.to_string()))
                    .await?;
                self.emit_repair_event(&job, 0, IntegritySeverity::High, Some(err.to_string()))
                    .await?;
            }
        }
        Ok(Some(job_id))
    }

    async fn refetch_range(&self, job: &RepairJob) -> anyhow::Result<i64> {
        let interval = job.timeframe.interval_ms();
        let policy = BackoffPolicy::default();
        let mut since = job.start_ts;
        let mut repaired = 0i64;

        while since <= job.end_ts {
            let batch = retry_with_backoff(&policy, "repair fetch_ohlcv", || {
                self.exchange
                    .fetch_ohlcv(&job.symbol, job.timeframe, Some(since), self.batch_limit)
            })
            .await
            .map_err(|e| anyhow::anyhow!("repair fetch failed: {}", e))?;

            if batch.is_empty() {
                break;
            }
            let in_range: Vec<Candle> = batch
                .iter()
                .filter(|c| c.ts <= job.end_ts)
                .cloned()
                .collect();
            repaired += self.candles.upsert_candles(&in_range).await? as i64;

            let last_ts = batch.last().map(|c| c.ts).unwrap_or(since);
            if last_ts < since {
                break;
            }
            since = last_ts + interval;
            if batch.len() < self.batch_limit && last_ts >= job.end_ts {
                break;
            }
        }
        Ok(repaired)
    }

    async fn emit_repair_event(
        &self,
        job: &RepairJob,
        repaired: i64,
        severity: IntegritySeverity,
        error: Option<String>,
    ) -> anyhow::Result<()> {
        let interval = job.timeframe.interval_ms();
        let details = serde_json::json!({
            "repaired_bars": repaired,
            "error": error,
        });
        self.integrity
            .insert_event(&IntegrityEvent {
                id: 0,
                symbol: job.symbol.clone(),
                timeframe: job.timeframe,
                event_type: IntegrityEventType::Repair,
                start_ts: job.start_ts,
                end_ts: job.end_ts,
                expected_bars: (job.end_ts - job.start_ts) / interval + 1,
                actual_bars: repaired,
                missing_bars: 0,
                duplicate_bars: 0,
                severity,
                detected_at: now_s(),
                repair_job_id: Some(job.job_id.clone()),
                details_json: Some(details.to_string()),
            })
            .await?;
        Ok(())
    }
}
