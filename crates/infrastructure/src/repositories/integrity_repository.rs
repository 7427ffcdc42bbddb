//! 完整性事件与修复任务仓储
//!
//! 同一 (symbol, timeframe) 只允许一个活跃（PENDING/RUNNING）修复任务，
//! 入队时检查，防止并发重复拉取同一区间

use std::str::FromStr;

use sqlx::SqlitePool;

use alpha_arena_common::utils::time::now_s;
use alpha_arena_domain::{
    IntegrityEvent, IntegrityEventType, IntegritySeverity, RepairJob, RepairStatus, Timeframe,
};

#[derive(sqlx::FromRow)]
struct IntegrityEventRow {
    id: i64,
    symbol: String,
    timeframe: String,
    event_type: String,
    start_ts: i64,
    end_ts: i64,
    expected_bars: i64,
    actual_bars: i64,
    missing_bars: i64,
    duplicate_bars: i64,
    severity: String,
    detected_at: i64,
    repair_job_id: Option<String>,
    details_json: Option<String>,
}

impl IntegrityEventRow {
    fn into_entity(self) -> anyhow::Result<IntegrityEvent> {
        let event_type = match self.event_type.as_str() {
            "GAP" => IntegrityEventType::Gap,
            "DUPLICATE" => IntegrityEventType::Duplicate,
            "REPAIR" => IntegrityEventType::Repair,
            other => return Err(anyhow::anyhow!("unknown integrity event type: {}", other)),
        };
        let severity = match self.severity.as_str() {
            "LOW" => IntegritySeverity::Low,
            "MEDIUM" => IntegritySeverity::Medium,
            "HIGH" => IntegritySeverity::High,
            other => return Err(anyhow::anyhow!("unknown severity: {}", other)),
        };
        Ok(IntegrityEvent {
            id: self.id,
            symbol: self.symbol,
            timeframe: Timeframe::from_str(&self.timeframe)?,
            event_type,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            expected_bars: self.expected_bars,
            actual_bars: self.actual_bars,
            missing_bars: self.missing_bars,
            duplicate_bars: self.duplicate_bars,
            severity,
            detected_at: self.detected_at,
            repair_job_id: self.repair_job_id,
            details_json: self.details_json,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RepairJobRow {
    job_id: String,
    symbol: String,
    timeframe: String,
    start_ts: i64,
    end_ts: i64,
    status: String,
    repaired_bars: i64,
    message: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RepairJobRow {
    fn into_entity(self) -> anyhow::Result<RepairJob> {
        Ok(RepairJob {
            job_id: self.job_id,
            symbol: self.symbol,
            timeframe: Timeframe::from_str(&self.timeframe)?,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            status: RepairStatus::from_str(&self.status)?,
            repaired_bars: self.repaired_bars,
            message: self.message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct IntegrityRepository {
    pool: SqlitePool,
}

impl IntegrityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_event(&self, event: &IntegrityEvent) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO integrity_events (
                symbol, timeframe, event_type, start_ts, end_ts,
                expected_bars, actual_bars, missing_bars, duplicate_bars,
                severity, detected_at, repair_job_id, details_json
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.symbol)
        .bind(event.timeframe.as_str())
        .bind(event.event_type.as_str())
        .bind(event.start_ts)
        .bind(event.end_ts)
        .bind(event.expected_bars)
        .bind(event.actual_bars)
        .bind(event.missing_bars)
        .bind(event.duplicate_bars)
        .bind(event.severity.as_str())
        .bind(event.detected_at)
        .bind(&event.repair_job_id)
        .bind(&event.details_json)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// detected_at >= since 的事件，按类型过滤
    pub async fn events_since(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        event_type: IntegrityEventType,
        since: i64,
    ) -> anyhow::Result<Vec<IntegrityEvent>> {
        let rows: Vec<IntegrityEventRow> = sqlx::query_as(
            r#"
            SELECT id, symbol, timeframe, event_type, start_ts, end_ts,
                   expected_bars, actual_bars, missing_bars, duplicate_bars,
                   severity, detected_at, repair_job_id, details_json
            FROM integrity_events
            WHERE symbol = ? AND timeframe = ? AND event_type = ? AND detected_at >= ?
            ORDER BY id ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(event_type.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(IntegrityEventRow::into_entity).collect()
    }

    /// 入队修复任务；同 key 已有活跃任务时返回 None
    pub async fn enqueue_job(
        &self,
        job_id: &str,
        symbol: &str,
        timeframe: Timeframe,
        start_ts: i64,
        end_ts: i64,
    ) -> anyhow::Result<Option<String>> {
        let active: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT job_id FROM repair_jobs
            WHERE symbol = ? AND timeframe = ? AND status IN ('PENDING', 'RUNNING')
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;
        if active.is_some() {
            return Ok(None);
        }

        let now = now_s();
        sqlx::query(
            r#"
            INSERT INTO repair_jobs (job_id, symbol, timeframe, start_ts, end_ts, status,
                                     repaired_bars, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'PENDING', 0, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(start_ts)
        .bind(end_ts)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(Some(job_id.to_string()))
    }

    /// 取下一个 PENDING 任务并标记 RUNNING（按创建顺序）
    pub async fn claim_next_pending(&self) -> anyhow::Result<Option<RepairJob>> {
        let row: Option<RepairJobRow> = sqlx::query_as(
            r#"
            SELECT job_id, symbol, timeframe, start_ts, end_ts, status,
                   repaired_bars, message, created_at, updated_at
            FROM repair_jobs
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let job = match row {
            Some(row) => row.into_entity()?,
            None => return Ok(None),
        };
        let updated = sqlx::query(
            "UPDATE repair_jobs SET status = 'RUNNING', updated_at = ? WHERE job_id = ? AND status = 'PENDING'",
        )
        .bind(now_s())
        .bind(&job.job_id)
        .execute(&self.pool)
        .await?;
        // 并发情况下可能被其他工作者抢走
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(RepairJob {
            status: RepairStatus::Running,
            ..job
        }))
    }

    pub async fn finish_job(
        &self,
        job_id: &str,
        status: RepairStatus,
        repaired_bars: i64,
        message: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE repair_jobs
            SET status = ?, repaired_bars = ?, message = ?, updated_at = ?
            WHERE job_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(repaired_bars)
        .bind(message)
        .bind(now_s())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<RepairJob>> {
        let row: Option<RepairJobRow> = sqlx::query_as(
            r#"
            SELECT job_id, symbol, timeframe, start_ts, end_ts, status,
                   repaired_bars, message, created_at, updated_at
            FROM repair_jobs WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RepairJobRow::into_entity).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;

    #[tokio::test]
    async fn only_one_active_job_per_key() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let repo = IntegrityRepository::new(pool);

        let first = repo
            .enqueue_job("job-1", "BTC-USDT-SWAP", Timeframe::M15, 0, 1000)
            .await
            .unwrap();
        assert!(first.is_some());
        let second = repo
            .enqueue_job("job-2", "BTC-USDT-SWAP", Timeframe::M15, 0, 1000)
            .await
            .unwrap();
        assert!(second.is_none());

        let claimed = repo.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, "job-1");
        assert_eq!(claimed.status, RepairStatus::Running);

        repo.finish_job("job-1", RepairStatus::Done, 4, None).await.unwrap();
        // 完成后可以入队新任务
        let third = repo
            .enqueue_job("job-3", "BTC-USDT-SWAP", Timeframe::M15, 0, 1000)
            .await
            .unwrap();
        assert!(third.is_some());
    }
}
