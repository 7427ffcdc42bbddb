//! 拉取审计仓储

use sqlx::SqlitePool;

use alpha_arena_common::utils::time::now_s;
use alpha_arena_domain::{IngestStatus, Timeframe};

#[derive(Clone)]
pub struct IngestionRunRepository {
    pool: SqlitePool,
}

impl IngestionRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 记录一次拉取开始，返回行ID
    pub async fn start(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Option<Timeframe>,
        data_type: &str,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO ingestion_runs (source, symbol, timeframe, data_type, started_at, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(source)
        .bind(symbol)
        .bind(timeframe.map(|t| t.as_str()))
        .bind(data_type)
        .bind(now_s())
        .bind(IngestStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn finish(
        &self,
        run_id: i64,
        status: IngestStatus,
        rows_inserted: i64,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET ended_at = ?, status = ?, rows_inserted = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(now_s())
        .bind(status.as_str())
        .bind(rows_inserted)
        .bind(error)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 最近连续失败次数（自最后一次成功以来）
    pub async fn consecutive_failures(&self, symbol: &str, data_type: &str) -> anyhow::Result<i64> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT status FROM ingestion_runs
            WHERE symbol = ? AND data_type = ? AND status != 'running'
            ORDER BY id DESC
            LIMIT 20
            "#,
        )
        .bind(symbol)
        .bind(data_type)
        .fetch_all(&self.pool)
        .await?;
        let mut failures = 0;
        for (status,) in rows {
            if status == "failed" {
                failures += 1;
            } else {
                break;
            }
        }
        Ok(failures)
    }
}
