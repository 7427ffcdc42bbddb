//! 风险事件仓储

use sqlx::SqlitePool;

use alpha_arena_domain::{RiskEvent, RiskLevel};

#[derive(Clone)]
pub struct RiskEventRepository {
    pool: SqlitePool,
}

impl RiskEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &RiskEvent) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO risk_events (ts, symbol, level, rule, details) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.ts)
        .bind(&event.symbol)
        .bind(event.level.as_str())
        .bind(&event.rule)
        .bind(&event.details)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// 最近事件（倒序），可按级别过滤
    pub async fn recent(
        &self,
        symbol: &str,
        level: Option<RiskLevel>,
        limit: usize,
    ) -> anyhow::Result<Vec<(i64, String, String)>> {
        let rows: Vec<(i64, String, String)> = match level {
            Some(level) => {
                sqlx::query_as(
                    r#"
                    SELECT ts, rule, details FROM risk_events
                    WHERE symbol = ? AND level = ?
                    ORDER BY ts DESC LIMIT ?
                    "#,
                )
                .bind(symbol)
                .bind(level.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT ts, rule, details FROM risk_events
                    WHERE symbol = ?
                    ORDER BY ts DESC LIMIT ?
                    "#,
                )
                .bind(symbol)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn count_by_rule(&self, symbol: &str, rule: &str) -> anyhow::Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM risk_events WHERE symbol = ? AND rule = ?",
        )
        .bind(symbol)
        .bind(rule)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
