//! LLM 调用审计仓储

use sqlx::SqlitePool;

#[derive(Clone)]
pub struct LlmRunRepository {
    pool: SqlitePool,
}

impl LlmRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 原始请求、响应、耗时与结果全部落库审计
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        ts: i64,
        provider: &str,
        model: &str,
        request_json: &str,
        response_text: Option<&str>,
        latency_ms: i64,
        outcome: &str,
        error: Option<&str>,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO llm_runs (ts, provider, model, request_json, response_text,
                                  latency_ms, outcome, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts)
        .bind(provider)
        .bind(model)
        .bind(request_json)
        .bind(response_text)
        .bind(latency_ms)
        .bind(outcome)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
