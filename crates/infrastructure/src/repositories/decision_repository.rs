//! 决策记录仓储

use std::str::FromStr;

use sqlx::SqlitePool;

use alpha_arena_domain::{Allocation, Decision, DecisionSource, Regime, Timeframe};

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: i64,
    ts: i64,
    symbol: String,
    timeframe: String,
    regime: String,
    allocations_json: String,
    total_position: f64,
    confidence: Option<f64>,
    reasoning: String,
    source: String,
    prompt_version: Option<String>,
    model_version: Option<String>,
}

impl DecisionRow {
    fn into_entity(self) -> anyhow::Result<Decision> {
        let allocations: Vec<Allocation> = serde_json::from_str(&self.allocations_json)?;
        let source = match self.source.as_str() {
            "llm" => DecisionSource::Llm,
            _ => DecisionSource::Portfolio,
        };
        Ok(Decision {
            id: self.id,
            ts: self.ts,
            symbol: self.symbol,
            timeframe: Timeframe::from_str(&self.timeframe)?,
            regime: Regime::from_str(&self.regime)?,
            allocations,
            total_position: self.total_position,
            confidence: self.confidence,
            reasoning: self.reasoning,
            source,
            prompt_version: self.prompt_version,
            model_version: self.model_version,
        })
    }
}

#[derive(Clone)]
pub struct DecisionRepository {
    pool: SqlitePool,
}

impl DecisionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, decision: &Decision) -> anyhow::Result<i64> {
        let allocations_json = serde_json::to_string(&decision.allocations)?;
        let result = sqlx::query(
            r#"
            INSERT INTO decisions (ts, symbol, timeframe, regime, allocations_json,
                                   total_position, confidence, reasoning, source,
                                   prompt_version, model_version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(decision.ts)
        .bind(&decision.symbol)
        .bind(decision.timeframe.as_str())
        .bind(decision.regime.as_str())
        .bind(allocations_json)
        .bind(decision.total_position)
        .bind(decision.confidence)
        .bind(&decision.reasoning)
        .bind(decision.source.as_str())
        .bind(&decision.prompt_version)
        .bind(&decision.model_version)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// 最近 limit 条决策，按时间升序返回
    pub async fn recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Decision>> {
        let rows: Vec<DecisionRow> = sqlx::query_as(
            r#"
            SELECT * FROM decisions
            WHERE symbol = ? AND timeframe = ?
            ORDER BY ts DESC LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut decisions = rows
            .into_iter()
            .map(DecisionRow::into_entity)
            .collect::<anyhow::Result<Vec<_>>>()?;
        decisions.reverse();
        Ok(decisions)
    }
}
