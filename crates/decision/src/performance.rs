//! 策略历史表现评分
//!
//! 从已落库的回测运行聚合每个策略的表现分：
//! 胜率、收益、回撤按 0.5 / 0.3 / 0.2 加权，缺数据时给中性分 0.5

use std::collections::HashMap;

use sqlx::SqlitePool;

use alpha_arena_domain::Timeframe;
use alpha_arena_infrastructure::BacktestRepository;

const NEUTRAL_SCORE: f64 = 0.5;

/// 每策略表现分（0-1）
#[derive(Debug, Clone, Default)]
pub struct PerformanceScores {
    scores: HashMap<String, f64>,
}

impl PerformanceScores {
    pub fn get(&self, strategy_id: &str) -> f64 {
        self.scores.get(strategy_id).copied().unwrap_or(NEUTRAL_SCORE)
    }

    pub fn from_map(scores: HashMap<String, f64>) -> Self {
        Self { scores }
    }

    /// 从最近 limit 次回测聚合
    pub async fn load(
        pool: &SqlitePool,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Self> {
        let repo = BacktestRepository::new(pool.clone());
        let rows = repo.recent_metrics(symbol, timeframe, limit).await?;

        let mut samples: HashMap<String, Vec<(f64, f64, f64)>> = HashMap::new();
        for row in rows {
            let params: serde_json::Value = match serde_json::from_str(&row.params_json) {
                Ok(value) => value,
                Err(_) => continue,
            };
            let key = match params["strategy_key"].as_str() {
                Some(key) if !key.is_empty() => key.to_string(),
                _ => continue,
            };
            let metrics: serde_json::Value = match row.metrics_json.as_deref().map(serde_json::from_str)
            {
                Some(Ok(value)) => value,
                _ => continue,
            };
            let win_rate = metrics["win_rate"].as_f64().unwrap_or(0.0);
            let total_return = metrics["total_return"].as_f64().unwrap_or(0.0);
            let max_drawdown = metrics["max_drawdown"].as_f64().unwrap_or(0.0);
            samples.entry(key).or_default().push((win_rate, total_return, max_drawdown));
        }

        let scores = samples
            .into_iter()
            .map(|(key, values)| (key, aggregate_score(&values)))
            .collect();
        Ok(Self { scores })
    }
}

/// 胜率/收益/回撤合成分
fn aggregate_score(values: &[(f64, f64, f64)]) -> f64 {
    if values.is_empty() {
        return NEUTRAL_SCORE;
    }
    let n = values.len() as f64;
    let avg_win_rate = values.iter().map(|v| v.0).sum::<f64>() / n;
    let avg_return = values.iter().map(|v| v.1).sum::<f64>() / n;
    let avg_drawdown = values.iter().map(|v| v.2).sum::<f64>() / n;

    let win_rate_score = avg_win_rate.clamp(0.0, 1.0);
    let return_score = avg_return.clamp(-1.0, 1.0) / 2.0 + 0.5;
    let drawdown_score = 1.0 - avg_drawdown.clamp(0.0, 1.0);

    0.5 * win_rate_score + 0.3 * return_score + 0.2 * drawdown_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_strategy_gets_neutral_score() {
        let scores = PerformanceScores::default();
        assert_eq!(scores.get("ema_trend"), 0.5);
    }

    #[test]
    fn profitable_history_scores_above_neutral() {
        // 胜率60%、收益20%、回撤10%
        let score = aggregate_score(&[(0.6, 0.2, 0.1)]);
        assert!(score > 0.5, "score={}", score);
        // 全亏的历史在中性分之下
        let bad = aggregate_score(&[(0.1, -0.5, 0.6)]);
        assert!(bad < 0.5, "bad={}", bad);
    }
}
