//! 决策反馈分析
//!
//! 把最近的决策窗口与已实现成交对齐，统计每个策略/市场状态的
//! 胜率与平均收益，生成给 LLM 的反馈摘要。

use std::collections::HashMap;

use sqlx::SqlitePool;

use alpha_arena_domain::Timeframe;
use alpha_arena_infrastructure::{DecisionRepository, TradeRepository};

/// 单项统计
#[derive(Debug, Clone, Default)]
pub struct OutcomeStats {
    pub wins: f64,
    pub total: f64,
    pub return_sum: f64,
}

impl OutcomeStats {
    pub fn win_rate(&self) -> f64 {
        if self.total > 0.0 {
            self.wins / self.total
        } else {
            0.0
        }
    }

    pub fn avg_return(&self) -> f64 {
        if self.total > 0.0 {
            self.return_sum / self.total
        } else {
            0.0
        }
    }
}

/// 反馈分析结果
#[derive(Debug, Clone, Default)]
pub struct FeedbackReport {
    pub strategy_stats: HashMap<String, OutcomeStats>,
    pub regime_stats: HashMap<String, OutcomeStats>,
}

pub struct FeedbackAnalyzer {
    decisions: DecisionRepository,
    trades: TradeRepository,
}

impl FeedbackAnalyzer {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            decisions: DecisionRepository::new(pool.clone()),
            trades: TradeRepository::new(pool),
        }
    }

    /// 最近 limit 次决策的表现统计
    pub async fn analyze(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<FeedbackReport> {
        let decisions = self.decisions.recent(symbol, timeframe, limit).await?;
        if decisions.is_empty() {
            return Ok(FeedbackReport::default());
        }
        let interval = timeframe.interval_ms();
        let mut report = FeedbackReport::default();

        for (idx, decision) in decisions.iter().enumerate() {
            let start_ts = decision.ts;
            let end_ts = decisions
                .get(idx + 1)
                .map(|d| d.ts)
                .unwrap_or(start_ts + interval);

            let trades = self.trades.recent(symbol, 500).await?;
            let window: Vec<_> = trades
                .iter()
                .filter(|t| t.ts >= start_ts && t.ts < end_ts)
                .collect();
            let pnl: f64 = window
                .iter()
                .filter_map(|t| t.realized_pnl.as_ref())
                .filter_map(|p| p.to_string().parse::<f64>().ok())
                .sum();
            let notional: f64 = window
                .iter()
                .filter_map(|t| {
                    let price = t.price.to_string().parse::<f64>().ok()?;
                    let amount = t.amount.to_string().parse::<f64>().ok()?;
                    Some(price * amount)
                })
                .sum();
            if notional <= 0.0 {
                continue;
            }
            let return_ratio = pnl / notional;
            let win = return_ratio > 0.0;

            for allocation in &decision.allocations {
                let stats = report
                    .strategy_stats
                    .entry(allocation.strategy_id.clone())
                    .or_default();
                stats.wins += if win { allocation.weight } else { 0.0 };
                stats.total += allocation.weight;
                stats.return_sum += return_ratio * allocation.weight;
            }
            let stats = report
                .regime_stats
                .entry(decision.regime.as_str().to_string())
                .or_default();
            stats.wins += if win { 1.0 } else { 0.0 };
            stats.total += 1.0;
            stats.return_sum += return_ratio;
        }
        Ok(report)
    }

    /// 生成给 LLM 的中文反馈摘要
    pub async fn summary(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<String> {
        let report = self.analyze(symbol, timeframe, limit).await?;
        if report.strategy_stats.is_empty() {
            return Ok(format!("最近{}次决策统计：暂无有效交易结果", limit));
        }

        let mut lines = vec![format!("最近{}次决策统计：", limit)];
        let mut entries: Vec<_> = report.strategy_stats.iter().collect();
        entries.sort_by(|a, b| {
            b.1.win_rate()
                .partial_cmp(&a.1.win_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (strategy_id, stats) in &entries {
            let sign = if stats.avg_return() >= 0.0 { "+" } else { "" };
            lines.push(format!(
                "- {}：胜率{:.0}%，平均收益{}{:.2}%",
                strategy_id,
                stats.win_rate() * 100.0,
                sign,
                stats.avg_return() * 100.0
            ));
        }
        if let Some((best, stats)) = entries.first() {
            lines.push(format!("表现最好的策略：{}（胜率{:.0}%）", best, stats.win_rate() * 100.0));
        }
        if let Some((worst, stats)) = entries.last() {
            lines.push(format!("表现最差的策略：{}（胜率{:.0}%）", worst, stats.win_rate() * 100.0));
        }
        Ok(lines.join("\n"))
    }
}
