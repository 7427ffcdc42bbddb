//! 组合调度器 - 永远可用的确定性分配器
//!
//! 流程：按市场状态过滤策略 -> 状态分与表现分加权打分 ->
//! 取前K归一化权重 -> 合成目标仓位并夹在全局杠杆内 ->
//! 变化不足阈值时 HOLD。
//!
//! V1 独占规则：同一 symbol 至多一个方向的仓位，反向目标
//! 由执行层拆成先平后开。

use tracing::debug;

use alpha_arena_domain::{Allocation, Decision, DecisionSource, Regime, Timeframe};
use alpha_arena_strategies::{Strategy, StrategySignal};

use crate::performance::PerformanceScores;

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub top_k: usize,
    pub min_score: f64,
    pub global_leverage: f64,
    /// 目标仓位变化阈值（基点）
    pub diff_threshold_bps: f64,
    pub min_notional: f64,
    pub regime_weight: f64,
    pub performance_weight: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.45,
            global_leverage: 1.0,
            diff_threshold_bps: 10.0,
            min_notional: 10.0,
            regime_weight: 0.6,
            performance_weight: 0.4,
        }
    }
}

/// 一次调度的市场与账户上下文
#[derive(Debug, Clone)]
pub struct SchedulerContext {
    pub ts: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub regime: Regime,
    /// 账户权益（USDT）
    pub equity: f64,
    /// 当前持仓占权益比例（带符号）
    pub current_weight: f64,
}

/// 调度结果
#[derive(Debug, Clone)]
pub enum SchedulerOutcome {
    Decide(Decision),
    Hold { reason: String },
}

#[derive(Debug, Clone)]
struct ScoredStrategy {
    strategy_id: String,
    score: f64,
    signal: StrategySignal,
}

pub struct PortfolioScheduler {
    config: SchedulerConfig,
}

impl PortfolioScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// 状态匹配分：命中 1.0，不限状态 0.6，不匹配 0.3
    fn regime_score(strategy: &dyn Strategy, regime: Regime) -> f64 {
        let regimes = strategy.required_regimes();
        if regimes.is_empty() {
            0.6
        } else if regimes.contains(&regime) {
            1.0
        } else {
            0.3
        }
    }

    /// 运行一次调度
    ///
    /// `signals` 是本周期全部启用策略的 (策略, 信号) 对
    pub fn schedule(
        &self,
        ctx: &SchedulerContext,
        signals: &[(&dyn Strategy, StrategySignal)],
        performance: &PerformanceScores,
    ) -> SchedulerOutcome {
        // 1) 状态过滤：要求特定市场状态的策略在其他状态下一律不参与
        let eligible: Vec<&(&dyn Strategy, StrategySignal)> = signals
            .iter()
            .filter(|(strategy, _)| strategy.accepts_regime(ctx.regime))
            .collect();
        if eligible.is_empty() {
            return SchedulerOutcome::Hold {
                reason: format!("no strategy eligible for regime {}", ctx.regime),
            };
        }

        // 2) 打分
        let mut scored: Vec<ScoredStrategy> = eligible
            .iter()
            .map(|(strategy, signal)| {
                let regime_score = Self::regime_score(*strategy, ctx.regime);
                let perf_score = performance.get(strategy.id());
                let score = self.config.regime_weight * regime_score
                    + self.config.performance_weight * perf_score;
                ScoredStrategy {
                    strategy_id: strategy.id().to_string(),
                    score,
                    signal: signal.clone(),
                }
            })
            .filter(|s| s.score >= self.config.min_score)
            .collect();
        if scored.is_empty() {
            return SchedulerOutcome::Hold {
                reason: "all strategies below min score".to_string(),
            };
        }

        // 3) 取前K并归一化权重
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.top_k);
        let score_sum: f64 = scored.iter().map(|s| s.score).sum();
        let allocations: Vec<Allocation> = scored
            .iter()
            .map(|s| Allocation {
                strategy_id: s.strategy_id.clone(),
                weight: s.score / score_sum,
                confidence: s.signal.confidence,
            })
            .collect();

        // 4) 合成方向并夹入全局杠杆
        let mut target: f64 = scored
            .iter()
            .zip(allocations.iter())
            .map(|(s, a)| a.weight * s.signal.target_weight)
            .sum();
        target = target.clamp(-self.config.global_leverage, self.config.global_leverage);

        // 5) 独占规则下的最小变化检查
        let diff = target - ctx.current_weight;
        let diff_bps = diff.abs() * 10_000.0;
        if diff_bps < self.config.diff_threshold_bps {
            return SchedulerOutcome::Hold {
                reason: format!("diff {:.1}bps below threshold", diff_bps),
            };
        }
        if ctx.equity > 0.0 && diff.abs() * ctx.equity < self.config.min_notional {
            return SchedulerOutcome::Hold {
                reason: format!(
                    "notional {:.2} below minimum {:.2}",
                    diff.abs() * ctx.equity,
                    self.config.min_notional
                ),
            };
        }

        let confidence = if allocations.is_empty() {
            0.0
        } else {
            allocations.iter().map(|a| a.confidence * a.weight).sum::<f64>()
        };
        debug!(
            "schedule {}: regime={} target={:.4} current={:.4}",
            ctx.symbol, ctx.regime, target, ctx.current_weight
        );

        SchedulerOutcome::Decide(Decision {
            id: 0,
            ts: ctx.ts,
            symbol: ctx.symbol.clone(),
            timeframe: ctx.timeframe,
            regime: ctx.regime,
            allocations,
            total_position: target,
            confidence: Some(confidence),
            reasoning: "scored_by_regime_and_performance".to_string(),
            source: DecisionSource::Portfolio,
            prompt_version: None,
            model_version: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_domain::{MarketSnapshot, SignalIntent};
    use alpha_arena_strategies::implementations::{
        BollingerRangeParams, BollingerRangeStrategy, EmaTrendParams, EmaTrendStrategy,
        FundingArbParams, FundingRateArbitrageStrategy,
    };

    fn signal(id: &str, intent: SignalIntent, weight: f64, confidence: f64) -> StrategySignal {
        StrategySignal {
            strategy_id: id.to_string(),
            ts: 1,
            intent,
            confidence,
            target_weight: weight,
            price: 50_000.0,
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
        }
    }

    fn ctx(regime: Regime, current_weight: f64) -> SchedulerContext {
        SchedulerContext {
            ts: 1,
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            regime,
            equity: 10_000.0,
            current_weight,
        }
    }

    #[test]
    fn regime_gating_excludes_mismatched_strategy() {
        let ema = EmaTrendStrategy::new(EmaTrendParams::default());
        let bollinger = BollingerRangeStrategy::new(BollingerRangeParams::default());
        let scheduler = PortfolioScheduler::new(SchedulerConfig::default());
        let performance = PerformanceScores::default();

        let signals: Vec<(&dyn Strategy, StrategySignal)> = vec![
            (&ema, signal("ema_trend", SignalIntent::Long, 0.2, 0.85)),
            (&bollinger, signal("bollinger_range", SignalIntent::Long, 0.25, 0.75)),
        ];
        let outcome = scheduler.schedule(&ctx(Regime::Trend, 0.0), &signals, &performance);
        match outcome {
            SchedulerOutcome::Decide(decision) => {
                // TREND 状态下 bollinger_range 不应拿到权重
                assert!(decision
                    .allocations
                    .iter()
                    .all(|a| a.strategy_id != "bollinger_range"));
                assert!(decision.total_position > 0.0);
                assert!((decision.weight_sum() - 1.0).abs() < 1e-9);
            }
            SchedulerOutcome::Hold { reason } => panic!("expected decision, got HOLD: {}", reason),
        }
    }

    #[test]
    fn small_change_holds() {
        let ema = EmaTrendStrategy::new(EmaTrendParams::default());
        let scheduler = PortfolioScheduler::new(SchedulerConfig::default());
        let performance = PerformanceScores::default();
        let signals: Vec<(&dyn Strategy, StrategySignal)> =
            vec![(&ema, signal("ema_trend", SignalIntent::Long, 0.2, 0.85))];

        // 当前仓位几乎等于目标
        let outcome = scheduler.schedule(&ctx(Regime::Trend, 0.1999), &signals, &performance);
        assert!(matches!(outcome, SchedulerOutcome::Hold { .. }));
    }

    #[test]
    fn empty_snapshot_signals_hold() {
        let funding = FundingRateArbitrageStrategy::new(FundingArbParams::default());
        let scheduler = PortfolioScheduler::new(SchedulerConfig::default());
        let performance = PerformanceScores::default();
        let snapshot = MarketSnapshot::empty("BTC-USDT-SWAP", Timeframe::H1);
        let flat = funding.signal(&snapshot);
        let signals: Vec<(&dyn Strategy, StrategySignal)> = vec![(&funding, flat)];

        let outcome = scheduler.schedule(&ctx(Regime::Undefined, 0.0), &signals, &performance);
        // FLAT 信号目标权重为 0，当前也为 0 -> HOLD
        assert!(matches!(outcome, SchedulerOutcome::Hold { .. }));
    }

    #[test]
    fn target_clamped_to_global_leverage() {
        let ema = EmaTrendStrategy::new(EmaTrendParams::default());
        let scheduler = PortfolioScheduler::new(SchedulerConfig {
            global_leverage: 0.5,
            ..Default::default()
        });
        let performance = PerformanceScores::default();
        let signals: Vec<(&dyn Strategy, StrategySignal)> =
            vec![(&ema, signal("ema_trend", SignalIntent::Long, 1.0, 0.9))];
        match scheduler.schedule(&ctx(Regime::Trend, 0.0), &signals, &performance) {
            SchedulerOutcome::Decide(decision) => {
                assert!(decision.total_position <= 0.5);
            }
            SchedulerOutcome::Hold { .. } => panic!("expected decision"),
        }
    }
}
