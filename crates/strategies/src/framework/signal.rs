//! 策略信号定义

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, SignalIntent};

/// 策略输出信号
///
/// `target_weight` 是仓位提示，[-1, 1]，正为多；止损止盈来自
/// ATR 倍数或显式百分比，由各策略自行计算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy_id: String,
    pub ts: i64,
    pub intent: SignalIntent,
    pub confidence: f64,
    pub target_weight: f64,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reason: String,
}

impl StrategySignal {
    /// FLAT 信号，沿用快照末根K线的时间与价格
    pub fn flat(strategy_id: &str, snapshot: &MarketSnapshot, reason: &str) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            ts: snapshot.last_ts().unwrap_or(0),
            intent: SignalIntent::Flat,
            confidence: 0.0,
            target_weight: 0.0,
            price: snapshot.last_price().unwrap_or(0.0),
            stop_loss: None,
            take_profit: None,
            reason: reason.to_string(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        !self.intent.is_flat()
    }
}
