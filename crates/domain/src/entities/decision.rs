//! 决策记录

use serde::{Deserialize, Serialize};

use crate::enums::{DecisionSource, Regime, Timeframe};

/// 单个策略的权重分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub strategy_id: String,
    pub weight: f64,
    pub confidence: f64,
}

/// 一次决策周期的产物，按周期持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub ts: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub regime: Regime,
    pub allocations: Vec<Allocation>,
    /// 目标仓位，[-1, 1]，正为多
    pub total_position: f64,
    pub confidence: Option<f64>,
    pub reasoning: String,
    pub source: DecisionSource,
    pub prompt_version: Option<String>,
    pub model_version: Option<String>,
}

impl Decision {
    /// 权重和（用于校验 Σw ≈ 1）
    pub fn weight_sum(&self) -> f64 {
        self.allocations.iter().map(|a| a.weight).sum()
    }
}
