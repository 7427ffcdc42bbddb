//! 风险事件

use serde::{Deserialize, Serialize};

use crate::enums::RiskLevel;

/// 持久化的风险事件，外部故障也通过它对用户可见
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: i64,
    pub ts: i64,
    pub symbol: String,
    pub level: RiskLevel,
    pub rule: String,
    pub details: String,
}

impl RiskEvent {
    pub fn new(ts: i64, symbol: &str, level: RiskLevel, rule: &str, details: String) -> Self {
        Self {
            id: 0,
            ts,
            symbol: symbol.to_string(),
            level,
            rule: rule.to_string(),
            details,
        }
    }
}
