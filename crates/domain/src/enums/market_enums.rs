//! 市场状态与数据质量相关枚举

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 市场状态标签，每个决策周期只输出一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Trend,
    Range,
    Breakout,
    HighVol,
    /// 无法归类，需要特定市场状态的策略输出 FLAT
    Undefined,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trend => "TREND",
            Regime::Range => "RANGE",
            Regime::Breakout => "BREAKOUT",
            Regime::HighVol => "HIGH_VOL",
            Regime::Undefined => "UNDEFINED",
        }
    }
}

impl FromStr for Regime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TREND" | "STRONG_TREND" | "WEAK_TREND" => Ok(Regime::Trend),
            "RANGE" | "LOW_VOLATILITY" => Ok(Regime::Range),
            "BREAKOUT" => Ok(Regime::Breakout),
            "HIGH_VOL" | "HIGH_VOLATILITY" => Ok(Regime::HighVol),
            "UNDEFINED" | "UNKNOWN" => Ok(Regime::Undefined),
            other => Err(anyhow::anyhow!("unknown regime: {}", other)),
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 策略信号意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalIntent {
    Long,
    Short,
    Flat,
    CloseLong,
    CloseShort,
}

impl SignalIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalIntent::Long => "LONG",
            SignalIntent::Short => "SHORT",
            SignalIntent::Flat => "FLAT",
            SignalIntent::CloseLong => "CLOSE_LONG",
            SignalIntent::CloseShort => "CLOSE_SHORT",
        }
    }

    pub fn is_flat(&self) -> bool {
        *self == SignalIntent::Flat
    }

    pub fn is_close(&self) -> bool {
        matches!(self, SignalIntent::CloseLong | SignalIntent::CloseShort)
    }
}

/// 风险事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Info,
    Warn,
    Block,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Info => "INFO",
            RiskLevel::Warn => "WARN",
            RiskLevel::Block => "BLOCK",
        }
    }
}

/// 数据完整性事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntegrityEventType {
    Gap,
    Duplicate,
    Repair,
}

impl IntegrityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityEventType::Gap => "GAP",
            IntegrityEventType::Duplicate => "DUPLICATE",
            IntegrityEventType::Repair => "REPAIR",
        }
    }
}

/// 完整性事件严重级别（按缺失/重复条数分档）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntegritySeverity {
    Low,
    Medium,
    High,
}

impl IntegritySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegritySeverity::Low => "LOW",
            IntegritySeverity::Medium => "MEDIUM",
            IntegritySeverity::High => "HIGH",
        }
    }

    /// 缺失 >= 100 为 HIGH，>= 20 为 MEDIUM，否则 LOW
    pub fn from_missing(missing: i64, duplicate: i64) -> Self {
        if missing >= 100 || duplicate >= 100 {
            IntegritySeverity::High
        } else if missing >= 20 || duplicate >= 20 {
            IntegritySeverity::Medium
        } else {
            IntegritySeverity::Low
        }
    }
}

/// 修复任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepairStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Pending => "PENDING",
            RepairStatus::Running => "RUNNING",
            RepairStatus::Done => "DONE",
            RepairStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for RepairStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(RepairStatus::Pending),
            "RUNNING" => Ok(RepairStatus::Running),
            "DONE" => Ok(RepairStatus::Done),
            "FAILED" => Ok(RepairStatus::Failed),
            other => Err(anyhow::anyhow!("unknown repair status: {}", other)),
        }
    }
}

/// 拉取任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Running => "running",
            IngestStatus::Success => "success",
            IngestStatus::Failed => "failed",
            IngestStatus::Skipped => "skipped",
        }
    }
}

/// 决策来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Portfolio,
    Llm,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Portfolio => "portfolio",
            DecisionSource::Llm => "llm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_thresholds() {
        assert_eq!(IntegritySeverity::from_missing(4, 0), IntegritySeverity::Low);
        assert_eq!(IntegritySeverity::from_missing(20, 0), IntegritySeverity::Medium);
        assert_eq!(IntegritySeverity::from_missing(0, 150), IntegritySeverity::High);
    }

    #[test]
    fn regime_parsing_normalizes_legacy_labels() {
        assert_eq!("strong_trend".parse::<Regime>().unwrap(), Regime::Trend);
        assert_eq!("LOW_VOLATILITY".parse::<Regime>().unwrap(), Regime::Range);
    }
}
