//! # Alpha Arena Risk
//!
//! 风控闸门：调度之后、执行之前的最后一道检查。
//! 全部规则通过才放行；任一失败记 `RiskEvent(BLOCK)` 并丢弃该决策，
//! 下一周期照常进行。

pub mod gate;
pub mod policies;

pub use gate::{RiskBlock, RiskCheckContext, RiskGate};
pub use policies::RiskRule;
