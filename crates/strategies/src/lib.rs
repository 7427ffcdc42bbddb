//! # Alpha Arena Strategies
//!
//! 策略库与市场状态分类器。策略是市场快照到交易信号的纯函数：
//! 只读传入的 [`MarketSnapshot`]，不访问交易所、不做 I/O、不休眠。

pub mod framework;
pub mod implementations;
pub mod regime;

pub use framework::signal::StrategySignal;
pub use framework::strategy_registry::{StrategyRegistry, StrategySpec};
pub use framework::strategy_trait::Strategy;
pub use regime::{RegimeClassifier, RegimeReading, RegimeThresholds};
