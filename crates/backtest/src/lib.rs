//! # Alpha Arena Backtest
//!
//! 确定性历史回放：与实盘共用数据访问、指标、策略与状态分类，
//! 执行与对账换成内存撮合。同样的输入与种子必须产出相同结果。

pub mod engine;
pub mod metrics;

pub use engine::{BacktestEngine, BacktestOutcome, BacktestRequest};
pub use metrics::BacktestMetrics;
