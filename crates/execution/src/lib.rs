//! # Alpha Arena Execution
//!
//! 执行域：目标仓位到子订单的翻译、订单状态机的推进、
//! 模拟/实盘两套执行器、账户与订单对账循环。
//! 订单与生命周期事件只允许执行器和对账循环写入。

pub mod allocator;
pub mod executor;
pub mod live_executor;
pub mod position_math;
pub mod reconciliation;
pub mod simulated_executor;

pub use allocator::PortfolioAllocator;
pub use executor::{OrderExecutor, OrderIntent, OrderLocks};
pub use live_executor::{LiveExecutor, LiveExecutorConfig};
pub use reconciliation::account_sync::AccountSync;
pub use reconciliation::order_sync::OrderSync;
pub use simulated_executor::{SimulatedExecutor, SlippageModel};
