//! # Alpha Arena Infrastructure
//!
//! 基础设施层：交易所适配器（真实 OKX 与确定性模拟）与 sqlx 仓储实现。
//! services/market/execution 只依赖 domain 接口，由这里提供实现。

pub mod exchanges;
pub mod repositories;

pub use exchanges::okx_adapter::OkxExchange;
pub use exchanges::retry::{retry_with_backoff, BackoffPolicy};
pub use exchanges::simulated::SimulatedExchange;
pub use repositories::{
    BacktestRepository, BalanceRepository, CandleRepository, DecisionRepository,
    FundingRepository, IngestionRunRepository, IntegrityRepository, LlmRunRepository,
    OrderRepository, PositionRepository, PriceSnapshotRepository, RiskEventRepository,
    TradeRepository,
};
