//! # Alpha Arena Domain
//!
//! 领域模型层 - 纯粹的业务逻辑，不依赖任何基础设施
//!
//! - `entities`: 业务实体，如 Order, Candle, Position, BacktestRun
//! - `enums`: 业务枚举，如 OrderSide, OrderStatus, Regime, Timeframe
//! - `traits`: 领域接口（交易所抽象等）

pub mod entities;
pub mod enums;
pub mod traits;

pub use entities::{
    Allocation, Balance, BacktestDecisionRow, BacktestPositionPoint, BacktestRun, BacktestTrade,
    Candle, Decision, FundingRate, FundingView, IngestionRun, IntegrityEvent, MarketSnapshot,
    Order, OrderLifecycleEvent, Position, PriceSnapshot, PriceView, RepairJob, RiskEvent, Trade,
    TransitionError,
};
pub use enums::{
    DecisionSource, IngestStatus, IntegrityEventType, IntegritySeverity, OrderSide, OrderStatus,
    OrderType, PositionSide, Regime, RepairStatus, RiskLevel, SignalIntent, TimeInForce, Timeframe,
};
pub use traits::{
    Exchange, ExchangeError, VenueBalance, VenueOrderAck, VenueOrderRequest, VenueOrderState,
    VenuePosition,
};
