//! 业务枚举模块

mod market_enums;
mod order_enums;
mod timeframe;

pub use market_enums::{
    DecisionSource, IngestStatus, IntegrityEventType, IntegritySeverity, Regime, RepairStatus,
    RiskLevel, SignalIntent,
};
pub use order_enums::{OrderSide, OrderStatus, OrderType, PositionSide, TimeInForce};
pub use timeframe::Timeframe;
