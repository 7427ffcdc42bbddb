//! 业务实体

mod backtest;
mod candle;
mod decision;
mod integrity;
mod market;
mod order;
mod position;
mod risk_event;

pub use backtest::{BacktestDecisionRow, BacktestPositionPoint, BacktestRun, BacktestTrade};
pub use candle::Candle;
pub use decision::{Allocation, Decision};
pub use integrity::{IngestionRun, IntegrityEvent, RepairJob};
pub use market::{FundingRate, FundingView, MarketSnapshot, PriceSnapshot, PriceView};
pub use order::{Order, OrderLifecycleEvent, Trade, TransitionError};
pub use position::{Balance, Position};
pub use risk_event::RiskEvent;
