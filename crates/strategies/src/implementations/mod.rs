//! 策略实现

mod bollinger_range;
mod breakout;
mod ema_trend;
mod funding_rate_arbitrage;
mod grid_trading;
mod mean_reversion;
mod momentum;

pub use bollinger_range::{BollingerRangeParams, BollingerRangeStrategy};
pub use breakout::{BreakoutParams, BreakoutStrategy};
pub use ema_trend::{EmaTrendParams, EmaTrendStrategy};
pub use funding_rate_arbitrage::{FundingArbParams, FundingRateArbitrageStrategy};
pub use grid_trading::{GridTradingParams, GridTradingStrategy};
pub use mean_reversion::{MeanReversionParams, MeanReversionStrategy};
pub use momentum::{MomentumParams, MomentumStrategy};
