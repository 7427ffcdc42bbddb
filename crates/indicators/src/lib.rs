//! # Alpha Arena Indicators
//!
//! 无状态纯函数指标库。输入K线序列，输出与输入等长的序列，
//! 预热期内以 NaN 占位。所有窗口参数一律按K线根数计，不按日历时间。

pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use momentum::{rsi, zscore};
pub use trend::{adx, ema, macd, price_efficiency, sma, MacdOutput};
pub use volatility::{atr, atr_percentile, bollinger, BollingerOutput};
pub use volume::{volume_sma, volume_trend};

/// 判断序列末端的值是否可用（非 NaN）
pub fn last_valid(values: &[f64]) -> Option<f64> {
    values.last().copied().filter(|v| !v.is_nan())
}
