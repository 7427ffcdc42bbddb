//! 资金费率、价格快照与市场数据快照

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use alpha_arena_common::CandleItem;

use crate::enums::Timeframe;

/// 资金费率，(symbol, ts) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    pub ts: i64,
    pub rate: Decimal,
    pub next_funding_ts: Option<i64>,
}

impl FundingRate {
    pub fn to_view(&self) -> FundingView {
        FundingView {
            ts: self.ts,
            rate: self.rate.to_f64().unwrap_or(0.0),
            next_funding_ts: self.next_funding_ts,
        }
    }
}

/// 最新价 / 标记价 / 指数价快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub ts: i64,
    pub last: Option<Decimal>,
    pub mark: Option<Decimal>,
    pub index: Option<Decimal>,
}

impl PriceSnapshot {
    pub fn to_view(&self) -> PriceView {
        PriceView {
            ts: self.ts,
            last: self.last.and_then(|v| v.to_f64()),
            mark: self.mark.and_then(|v| v.to_f64()),
            index: self.index.and_then(|v| v.to_f64()),
        }
    }

    /// 参考价优先级：mark > last > index
    pub fn reference_price(&self) -> Option<f64> {
        self.mark
            .or(self.last)
            .or(self.index)
            .and_then(|v| v.to_f64())
    }
}

/// 策略可见的资金费率视图（f64）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingView {
    pub ts: i64,
    pub rate: f64,
    pub next_funding_ts: Option<i64>,
}

/// 策略可见的价格视图（f64）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceView {
    pub ts: i64,
    pub last: Option<f64>,
    pub mark: Option<f64>,
    pub index: Option<f64>,
}

impl PriceView {
    /// 永续与现货的基差：perp_mid / spot_mid - 1（以 mark/index 近似）
    pub fn basis(&self) -> Option<f64> {
        match (self.mark, self.index) {
            (Some(mark), Some(index)) if index != 0.0 => Some(mark / index - 1.0),
            _ => None,
        }
    }
}

/// 市场数据快照 - 策略的唯一输入
///
/// 由 DataService 组装，策略不得自行访问数据库或交易所
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// 按 ts 升序排列的已收盘K线
    pub candles: Vec<CandleItem>,
    pub funding: Option<FundingView>,
    /// 最近若干期资金费率（升序），给资金费率套利用
    pub funding_history: Vec<FundingView>,
    pub prices: Option<PriceView>,
}

impl MarketSnapshot {
    pub fn empty(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            candles: Vec::new(),
            funding: None,
            funding_history: Vec::new(),
            prices: None,
        }
    }

    pub fn last_candle(&self) -> Option<&CandleItem> {
        self.candles.last()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_candle().map(|c| c.c())
    }

    pub fn last_ts(&self) -> Option<i64> {
        self.last_candle().map(|c| c.ts())
    }

    /// 数据新鲜度判断：最后一根K线是否落后 now 超过 max_age_ms
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        match self.last_ts() {
            Some(ts) => now_ms - ts > max_age_ms,
            None => true,
        }
    }
}
