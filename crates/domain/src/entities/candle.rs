//! K线实体
//!
//! 持久化价格使用定点小数，计算路径转换为 f64 的 [`CandleItem`]

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use alpha_arena_common::CandleItem;

use crate::enums::Timeframe;

/// 一根已收盘的K线，(symbol, timeframe, ts) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// K线开始时间戳（毫秒，已对齐到周期边界）
    pub ts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// 校验 OHLCV 约束：low <= open/close <= high，volume >= 0，ts 对齐
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.low > self.open || self.low > self.close {
            return Err(anyhow::anyhow!(
                "candle {}@{} low {} above open/close",
                self.symbol,
                self.ts,
                self.low
            ));
        }
        if self.high < self.open || self.high < self.close {
            return Err(anyhow::anyhow!(
                "candle {}@{} high {} below open/close",
                self.symbol,
                self.ts,
                self.high
            ));
        }
        if self.volume < Decimal::ZERO {
            return Err(anyhow::anyhow!("candle {}@{} negative volume", self.symbol, self.ts));
        }
        if self.ts % self.timeframe.interval_ms() != 0 {
            return Err(anyhow::anyhow!(
                "candle ts {} not aligned to {}",
                self.ts,
                self.timeframe
            ));
        }
        Ok(())
    }

    /// 转换为计算用条目
    pub fn to_item(&self) -> CandleItem {
        CandleItem::builder()
            .ts(self.ts)
            .o(self.open.to_f64().unwrap_or(0.0))
            .h(self.high.to_f64().unwrap_or(0.0))
            .l(self.low.to_f64().unwrap_or(0.0))
            .c(self.close.to_f64().unwrap_or(0.0))
            .v(self.volume.to_f64().unwrap_or(0.0))
            .build()
            .unwrap_or_else(|_| {
                // 数据库中的行已通过写入校验，这里仅兜底
                CandleItem::builder()
                    .ts(self.ts)
                    .o(0.0)
                    .h(0.0)
                    .l(0.0)
                    .c(0.0)
                    .v(0.0)
                    .build()
                    .expect("zero candle is always valid")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(o: &str, h: &str, l: &str, c: &str) -> Candle {
        Candle {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            ts: 1_700_000_000_000 / 3_600_000 * 3_600_000,
            open: o.parse().unwrap(),
            high: h.parse().unwrap(),
            low: l.parse().unwrap(),
            close: c.parse().unwrap(),
            volume: "12.5".parse().unwrap(),
        }
    }

    #[test]
    fn valid_candle_passes() {
        assert!(candle("100", "110", "95", "105").validate().is_ok());
    }

    #[test]
    fn high_below_close_fails() {
        assert!(candle("100", "101", "95", "105").validate().is_err());
    }

    #[test]
    fn unaligned_ts_fails() {
        let mut c = candle("100", "110", "95", "105");
        c.ts += 1;
        assert!(c.validate().is_err());
    }
}
