//! 关键位放量突破
//!
//! 挤压后的突破才算数：带宽处于低分位、收盘放量越过前高/前低、
//! K线实体饱满。突破后连续两根收回关键位内视为假突破，发平仓信号。

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, Regime, SignalIntent};
use alpha_arena_indicators::{atr, bollinger, volume_sma};

use crate::framework::signal::StrategySignal;
use crate::framework::strategy_trait::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutParams {
    pub lookback_period: usize,
    /// 突破确认倍数：close > resistance × threshold
    pub breakout_threshold: f64,
    pub volume_threshold: f64,
    /// 带宽分位窗口
    pub squeeze_window: usize,
    /// 带宽低分位上限（0-1）
    pub squeeze_quantile: f64,
    /// 实体占比下限（强K线）
    pub min_body_ratio: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
    pub max_position: f64,
}

impl Default for BreakoutParams {
    fn default() -> Self {
        Self {
            lookback_period: 20,
            breakout_threshold: 1.005,
            volume_threshold: 1.5,
            squeeze_window: 100,
            squeeze_quantile: 0.25,
            min_body_ratio: 0.6,
            atr_period: 14,
            stop_loss_atr: 2.0,
            take_profit_atr: 4.0,
            max_position: 0.25,
        }
    }
}

pub struct BreakoutStrategy {
    params: BreakoutParams,
}

impl BreakoutStrategy {
    pub fn new(params: BreakoutParams) -> Self {
        Self { params }
    }

    /// 当前带宽是否处于窗口低分位
    fn in_squeeze(&self, widths: &[f64], i: usize) -> bool {
        let start = i.saturating_sub(self.params.squeeze_window);
        let window: Vec<f64> = widths[start..=i]
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        if window.len() < 20 {
            return false;
        }
        let current = widths[i];
        if current.is_nan() {
            return false;
        }
        // 严格小于：窗口内带宽全相等时当前值位于最低分位
        let rank = window.iter().filter(|v| **v < current).count() as f64 / window.len() as f64;
        rank <= self.params.squeeze_quantile
    }
}

impl Strategy for BreakoutStrategy {
    fn id(&self) -> &'static str {
        "breakout"
    }

    fn name(&self) -> &'static str {
        "Breakout"
    }

    fn required_regimes(&self) -> &'static [Regime] {
        &[Regime::Breakout, Regime::Trend]
    }

    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal {
        let p = &self.params;
        let candles = &snapshot.candles;
        let min_len = p.lookback_period.max(p.atr_period) + 3;
        if candles.len() < min_len {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
        let i = candles.len() - 1;

        // 关键位取前 N 根（剔除当前K线，避免前视）
        let history = &candles[i - p.lookback_period..i];
        let resistance = history.iter().map(|c| c.h()).fold(f64::MIN, f64::max);
        let support = history.iter().map(|c| c.l()).fold(f64::MAX, f64::min);

        let atr_series = atr(candles, p.atr_period);
        let vol_ma = volume_sma(candles, p.lookback_period);
        let bands = bollinger(&closes, 20, 2.0);

        let price = closes[i];
        let atr_val = atr_series[i];
        if atr_val.is_nan() || vol_ma[i].is_nan() {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }

        let base = StrategySignal {
            strategy_id: self.id().to_string(),
            ts: candles[i].ts(),
            intent: SignalIntent::Flat,
            confidence: 0.0,
            target_weight: 0.0,
            price,
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
        };

        // 假突破：此前出现过突破，随后两根都收回位内
        if i >= 3 {
            let older = &candles[i.saturating_sub(p.lookback_period + 3)..i - 2];
            if older.len() >= p.lookback_period {
                let old_resistance = older.iter().map(|c| c.h()).fold(f64::MIN, f64::max);
                let broke_then = closes[i - 2] > old_resistance * p.breakout_threshold;
                if broke_then && closes[i - 1] < old_resistance && price < old_resistance {
                    return StrategySignal {
                        intent: SignalIntent::CloseLong,
                        confidence: 0.7,
                        reason: "突破失败，连续两根收回关键位内".to_string(),
                        ..base
                    };
                }
            }
        }

        // 挤压看突破前一根：突破K线本身会瞬间撑大带宽
        let squeezed = self.in_squeeze(&bands.width, i - 1);
        let volume_ok = candles[i].v() > vol_ma[i] * p.volume_threshold;
        let strong_candle = candles[i].body_ratio() >= p.min_body_ratio;

        if squeezed && volume_ok && strong_candle {
            if price > resistance * p.breakout_threshold && candles[i].is_bullish() {
                return StrategySignal {
                    intent: SignalIntent::Long,
                    confidence: 0.8,
                    target_weight: p.max_position,
                    stop_loss: Some(price - atr_val * p.stop_loss_atr),
                    take_profit: Some(price + atr_val * p.take_profit_atr),
                    reason: "挤压后放量突破前高".to_string(),
                    ..base
                };
            }
            if price < support / p.breakout_threshold && !candles[i].is_bullish() {
                return StrategySignal {
                    intent: SignalIntent::Short,
                    confidence: 0.8,
                    target_weight: -p.max_position,
                    stop_loss: Some(price + atr_val * p.stop_loss_atr),
                    take_profit: Some(price - atr_val * p.take_profit_atr),
                    reason: "挤压后放量跌破前低".to_string(),
                    ..base
                };
            }
        }

        StrategySignal::flat(self.id(), snapshot, "no_signal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_common::CandleItem;
    use alpha_arena_domain::Timeframe;

    #[test]
    fn squeeze_then_surge_breaks_out_long() {
        // 长横盘构造低带宽分位，末根放量大阳线突破
        let mut candles = Vec::new();
        for i in 0..120 {
            let wiggle = if i % 2 == 0 { 0.1 } else { -0.1 };
            let base = 100.0 + wiggle;
            candles.push(
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base)
                    .h(base + 0.2)
                    .l(base - 0.2)
                    .c(base)
                    .v(100.0)
                    .build()
                    .unwrap(),
            );
        }
        candles.push(
            CandleItem::builder()
                .ts(120 * 3_600_000)
                .o(100.1)
                .h(102.5)
                .l(100.0)
                .c(102.4)
                .v(400.0)
                .build()
                .unwrap(),
        );
        let snapshot = MarketSnapshot {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            candles,
            funding: None,
            funding_history: Vec::new(),
            prices: None,
        };
        let strategy = BreakoutStrategy::new(BreakoutParams::default());
        let signal = strategy.signal(&snapshot);
        assert_eq!(signal.intent, SignalIntent::Long);
        assert!(signal.stop_loss.unwrap() < signal.price);
    }

    #[test]
    fn quiet_market_without_breakout_is_flat() {
        let candles: Vec<CandleItem> = (0..80)
            .map(|i| {
                let base = 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 };
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base)
                    .h(base + 0.2)
                    .l(base - 0.2)
                    .c(base)
                    .v(100.0)
                    .build()
                    .unwrap()
            })
            .collect();
        let snapshot = MarketSnapshot {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            candles,
            funding: None,
            funding_history: Vec::new(),
            prices: None,
        };
        let strategy = BreakoutStrategy::new(BreakoutParams::default());
        assert_eq!(strategy.signal(&snapshot).intent, SignalIntent::Flat);
    }
}
