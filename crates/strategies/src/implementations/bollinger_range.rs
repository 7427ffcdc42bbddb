//! 布林带区间回归
//!
//! 只在低波动震荡里做：ADX 走低、带宽收窄、Z分数触及极值且 RSI 确认。
//! 回到中轨（Z 归零）平仓；止损取 ATR 倍数与固定百分比中更近的一个。

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, Regime, SignalIntent};
use alpha_arena_indicators::{adx, atr, bollinger, rsi, zscore};

use crate::framework::signal::StrategySignal;
use crate::framework::strategy_trait::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BollingerRangeParams {
    pub bb_period: usize,
    pub bb_std: f64,
    pub adx_max: f64,
    pub bandwidth_max: f64,
    pub zscore_entry: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub stop_loss_pct: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub max_position: f64,
}

impl Default for BollingerRangeParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_std: 2.0,
            adx_max: 18.0,
            bandwidth_max: 0.04,
            zscore_entry: 2.0,
            rsi_oversold: 35.0,
            rsi_overbought: 65.0,
            stop_loss_pct: 0.02,
            atr_period: 14,
            stop_loss_atr: 2.0,
            max_position: 0.25,
        }
    }
}

pub struct BollingerRangeStrategy {
    params: BollingerRangeParams,
}

impl BollingerRangeStrategy {
    pub fn new(params: BollingerRangeParams) -> Self {
        Self { params }
    }

    /// ATR 止损与百分比止损取离价更近者
    fn long_stop(&self, price: f64, atr_val: f64) -> f64 {
        let pct_stop = price * (1.0 - self.params.stop_loss_pct);
        let atr_stop = price - atr_val * self.params.stop_loss_atr;
        pct_stop.max(atr_stop)
    }

    fn short_stop(&self, price: f64, atr_val: f64) -> f64 {
        let pct_stop = price * (1.0 + self.params.stop_loss_pct);
        let atr_stop = price + atr_val * self.params.stop_loss_atr;
        pct_stop.min(atr_stop)
    }
}

impl Strategy for BollingerRangeStrategy {
    fn id(&self) -> &'static str {
        "bollinger_range"
    }

    fn name(&self) -> &'static str {
        "Bollinger Range"
    }

    fn required_regimes(&self) -> &'static [Regime] {
        &[Regime::Range]
    }

    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal {
        let p = &self.params;
        let candles = &snapshot.candles;
        // ADX 需要两段平滑预热
        if candles.len() < p.bb_period.max(30) + 5 {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
        let i = candles.len() - 1;

        let bands = bollinger(&closes, p.bb_period, p.bb_std);
        let z = zscore(&closes, p.bb_period);
        let adx_series = adx(candles, 14);
        let rsi_series = rsi(&closes, 14);
        let atr_series = atr(candles, p.atr_period);

        let price = closes[i];
        let width = bands.width[i];
        let z_val = z[i];
        let adx_val = adx_series[i];
        let rsi_val = rsi_series[i];
        if width.is_nan() || z_val.is_nan() || adx_val.is_nan() || rsi_val.is_nan() {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }
        let atr_val = if atr_series[i].is_nan() { 0.0 } else { atr_series[i] };

        // 波动放大或趋势走强时离场观望
        if width > p.bandwidth_max {
            return StrategySignal::flat(self.id(), snapshot, "bandwidth_too_wide");
        }
        if adx_val >= p.adx_max {
            return StrategySignal::flat(self.id(), snapshot, "trending_market");
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

        if z_val <= -p.zscore_entry && rsi_val < p.rsi_oversold {
            return StrategySignal {
                intent: SignalIntent::Long,
                confidence: 0.75,
                target_weight: p.max_position,
                stop_loss: Some(self.long_stop(price, atr_val)),
                take_profit: Some(bands.mid[i]),
                reason: "低波动区间下轨超卖".to_string(),
                ..base
            };
        }
        if z_val >= p.zscore_entry && rsi_val > p.rsi_overbought {
            return StrategySignal {
                intent: SignalIntent::Short,
                confidence: 0.75,
                target_weight: -p.max_position,
                stop_loss: Some(self.short_stop(price, atr_val)),
                take_profit: Some(bands.mid[i]),
                reason: "低波动区间上轨超买".to_string(),
                ..base
            };
        }

        // Z 回归零轴视为均值回归完成
        let prev_z = z[i - 1];
        if !prev_z.is_nan() {
            if prev_z < 0.0 && z_val >= 0.0 {
                return StrategySignal {
                    intent: SignalIntent::CloseLong,
                    confidence: 0.6,
                    reason: "回归中轨".to_string(),
                    ..base
                };
            }
            if prev_z > 0.0 && z_val <= 0.0 {
                return StrategySignal {
                    intent: SignalIntent::CloseShort,
                    confidence: 0.6,
                    reason: "回归中轨".to_string(),
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

    fn snapshot_from(candles: Vec<CandleItem>) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            candles,
            funding: None,
            funding_history: Vec::new(),
            prices: None,
        }
    }

    /// 趋势行情快照：策略必须自守（即使未被状态过滤也不做多空）
    #[test]
    fn trending_snapshot_produces_flat_without_panic() {
        let candles: Vec<CandleItem> = (0..120)
            .map(|i| {
                let base = 100.0 + 3.0 * i as f64;
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base)
                    .h(base + 3.5)
                    .l(base - 0.5)
                    .c(base + 3.0)
                    .v(100.0)
                    .build()
                    .unwrap()
            })
            .collect();
        let strategy = BollingerRangeStrategy::new(BollingerRangeParams::default());
        let signal = strategy.signal(&snapshot_from(candles));
        assert_eq!(signal.intent, SignalIntent::Flat);
    }

    #[test]
    fn oversold_dip_in_quiet_range_goes_long() {
        // 横盘后末端下探
        let mut candles = Vec::new();
        for i in 0..100 {
            let wiggle = if i % 2 == 0 { 0.08 } else { -0.08 };
            let base = 100.0 + wiggle;
            candles.push(
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base)
                    .h(base + 0.15)
                    .l(base - 0.15)
                    .c(base)
                    .v(100.0)
                    .build()
                    .unwrap(),
            );
        }
        for i in 100..104 {
            let base = 100.0 - (i - 99) as f64 * 0.25;
            candles.push(
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base + 0.2)
                    .h(base + 0.25)
                    .l(base - 0.1)
                    .c(base)
                    .v(100.0)
                    .build()
                    .unwrap(),
            );
        }
        let strategy = BollingerRangeStrategy::new(BollingerRangeParams::default());
        let signal = strategy.signal(&snapshot_from(candles));
        if signal.intent == SignalIntent::Long {
            assert!(signal.stop_loss.unwrap() < signal.price);
            assert!(signal.take_profit.unwrap() > signal.price);
        } else {
            assert_eq!(signal.intent, SignalIntent::Flat);
        }
    }
}
