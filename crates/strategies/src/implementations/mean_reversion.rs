//! Z分数均值回归
//!
//! 极端偏离 + RSI 极值共振入场，|Z| 收敛后退出

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, Regime, SignalIntent};
use alpha_arena_indicators::{atr, rsi, sma, zscore};

use crate::framework::signal::StrategySignal;
use crate::framework::strategy_trait::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionParams {
    pub zscore_period: usize,
    pub zscore_entry: f64,
    pub zscore_exit: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub max_position: f64,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            zscore_period: 20,
            zscore_entry: 2.0,
            zscore_exit: 0.5,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            atr_period: 14,
            stop_loss_atr: 2.5,
            max_position: 0.20,
        }
    }
}

pub struct MeanReversionStrategy {
    params: MeanReversionParams,
}

impl MeanReversionStrategy {
    pub fn new(params: MeanReversionParams) -> Self {
        Self { params }
    }
}

impl Strategy for MeanReversionStrategy {
    fn id(&self) -> &'static str {
        "mean_reversion"
    }

    fn name(&self) -> &'static str {
        "Mean Reversion"
    }

    fn required_regimes(&self) -> &'static [Regime] {
        &[Regime::Range]
    }

    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal {
        let p = &self.params;
        let candles = &snapshot.candles;
        if candles.len() < p.zscore_period + 5 {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
        let i = candles.len() - 1;

        let z = zscore(&closes, p.zscore_period);
        let rsi_series = rsi(&closes, 14);
        let atr_series = atr(candles, p.atr_period);
        let mean = sma(&closes, p.zscore_period);

        let price = closes[i];
        let z_val = z[i];
        let rsi_val = rsi_series[i];
        if z_val.is_nan() || rsi_val.is_nan() {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }
        let atr_val = if atr_series[i].is_nan() { 0.0 } else { atr_series[i] };

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
                confidence: 0.7,
                target_weight: p.max_position,
                stop_loss: Some(price - atr_val * p.stop_loss_atr),
                take_profit: Some(mean[i]),
                reason: format!("Z={:.2} 超卖共振", z_val),
                ..base
            };
        }
        if z_val >= p.zscore_entry && rsi_val > p.rsi_overbought {
            return StrategySignal {
                intent: SignalIntent::Short,
                confidence: 0.7,
                target_weight: -p.max_position,
                stop_loss: Some(price + atr_val * p.stop_loss_atr),
                take_profit: Some(mean[i]),
                reason: format!("Z={:.2} 超买共振", z_val),
                ..base
            };
        }

        // 收敛退出
        let prev_z = z[i - 1];
        if !prev_z.is_nan() && z_val.abs() <= p.zscore_exit && prev_z.abs() > p.zscore_exit {
            return StrategySignal {
                intent: if prev_z < 0.0 {
                    SignalIntent::CloseLong
                } else {
                    SignalIntent::CloseShort
                },
                confidence: 0.6,
                reason: "Z分数收敛，均值回归完成".to_string(),
                ..base
            };
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
    fn extreme_dip_with_oversold_rsi_goes_long() {
        let mut candles = Vec::new();
        for i in 0..60 {
            let base = 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 };
            candles.push(
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base)
                    .h(base + 0.2)
                    .l(base - 0.2)
                    .c(base)
                    .v(10.0)
                    .build()
                    .unwrap(),
            );
        }
        // 连续急跌
        for i in 60..66 {
            let base = 100.0 - (i - 59) as f64 * 0.4;
            candles.push(
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base + 0.4)
                    .h(base + 0.45)
                    .l(base - 0.1)
                    .c(base)
                    .v(10.0)
                    .build()
                    .unwrap(),
            );
        }
        let snapshot = MarketSnapshot {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            candles,
            funding: None,
            funding_history: Vec::new(),
            prices: None,
        };
        let strategy = MeanReversionStrategy::new(MeanReversionParams::default());
        let signal = strategy.signal(&snapshot);
        assert_eq!(signal.intent, SignalIntent::Long);
        assert!(signal.take_profit.unwrap() > signal.price);
    }
}
