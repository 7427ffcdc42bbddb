//! 多因子动量
//!
//! ROC 主信号，RSI / MACD / 量能三重确认，缺一不可

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, Regime, SignalIntent};
use alpha_arena_indicators::{atr, macd, rsi, volume_sma};

use crate::framework::signal::StrategySignal;
use crate::framework::strategy_trait::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    /// ROC 回看根数
    pub roc_period: usize,
    /// ROC 入场阈值（比例）
    pub roc_threshold: f64,
    pub rsi_long_min: f64,
    pub rsi_long_max: f64,
    pub rsi_short_min: f64,
    pub rsi_short_max: f64,
    pub volume_threshold: f64,
    pub atr_period: usize,
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
    pub max_position: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            roc_period: 10,
            roc_threshold: 0.02,
            rsi_long_min: 50.0,
            rsi_long_max: 80.0,
            rsi_short_min: 20.0,
            rsi_short_max: 50.0,
            volume_threshold: 1.2,
            atr_period: 14,
            stop_loss_atr: 2.0,
            take_profit_atr: 3.0,
            max_position: 0.20,
        }
    }
}

pub struct MomentumStrategy {
    params: MomentumParams,
}

impl MomentumStrategy {
    pub fn new(params: MomentumParams) -> Self {
        Self { params }
    }
}

impl Strategy for MomentumStrategy {
    fn id(&self) -> &'static str {
        "momentum"
    }

    fn name(&self) -> &'static str {
        "Momentum"
    }

    fn required_regimes(&self) -> &'static [Regime] {
        &[Regime::Trend, Regime::Breakout]
    }

    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal {
        let p = &self.params;
        let candles = &snapshot.candles;
        if candles.len() < p.roc_period.max(26) + 10 {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
        let i = candles.len() - 1;

        let prev = closes[i - p.roc_period];
        if prev == 0.0 {
            return StrategySignal::flat(self.id(), snapshot, "degenerate_price");
        }
        let roc = closes[i] / prev - 1.0;

        let rsi_series = rsi(&closes, 14);
        let macd_out = macd(&closes, 12, 26, 9);
        let vol_ma = volume_sma(candles, 20);
        let atr_series = atr(candles, p.atr_period);

        let price = closes[i];
        let rsi_val = rsi_series[i];
        let atr_val = atr_series[i];
        if rsi_val.is_nan() || atr_val.is_nan() || vol_ma[i].is_nan() {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }
        let volume_ok = candles[i].v() > vol_ma[i] * p.volume_threshold;

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

        if roc > p.roc_threshold
            && rsi_val > p.rsi_long_min
            && rsi_val < p.rsi_long_max
            && macd_out.hist[i] > 0.0
            && volume_ok
        {
            return StrategySignal {
                intent: SignalIntent::Long,
                confidence: 0.8,
                target_weight: p.max_position,
                stop_loss: Some(price - atr_val * p.stop_loss_atr),
                take_profit: Some(price + atr_val * p.take_profit_atr),
                reason: format!("{}根动量 {:.2}% + 三重确认", p.roc_period, roc * 100.0),
                ..base
            };
        }
        if roc < -p.roc_threshold
            && rsi_val > p.rsi_short_min
            && rsi_val < p.rsi_short_max
            && macd_out.hist[i] < 0.0
            && volume_ok
        {
            return StrategySignal {
                intent: SignalIntent::Short,
                confidence: 0.8,
                target_weight: -p.max_position,
                stop_loss: Some(price + atr_val * p.stop_loss_atr),
                take_profit: Some(price - atr_val * p.take_profit_atr),
                reason: format!("{}根动量 {:.2}% + 三重确认", p.roc_period, roc * 100.0),
                ..base
            };
        }

        StrategySignal::flat(self.id(), snapshot, "no_signal")
    }
}
