//! 布林中轨等距网格（区间状态门控）
//!
//! 以布林中轨为中心、带宽等分为网格；价格偏离中轨的格数决定
//! 目标权重，回到中轨附近清仓。只在震荡市启用。

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, Regime, SignalIntent};
use alpha_arena_indicators::{adx, bollinger};

use crate::framework::signal::StrategySignal;
use crate::framework::strategy_trait::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridTradingParams {
    pub bb_period: usize,
    pub bb_std: f64,
    /// 单侧网格层数
    pub grid_levels: usize,
    pub adx_max: f64,
    pub bandwidth_max: f64,
    pub max_position: f64,
    /// 回中轨的清仓带（格数）
    pub flat_band: f64,
}

impl Default for GridTradingParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_std: 2.0,
            grid_levels: 5,
            adx_max: 20.0,
            bandwidth_max: 0.05,
            max_position: 0.30,
            flat_band: 0.5,
        }
    }
}

pub struct GridTradingStrategy {
    params: GridTradingParams,
}

impl GridTradingStrategy {
    pub fn new(params: GridTradingParams) -> Self {
        Self { params }
    }
}

impl Strategy for GridTradingStrategy {
    fn id(&self) -> &'static str {
        "grid_trading"
    }

    fn name(&self) -> &'static str {
        "Grid Trading"
    }

    fn required_regimes(&self) -> &'static [Regime] {
        &[Regime::Range]
    }

    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal {
        let p = &self.params;
        let candles = &snapshot.candles;
        if candles.len() < p.bb_period.max(30) + 5 {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
        let i = candles.len() - 1;
        let bands = bollinger(&closes, p.bb_period, p.bb_std);
        let adx_series = adx(candles, 14);

        let price = closes[i];
        let mid = bands.mid[i];
        let upper = bands.upper[i];
        let lower = bands.lower[i];
        let adx_val = adx_series[i];
        if mid.is_nan() || adx_val.is_nan() {
            return StrategySignal::flat(self.id(), snapshot, "not_enough_data");
        }
        if bands.width[i] > p.bandwidth_max || adx_val >= p.adx_max {
            return StrategySignal::flat(self.id(), snapshot, "market_not_ranging");
        }

        let half_band = (upper - lower) / 2.0;
        if half_band <= 0.0 {
            return StrategySignal::flat(self.id(), snapshot, "degenerate_band");
        }
        let spacing = half_band / p.grid_levels as f64;
        // 正 offset = 价格在中轨下方 = 买入区
        let offset = (mid - price) / spacing;

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

        if offset.abs() <= p.flat_band {
            // 回到中轨附近，把仓位清回零
            return StrategySignal {
                intent: if closes[i - 1] < mid {
                    SignalIntent::CloseLong
                } else {
                    SignalIntent::CloseShort
                },
                confidence: 0.5,
                reason: "价格回到网格中枢".to_string(),
                ..base
            };
        }

        let level = offset.abs().floor().min(p.grid_levels as f64);
        let weight = (level / p.grid_levels as f64) * p.max_position;
        if offset > 0.0 {
            StrategySignal {
                intent: SignalIntent::Long,
                confidence: 0.6,
                target_weight: weight,
                stop_loss: Some(lower - spacing),
                take_profit: Some(mid),
                reason: format!("网格第 {} 层买入", level as i64),
                ..base
            }
        } else {
            StrategySignal {
                intent: SignalIntent::Short,
                confidence: 0.6,
                target_weight: -weight,
                stop_loss: Some(upper + spacing),
                take_profit: Some(mid),
                reason: format!("网格第 {} 层卖出", level as i64),
                ..base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_common::CandleItem;
    use alpha_arena_domain::Timeframe;

    #[test]
    fn deeper_deviation_scales_weight() {
        let mut candles: Vec<CandleItem> = (0..100)
            .map(|i| {
                let wiggle = if i % 2 == 0 { 0.3 } else { -0.3 };
                let base = 100.0 + wiggle;
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(base)
                    .h(base + 0.4)
                    .l(base - 0.4)
                    .c(base)
                    .v(50.0)
                    .build()
                    .unwrap()
            })
            .collect();
        // 下探一格以上
        candles.push(
            CandleItem::builder()
                .ts(100 * 3_600_000)
                .o(99.9)
                .h(99.9)
                .l(99.2)
                .c(99.3)
                .v(50.0)
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
        let strategy = GridTradingStrategy::new(GridTradingParams::default());
        let signal = strategy.signal(&snapshot);
        if signal.intent == SignalIntent::Long {
            assert!(signal.target_weight > 0.0);
            assert!(signal.target_weight <= GridTradingParams::default().max_position);
        }
    }
}
