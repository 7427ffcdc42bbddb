//! 资金费率套利（永续腿）
//!
//! 资金费率持续为正（多头付费）时做空永续收取费率，
//! 完整的对冲在现货侧，这里只表达永续腿。
//! 费率回落或基差走阔时退出。

use serde::{Deserialize, Serialize};

use alpha_arena_domain::{MarketSnapshot, Regime, SignalIntent};

use crate::framework::signal::StrategySignal;
use crate::framework::strategy_trait::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingArbParams {
    /// 入场费率阈值（单期，8小时）
    pub min_funding_rate: f64,
    /// 退出费率阈值
    pub exit_funding_rate: f64,
    /// 需要连续满足入场阈值的结算期数
    pub min_duration: usize,
    /// 入场时允许的最大基差绝对值
    pub max_entry_basis: f64,
    /// 基差超过该值强制退出
    pub max_hold_basis: f64,
    pub max_position: f64,
}

impl Default for FundingArbParams {
    fn default() -> Self {
        Self {
            min_funding_rate: 0.001,
            exit_funding_rate: 0.0005,
            min_duration: 2,
            max_entry_basis: 0.005,
            max_hold_basis: 0.015,
            max_position: 0.50,
        }
    }
}

pub struct FundingRateArbitrageStrategy {
    params: FundingArbParams,
}

impl FundingRateArbitrageStrategy {
    pub fn new(params: FundingArbParams) -> Self {
        Self { params }
    }
}

impl Strategy for FundingRateArbitrageStrategy {
    fn id(&self) -> &'static str {
        "funding_rate_arbitrage"
    }

    fn name(&self) -> &'static str {
        "Funding Rate Arbitrage"
    }

    fn required_regimes(&self) -> &'static [Regime] {
        // 不受市场状态门控
        &[]
    }

    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal {
        let p = &self.params;
        let funding = match &snapshot.funding {
            Some(f) => *f,
            None => return StrategySignal::flat(self.id(), snapshot, "no_funding_data"),
        };
        let price = snapshot.last_price().unwrap_or(0.0);
        let basis = snapshot.prices.as_ref().and_then(|view| view.basis());

        let base = StrategySignal {
            strategy_id: self.id().to_string(),
            ts: funding.ts,
            intent: SignalIntent::Flat,
            confidence: 0.0,
            target_weight: 0.0,
            price,
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
        };

        // 退出：费率回落，或基差超限
        if funding.rate <= p.exit_funding_rate {
            return StrategySignal {
                intent: SignalIntent::CloseShort,
                confidence: 0.8,
                reason: "资金费率回落，套利窗口关闭".to_string(),
                ..base
            };
        }
        if let Some(basis) = basis {
            if basis.abs() > p.max_hold_basis {
                return StrategySignal {
                    intent: SignalIntent::CloseShort,
                    confidence: 0.8,
                    reason: format!("基差 {:.4} 超限，退出对冲", basis),
                    ..base
                };
            }
        }

        // 入场：连续 min_duration 期费率高于阈值且基差温和
        if funding.rate >= p.min_funding_rate {
            let history = &snapshot.funding_history;
            let sustained = history.len() >= p.min_duration
                && history
                    .iter()
                    .rev()
                    .take(p.min_duration)
                    .all(|f| f.rate >= p.min_funding_rate);
            let basis_ok = basis.map_or(true, |b| b.abs() < p.max_entry_basis);

            if sustained && basis_ok {
                return StrategySignal {
                    intent: SignalIntent::Short,
                    confidence: 0.9,
                    target_weight: -p.max_position,
                    reason: format!(
                        "资金费率 {:.4}% 连续 {} 期为正，做空永续收费率",
                        funding.rate * 100.0,
                        p.min_duration
                    ),
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
    use alpha_arena_domain::{FundingView, PriceView, Timeframe};

    fn snapshot(rate: f64, history_rates: &[f64], basis_mark_index: Option<(f64, f64)>) -> MarketSnapshot {
        let history = history_rates
            .iter()
            .enumerate()
            .map(|(i, r)| FundingView {
                ts: i as i64 * 8 * 3_600_000,
                rate: *r,
                next_funding_ts: None,
            })
            .collect();
        MarketSnapshot {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            candles: Vec::new(),
            funding: Some(FundingView {
                ts: 0,
                rate,
                next_funding_ts: None,
            }),
            funding_history: history,
            prices: basis_mark_index.map(|(mark, index)| PriceView {
                ts: 0,
                last: Some(mark),
                mark: Some(mark),
                index: Some(index),
            }),
        }
    }

    #[test]
    fn sustained_high_funding_shorts_perp() {
        let strategy = FundingRateArbitrageStrategy::new(FundingArbParams::default());
        let signal = strategy.signal(&snapshot(0.0012, &[0.0011, 0.0012], Some((50_050.0, 50_000.0))));
        assert_eq!(signal.intent, SignalIntent::Short);
        assert!(signal.target_weight < 0.0);
    }

    #[test]
    fn single_spike_is_not_enough() {
        let strategy = FundingRateArbitrageStrategy::new(FundingArbParams::default());
        let signal = strategy.signal(&snapshot(0.0012, &[0.0002, 0.0012], None));
        assert_eq!(signal.intent, SignalIntent::Flat);
    }

    #[test]
    fn normalized_funding_exits() {
        let strategy = FundingRateArbitrageStrategy::new(FundingArbParams::default());
        let signal = strategy.signal(&snapshot(0.0003, &[0.0012, 0.0003], None));
        assert_eq!(signal.intent, SignalIntent::CloseShort);
    }

    #[test]
    fn wide_basis_blocks_entry() {
        let strategy = FundingRateArbitrageStrategy::new(FundingArbParams::default());
        // 基差 2%
        let signal = strategy.signal(&snapshot(0.0012, &[0.0012, 0.0012], Some((51_000.0, 50_000.0))));
        assert_eq!(signal.intent, SignalIntent::CloseShort);
    }

    #[test]
    fn missing_funding_is_flat() {
        let strategy = FundingRateArbitrageStrategy::new(FundingArbParams::default());
        let snapshot = MarketSnapshot::empty("BTC-USDT-SWAP", Timeframe::H1);
        assert_eq!(strategy.signal(&snapshot).intent, SignalIntent::Flat);
    }
}
