//! 回测绩效指标
//!
//! 所有比率类指标一律以比例存储（0.05 = 5%），展示层自行换算。
//! 年化因子由周期的每年K线数推得。

use serde::{Deserialize, Serialize};

/// 单笔闭合交易的摘要（指标计算输入）
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub pnl: f64,
    /// 本笔收益率（比例）
    pub return_ratio: f64,
}

/// 权益曲线点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: i64,
    pub equity: f64,
    /// 距离运行峰值的回撤（比例，>= 0）
    pub drawdown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration_bars: i64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub win_rate: f64,
    pub profit_factor: Option<f64>,
    pub payoff_ratio: Option<f64>,
    pub trade_count: i64,
    pub funding_pnl: f64,
}

impl BacktestMetrics {
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[ClosedTrade],
        bars_per_year: f64,
        funding_pnl: f64,
    ) -> Self {
        if equity_curve.is_empty() || initial_capital <= 0.0 {
            return Self::zeroed();
        }
        let final_equity = equity_curve.last().map(|p| p.equity).unwrap_or(initial_capital);
        let total_return = final_equity / initial_capital - 1.0;

        // 回撤与回撤持续期
        let (max_drawdown, max_dd_duration) = drawdown_stats(equity_curve);

        // 按K线收益序列年化
        let bar_returns: Vec<f64> = equity_curve
            .windows(2)
            .filter(|w| w[0].equity > 0.0)
            .map(|w| w[1].equity / w[0].equity - 1.0)
            .collect();
        let sharpe = annualized_ratio(&bar_returns, bars_per_year, false);
        let sortino = annualized_ratio(&bar_returns, bars_per_year, true);

        let years = equity_curve.len() as f64 / bars_per_year;
        let cagr = if years > 0.0 && final_equity > 0.0 {
            (final_equity / initial_capital).powf(1.0 / years) - 1.0
        } else {
            0.0
        };
        let calmar = if max_drawdown > 0.0 { cagr / max_drawdown } else { 0.0 };

        // 交易统计
        let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).collect();
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            wins.len() as f64 / trades.len() as f64
        };
        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum::<f64>().abs();
        let profit_factor = if gross_loss > 0.0 {
            Some(gross_profit / gross_loss)
        } else {
            None
        };
        let payoff_ratio = match (wins.is_empty(), losses.is_empty()) {
            (false, false) => {
                let avg_win = gross_profit / wins.len() as f64;
                let avg_loss = gross_loss / losses.len() as f64;
                if avg_loss > 0.0 {
                    Some(avg_win / avg_loss)
                } else {
                    None
                }
            }
            _ => None,
        };

        Self {
            total_return,
            cagr,
            max_drawdown,
            max_drawdown_duration_bars: max_dd_duration,
            sharpe,
            sortino,
            calmar,
            win_rate,
            profit_factor,
            payoff_ratio,
            trade_count: trades.len() as i64,
            funding_pnl,
        }
    }

    fn zeroed() -> Self {
        Self {
            total_return: 0.0,
            cagr: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration_bars: 0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            win_rate: 0.0,
            profit_factor: None,
            payoff_ratio: None,
            trade_count: 0,
            funding_pnl: 0.0,
        }
    }
}

/// 最大回撤（比例）与最长回撤持续K线数
fn drawdown_stats(curve: &[EquityPoint]) -> (f64, i64) {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    let mut current_duration = 0_i64;
    let mut max_duration = 0_i64;
    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            current_duration = 0;
        } else {
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    (max_dd, max_duration)
}

/// 年化的 Sharpe / Sortino（无风险利率按 0 处理）
fn annualized_ratio(returns: &[f64], bars_per_year: f64, downside_only: bool) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let deviations: Vec<f64> = if downside_only {
        returns.iter().filter(|r| **r < 0.0).map(|r| r * r).collect()
    } else {
        returns.iter().map(|r| (r - mean).powi(2)).collect()
    };
    if deviations.is_empty() {
        return 0.0;
    }
    let variance = deviations.iter().sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    mean / std * bars_per_year.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let mut peak = f64::MIN;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                peak = peak.max(*v);
                EquityPoint {
                    ts: i as i64,
                    equity: *v,
                    drawdown: if peak > 0.0 { (peak - v) / peak } else { 0.0 },
                }
            })
            .collect()
    }

    #[test]
    fn drawdown_is_non_negative_and_correct() {
        let curve = curve(&[100.0, 110.0, 99.0, 104.5, 120.0]);
        let (dd, duration) = drawdown_stats(&curve);
        assert!((dd - 0.1).abs() < 1e-9);
        assert_eq!(duration, 2);
    }

    #[test]
    fn monotonic_curve_has_zero_drawdown() {
        let metrics = BacktestMetrics::compute(
            100.0,
            &curve(&[100.0, 105.0, 110.0, 120.0]),
            &[],
            8760.0,
            0.0,
        );
        assert_eq!(metrics.max_drawdown, 0.0);
        assert!((metrics.total_return - 0.2).abs() < 1e-9);
        assert_eq!(metrics.trade_count, 0);
        assert!(metrics.profit_factor.is_none());
    }

    #[test]
    fn trade_stats_are_ratios() {
        let trades = vec![
            ClosedTrade { pnl: 10.0, return_ratio: 0.01 },
            ClosedTrade { pnl: -5.0, return_ratio: -0.005 },
            ClosedTrade { pnl: 20.0, return_ratio: 0.02 },
        ];
        let metrics = BacktestMetrics::compute(
            1000.0,
            &curve(&[1000.0, 1010.0, 1005.0, 1025.0]),
            &trades,
            8760.0,
            0.0,
        );
        assert!((metrics.win_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.profit_factor.unwrap(), 6.0);
        assert_eq!(metrics.payoff_ratio.unwrap(), 3.0);
    }
}
