//! 波动类指标：布林带 / ATR / ATR百分位

use alpha_arena_common::CandleItem;

use crate::trend::sma;

/// 布林带输出，width = (upper - lower) / mid
#[derive(Debug, Clone)]
pub struct BollingerOutput {
    pub upper: Vec<f64>,
    pub mid: Vec<f64>,
    pub lower: Vec<f64>,
    pub width: Vec<f64>,
}

/// 布林带(period, k)，中轨为 SMA，带宽用样本标准差
pub fn bollinger(values: &[f64], period: usize, std_dev: f64) -> BollingerOutput {
    let len = values.len();
    let mid = sma(values, period);
    let mut upper = vec![f64::NAN; len];
    let mut lower = vec![f64::NAN; len];
    let mut width = vec![f64::NAN; len];

    if period >= 2 && len >= period {
        for i in period - 1..len {
            let window = &values[i + 1 - period..=i];
            let mean = mid[i];
            let var: f64 =
                window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
            let std = var.sqrt();
            upper[i] = mean + std * std_dev;
            lower[i] = mean - std * std_dev;
            width[i] = if mean != 0.0 {
                (upper[i] - lower[i]) / mean
            } else {
                f64::NAN
            };
        }
    }

    BollingerOutput {
        upper,
        mid,
        lower,
        width,
    }
}

/// 平均真实波幅，TR 按窗口简单平均
pub fn atr(candles: &[CandleItem], period: usize) -> Vec<f64> {
    let len = candles.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < 2 {
        return out;
    }

    let mut tr = vec![f64::NAN; len];
    for i in 1..len {
        let prev_close = candles[i - 1].c();
        tr[i] = (candles[i].h() - candles[i].l())
            .max((candles[i].h() - prev_close).abs())
            .max((candles[i].l() - prev_close).abs());
    }

    if len < period + 1 {
        return out;
    }
    for i in period..len {
        out[i] = tr[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
    }
    out
}

/// 当前 ATR 在最近 lookback 根K线 ATR 中的百分位（0-100）
pub fn atr_percentile(candles: &[CandleItem], period: usize, lookback: usize) -> Vec<f64> {
    let atr_series = atr(candles, period);
    let len = atr_series.len();
    let mut out = vec![f64::NAN; len];
    for i in 0..len {
        let current = atr_series[i];
        if current.is_nan() {
            continue;
        }
        let window_start = i.saturating_sub(lookback.saturating_sub(1));
        let window: Vec<f64> = atr_series[window_start..=i]
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        if window.len() < 2 {
            continue;
        }
        let rank = window.iter().filter(|v| **v <= current).count();
        out[i] = rank as f64 / window.len() as f64 * 100.0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candles(n: usize, price: f64, range: f64) -> Vec<CandleItem> {
        (0..n)
            .map(|i| {
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(price)
                    .h(price + range)
                    .l(price - range)
                    .c(price)
                    .v(10.0)
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn bollinger_width_zero_for_flat_series() {
        let values = vec![100.0; 30];
        let out = bollinger(&values, 20, 2.0);
        assert!(out.width[18].is_nan());
        assert_eq!(out.width[29], 0.0);
        assert_eq!(out.upper[29], 100.0);
    }

    #[test]
    fn atr_matches_constant_range() {
        let out = atr(&flat_candles(30, 100.0, 2.0), 14);
        assert!(out[13].is_nan());
        // 恒定 range=4 时 TR 恒等于 4
        assert!((out[29] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn atr_percentile_high_when_vol_expands() {
        let mut candles = flat_candles(80, 100.0, 1.0);
        // 末端放大波动
        let last_ts = candles.last().unwrap().ts();
        for i in 0..5 {
            candles.push(
                CandleItem::builder()
                    .ts(last_ts + (i as i64 + 1) * 3_600_000)
                    .o(100.0)
                    .h(110.0)
                    .l(90.0)
                    .c(100.0)
                    .v(10.0)
                    .build()
                    .unwrap(),
            );
        }
        let out = atr_percentile(&candles, 14, 60);
        assert!(*out.last().unwrap() > 90.0);
    }
}
