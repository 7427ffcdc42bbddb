//! 趋势类指标：EMA / SMA / MACD / ADX / 价格效率

use ta::indicators::ExponentialMovingAverage;
use ta::Next;

use alpha_arena_common::CandleItem;

/// 指数移动平均
///
/// 递归定义从首根K线开始，无预热 NaN（与 pandas ewm(adjust=False) 一致）
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return vec![f64::NAN; values.len()];
    }
    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(v) => v,
        Err(_) => return vec![f64::NAN; values.len()],
    };
    values.iter().map(|v| indicator.next(*v)).collect()
}

/// 简单移动平均，窗口未满时为 NaN
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// MACD 输出
#[derive(Debug, Clone)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

/// MACD(fast, slow, signal)，hist = macd - signal
pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdOutput {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd_line, signal_period);
    let hist: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();
    MacdOutput {
        macd: macd_line,
        signal: signal_line,
        hist,
    }
}

/// 平均趋向指数，衡量趋势强度
///
/// +DM/-DM 经窗口平滑后计算 DX，再对 DX 做一次窗口平滑
pub fn adx(candles: &[CandleItem], period: usize) -> Vec<f64> {
    let len = candles.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < 2 {
        return out;
    }

    let mut plus_dm = vec![f64::NAN; len];
    let mut minus_dm = vec![f64::NAN; len];
    let mut tr = vec![f64::NAN; len];
    for i in 1..len {
        let up = candles[i].h() - candles[i - 1].h();
        let down = candles[i - 1].l() - candles[i].l();
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };

        let prev_close = candles[i - 1].c();
        tr[i] = (candles[i].h() - candles[i].l())
            .max((candles[i].h() - prev_close).abs())
            .max((candles[i].l() - prev_close).abs());
    }

    let atr = rolling_mean_skip_leading_nan(&tr, period);
    let plus_ma = rolling_mean_skip_leading_nan(&plus_dm, period);
    let minus_ma = rolling_mean_skip_leading_nan(&minus_dm, period);

    let mut dx = vec![f64::NAN; len];
    for i in 0..len {
        if atr[i].is_nan() || plus_ma[i].is_nan() || minus_ma[i].is_nan() || atr[i] == 0.0 {
            continue;
        }
        let plus_di = 100.0 * plus_ma[i] / atr[i];
        let minus_di = 100.0 * minus_ma[i] / atr[i];
        let di_sum = plus_di + minus_di;
        if di_sum == 0.0 {
            continue;
        }
        dx[i] = (plus_di - minus_di).abs() / di_sum * 100.0;
    }
    rolling_mean_skip_leading_nan(&dx, period)
}

/// 价格效率：|净变动| / 路径总长，区间 [0,1]
pub fn price_efficiency(candles: &[CandleItem], period: usize) -> Vec<f64> {
    let len = candles.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len <= period {
        return out;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
    for i in period..len {
        let net = (closes[i] - closes[i - period]).abs();
        let total: f64 = (i - period + 1..=i)
            .map(|j| (closes[j] - closes[j - 1]).abs())
            .sum();
        out[i] = if total > 0.0 { net / total } else { 0.0 };
    }
    out
}

/// 窗口均值，自动跳过序列头部的 NaN 段
fn rolling_mean_skip_leading_nan(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    let first_valid = match values.iter().position(|v| !v.is_nan()) {
        Some(idx) => idx,
        None => return out,
    };
    if len - first_valid < period {
        return out;
    }
    for i in (first_valid + period - 1)..len {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<CandleItem> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                CandleItem::builder()
                    .ts(i as i64 * 3_600_000)
                    .o(*c)
                    .h(c + 1.0)
                    .l(c - 1.0)
                    .c(*c)
                    .v(100.0)
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn sma_pads_warmup_with_nan() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
        assert!((out[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn sma_short_input_is_all_nan() {
        let out = sma(&[1.0, 2.0], 3);
        assert!(out.iter().all(|v| v.is_nan()));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn ema_starts_from_first_value() {
        let out = ema(&[10.0, 10.0, 10.0], 5);
        assert!((out[0] - 10.0).abs() < 1e-12);
        assert!((out[2] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn macd_lengths_match_input() {
        let values: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let out = macd(&values, 12, 26, 9);
        assert_eq!(out.macd.len(), 100);
        assert_eq!(out.signal.len(), 100);
        assert_eq!(out.hist.len(), 100);
        // 恒定上涨时 MACD 为正
        assert!(out.macd[99] > 0.0);
    }

    #[test]
    fn adx_rises_in_strong_trend() {
        let trending: Vec<f64> = (0..120).map(|i| 100.0 + 2.0 * i as f64).collect();
        let out = adx(&candles_from_closes(&trending), 14);
        assert_eq!(out.len(), 120);
        let last = out[119];
        assert!(!last.is_nan());
        assert!(last > 20.0, "ADX in steady trend should be high, got {}", last);
    }

    #[test]
    fn price_efficiency_is_one_for_monotonic_moves() {
        let trending: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = price_efficiency(&candles_from_closes(&trending), 20);
        assert!((out[39] - 1.0).abs() < 1e-9);
    }
}
