//! 动量类指标：RSI / 滚动Z分数

use crate::trend::sma;

/// 相对强弱指数，增益/损失按窗口简单平均
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < period + 1 {
        return out;
    }

    let mut gains = vec![f64::NAN; len];
    let mut losses = vec![f64::NAN; len];
    for i in 1..len {
        let delta = values[i] - values[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    for i in period..len {
        let g: f64 = gains[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let l: f64 = losses[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        out[i] = if l == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + g / l)
        };
    }
    out
}

/// 滚动Z分数：(x - mean) / std，std 为样本标准差
pub fn zscore(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period < 2 || len < period {
        return out;
    }
    let means = sma(values, period);
    for i in period - 1..len {
        let window = &values[i + 1 - period..=i];
        let mean = means[i];
        let var: f64 =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
        let std = var.sqrt();
        out[i] = if std > 0.0 { (values[i] - mean) / std } else { 0.0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_is_100_when_only_gains() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&values, 14);
        assert!(out[13].is_nan());
        assert!((out[29] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_balanced_for_alternating_moves() {
        // 涨跌幅相同交替，RSI 应接近 50
        let mut values = vec![100.0];
        for i in 0..40 {
            let last = *values.last().unwrap();
            values.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let out = rsi(&values, 14);
        let last = out.last().unwrap();
        assert!((last - 50.0).abs() < 5.0, "rsi={}", last);
    }

    #[test]
    fn zscore_flags_outlier() {
        let mut values = vec![100.0; 30];
        values.push(110.0);
        let out = zscore(&values, 20);
        assert!(*out.last().unwrap() > 2.0);
    }

    #[test]
    fn zscore_zero_for_flat_series() {
        let values = vec![5.0; 25];
        let out = zscore(&values, 20);
        assert_eq!(*out.last().unwrap(), 0.0);
    }
}
