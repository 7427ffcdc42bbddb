//! 成交量类指标

use alpha_arena_common::CandleItem;

use crate::trend::sma;

/// 成交量简单均线
pub fn volume_sma(candles: &[CandleItem], period: usize) -> Vec<f64> {
    let volumes: Vec<f64> = candles.iter().map(|c| c.v()).collect();
    sma(&volumes, period)
}

/// 成交量趋势：量均线相对 period 根之前的变化率
pub fn volume_trend(candles: &[CandleItem], period: usize) -> Vec<f64> {
    let ma = volume_sma(candles, period);
    let len = ma.len();
    let mut out = vec![f64::NAN; len];
    for i in 0..len {
        if i < period {
            continue;
        }
        let prev = ma[i - period];
        if prev.is_nan() || ma[i].is_nan() || prev == 0.0 {
            continue;
        }
        out[i] = (ma[i] - prev) / prev;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_with_volumes(vols: &[f64]) -> Vec<CandleItem> {
        vols.iter()
            .enumerate()
            .map(|(i, v)| {
                CandleItem::builder()
                    .ts(i as i64 * 900_000)
                    .o(100.0)
                    .h(101.0)
                    .l(99.0)
                    .c(100.0)
                    .v(*v)
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn volume_trend_positive_when_volume_grows() {
        let vols: Vec<f64> = (0..60).map(|i| 100.0 + 10.0 * i as f64).collect();
        let out = volume_trend(&candles_with_volumes(&vols), 20);
        assert!(*out.last().unwrap() > 0.0);
    }
}
