//! 市场状态分类器
//!
//! 每个决策周期输出且仅输出一个状态标签，附带 (adx, bb_width, atr_pct)。
//! 判定按固定顺序收敛：TREND -> RANGE -> BREAKOUT -> HIGH_VOL -> UNDEFINED。

use alpha_arena_common::CandleItem;
use alpha_arena_domain::Regime;
use alpha_arena_indicators::{adx, atr_percentile, bollinger, ema, volume_sma};

/// 分类阈值（按周期参数化，由配置注入）
#[derive(Debug, Clone)]
pub struct RegimeThresholds {
    pub adx_trend: f64,
    pub adx_range: f64,
    pub bb_width: f64,
    /// ATR 百分位高于此值直接判高波动
    pub vol_kill: f64,
    /// EMA55 五根K线的相对斜率阈值
    pub ema_slope: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            adx_trend: 20.0,
            adx_range: 18.0,
            bb_width: 0.04,
            vol_kill: 85.0,
            ema_slope: 0.004,
        }
    }
}

/// 分类结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeReading {
    pub regime: Regime,
    pub adx: f64,
    pub bb_width: f64,
    pub atr_pct: f64,
}

impl RegimeReading {
    fn undefined() -> Self {
        Self {
            regime: Regime::Undefined,
            adx: 0.0,
            bb_width: 0.0,
            atr_pct: 0.0,
        }
    }
}

pub struct RegimeClassifier {
    thresholds: RegimeThresholds,
}

impl RegimeClassifier {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self { thresholds }
    }

    /// 对快照末端分类；数据不足输出 UNDEFINED
    pub fn classify(&self, candles: &[CandleItem]) -> RegimeReading {
        // ADX(14) 两次平滑 + BB(20) + ATR 百分位都需要预热
        if candles.len() < 60 {
            return RegimeReading::undefined();
        }
        let closes: Vec<f64> = candles.iter().map(|c| c.c()).collect();
        let last_idx = candles.len() - 1;

        let adx_series = adx(candles, 14);
        let bands = bollinger(&closes, 20, 2.0);
        let atr_pct_series = atr_percentile(candles, 14, 100);
        let ema55 = ema(&closes, 55);

        let adx_val = adx_series[last_idx];
        let width = bands.width[last_idx];
        let atr_pct = atr_pct_series[last_idx];
        if adx_val.is_nan() || width.is_nan() {
            return RegimeReading::undefined();
        }
        let atr_pct = if atr_pct.is_nan() { 0.0 } else { atr_pct };

        let reading = |regime| RegimeReading {
            regime,
            adx: adx_val,
            bb_width: width,
            atr_pct,
        };

        // 1) TREND：ADX 高，且带宽在走阔或 EMA55 斜率显著
        let width_rising = {
            let prev = bands.width[last_idx.saturating_sub(5)];
            !prev.is_nan() && width > prev
        };
        let ema_slope_strong = {
            let now = ema55[last_idx];
            let prev = ema55[last_idx.saturating_sub(5)];
            prev != 0.0 && ((now - prev) / prev).abs() > self.thresholds.ema_slope
        };
        if adx_val > self.thresholds.adx_trend && (width_rising || ema_slope_strong) {
            return reading(Regime::Trend);
        }

        // 2) RANGE：ADX 低且带宽收窄
        if adx_val < self.thresholds.adx_range && width < self.thresholds.bb_width {
            return reading(Regime::Range);
        }

        // 3) BREAKOUT：带宽处于低分位 + 突破关键位 + 放量
        if self.is_breakout(candles, &bands.width, last_idx) {
            return reading(Regime::Breakout);
        }

        // 4) HIGH_VOL：ATR 百分位超限
        if atr_pct > self.thresholds.vol_kill {
            return reading(Regime::HighVol);
        }

        reading(Regime::Undefined)
    }

    fn is_breakout(&self, candles: &[CandleItem], widths: &[f64], last_idx: usize) -> bool {
        const QUANTILE_WINDOW: usize = 100;
        const LEVEL_LOOKBACK: usize = 20;
        if last_idx < LEVEL_LOOKBACK + 1 {
            return false;
        }

        // 带宽低分位看突破前一根：突破K线本身会瞬间撑大带宽
        let squeeze_idx = last_idx - 1;
        let start = squeeze_idx.saturating_sub(QUANTILE_WINDOW);
        let window: Vec<f64> = widths[start..=squeeze_idx]
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        if window.len() < 20 {
            return false;
        }
        let current = widths[squeeze_idx];
        if current.is_nan() {
            return false;
        }
        // 严格小于：窗口内带宽全相等时当前值位于最低分位
        let rank = window.iter().filter(|v| **v < current).count() as f64 / window.len() as f64;
        if rank > 0.25 {
            return false;
        }

        // 突破关键位：收盘越过前 N 根的高/低点
        let level_window = &candles[last_idx - LEVEL_LOOKBACK..last_idx];
        let resistance = level_window.iter().map(|c| c.h()).fold(f64::MIN, f64::max);
        let support = level_window.iter().map(|c| c.l()).fold(f64::MAX, f64::min);
        let close = candles[last_idx].c();
        let broke_level = close > resistance * 1.005 || close < support * 0.995;
        if !broke_level {
            return false;
        }

        // 放量确认
        let vol_ma = volume_sma(candles, 20);
        let vol = candles[last_idx].v();
        !vol_ma[last_idx].is_nan() && vol > vol_ma[last_idx] * 1.5
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(RegimeThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> CandleItem {
        CandleItem::builder()
            .ts(ts)
            .o(o)
            .h(h)
            .l(l)
            .c(c)
            .v(v)
            .build()
            .unwrap()
    }

    fn trending_series(n: usize) -> Vec<CandleItem> {
        (0..n)
            .map(|i| {
                let base = 100.0 + 2.0 * i as f64;
                candle(i as i64 * 3_600_000, base, base + 2.5, base - 0.5, base + 2.0, 100.0)
            })
            .collect()
    }

    fn flat_series(n: usize) -> Vec<CandleItem> {
        (0..n)
            .map(|i| {
                // 幅度极小的横盘
                let wiggle = if i % 2 == 0 { 0.05 } else { -0.05 };
                let base = 100.0 + wiggle;
                candle(i as i64 * 3_600_000, base, base + 0.1, base - 0.1, base, 100.0)
            })
            .collect()
    }

    #[test]
    fn short_history_is_undefined() {
        let classifier = RegimeClassifier::default();
        let reading = classifier.classify(&trending_series(30));
        assert_eq!(reading.regime, Regime::Undefined);
    }

    #[test]
    fn steady_trend_is_trend() {
        let classifier = RegimeClassifier::default();
        let reading = classifier.classify(&trending_series(150));
        assert_eq!(reading.regime, Regime::Trend);
        assert!(reading.adx > 20.0);
    }

    #[test]
    fn quiet_market_is_range() {
        let classifier = RegimeClassifier::default();
        let reading = classifier.classify(&flat_series(150));
        assert_eq!(reading.regime, Regime::Range);
        assert!(reading.bb_width < 0.04);
    }
}
