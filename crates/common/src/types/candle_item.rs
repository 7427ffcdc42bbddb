use serde::{Deserialize, Serialize};

/// 内存中参与计算的K线条目，数值均为 f64
///
/// 持久化层保留定点小数文本，读出后转换为本类型供指标/策略使用
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CandleItem {
    pub(crate) ts: i64,
    pub(crate) o: f64,
    pub(crate) h: f64,
    pub(crate) l: f64,
    pub(crate) c: f64,
    pub(crate) v: f64,
}

impl CandleItem {
    pub fn builder() -> CandleItemBuilder {
        CandleItemBuilder::new()
    }

    pub fn ts(&self) -> i64 {
        self.ts
    }
    pub fn o(&self) -> f64 {
        self.o
    }
    pub fn h(&self) -> f64 {
        self.h
    }
    pub fn l(&self) -> f64 {
        self.l
    }
    pub fn c(&self) -> f64 {
        self.c
    }
    pub fn v(&self) -> f64 {
        self.v
    }

    /// 典型价 (h+l+c)/3
    pub fn typical_price(&self) -> f64 {
        (self.h + self.l + self.c) / 3.0
    }

    pub fn is_bullish(&self) -> bool {
        self.c > self.o
    }

    /// 实体占整根K线的比例，range 为 0 时返回 0
    pub fn body_ratio(&self) -> f64 {
        let range = self.h - self.l;
        if range <= 0.0 {
            return 0.0;
        }
        (self.c - self.o).abs() / range
    }
}

pub struct CandleItemBuilder {
    ts: Option<i64>,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    v: Option<f64>,
}

impl CandleItemBuilder {
    pub fn new() -> Self {
        Self {
            ts: None,
            o: None,
            h: None,
            l: None,
            c: None,
            v: None,
        }
    }

    pub fn ts(mut self, val: i64) -> Self {
        self.ts = Some(val);
        self
    }
    pub fn o(mut self, val: f64) -> Self {
        self.o = Some(val);
        self
    }
    pub fn h(mut self, val: f64) -> Self {
        self.h = Some(val);
        self
    }
    pub fn l(mut self, val: f64) -> Self {
        self.l = Some(val);
        self
    }
    pub fn c(mut self, val: f64) -> Self {
        self.c = Some(val);
        self
    }
    pub fn v(mut self, val: f64) -> Self {
        self.v = Some(val);
        self
    }

    /// 校验 low <= open/close <= high 且 volume >= 0
    pub fn build(self) -> anyhow::Result<CandleItem> {
        if let (Some(ts), Some(o), Some(h), Some(l), Some(c), Some(v)) =
            (self.ts, self.o, self.h, self.l, self.c, self.v)
        {
            if l <= o && l <= c && h >= o && h >= c && h >= l && v >= 0.0 && l >= 0.0 {
                Ok(CandleItem { ts, o, h, l, c, v })
            } else {
                Err(anyhow::anyhow!("CandleItemInvalid"))
            }
        } else {
            Err(anyhow::anyhow!("CandleItemIncomplete"))
        }
    }
}

impl Default for CandleItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_validates_ohlc_bounds() {
        let ok = CandleItem::builder()
            .ts(1_700_000_000_000)
            .o(100.0)
            .h(110.0)
            .l(95.0)
            .c(105.0)
            .v(1000.0)
            .build();
        assert!(ok.is_ok());

        // high < close 非法
        let bad = CandleItem::builder()
            .ts(1_700_000_000_000)
            .o(100.0)
            .h(101.0)
            .l(95.0)
            .c(105.0)
            .v(1000.0)
            .build();
        assert!(bad.is_err());
    }

    #[test]
    fn builder_rejects_negative_volume() {
        let bad = CandleItem::builder()
            .ts(0)
            .o(1.0)
            .h(2.0)
            .l(0.5)
            .c(1.5)
            .v(-1.0)
            .build();
        assert!(bad.is_err());
    }
}
