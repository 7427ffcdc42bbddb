//! 持仓与余额

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::PositionSide;

/// 当前持仓，net 模式下每个 symbol 至多一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: Option<f64>,
    pub unrealized_pnl: Option<Decimal>,
    pub margin: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
    pub updated_at: i64,
}

impl Position {
    pub fn flat(symbol: &str, now_ms: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: PositionSide::Flat,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            leverage: None,
            unrealized_pnl: None,
            margin: None,
            liquidation_price: None,
            updated_at: now_ms,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat || self.size == Decimal::ZERO
    }

    /// 带符号的持仓数量，空头为负
    pub fn signed_size(&self) -> f64 {
        self.size.to_f64().unwrap_or(0.0) * self.side.sign()
    }

    /// 按给定标记价计算名义价值（带符号）
    pub fn signed_notional(&self, mark: f64) -> f64 {
        self.signed_size() * mark
    }
}

/// 单币种余额，(currency, ts) 唯一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub ts: i64,
    pub total: Decimal,
    pub free: Option<Decimal>,
    pub used: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_size_respects_side() {
        let mut pos = Position::flat("BTC-USDT-SWAP", 0);
        pos.side = PositionSide::Short;
        pos.size = "0.5".parse().unwrap();
        assert_eq!(pos.signed_size(), -0.5);
        assert_eq!(pos.signed_notional(40_000.0), -20_000.0);
    }
}
