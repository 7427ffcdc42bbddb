//! net 模式持仓演算
//!
//! 成交按带符号数量合并进当前持仓；越过零点时先平后反手，
//! 平掉部分产生已实现盈亏。

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use alpha_arena_domain::{OrderSide, Position, PositionSide};

/// 应用一笔成交，返回新持仓与本笔的已实现盈亏
pub fn apply_fill(
    current: Option<&Position>,
    symbol: &str,
    side: OrderSide,
    fill_qty: Decimal,
    fill_price: Decimal,
    leverage: Option<f64>,
    now_ms: i64,
) -> (Position, Option<Decimal>) {
    let signed_cur = current
        .map(|p| match p.side {
            PositionSide::Long => p.size,
            PositionSide::Short => -p.size,
            PositionSide::Flat => Decimal::ZERO,
        })
        .unwrap_or(Decimal::ZERO);
    let entry = current.map(|p| p.entry_price).unwrap_or(Decimal::ZERO);

    let delta = match side {
        OrderSide::Buy => fill_qty,
        OrderSide::Sell => -fill_qty,
    };
    let signed_new = signed_cur + delta;

    // 同向加仓 / 开仓：加权平均入场价
    let same_direction = signed_cur.is_zero()
        || (signed_cur > Decimal::ZERO) == (signed_new > Decimal::ZERO) && !signed_new.is_zero()
            && signed_new.abs() > signed_cur.abs();

    let mut realized: Option<Decimal> = None;
    let (new_side, new_size, new_entry) = if signed_new.is_zero() {
        // 完全平仓
        let closed = signed_cur.abs();
        realized = Some(realized_pnl(signed_cur, closed, entry, fill_price));
        (PositionSide::Flat, Decimal::ZERO, Decimal::ZERO)
    } else if same_direction {
        let total = signed_new.abs();
        let prev = signed_cur.abs();
        let added = fill_qty;
        let avg_entry = if prev.is_zero() {
            fill_price
        } else {
            (entry * prev + fill_price * added) / total
        };
        (side_of(signed_new), total, avg_entry)
    } else if signed_cur.signum() == signed_new.signum() {
        // 同向减仓
        let closed = fill_qty;
        realized = Some(realized_pnl(signed_cur, closed, entry, fill_price));
        (side_of(signed_new), signed_new.abs(), entry)
    } else {
        // 越过零点：平掉旧仓，剩余部分按成交价开新仓
        let closed = signed_cur.abs();
        realized = Some(realized_pnl(signed_cur, closed, entry, fill_price));
        (side_of(signed_new), signed_new.abs(), fill_price)
    };

    let position = Position {
        symbol: symbol.to_string(),
        side: new_side,
        size: new_size,
        entry_price: new_entry,
        leverage,
        unrealized_pnl: None,
        margin: None,
        liquidation_price: None,
        updated_at: now_ms,
    };
    (position, realized)
}

fn side_of(signed: Decimal) -> PositionSide {
    if signed > Decimal::ZERO {
        PositionSide::Long
    } else if signed < Decimal::ZERO {
        PositionSide::Short
    } else {
        PositionSide::Flat
    }
}

/// 平仓部分的已实现盈亏：多头 (exit-entry)×qty，空头取反
fn realized_pnl(signed_cur: Decimal, closed_qty: Decimal, entry: Decimal, exit: Decimal) -> Decimal {
    if signed_cur > Decimal::ZERO {
        (exit - entry) * closed_qty
    } else {
        (entry - exit) * closed_qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn open_long_from_flat() {
        let (pos, realized) = apply_fill(
            None,
            "BTC-USDT-SWAP",
            OrderSide::Buy,
            dec("0.5"),
            dec("50000"),
            Some(2.0),
            0,
        );
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.size, dec("0.5"));
        assert_eq!(pos.entry_price, dec("50000"));
        assert!(realized.is_none());
    }

    #[test]
    fn add_to_long_averages_entry() {
        let (first, _) = apply_fill(None, "S", OrderSide::Buy, dec("1"), dec("100"), None, 0);
        let (second, realized) =
            apply_fill(Some(&first), "S", OrderSide::Buy, dec("1"), dec("110"), None, 0);
        assert_eq!(second.size, dec("2"));
        assert_eq!(second.entry_price, dec("105"));
        assert!(realized.is_none());
    }

    #[test]
    fn partial_close_realizes_pnl() {
        let (pos, _) = apply_fill(None, "S", OrderSide::Buy, dec("1"), dec("100"), None, 0);
        let (after, realized) =
            apply_fill(Some(&pos), "S", OrderSide::Sell, dec("0.4"), dec("110"), None, 0);
        assert_eq!(after.side, PositionSide::Long);
        assert_eq!(after.size, dec("0.6"));
        assert_eq!(after.entry_price, dec("100"));
        assert_eq!(realized.unwrap(), dec("4.0"));
    }

    #[test]
    fn full_close_flattens() {
        let (pos, _) = apply_fill(None, "S", OrderSide::Sell, dec("2"), dec("100"), None, 0);
        let (after, realized) =
            apply_fill(Some(&pos), "S", OrderSide::Buy, dec("2"), dec("90"), None, 0);
        assert!(after.is_flat());
        // 空头下跌获利
        assert_eq!(realized.unwrap(), dec("20"));
    }

    #[test]
    fn crossing_zero_reverses_position() {
        let (pos, _) = apply_fill(None, "S", OrderSide::Buy, dec("1"), dec("100"), None, 0);
        let (after, realized) =
            apply_fill(Some(&pos), "S", OrderSide::Sell, dec("1.5"), dec("120"), None, 0);
        assert_eq!(after.side, PositionSide::Short);
        assert_eq!(after.size, dec("0.5"));
        assert_eq!(after.entry_price, dec("120"));
        assert_eq!(realized.unwrap(), dec("20"));
    }
}
