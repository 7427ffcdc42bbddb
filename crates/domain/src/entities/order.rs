//! 订单实体与生命周期事件
//!
//! 生命周期事件是订单历史的唯一事实来源，只允许追加

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{OrderSide, OrderStatus, OrderType, TimeInForce};

/// 非法状态迁移
#[derive(Debug, Error)]
#[error("invalid order transition: {from} -> {to} (order {client_order_id})")]
pub struct TransitionError {
    pub client_order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// 订单实体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 数据库行ID，未持久化时为 0
    pub id: i64,
    /// 客户端生成的幂等ID，提交前必须先落库
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled_amount: Decimal,
    pub leverage: Option<f64>,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn new(
        client_order_id: String,
        symbol: String,
        side: OrderSide,
        order_type: OrderType,
        price: Option<Decimal>,
        amount: Decimal,
        leverage: Option<f64>,
        time_in_force: TimeInForce,
        now_ms: i64,
    ) -> anyhow::Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(anyhow::anyhow!("order amount must be positive"));
        }
        if order_type == OrderType::Limit && price.is_none() {
            return Err(anyhow::anyhow!("limit order requires a price"));
        }
        Ok(Self {
            id: 0,
            client_order_id,
            exchange_order_id: None,
            symbol,
            side,
            order_type,
            price,
            amount,
            filled_amount: Decimal::ZERO,
            leverage,
            status: OrderStatus::New,
            time_in_force,
            created_at: now_ms,
            updated_at: now_ms,
        })
    }

    /// 应用状态迁移，非法迁移返回 [`TransitionError`]
    pub fn transition(&mut self, next: OrderStatus, now_ms: i64) -> Result<(), TransitionError> {
        if !self.status.can_transition(next) {
            return Err(TransitionError {
                client_order_id: self.client_order_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now_ms;
        Ok(())
    }

    /// 记录一笔成交并推导状态迁移目标
    pub fn fill_target_status(&self, fill_qty: Decimal) -> OrderStatus {
        if self.filled_amount + fill_qty >= self.amount {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        }
    }

    pub fn remaining(&self) -> Decimal {
        (self.amount - self.filled_amount).max(Decimal::ZERO)
    }

    /// 名义价值 = price × amount
    pub fn notional(&self) -> Option<f64> {
        let price = self.price?.to_f64()?;
        let amount = self.amount.to_f64()?;
        Some(price * amount)
    }
}

/// 订单生命周期事件（append-only）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLifecycleEvent {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub ts: i64,
    pub exchange_status: Option<String>,
    pub fill_qty: Option<Decimal>,
    pub fill_price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub message: String,
    pub raw_payload: Option<String>,
}

/// 成交记录，sum(trades.amount) <= order.amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub order_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub fee_currency: Option<String>,
    pub realized_pnl: Option<Decimal>,
    pub ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(amount: &str) -> Order {
        Order::new(
            "cid-1".to_string(),
            "BTC-USDT-SWAP".to_string(),
            OrderSide::Buy,
            OrderType::Market,
            None,
            amount.parse().unwrap(),
            Some(2.0),
            TimeInForce::Gtc,
            1_700_000_000_000,
        )
        .unwrap()
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut o = order("1.0");
        o.transition(OrderStatus::Accepted, 1).unwrap();
        o.transition(OrderStatus::PartiallyFilled, 2).unwrap();
        o.transition(OrderStatus::Filled, 3).unwrap();
        assert!(o.status.is_terminal());
    }

    #[test]
    fn terminal_rejects_further_transitions() {
        let mut o = order("1.0");
        o.transition(OrderStatus::Accepted, 1).unwrap();
        o.transition(OrderStatus::Canceled, 2).unwrap();
        let err = o.transition(OrderStatus::Filled, 3).unwrap_err();
        assert_eq!(err.from, OrderStatus::Canceled);
    }

    #[test]
    fn fill_target_depends_on_quantity() {
        let mut o = order("1.0");
        assert_eq!(o.fill_target_status("0.3".parse().unwrap()), OrderStatus::PartiallyFilled);
        o.filled_amount = "0.7".parse().unwrap();
        assert_eq!(o.fill_target_status("0.3".parse().unwrap()), OrderStatus::Filled);
    }

    #[test]
    fn limit_order_requires_price() {
        let err = Order::new(
            "cid-2".to_string(),
            "BTC-USDT-SWAP".to_string(),
            OrderSide::Sell,
            OrderType::Limit,
            None,
            "1".parse().unwrap(),
            None,
            TimeInForce::Gtc,
            0,
        );
        assert!(err.is_err());
    }
}
