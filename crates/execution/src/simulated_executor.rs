//! 模拟执行器
//!
//! 在下一根K线开盘价附近成交，滑点模型可配置（固定bp、波动缩放、
//! 规模冲击），同一K线数据与种子下结果逐位一致。
//! 成交路径与实盘共用仓储：NEW -> ACCEPTED -> FILLED 全部留事件。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_domain::{Order, OrderSide, OrderStatus, Position};
use alpha_arena_infrastructure::repositories::{LifecycleInput, OrderRepository, PositionRepository};

use crate::executor::{OrderExecutor, OrderIntent};
use crate::position_math;

/// 滑点模型
#[derive(Debug, Clone)]
pub enum SlippageModel {
    /// 无滑点
    None,
    /// 固定基点
    FixedBps(f64),
    /// 按 ATR 百分比缩放：bps = factor × atr_pct
    VolScaled { factor: f64 },
    /// 规模冲击：bps = impact × quantity
    SizeImpact { impact_bps_per_unit: f64 },
}

impl SlippageModel {
    /// 成交价：买单向上滑，卖单向下滑
    fn apply(&self, price: f64, side: OrderSide, quantity: f64, atr_pct: f64) -> f64 {
        let bps = match self {
            SlippageModel::None => 0.0,
            SlippageModel::FixedBps(bps) => *bps,
            SlippageModel::VolScaled { factor } => factor * atr_pct,
            SlippageModel::SizeImpact { impact_bps_per_unit } => impact_bps_per_unit * quantity,
        };
        let direction = match side {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        };
        price * (1.0 + direction * bps / 10_000.0)
    }
}

pub struct SimulatedExecutor {
    orders: OrderRepository,
    positions: PositionRepository,
    fee_rate: f64,
    slippage: SlippageModel,
    /// 下一次成交的参考价（通常是下一根K线开盘价）
    reference_price: Mutex<f64>,
    /// 当前 ATR 百分比（波动缩放滑点用）
    atr_pct: Mutex<f64>,
    /// 每次提交的成交比例脚本；空时全额成交
    fill_plan: Mutex<VecDeque<f64>>,
}

impl SimulatedExecutor {
    pub fn new(pool: SqlitePool, fee_rate: f64, slippage: SlippageModel) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            positions: PositionRepository::new(pool),
            fee_rate,
            slippage,
            reference_price: Mutex::new(0.0),
            atr_pct: Mutex::new(0.0),
            fill_plan: Mutex::new(VecDeque::new()),
        }
    }

    /// 设置下一次成交的参考价与波动
    pub fn set_reference(&self, price: f64, atr_pct: f64) {
        *self.reference_price.lock().unwrap() = price;
        *self.atr_pct.lock().unwrap() = atr_pct;
    }

    /// 预置后续提交的成交比例（测试部分成交用）
    pub fn plan_fills(&self, fractions: Vec<f64>) {
        *self.fill_plan.lock().unwrap() = fractions.into();
    }

    fn next_fill_fraction(&self) -> f64 {
        self.fill_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(1.0)
            .clamp(0.0, 1.0)
    }
}

#[async_trait]
impl OrderExecutor for SimulatedExecutor {
    async fn submit(&self, intent: &OrderIntent) -> anyhow::Result<Order> {
        let reference = intent
            .price
            .unwrap_or_else(|| *self.reference_price.lock().unwrap());
        if reference <= 0.0 {
            return Err(anyhow::anyhow!("simulated executor has no reference price"));
        }

        let client_order_id = Uuid::new_v4().simple().to_string();
        let amount = Decimal::from_f64(intent.quantity)
            .ok_or_else(|| anyhow::anyhow!("invalid quantity {}", intent.quantity))?;
        let mut order = Order::new(
            client_order_id.clone(),
            intent.symbol.clone(),
            intent.side,
            intent.order_type,
            intent.price.and_then(Decimal::from_f64),
            amount,
            intent.leverage,
            intent.time_in_force,
            now_ms(),
        )?;
        self.orders.insert_new(&mut order).await?;

        // 模拟交易所即时受理
        self.orders
            .append_lifecycle_event(
                order.id,
                OrderStatus::Accepted,
                LifecycleInput {
                    message: "simulated accept".to_string(),
                    ..Default::default()
                },
            )
            .await?;
        self.orders
            .set_exchange_order_id(order.id, &format!("SIM-{}", order.id))
            .await?;

        let fraction = self.next_fill_fraction();
        if fraction <= 0.0 {
            return self
                .orders
                .find_by_client_id(&client_order_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("order vanished"));
        }

        let atr_pct = *self.atr_pct.lock().unwrap();
        let exec_price = self
            .slippage
            .apply(reference, intent.side, intent.quantity, atr_pct);
        let fill_qty = (amount
            * Decimal::from_f64(fraction).unwrap_or(Decimal::ONE))
        .round_dp(8);
        let fill_price = Decimal::from_f64(exec_price)
            .ok_or_else(|| anyhow::anyhow!("invalid exec price"))?
            .round_dp(8);
        let fee = (fill_price * fill_qty * Decimal::from_f64(self.fee_rate).unwrap_or_default())
            .round_dp(8);

        let current = self.positions.get(&intent.symbol).await?;
        let (new_position, realized) = position_math::apply_fill(
            current.as_ref(),
            &intent.symbol,
            intent.side,
            fill_qty,
            fill_price,
            intent.leverage,
            now_ms(),
        );

        let updated = self
            .orders
            .apply_fill(
                order.id,
                fill_qty,
                fill_price,
                Some(fee),
                Some("USDT".to_string()),
                realized,
                &new_position,
                None,
            )
            .await?;
        info!(
            "simulated fill {} {} {}@{} -> {}",
            intent.symbol,
            intent.side,
            fill_qty,
            fill_price,
            updated.status
        );
        Ok(updated)
    }

    async fn cancel(&self, client_order_id: &str) -> anyhow::Result<bool> {
        let order = match self.orders.find_by_client_id(client_order_id).await? {
            Some(order) => order,
            None => return Ok(false),
        };
        if order.status.is_terminal() {
            return Ok(false);
        }
        self.orders
            .append_lifecycle_event(
                order.id,
                OrderStatus::Canceled,
                LifecycleInput {
                    message: "simulated cancel".to_string(),
                    ..Default::default()
                },
            )
            .await?;
        Ok(true)
    }

    async fn get_order(&self, client_order_id: &str) -> anyhow::Result<Option<Order>> {
        self.orders.find_by_client_id(client_order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;
    use alpha_arena_domain::{OrderType, TimeInForce};

    fn intent(side: OrderSide, qty: f64) -> OrderIntent {
        OrderIntent {
            symbol: "BTC-USDT-SWAP".to_string(),
            side,
            order_type: OrderType::Market,
            quantity: qty,
            price: None,
            leverage: Some(2.0),
            confidence: Some(0.8),
            time_in_force: TimeInForce::Gtc,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn market_buy_partial_fill_then_cancel() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let executor = SimulatedExecutor::new(pool.clone(), 0.0005, SlippageModel::None);
        executor.set_reference(50_000.0, 0.0);
        executor.plan_fills(vec![0.3]);

        let order = executor.submit(&intent(OrderSide::Buy, 1.0)).await.unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_amount, "0.3".parse().unwrap());

        assert!(executor.cancel(&order.client_order_id).await.unwrap());
        let after = executor
            .get_order(&order.client_order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, OrderStatus::Canceled);

        // 恰好4条事件：NEW, ACCEPTED, PARTIALLY_FILLED, CANCELED
        let repo = OrderRepository::new(pool.clone());
        let events = repo.lifecycle_events(order.id).await.unwrap();
        assert_eq!(events.len(), 4);

        // 仓位反映 0.3，成交合计 0.3
        let positions = PositionRepository::new(pool);
        let position = positions.get("BTC-USDT-SWAP").await.unwrap().unwrap();
        assert_eq!(position.size, "0.3".parse().unwrap());
    }

    #[tokio::test]
    async fn fixed_slippage_moves_fill_price_against_taker() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let executor = SimulatedExecutor::new(pool.clone(), 0.0, SlippageModel::FixedBps(10.0));
        executor.set_reference(50_000.0, 0.0);

        let order = executor.submit(&intent(OrderSide::Buy, 0.5)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        // 10bp 买入滑点 -> 成交在 50050
        let repo = OrderRepository::new(pool);
        let events = repo.lifecycle_events(order.id).await.unwrap();
        let fill = events
            .iter()
            .find(|e| e.fill_price.is_some())
            .expect("fill event present");
        assert_eq!(fill.fill_price.unwrap(), "50050".parse().unwrap());
    }
}
