//! 订单同步循环
//!
//! 拉取本地未完结订单在交易所的真实状态，回放派生事件：
//! 成交追补带交易所权威数据；交易所侧的人工撤单无条件补一条
//! 带 source=reconciliation 标注的 CANCELED 事件。
//! 崩溃后重启的收敛也走这里：client_order_id 去歧义。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{info, warn};

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_domain::{Exchange, ExchangeError, Order, OrderStatus, VenueOrderState};
use alpha_arena_infrastructure::repositories::{
    LifecycleInput, OrderRepository, PositionRepository,
};

use crate::executor::OrderLocks;
use crate::position_math;

pub struct OrderSync {
    exchange: Arc<dyn Exchange>,
    orders: OrderRepository,
    positions: PositionRepository,
    locks: OrderLocks,
    /// 本地缺 exchange_order_id 的容忍时间（毫秒）
    grace_ms: i64,
    running: AtomicBool,
}

impl OrderSync {
    pub fn new(
        pool: SqlitePool,
        exchange: Arc<dyn Exchange>,
        locks: OrderLocks,
        grace_s: i64,
    ) -> Self {
        Self {
            exchange,
            orders: OrderRepository::new(pool.clone()),
            positions: PositionRepository::new(pool),
            locks,
            grace_ms: grace_s * 1000,
            running: AtomicBool::new(false),
        }
    }

    /// 同步一轮；上一轮未结束时跳过
    pub async fn run_once(&self, symbol: &str) -> anyhow::Result<bool> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("order sync still running, tick skipped");
            return Ok(false);
        }
        let result = self.sync(symbol).await;
        self.running.store(false, Ordering::Release);
        result.map(|_| true)
    }

    async fn sync(&self, symbol: &str) -> anyhow::Result<()> {
        let open_orders = self.orders.list_open(symbol).await?;
        for order in open_orders {
            // 与执行器共享同一把订单锁，保证事件串行
            let lock = self.locks.lock_for(&order.client_order_id);
            let _guard = lock.lock().await;

            if let Err(err) = self.reconcile_order(&order).await {
                warn!("reconcile {} failed: {}", order.client_order_id, err);
            }
        }
        Ok(())
    }

    async fn reconcile_order(&self, order: &Order) -> anyhow::Result<()> {
        let state = match self
            .exchange
            .fetch_order(
                &order.symbol,
                order.exchange_order_id.as_deref(),
                Some(&order.client_order_id),
            )
            .await
        {
            Ok(state) => state,
            Err(ExchangeError::Permanent(_)) => {
                // 交易所不认识这笔订单：提交从未到达
                if order.exchange_order_id.is_none()
                    && now_ms() - order.created_at > self.grace_ms
                {
                    info!(
                        "order {} never reached venue, expiring",
                        order.client_order_id
                    );
                    self.orders
                        .append_lifecycle_event(
                            order.id,
                            OrderStatus::Expired,
                            LifecycleInput {
                                message: "not found at venue after grace period".to_string(),
                                raw_payload: Some(
                                    serde_json::json!({"source": "reconciliation"}).to_string(),
                                ),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                return Ok(());
            }
            Err(err) => {
                warn!("fetch_order failed for {}: {}", order.client_order_id, err);
                return Ok(());
            }
        };

        // 本地还没记录 exchange_order_id（崩溃恢复路径）
        if order.exchange_order_id.is_none() {
            if let Some(exchange_order_id) = &state.exchange_order_id {
                self.orders
                    .set_exchange_order_id(order.id, exchange_order_id)
                    .await?;
                // NEW 卡住的订单补 ACCEPTED
                if order.status == OrderStatus::New {
                    self.orders
                        .append_lifecycle_event(
                            order.id,
                            OrderStatus::Accepted,
                            LifecycleInput {
                                exchange_status: Some(state.status.clone()),
                                message: "adopted from venue by reconciliation".to_string(),
                                raw_payload: Some(reconciliation_payload(&state)),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
        }

        // 成交追补（交易所权威数据）
        let current = self
            .orders
            .find_by_client_id(&order.client_order_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("order {} missing", order.client_order_id))?;
        let venue_filled = Decimal::from_f64(state.filled).unwrap_or(Decimal::ZERO);
        if venue_filled > current.filled_amount {
            let fill_qty = venue_filled - current.filled_amount;
            let fill_price = state
                .avg_price
                .and_then(Decimal::from_f64)
                .or(current.price)
                .unwrap_or(Decimal::ZERO);
            let snapshot = self.positions.get(&current.symbol).await?;
            let (new_position, realized) = position_math::apply_fill(
                snapshot.as_ref(),
                &current.symbol,
                current.side,
                fill_qty,
                fill_price,
                current.leverage,
                now_ms(),
            );
            self.orders
                .apply_fill(
                    current.id,
                    fill_qty,
                    fill_price,
                    state.fee.and_then(Decimal::from_f64),
                    state.fee_currency.clone(),
                    realized,
                    &new_position,
                    Some(reconciliation_payload(&state)),
                )
                .await?;
        }

        // 终态追补：交易所侧撤单/拒单无条件补事件
        let current = self
            .orders
            .find_by_client_id(&order.client_order_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("order {} missing", order.client_order_id))?;
        if current.status.is_terminal() {
            self.locks.release(&current.client_order_id);
            return Ok(());
        }
        if let Ok(venue_status) = state.status.parse::<OrderStatus>() {
            if venue_status.is_terminal() && venue_status != OrderStatus::Filled {
                self.orders
                    .append_lifecycle_event(
                        current.id,
                        venue_status,
                        LifecycleInput {
                            exchange_status: Some(state.status.clone()),
                            message: "venue-side terminal state discovered".to_string(),
                            raw_payload: Some(reconciliation_payload(&state)),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.locks.release(&current.client_order_id);
            }
        }
        Ok(())
    }
}

/// 对账补录事件的载荷，统一标注来源
fn reconciliation_payload(state: &VenueOrderState) -> String {
    serde_json::json!({
        "source": "reconciliation",
        "venue": state.raw,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;
    use alpha_arena_domain::{OrderSide, OrderType, TimeInForce};
    use alpha_arena_infrastructure::SimulatedExchange;

    async fn setup() -> (SqlitePool, Arc<SimulatedExchange>, OrderSync, OrderRepository) {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let exchange = Arc::new(SimulatedExchange::new(false));
        exchange.set_fill_price(50_000.0);
        let sync = OrderSync::new(pool.clone(), exchange.clone(), OrderLocks::new(), 60);
        let orders = OrderRepository::new(pool.clone());
        (pool, exchange, sync, orders)
    }

    async fn seed_order(
        orders: &OrderRepository,
        exchange: &SimulatedExchange,
        cid: &str,
        qty: &str,
    ) -> Order {
        // 先在交易所创建（模拟此前的提交），再本地入库
        let request = alpha_arena_domain::VenueOrderRequest {
            symbol: "BTC-USDT-SWAP".to_string(),
            client_order_id: cid.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: qty.parse().unwrap(),
            price: None,
            td_mode: "cross".to_string(),
            pos_side: None,
            reduce_only: false,
        };
        let ack = exchange.submit_order(&request).await.unwrap();

        let mut order = Order::new(
            cid.to_string(),
            "BTC-USDT-SWAP".to_string(),
            OrderSide::Buy,
            OrderType::Market,
            None,
            qty.parse().unwrap(),
            None,
            TimeInForce::Gtc,
            now_ms(),
        )
        .unwrap();
        orders.insert_new(&mut order).await.unwrap();
        orders
            .set_exchange_order_id(order.id, &ack.exchange_order_id)
            .await.unwrap();
        orders
            .append_lifecycle_event(order.id, OrderStatus::Accepted, LifecycleInput::default())
            .await
            .unwrap();
        orders.find_by_client_id(cid).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn venue_fill_is_caught_up() {
        let (_pool, exchange, sync, orders) = setup().await;
        let order = seed_order(&orders, &exchange, "cid-fill", "1.0").await;
        // 交易所侧已全部成交
        exchange.force_order_status("cid-fill", "FILLED", 1.0);
        exchange.script_order_states(
            "cid-fill",
            vec![VenueOrderState {
                exchange_order_id: order.exchange_order_id.clone(),
                client_order_id: Some("cid-fill".to_string()),
                status: "FILLED".to_string(),
                filled: 1.0,
                amount: 1.0,
                avg_price: Some(50_100.0),
                fee: Some(2.5),
                fee_currency: Some("USDT".to_string()),
                ts: now_ms(),
                raw: serde_json::json!({"ordId": "x"}),
            }],
        );

        sync.run_once("BTC-USDT-SWAP").await.unwrap();
        let updated = orders.find_by_client_id("cid-fill").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Filled);
        assert_eq!(updated.filled_amount, "1".parse().unwrap());
    }

    #[tokio::test]
    async fn venue_manual_cancel_backfills_event_with_source() {
        let (_pool, exchange, sync, orders) = setup().await;
        let order = seed_order(&orders, &exchange, "cid-cancel", "1.0").await;
        // 交易所侧人工撤单
        exchange.force_order_status("cid-cancel", "CANCELED", 0.0);

        sync.run_once("BTC-USDT-SWAP").await.unwrap();
        let updated = orders.find_by_client_id("cid-cancel").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Canceled);

        let events = orders.lifecycle_events(order.id).await.unwrap();
        let cancel_event = events
            .iter()
            .find(|e| e.status == OrderStatus::Canceled)
            .expect("synthetic cancel event");
        let payload = cancel_event.raw_payload.as_ref().unwrap();
        assert!(payload.contains("\"source\":\"reconciliation\""));
    }

    #[tokio::test]
    async fn crash_recovery_converges_pending_orders() {
        let (_pool, exchange, sync, orders) = setup().await;
        // 三笔悬置订单：ACCEPTED、PARTIALLY_FILLED、NEW（从未到达交易所）
        let accepted = seed_order(&orders, &exchange, "cid-a", "1.0").await;
        let partial = seed_order(&orders, &exchange, "cid-b", "1.0").await;
        exchange.force_order_status("cid-b", "PARTIALLY_FILLED", 0.4);

        let mut never_sent = Order::new(
            "cid-c".to_string(),
            "BTC-USDT-SWAP".to_string(),
            OrderSide::Buy,
            OrderType::Market,
            None,
            "1".parse().unwrap(),
            None,
            TimeInForce::Gtc,
            now_ms() - 120_000, // 已超过 grace
        )
        .unwrap();
        orders.insert_new(&mut never_sent).await.unwrap();

        sync.run_once("BTC-USDT-SWAP").await.unwrap();

        let a = orders.find_by_client_id("cid-a").await.unwrap().unwrap();
        assert_eq!(a.status, OrderStatus::Accepted);
        assert_eq!(a.id, accepted.id);

        let b = orders.find_by_client_id("cid-b").await.unwrap().unwrap();
        assert_eq!(b.status, OrderStatus::PartiallyFilled);
        assert_eq!(b.filled_amount, "0.4".parse().unwrap());
        assert_eq!(b.id, partial.id);

        // 从未到达交易所的订单过期收口
        let c = orders.find_by_client_id("cid-c").await.unwrap().unwrap();
        assert_eq!(c.status, OrderStatus::Expired);

        // 交易所侧没有多出第二笔订单
        assert_eq!(exchange.submitted_order_count(), 2);
    }
}
