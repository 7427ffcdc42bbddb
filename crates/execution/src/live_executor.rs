//! 实盘执行器
//!
//! 幂等提交：client_order_id 先落库再发网络请求，重试与崩溃恢复
//! 都以它去重。杀开关打开时订单只记录不路由。
//! 每笔订单的状态推进持有对应的键锁，与对账循环互斥。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use alpha_arena_common::utils::time::{now_ms, now_s};
use alpha_arena_domain::{
    Exchange, Order, OrderStatus, RiskEvent, RiskLevel, VenueOrderRequest, VenueOrderState,
};
use alpha_arena_infrastructure::repositories::{
    LifecycleInput, OrderRepository, PositionRepository, RiskEventRepository,
};
use alpha_arena_infrastructure::{retry_with_backoff, BackoffPolicy};

use crate::executor::{OrderExecutor, OrderIntent, OrderLocks};
use crate::position_math;

/// 实盘执行配置
#[derive(Debug, Clone)]
pub struct LiveExecutorConfig {
    pub td_mode: String,
    /// long_short 模式下需要 posSide
    pub pos_mode: String,
    pub wait_fill: bool,
    pub fill_timeout_s: f64,
    pub fill_interval_s: f64,
    pub max_submit_retries: u32,
}

impl Default for LiveExecutorConfig {
    fn default() -> Self {
        Self {
            td_mode: "cross".to_string(),
            pos_mode: "net".to_string(),
            wait_fill: true,
            fill_timeout_s: 8.0,
            fill_interval_s: 1.0,
            max_submit_retries: 3,
        }
    }
}

pub struct LiveExecutor {
    exchange: Arc<dyn Exchange>,
    orders: OrderRepository,
    positions: PositionRepository,
    risk_events: RiskEventRepository,
    locks: OrderLocks,
    config: LiveExecutorConfig,
    /// 杀开关，每次提交原子读取
    trading_enabled: Arc<AtomicBool>,
}

impl LiveExecutor {
    pub fn new(
        pool: SqlitePool,
        exchange: Arc<dyn Exchange>,
        locks: OrderLocks,
        config: LiveExecutorConfig,
        trading_enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            exchange,
            orders: OrderRepository::new(pool.clone()),
            positions: PositionRepository::new(pool.clone()),
            risk_events: RiskEventRepository::new(pool),
            locks,
            config,
            trading_enabled,
        }
    }

    fn pos_side(&self, intent: &OrderIntent) -> Option<String> {
        let mode = self.config.pos_mode.trim().to_lowercase();
        if matches!(mode.as_str(), "long_short" | "hedge" | "longshort") {
            Some(match intent.side {
                alpha_arena_domain::OrderSide::Buy => "long".to_string(),
                alpha_arena_domain::OrderSide::Sell => "short".to_string(),
            })
        } else {
            None
        }
    }

    /// 应用一次交易所侧的订单状态（带锁调用）
    async fn apply_venue_state(&self, order: &Order, state: &VenueOrderState) -> anyhow::Result<Order> {
        let mut current = self
            .orders
            .find_by_client_id(&order.client_order_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("order {} missing", order.client_order_id))?;

        // 成交追补
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
            current = self
                .orders
                .apply_fill(
                    current.id,
                    fill_qty,
                    fill_price,
                    state.fee.and_then(Decimal::from_f64),
                    state.fee_currency.clone(),
                    realized,
                    &new_position,
                    Some(state.raw.to_string()),
                )
                .await?;
        }

        // 终态追补
        let venue_status: Option<OrderStatus> = state.status.parse().ok();
        if let Some(status) = venue_status {
            if status.is_terminal() && status != OrderStatus::Filled && !current.status.is_terminal()
            {
                current = self
                    .orders
                    .append_lifecycle_event(
                        current.id,
                        status,
                        LifecycleInput {
                            exchange_status: Some(state.status.clone()),
                            message: "venue terminal state".to_string(),
                            raw_payload: Some(state.raw.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
        Ok(current)
    }

    /// 轮询等待成交，超时后按 TIF 处理剩余数量
    async fn wait_for_fill(&self, order: Order) -> anyhow::Result<Order> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs_f64(self.config.fill_timeout_s);
        let mut current = order;

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_secs_f64(self.config.fill_interval_s)).await;
            let state = match self
                .exchange
                .fetch_order(
                    &current.symbol,
                    current.exchange_order_id.as_deref(),
                    Some(&current.client_order_id),
                )
                .await
            {
                Ok(state) => state,
                Err(err) => {
                    warn!("fetch_order during wait_fill failed: {}", err);
                    continue;
                }
            };
            current = self.apply_venue_state(&current, &state).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }
        }

        // 超时：IOC 撤掉剩余，GTC 留在场内
        if current.time_in_force == alpha_arena_domain::TimeInForce::Ioc
            && !current.status.is_terminal()
        {
            info!("fill timeout, canceling IOC remainder of {}", current.client_order_id);
            if let Some(exchange_order_id) = current.exchange_order_id.clone() {
                if let Err(err) = self
                    .exchange
                    .cancel_order(&current.symbol, &exchange_order_id)
                    .await
                {
                    warn!("cancel after timeout failed: {}", err);
                }
            }
            current = self
                .orders
                .append_lifecycle_event(
                    current.id,
                    OrderStatus::Canceled,
                    LifecycleInput {
                        message: "fill timeout, IOC remainder canceled".to_string(),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(current)
    }
}

#[async_trait]
impl OrderExecutor for LiveExecutor {
    async fn submit(&self, intent: &OrderIntent) -> anyhow::Result<Order> {
        let client_order_id = Uuid::new_v4().simple().to_string();
        let lock = self.locks.lock_for(&client_order_id);
        let _guard = lock.lock().await;

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
        // 幂等基石：网络调用之前先持久化 client_order_id
        self.orders.insert_new(&mut order).await?;

        // 杀开关：记录 would-have-been，不路由
        if !self.trading_enabled.load(Ordering::Acquire) {
            self.risk_events
                .insert(&RiskEvent::new(
                    now_s(),
                    &intent.symbol,
                    RiskLevel::Info,
                    "KILL_SWITCH",
                    format!(
                        "order {} recorded but not routed (TRADING_ENABLED=false)",
                        client_order_id
                    ),
                ))
                .await?;
            let order = self
                .orders
                .append_lifecycle_event(
                    order.id,
                    OrderStatus::Canceled,
                    LifecycleInput {
                        message: "kill switch active, order not routed".to_string(),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(order);
        }

        let request = VenueOrderRequest {
            symbol: intent.symbol.clone(),
            client_order_id: client_order_id.clone(),
            side: intent.side,
            order_type: intent.order_type,
            quantity: intent.quantity,
            price: intent.price,
            td_mode: self.config.td_mode.clone(),
            pos_side: self.pos_side(intent),
            reduce_only: intent.reduce_only,
        };

        let policy = BackoffPolicy::with_retries(self.config.max_submit_retries);
        let submit_result =
            retry_with_backoff(&policy, "submit_order", || self.exchange.submit_order(&request))
                .await;

        let ack = match submit_result {
            Ok(ack) => ack,
            Err(err) if err.is_retryable() => {
                // 重试预算耗尽：留给对账循环按 client_order_id 收敛
                warn!(
                    "submit retries exhausted for {}, deferring to reconciliation: {}",
                    client_order_id, err
                );
                return self
                    .orders
                    .find_by_client_id(&client_order_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("order vanished"));
            }
            Err(err) => {
                // 永久错误：REJECTED
                let order = self
                    .orders
                    .append_lifecycle_event(
                        order.id,
                        OrderStatus::Rejected,
                        LifecycleInput {
                            message: format!("venue rejected: {}", err),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok(order);
            }
        };

        self.orders
            .set_exchange_order_id(order.id, &ack.exchange_order_id)
            .await?;
        let mut order = self
            .orders
            .append_lifecycle_event(
                order.id,
                OrderStatus::Accepted,
                LifecycleInput {
                    exchange_status: Some(ack.status.clone()),
                    message: "venue accepted".to_string(),
                    ..Default::default()
                },
            )
            .await?;
        order.exchange_order_id = Some(ack.exchange_order_id);

        if self.config.wait_fill {
            order = self.wait_for_fill(order).await?;
        }
        if order.status.is_terminal() {
            self.locks.release(&client_order_id);
        }
        Ok(order)
    }

    async fn cancel(&self, client_order_id: &str) -> anyhow::Result<bool> {
        let lock = self.locks.lock_for(client_order_id);
        let _guard = lock.lock().await;

        let order = match self.orders.find_by_client_id(client_order_id).await? {
            Some(order) => order,
            None => return Ok(false),
        };
        if order.status.is_terminal() {
            return Ok(false);
        }
        if let Some(exchange_order_id) = &order.exchange_order_id {
            self.exchange
                .cancel_order(&order.symbol, exchange_order_id)
                .await
                .map_err(|e| anyhow::anyhow!("venue cancel failed: {}", e))?;
        }
        self.orders
            .append_lifecycle_event(
                order.id,
                OrderStatus::Canceled,
                LifecycleInput {
                    message: "cancel requested".to_string(),
                    ..Default::default()
                },
            )
            .await?;
        self.locks.release(client_order_id);
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
    use alpha_arena_domain::{OrderSide, OrderType, TimeInForce};
    use alpha_arena_infrastructure::SimulatedExchange;

    fn intent(qty: f64) -> OrderIntent {
        OrderIntent {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: qty,
            price: None,
            leverage: Some(2.0),
            confidence: Some(0.9),
            time_in_force: TimeInForce::Gtc,
            reduce_only: false,
        }
    }

    async fn setup(auto_fill: bool, trading_enabled: bool) -> (LiveExecutor, Arc<SimulatedExchange>, SqlitePool) {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let exchange = Arc::new(SimulatedExchange::new(auto_fill));
        exchange.set_fill_price(50_000.0);
        let config = LiveExecutorConfig {
            wait_fill: true,
            fill_timeout_s: 0.3,
            fill_interval_s: 0.05,
            ..Default::default()
        };
        let executor = LiveExecutor::new(
            pool.clone(),
            exchange.clone(),
            OrderLocks::new(),
            config,
            Arc::new(AtomicBool::new(trading_enabled)),
        );
        (executor, exchange, pool)
    }

    #[tokio::test]
    async fn kill_switch_records_but_never_routes() {
        let (executor, exchange, pool) = setup(true, false).await;
        let order = executor.submit(&intent(1.0)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(exchange.submitted_order_count(), 0, "no order may leak out");

        let risk = RiskEventRepository::new(pool);
        let events = risk.recent("BTC-USDT-SWAP", None, 10).await.unwrap();
        assert!(events.iter().any(|(_, rule, _)| rule == "KILL_SWITCH"));
    }

    #[tokio::test]
    async fn auto_fill_reaches_filled_with_position() {
        let (executor, _exchange, pool) = setup(true, true).await;
        let order = executor.submit(&intent(1.0)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let positions = PositionRepository::new(pool);
        let position = positions.get("BTC-USDT-SWAP").await.unwrap().unwrap();
        assert_eq!(position.size, "1".parse().unwrap());
    }

    #[tokio::test]
    async fn transient_submit_failure_retries_idempotently() {
        let (executor, exchange, _pool) = setup(true, true).await;
        exchange.fail_next_submits(1);
        let order = executor.submit(&intent(0.5)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        // 同一 client_order_id 重试，交易所侧只有一笔
        assert_eq!(exchange.submitted_order_count(), 1);
    }

    #[tokio::test]
    async fn gtc_order_left_open_after_timeout() {
        let (executor, _exchange, _pool) = setup(false, true).await;
        let order = executor.submit(&intent(1.0)).await.unwrap();
        // 未成交且 GTC：超时后留在场内
        assert_eq!(order.status, OrderStatus::Accepted);
    }
}
