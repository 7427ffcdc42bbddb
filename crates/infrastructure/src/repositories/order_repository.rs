//! 订单仓储
//!
//! 生命周期事件只追加；状态更新与事件写入在同一事务内完成。
//! 成交额外携带 Trade 与 Position 的写入，同样单事务。

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_domain::{
    Order, OrderLifecycleEvent, OrderSide, OrderStatus, OrderType, Position, TimeInForce,
    TransitionError,
};

use super::{dec_opt_string, parse_dec, parse_dec_opt};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    client_order_id: String,
    exchange_order_id: Option<String>,
    symbol: String,
    side: String,
    order_type: String,
    price: Option<String>,
    amount: String,
    filled_amount: String,
    leverage: Option<f64>,
    status: String,
    time_in_force: String,
    created_at: i64,
    updated_at: i64,
}

impl OrderRow {
    fn into_entity(self) -> anyhow::Result<Order> {
        Ok(Order {
            id: self.id,
            client_order_id: self.client_order_id,
            exchange_order_id: self.exchange_order_id,
            symbol: self.symbol,
            side: OrderSide::from_str(&self.side)?,
            order_type: OrderType::from_str(&self.order_type)?,
            price: parse_dec_opt(&self.price)?,
            amount: parse_dec(&self.amount)?,
            filled_amount: parse_dec(&self.filled_amount)?,
            leverage: self.leverage,
            status: OrderStatus::from_str(&self.status)?,
            time_in_force: TimeInForce::from_str(&self.time_in_force)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LifecycleRow {
    id: i64,
    order_id: i64,
    status: String,
    ts: i64,
    exchange_status: Option<String>,
    fill_qty: Option<String>,
    fill_price: Option<String>,
    fee: Option<String>,
    message: String,
    raw_payload: Option<String>,
}

impl LifecycleRow {
    fn into_entity(self) -> anyhow::Result<OrderLifecycleEvent> {
        Ok(OrderLifecycleEvent {
            id: self.id,
            order_id: self.order_id,
            status: OrderStatus::from_str(&self.status)?,
            ts: self.ts,
            exchange_status: self.exchange_status,
            fill_qty: parse_dec_opt(&self.fill_qty)?,
            fill_price: parse_dec_opt(&self.fill_price)?,
            fee: parse_dec_opt(&self.fee)?,
            message: self.message,
            raw_payload: self.raw_payload,
        })
    }
}

/// 生命周期事件的输入载荷
#[derive(Debug, Clone, Default)]
pub struct LifecycleInput {
    pub exchange_status: Option<String>,
    pub fill_qty: Option<Decimal>,
    pub fill_price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub message: String,
    pub raw_payload: Option<String>,
}

#[derive(Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 新建订单：订单行与 NEW 事件在同一事务写入，网络调用前必须先走这里
    pub async fn insert_new(&self, order: &mut Order) -> anyhow::Result<i64> {
        let mut transaction = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO orders (client_order_id, exchange_order_id, symbol, side, order_type,
                                price, amount, filled_amount, leverage, status, time_in_force,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.client_order_id)
        .bind(&order.exchange_order_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.order_type.as_str())
        .bind(dec_opt_string(&order.price))
        .bind(order.amount.to_string())
        .bind(order.filled_amount.to_string())
        .bind(order.leverage)
        .bind(order.status.as_str())
        .bind(order.time_in_force.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *transaction)
        .await?;
        let order_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO order_lifecycle_events (order_id, status, ts, message)
            VALUES (?, ?, ?, 'order created')
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::New.as_str())
        .bind(order.created_at)
        .execute(&mut *transaction)
        .await?;
        transaction.commit().await?;

        order.id = order_id;
        Ok(order_id)
    }

    pub async fn find_by_client_id(&self, client_order_id: &str) -> anyhow::Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT * FROM orders WHERE client_order_id = ? LIMIT 1",
        )
        .bind(client_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_entity).transpose()
    }

    pub async fn find_by_exchange_id(
        &self,
        exchange_order_id: &str,
    ) -> anyhow::Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT * FROM orders WHERE exchange_order_id = ? LIMIT 1",
        )
        .bind(exchange_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_entity).transpose()
    }

    /// 所有未完结订单
    pub async fn list_open(&self, symbol: &str) -> anyhow::Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT * FROM orders
            WHERE symbol = ? AND status IN ('NEW', 'ACCEPTED', 'PARTIALLY_FILLED')
            ORDER BY created_at ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_entity).collect()
    }

    pub async fn set_exchange_order_id(
        &self,
        order_id: i64,
        exchange_order_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE orders SET exchange_order_id = ?, updated_at = ? WHERE id = ?")
            .bind(exchange_order_id)
            .bind(now_ms())
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 追加生命周期事件并推进订单状态
    ///
    /// 非法后继时不写任何行，错误可 downcast 为 [`TransitionError`]
    pub async fn append_lifecycle_event(
        &self,
        order_id: i64,
        next_status: OrderStatus,
        input: LifecycleInput,
    ) -> anyhow::Result<Order> {
        let mut transaction = self.pool.begin().await?;
        let order =
            Self::transition_in_tx(&mut transaction, order_id, next_status, &input).await?;
        transaction.commit().await?;
        Ok(order)
    }

    /// 成交事件：订单状态、生命周期事件、Trade、Position 同一事务落库
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_fill(
        &self,
        order_id: i64,
        fill_qty: Decimal,
        fill_price: Decimal,
        fee: Option<Decimal>,
        fee_currency: Option<String>,
        realized_pnl: Option<Decimal>,
        new_position: &Position,
        raw_payload: Option<String>,
    ) -> anyhow::Result<Order> {
        let mut transaction = self.pool.begin().await?;

        let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE id = ? LIMIT 1")
            .bind(order_id)
            .fetch_optional(&mut *transaction)
            .await?;
        let mut order = row
            .ok_or_else(|| anyhow::anyhow!("order {} not found", order_id))?
            .into_entity()?;

        let next_status = order.fill_target_status(fill_qty);
        let now = now_ms();
        if !order.status.can_transition(next_status) {
            return Err(anyhow::Error::new(TransitionError {
                client_order_id: order.client_order_id.clone(),
                from: order.status,
                to: next_status,
            }));
        }
        order.filled_amount += fill_qty;
        order.status = next_status;
        order.updated_at = now;

        sqlx::query(
            "UPDATE orders SET status = ?, filled_amount = ?, updated_at = ? WHERE id = ?",
        )
        .bind(order.status.as_str())
        .bind(order.filled_amount.to_string())
        .bind(now)
        .bind(order_id)
        .execute(&mut *transaction)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO order_lifecycle_events
                (order_id, status, ts, exchange_status, fill_qty, fill_price, fee, message, raw_payload)
            VALUES (?, ?, ?, NULL, ?, ?, ?, 'fill', ?)
            "#,
        )
        .bind(order_id)
        .bind(order.status.as_str())
        .bind(now)
        .bind(fill_qty.to_string())
        .bind(fill_price.to_string())
        .bind(fee.map(|f| f.to_string()))
        .bind(&raw_payload)
        .execute(&mut *transaction)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO trades (order_id, symbol, side, price, amount, fee, fee_currency, realized_pnl, ts)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(fill_price.to_string())
        .bind(fill_qty.to_string())
        .bind(fee.map(|f| f.to_string()))
        .bind(fee_currency)
        .bind(realized_pnl.map(|p| p.to_string()))
        .bind(now)
        .execute(&mut *transaction)
        .await?;

        Self::write_position(&mut transaction, new_position).await?;
        transaction.commit().await?;
        Ok(order)
    }

    /// 同一事务内的状态迁移 + 事件写入
    async fn transition_in_tx(
        conn: &mut SqliteConnection,
        order_id: i64,
        next_status: OrderStatus,
        input: &LifecycleInput,
    ) -> anyhow::Result<Order> {
        let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE id = ? LIMIT 1")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;
        let mut order = row
            .ok_or_else(|| anyhow::anyhow!("order {} not found", order_id))?
            .into_entity()?;

        let now = now_ms();
        order
            .transition(next_status, now)
            .map_err(anyhow::Error::new)?;

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(order.status.as_str())
            .bind(now)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO order_lifecycle_events
                (order_id, status, ts, exchange_status, fill_qty, fill_price, fee, message, raw_payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order_id)
        .bind(next_status.as_str())
        .bind(now)
        .bind(&input.exchange_status)
        .bind(input.fill_qty.map(|v| v.to_string()))
        .bind(input.fill_price.map(|v| v.to_string()))
        .bind(input.fee.map(|v| v.to_string()))
        .bind(&input.message)
        .bind(&input.raw_payload)
        .execute(&mut *conn)
        .await?;
        Ok(order)
    }

    async fn write_position(
        conn: &mut SqliteConnection,
        position: &Position,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM positions WHERE symbol = ?")
            .bind(&position.symbol)
            .execute(&mut *conn)
            .await?;
        if position.is_flat() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO positions (symbol, side, size, entry_price, leverage, unrealized_pnl,
                                   margin, liquidation_price, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&position.symbol)
        .bind(position.side.as_str())
        .bind(position.size.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.leverage)
        .bind(dec_opt_string(&position.unrealized_pnl))
        .bind(dec_opt_string(&position.margin))
        .bind(dec_opt_string(&position.liquidation_price))
        .bind(position.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 按时间升序返回订单的全部生命周期事件
    pub async fn lifecycle_events(&self, order_id: i64) -> anyhow::Result<Vec<OrderLifecycleEvent>> {
        let rows: Vec<LifecycleRow> = sqlx::query_as(
            "SELECT * FROM order_lifecycle_events WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LifecycleRow::into_entity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;
    use alpha_arena_domain::PositionSide;

    async fn repo() -> OrderRepository {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        OrderRepository::new(pool)
    }

    fn order(cid: &str) -> Order {
        Order::new(
            cid.to_string(),
            "BTC-USDT-SWAP".to_string(),
            OrderSide::Buy,
            OrderType::Market,
            None,
            "1.0".parse().unwrap(),
            Some(2.0),
            TimeInForce::Gtc,
            now_ms(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_atomically() {
        let repo = repo().await;
        let mut o = order("cid-1");
        repo.insert_new(&mut o).await.unwrap();

        // NEW -> FILLED 非法
        let err = repo
            .append_lifecycle_event(o.id, OrderStatus::Filled, LifecycleInput::default())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TransitionError>().is_some());

        // 未留下事件
        let events = repo.lifecycle_events(o.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OrderStatus::New);
    }

    #[tokio::test]
    async fn partial_fill_then_cancel_produces_four_events() {
        let repo = repo().await;
        let mut o = order("cid-2");
        repo.insert_new(&mut o).await.unwrap();

        repo.append_lifecycle_event(o.id, OrderStatus::Accepted, LifecycleInput::default())
            .await
            .unwrap();

        let position = Position {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: PositionSide::Long,
            size: "0.3".parse().unwrap(),
            entry_price: "50000".parse().unwrap(),
            leverage: Some(2.0),
            unrealized_pnl: None,
            margin: None,
            liquidation_price: None,
            updated_at: now_ms(),
        };
        let updated = repo
            .apply_fill(
                o.id,
                "0.3".parse().unwrap(),
                "50000".parse().unwrap(),
                Some("0.15".parse().unwrap()),
                Some("USDT".to_string()),
                None,
                &position,
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::PartiallyFilled);
        assert_eq!(updated.filled_amount, "0.3".parse().unwrap());

        repo.append_lifecycle_event(o.id, OrderStatus::Canceled, LifecycleInput::default())
            .await
            .unwrap();

        let events = repo.lifecycle_events(o.id).await.unwrap();
        let statuses: Vec<OrderStatus> = events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::New,
                OrderStatus::Accepted,
                OrderStatus::PartiallyFilled,
                OrderStatus::Canceled
            ]
        );
        // 事件时间单调不减
        assert!(events.windows(2).all(|w| w[0].ts <= w[1].ts));
    }
}
