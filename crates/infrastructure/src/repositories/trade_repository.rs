//! 成交查询仓储（写入由订单成交事务完成）

use std::str::FromStr;

use sqlx::SqlitePool;

use alpha_arena_domain::{OrderSide, Trade};

use super::{parse_dec, parse_dec_opt};

#[derive(sqlx::FromRow)]
struct TradeRow {
    id: i64,
    order_id: i64,
    symbol: String,
    side: String,
    price: String,
    amount: String,
    fee: Option<String>,
    fee_currency: Option<String>,
    realized_pnl: Option<String>,
    ts: i64,
}

impl TradeRow {
    fn into_entity(self) -> anyhow::Result<Trade> {
        Ok(Trade {
            id: self.id,
            order_id: self.order_id,
            symbol: self.symbol,
            side: OrderSide::from_str(&self.side)?,
            price: parse_dec(&self.price)?,
            amount: parse_dec(&self.amount)?,
            fee: parse_dec_opt(&self.fee)?,
            fee_currency: self.fee_currency,
            realized_pnl: parse_dec_opt(&self.realized_pnl)?,
            ts: self.ts,
        })
    }
}

#[derive(Clone)]
pub struct TradeRepository {
    pool: SqlitePool,
}

impl TradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn by_order(&self, order_id: i64) -> anyhow::Result<Vec<Trade>> {
        let rows: Vec<TradeRow> =
            sqlx::query_as("SELECT * FROM trades WHERE order_id = ? ORDER BY ts ASC")
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TradeRow::into_entity).collect()
    }

    /// 区间内已实现盈亏合计（只计已记录 realized_pnl 的成交）
    pub async fn realized_pnl_between(
        &self,
        symbol: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> anyhow::Result<f64> {
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            "SELECT realized_pnl FROM trades WHERE symbol = ? AND ts BETWEEN ? AND ?",
        )
        .bind(symbol)
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(p,)| p.and_then(|s| s.parse::<f64>().ok()))
            .sum())
    }

    /// 最近 limit 笔成交（按时间倒序）
    pub async fn recent(&self, symbol: &str, limit: usize) -> anyhow::Result<Vec<Trade>> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            "SELECT * FROM trades WHERE symbol = ? ORDER BY ts DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TradeRow::into_entity).collect()
    }
}
