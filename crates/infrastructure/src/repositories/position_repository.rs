//! 持仓与持仓快照仓储

use std::str::FromStr;

use sqlx::SqlitePool;

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_domain::{Position, PositionSide, VenuePosition};

use super::{dec_opt_string, parse_dec, parse_dec_opt};

#[derive(sqlx::FromRow)]
struct PositionRow {
    symbol: String,
    side: String,
    size: String,
    entry_price: String,
    leverage: Option<f64>,
    unrealized_pnl: Option<String>,
    margin: Option<String>,
    liquidation_price: Option<String>,
    updated_at: i64,
}

impl PositionRow {
    fn into_entity(self) -> anyhow::Result<Position> {
        Ok(Position {
            symbol: self.symbol,
            side: PositionSide::from_str(&self.side)?,
            size: parse_dec(&self.size)?,
            entry_price: parse_dec(&self.entry_price)?,
            leverage: self.leverage,
            unrealized_pnl: parse_dec_opt(&self.unrealized_pnl)?,
            margin: parse_dec_opt(&self.margin)?,
            liquidation_price: parse_dec_opt(&self.liquidation_price)?,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PositionRepository {
    pool: SqlitePool,
}

impl PositionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// net 模式：先清空该 symbol 再写入非平仓位
    pub async fn set_position(&self, position: &Position) -> anyhow::Result<()> {
        let mut transaction = self.pool.begin().await?;
        sqlx::query("DELETE FROM positions WHERE symbol = ?")
            .bind(&position.symbol)
            .execute(&mut *transaction)
            .await?;
        if !position.is_flat() {
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
            .execute(&mut *transaction)
            .await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    /// 当前持仓（net 模式单行）；无持仓返回 None
    pub async fn get(&self, symbol: &str) -> anyhow::Result<Option<Position>> {
        let row: Option<PositionRow> = sqlx::query_as(
            r#"
            SELECT symbol, side, size, entry_price, leverage, unrealized_pnl,
                   margin, liquidation_price, updated_at
            FROM positions WHERE symbol = ?
            ORDER BY updated_at DESC LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PositionRow::into_entity).transpose()
    }

    /// 写一条交易所侧持仓快照（含 raw_payload 审计）
    pub async fn insert_snapshot(
        &self,
        exchange: &str,
        account_id: &str,
        ts: i64,
        venue: &VenuePosition,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO position_snapshots (exchange, account_id, symbol, ts, side, size,
                                            entry_price, mark_price, unrealized_pnl, leverage,
                                            margin, liquidation_price, raw_payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (symbol, ts, side) DO NOTHING
            "#,
        )
        .bind(exchange)
        .bind(account_id)
        .bind(&venue.symbol)
        .bind(ts)
        .bind(&venue.side)
        .bind(venue.size.to_string())
        .bind(venue.entry_price.to_string())
        .bind(venue.mark_price.map(|v| v.to_string()))
        .bind(venue.unrealized_pnl.map(|v| v.to_string()))
        .bind(venue.leverage)
        .bind(venue.margin.map(|v| v.to_string()))
        .bind(venue.liquidation_price.map(|v| v.to_string()))
        .bind(venue.raw.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 交易所侧仓位消失时写一条 size=0 的收口快照
    pub async fn insert_closed_snapshot(
        &self,
        exchange: &str,
        account_id: &str,
        ts: i64,
        symbol: &str,
        side: &str,
        entry_price: &str,
    ) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "symbol": symbol,
            "side": side,
            "size": 0.0,
            "entry_price": entry_price,
            "closed": true,
        });
        sqlx::query(
            r#"
            INSERT INTO position_snapshots (exchange, account_id, symbol, ts, side, size,
                                            entry_price, raw_payload)
            VALUES (?, ?, ?, ?, ?, '0', ?, ?)
            ON CONFLICT (symbol, ts, side) DO NOTHING
            "#,
        )
        .bind(exchange)
        .bind(account_id)
        .bind(symbol)
        .bind(ts)
        .bind(side)
        .bind(entry_price)
        .bind(payload.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear(&self, symbol: &str) -> anyhow::Result<()> {
        self.set_position(&Position::flat(symbol, now_ms())).await
    }
}
