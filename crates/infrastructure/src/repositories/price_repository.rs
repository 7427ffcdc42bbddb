//! 价格快照仓储

use sqlx::SqlitePool;

use alpha_arena_domain::PriceSnapshot;

use super::{dec_opt_string, parse_dec_opt};

#[derive(sqlx::FromRow)]
struct PriceRow {
    symbol: String,
    ts: i64,
    last_price: Option<String>,
    mark_price: Option<String>,
    index_price: Option<String>,
}

impl PriceRow {
    fn into_entity(self) -> anyhow::Result<PriceSnapshot> {
        Ok(PriceSnapshot {
            symbol: self.symbol,
            ts: self.ts,
            last: parse_dec_opt(&self.last_price)?,
            mark: parse_dec_opt(&self.mark_price)?,
            index: parse_dec_opt(&self.index_price)?,
        })
    }
}

#[derive(Clone)]
pub struct PriceSnapshotRepository {
    pool: SqlitePool,
}

impl PriceSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, snapshot: &PriceSnapshot) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO price_snapshots (symbol, ts, last_price, mark_price, index_price)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (symbol, ts) DO NOTHING
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(snapshot.ts)
        .bind(dec_opt_string(&snapshot.last))
        .bind(dec_opt_string(&snapshot.mark))
        .bind(dec_opt_string(&snapshot.index))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn latest(&self, symbol: &str) -> anyhow::Result<Option<PriceSnapshot>> {
        let row: Option<PriceRow> = sqlx::query_as(
            r#"
            SELECT symbol, ts, last_price, mark_price, index_price
            FROM price_snapshots
            WHERE symbol = ?
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PriceRow::into_entity).transpose()
    }
}
