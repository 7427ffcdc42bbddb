//! 账户同步循环
//!
//! 拉取余额与持仓，写快照并刷新本地 Position 行。
//! 本地与交易所仓位漂移超过容忍度时发 WARN（不自行修复，
//! 订单意图仍以执行器为准）。

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{info, warn};

use alpha_arena_common::utils::time::{now_ms, now_s};
use alpha_arena_domain::{
    Exchange, Position, PositionSide, RiskEvent, RiskLevel,
};
use alpha_arena_infrastructure::repositories::{
    BalanceRepository, PositionRepository, RiskEventRepository,
};

pub struct AccountSync {
    exchange: Arc<dyn Exchange>,
    balances: BalanceRepository,
    positions: PositionRepository,
    risk_events: RiskEventRepository,
    account_id: String,
    drift_tolerance: f64,
    running: AtomicBool,
}

impl AccountSync {
    pub fn new(
        pool: SqlitePool,
        exchange: Arc<dyn Exchange>,
        account_id: String,
        drift_tolerance: f64,
    ) -> Self {
        Self {
            exchange,
            balances: BalanceRepository::new(pool.clone()),
            positions: PositionRepository::new(pool.clone()),
            risk_events: RiskEventRepository::new(pool),
            account_id,
            drift_tolerance,
            running: AtomicBool::new(false),
        }
    }

    /// 同步一轮；上一轮未结束时跳过并返回 false
    pub async fn run_once(&self, symbol: &str) -> anyhow::Result<bool> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("account sync still running, tick skipped");
            return Ok(false);
        }
        let result = self.sync(symbol).await;
        self.running.store(false, Ordering::Release);
        result.map(|_| true)
    }

    async fn sync(&self, symbol: &str) -> anyhow::Result<()> {
        let ts = now_ms();
        let exchange_name = self.exchange.name();

        // 余额
        match self.exchange.fetch_balances().await {
            Ok(balances) => {
                for balance in &balances {
                    self.balances
                        .record(exchange_name, &self.account_id, ts, balance)
                        .await?;
                }
            }
            Err(err) => warn!("fetch_balances failed: {}", err),
        }

        // 持仓
        let venue_positions = match self.exchange.fetch_positions(Some(symbol)).await {
            Ok(positions) => positions,
            Err(err) => {
                warn!("fetch_positions failed: {}", err);
                return Ok(());
            }
        };

        let local = self.positions.get(symbol).await?;
        let venue = venue_positions.iter().find(|p| p.symbol == symbol);

        match venue {
            Some(venue) => {
                self.positions
                    .insert_snapshot(exchange_name, &self.account_id, ts, venue)
                    .await?;

                // 漂移检查
                let local_size = local.as_ref().map(|p| p.signed_size()).unwrap_or(0.0);
                let venue_signed = match venue.side.as_str() {
                    "SHORT" => -venue.size,
                    _ => venue.size,
                };
                let denom = local_size.abs().max(venue_signed.abs()).max(1e-9);
                if (venue_signed - local_size).abs() / denom > self.drift_tolerance {
                    self.risk_events
                        .insert(&RiskEvent::new(
                            now_s(),
                            symbol,
                            RiskLevel::Warn,
                            "POSITION_DRIFT",
                            format!(
                                "local {:.6} vs venue {:.6} beyond tolerance {:.4}",
                                local_size, venue_signed, self.drift_tolerance
                            ),
                        ))
                        .await?;
                }

                // 交易所是持仓事实来源：刷新当前行
                let position = Position {
                    symbol: symbol.to_string(),
                    side: PositionSide::from_str(&venue.side).unwrap_or(PositionSide::Flat),
                    size: Decimal::from_f64(venue.size).unwrap_or(Decimal::ZERO),
                    entry_price: Decimal::from_f64(venue.entry_price).unwrap_or(Decimal::ZERO),
                    leverage: venue.leverage,
                    unrealized_pnl: venue.unrealized_pnl.and_then(Decimal::from_f64),
                    margin: venue.margin.and_then(Decimal::from_f64),
                    liquidation_price: venue.liquidation_price.and_then(Decimal::from_f64),
                    updated_at: ts,
                };
                self.positions.set_position(&position).await?;
            }
            None => {
                // 交易所侧仓位消失：写收口快照并清掉本地行
                if let Some(local) = &local {
                    if !local.is_flat() {
                        self.positions
                            .insert_closed_snapshot(
                                exchange_name,
                                &self.account_id,
                                ts,
                                symbol,
                                local.side.as_str(),
                                &local.entry_price.to_string(),
                            )
                            .await?;
                        self.positions.clear(symbol).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;
    use alpha_arena_domain::{VenueBalance, VenuePosition};
    use alpha_arena_infrastructure::SimulatedExchange;

    #[tokio::test]
    async fn sync_writes_snapshots_and_position_row() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();

        let exchange = Arc::new(SimulatedExchange::new(true));
        exchange.seed_balances(vec![VenueBalance {
            currency: "USDT".to_string(),
            total: 10_000.0,
            free: Some(8_000.0),
            used: Some(2_000.0),
        }]);
        exchange.seed_positions(vec![VenuePosition {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: "LONG".to_string(),
            size: 0.5,
            entry_price: 50_000.0,
            mark_price: Some(50_500.0),
            unrealized_pnl: Some(250.0),
            leverage: Some(2.0),
            margin: Some(12_500.0),
            liquidation_price: None,
            raw: serde_json::json!({}),
        }]);

        let sync = AccountSync::new(pool.clone(), exchange, "okx-test".to_string(), 0.02);
        assert!(sync.run_once("BTC-USDT-SWAP").await.unwrap());

        let balances = BalanceRepository::new(pool.clone());
        assert_eq!(balances.latest_total("USDT").await.unwrap(), Some(10_000.0));

        let positions = PositionRepository::new(pool.clone());
        let position = positions.get("BTC-USDT-SWAP").await.unwrap().unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.size, "0.5".parse().unwrap());

        // 本地无仓位 -> 漂移事件
        let risk = RiskEventRepository::new(pool);
        let drift = risk.count_by_rule("BTC-USDT-SWAP", "POSITION_DRIFT").await.unwrap();
        assert_eq!(drift, 1);
    }

    #[tokio::test]
    async fn vanished_position_is_closed_out() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();

        let positions = PositionRepository::new(pool.clone());
        positions
            .set_position(&Position {
                symbol: "BTC-USDT-SWAP".to_string(),
                side: PositionSide::Long,
                size: "1".parse().unwrap(),
                entry_price: "50000".parse().unwrap(),
                leverage: None,
                unrealized_pnl: None,
                margin: None,
                liquidation_price: None,
                updated_at: 0,
            })
            .await
            .unwrap();

        let exchange = Arc::new(SimulatedExchange::new(true));
        let sync = AccountSync::new(pool.clone(), exchange, "okx-test".to_string(), 0.02);
        sync.run_once("BTC-USDT-SWAP").await.unwrap();

        assert!(positions.get("BTC-USDT-SWAP").await.unwrap().is_none());
    }
}
