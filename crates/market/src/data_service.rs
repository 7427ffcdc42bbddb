//! 只读数据访问层
//!
//! 策略、决策、风控、回测一律通过这里读取行情；
//! 绕过本层直接查库属于设计违规。返回的都是防御性拷贝。

use sqlx::SqlitePool;

use alpha_arena_common::CandleItem;
use alpha_arena_domain::{
    Candle, FundingRate, MarketSnapshot, PriceSnapshot, Timeframe,
};
use alpha_arena_infrastructure::{CandleRepository, FundingRepository, PriceSnapshotRepository};

/// 资金费率历史的默认条数（够覆盖套利策略的持续期判断）
const FUNDING_HISTORY_LIMIT: usize = 16;

#[derive(Clone)]
pub struct DataService {
    candles: CandleRepository,
    funding: FundingRepository,
    prices: PriceSnapshotRepository,
}

impl DataService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            candles: CandleRepository::new(pool.clone()),
            funding: FundingRepository::new(pool.clone()),
            prices: PriceSnapshotRepository::new(pool),
        }
    }

    /// 最近 limit 根已收盘K线，升序；不足时返回已有的，不做填充
    pub async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        self.candles.recent(symbol, timeframe, limit).await
    }

    /// [start_ts, end_ts] 区间的K线，升序
    pub async fn get_candles_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ts: i64,
        end_ts: i64,
    ) -> anyhow::Result<Vec<Candle>> {
        self.candles.range(symbol, timeframe, start_ts, end_ts).await
    }

    pub async fn get_latest_funding(&self, symbol: &str) -> anyhow::Result<Option<FundingRate>> {
        self.funding.latest(symbol).await
    }

    /// 最近 limit 期资金费率，升序（回测资金费计提用）
    pub async fn get_funding_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<FundingRate>> {
        self.funding.history(symbol, limit).await
    }

    pub async fn get_latest_prices(&self, symbol: &str) -> anyhow::Result<Option<PriceSnapshot>> {
        self.prices.latest(symbol).await
    }

    /// 组装策略输入快照
    pub async fn get_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<MarketSnapshot> {
        let candles = self.get_candles(symbol, timeframe, limit).await?;
        let items: Vec<CandleItem> = candles.iter().map(Candle::to_item).collect();
        let funding = self.funding.latest(symbol).await?;
        let funding_history = self
            .funding
            .history(symbol, FUNDING_HISTORY_LIMIT)
            .await?
            .iter()
            .map(FundingRate::to_view)
            .collect();
        let prices = self.prices.latest(symbol).await?;

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            timeframe,
            candles: items,
            funding: funding.map(|f| f.to_view()),
            funding_history,
            prices: prices.map(|p| p.to_view()),
        })
    }
}
