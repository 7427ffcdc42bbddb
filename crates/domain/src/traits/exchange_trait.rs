//! 交易所抽象接口
//!
//! services/market/execution 层依赖本接口，infrastructure 层提供实现
//! （真实 OKX HTTPS+HMAC 与确定性模拟两套）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{Candle, FundingRate, PriceSnapshot};
use crate::enums::{OrderSide, OrderType, Timeframe};

/// 交易所错误分类
///
/// 调用方按分类决定重试还是放弃：限流/超时/5xx 退避重试，4xx 不重试
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("rate limited by venue")]
    RateLimited,

    #[error("venue request timeout")]
    Timeout,

    #[error("transient venue error: {0}")]
    Transient(String),

    #[error("permanent venue error: {0}")]
    Permanent(String),
}

impl ExchangeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimited | ExchangeError::Timeout | ExchangeError::Transient(_)
        )
    }
}

/// 下单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderRequest {
    pub symbol: String,
    /// 幂等ID，随每笔订单发送
    pub client_order_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    /// OKX tdMode：cross / isolated
    pub td_mode: String,
    /// 双向持仓模式下的 posSide
    pub pos_side: Option<String>,
    pub reduce_only: bool,
}

/// 下单回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderAck {
    pub exchange_order_id: String,
    pub status: String,
}

/// 查询到的订单状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrderState {
    pub exchange_order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub status: String,
    pub filled: f64,
    pub amount: f64,
    pub avg_price: Option<f64>,
    pub fee: Option<f64>,
    pub fee_currency: Option<String>,
    pub ts: i64,
    pub raw: serde_json::Value,
}

/// 账户余额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueBalance {
    pub currency: String,
    pub total: f64,
    pub free: Option<f64>,
    pub used: Option<f64>,
}

/// 交易所侧持仓
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: String,
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub leverage: Option<f64>,
    pub margin: Option<f64>,
    pub liquidation_price: Option<f64>,
    pub raw: serde_json::Value,
}

/// 交易所统一能力集
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &'static str;

    /// 拉取历史K线（since 起，最多 limit 根，升序返回，含未收盘K线）
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// 当前资金费率
    async fn fetch_funding(&self, symbol: &str) -> Result<FundingRate, ExchangeError>;

    /// 最新价/标记价/指数价
    async fn fetch_mark_index_last(&self, symbol: &str) -> Result<PriceSnapshot, ExchangeError>;

    async fn fetch_balances(&self) -> Result<Vec<VenueBalance>, ExchangeError>;

    async fn fetch_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<VenuePosition>, ExchangeError>;

    async fn submit_order(&self, req: &VenueOrderRequest) -> Result<VenueOrderAck, ExchangeError>;

    /// 按交易所ID或客户端ID查询订单
    async fn fetch_order(
        &self,
        symbol: &str,
        exchange_order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<VenueOrderState, ExchangeError>;

    /// 拉取全部未完结订单
    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<VenueOrderState>, ExchangeError>;

    async fn cancel_order(
        &self,
        symbol: &str,
        exchange_order_id: &str,
    ) -> Result<(), ExchangeError>;
}
