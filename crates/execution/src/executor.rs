//! 执行器接口与订单意图

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use alpha_arena_domain::{Order, OrderSide, OrderType, TimeInForce};

/// 下单意图：风控通过后的决策产物
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub leverage: Option<f64>,
    pub confidence: Option<f64>,
    pub time_in_force: TimeInForce,
    /// 只减仓（先平后开拆单中的平仓腿）
    pub reduce_only: bool,
}

/// 按 client_order_id 的细粒度互斥锁
///
/// 执行器推进状态时持锁；对账循环追加派生事件前取同一把锁，
/// 保证单个订单的生命周期事件严格串行
#[derive(Clone, Default)]
pub struct OrderLocks {
    locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, client_order_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(client_order_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// 终态订单的锁可以回收
    pub fn release(&self, client_order_id: &str) {
        self.locks.remove(client_order_id);
    }
}

/// 执行器统一接口：模拟与实盘共用
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// 提交订单；返回含最新状态的订单实体
    async fn submit(&self, intent: &OrderIntent) -> anyhow::Result<Order>;

    /// 撤销未完结订单，成功返回 true
    async fn cancel(&self, client_order_id: &str) -> anyhow::Result<bool>;

    async fn get_order(&self, client_order_id: &str) -> anyhow::Result<Option<Order>>;
}
