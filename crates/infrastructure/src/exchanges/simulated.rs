//! 确定性模拟交易所
//!
//! 回测与测试共用：K线/资金费率/价格由测试预置，订单行为可脚本化。
//! 同一 client_order_id 重复提交返回原回执，与真实交易所的幂等语义一致。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_domain::{
    Candle, Exchange, ExchangeError, FundingRate, OrderSide, PriceSnapshot, Timeframe,
    VenueBalance, VenueOrderAck, VenueOrderRequest, VenueOrderState, VenuePosition,
};

#[derive(Debug, Clone)]
struct SimOrder {
    exchange_order_id: String,
    client_order_id: String,
    symbol: String,
    side: OrderSide,
    amount: f64,
    filled: f64,
    avg_price: Option<f64>,
    status: String,
    ts: i64,
}

impl SimOrder {
    fn to_state(&self) -> VenueOrderState {
        VenueOrderState {
            exchange_order_id: Some(self.exchange_order_id.clone()),
            client_order_id: Some(self.client_order_id.clone()),
            status: self.status.clone(),
            filled: self.filled,
            amount: self.amount,
            avg_price: self.avg_price,
            fee: None,
            fee_currency: None,
            ts: self.ts,
            raw: serde_json::json!({
                "ordId": self.exchange_order_id,
                "clOrdId": self.client_order_id,
                "instId": self.symbol,
                "side": self.side.as_str(),
                "simulated": true,
            }),
        }
    }
}

/// 内存态模拟交易所
pub struct SimulatedExchange {
    candles: Mutex<HashMap<(String, Timeframe), Vec<Candle>>>,
    funding: Mutex<HashMap<String, Vec<FundingRate>>>,
    prices: Mutex<HashMap<String, PriceSnapshot>>,
    balances: Mutex<Vec<VenueBalance>>,
    positions: Mutex<Vec<VenuePosition>>,
    orders: Mutex<HashMap<String, SimOrder>>,
    /// 按 client_order_id 预置的查询应答序列
    scripted_states: Mutex<HashMap<String, VecDeque<VenueOrderState>>>,
    /// 提交前返回 Transient 错误的剩余次数（测试重试用）
    fail_submits: AtomicU32,
    /// true 时提交即全额成交
    auto_fill: bool,
    fill_price: Mutex<Option<f64>>,
    next_id: AtomicU64,
}

impl SimulatedExchange {
    pub fn new(auto_fill: bool) -> Self {
        Self {
            candles: Mutex::new(HashMap::new()),
            funding: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
            balances: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
            orders: Mutex::new(HashMap::new()),
            scripted_states: Mutex::new(HashMap::new()),
            fail_submits: AtomicU32::new(0),
            auto_fill,
            fill_price: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn seed_candles(&self, candles: Vec<Candle>) {
        let mut store = self.candles.lock().unwrap();
        for candle in candles {
            let key = (candle.symbol.clone(), candle.timeframe);
            let entry = store.entry(key).or_default();
            entry.push(candle);
        }
        for series in store.values_mut() {
            series.sort_by_key(|c| c.ts);
            series.dedup_by_key(|c| c.ts);
        }
    }

    pub fn seed_funding(&self, rates: Vec<FundingRate>) {
        let mut store = self.funding.lock().unwrap();
        for rate in rates {
            store.entry(rate.symbol.clone()).or_default().push(rate);
        }
        for series in store.values_mut() {
            series.sort_by_key(|r| r.ts);
        }
    }

    pub fn seed_prices(&self, snapshot: PriceSnapshot) {
        self.prices
            .lock()
            .unwrap()
            .insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn seed_balances(&self, balances: Vec<VenueBalance>) {
        *self.balances.lock().unwrap() = balances;
    }

    pub fn seed_positions(&self, positions: Vec<VenuePosition>) {
        *self.positions.lock().unwrap() = positions;
    }

    pub fn set_fill_price(&self, price: f64) {
        *self.fill_price.lock().unwrap() = Some(price);
    }

    /// 让接下来 n 次提交失败（Transient），验证幂等重试
    pub fn fail_next_submits(&self, n: u32) {
        self.fail_submits.store(n, Ordering::SeqCst);
    }

    /// 预置某订单后续 fetch_order 的应答序列；耗尽后回落到当前内部状态
    pub fn script_order_states(&self, client_order_id: &str, states: Vec<VenueOrderState>) {
        self.scripted_states
            .lock()
            .unwrap()
            .insert(client_order_id.to_string(), states.into());
    }

    /// 直接改写内部订单状态（模拟交易所侧的撤单/成交）
    pub fn force_order_status(&self, client_order_id: &str, status: &str, filled: f64) {
        let fill_price = (*self.fill_price.lock().unwrap()).or_else(|| {
            let orders = self.orders.lock().unwrap();
            orders.get(client_order_id).and_then(|o| {
                self.prices
                    .lock()
                    .unwrap()
                    .get(&o.symbol)
                    .and_then(|p| p.reference_price())
            })
        });
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(client_order_id) {
            order.status = status.to_string();
            order.filled = filled;
            if filled > 0.0 && order.avg_price.is_none() {
                order.avg_price = fill_price;
            }
            order.ts = now_ms();
        }
    }

    pub fn submitted_order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    fn resolve_fill_price(&self, symbol: &str) -> Option<f64> {
        if let Some(price) = *self.fill_price.lock().unwrap() {
            return Some(price);
        }
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|p| p.reference_price())
    }
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let store = self.candles.lock().unwrap();
        let series = match store.get(&(symbol.to_string(), timeframe)) {
            Some(series) => series,
            None => return Ok(Vec::new()),
        };
        let filtered: Vec<Candle> = series
            .iter()
            .filter(|c| since_ms.map_or(true, |since| c.ts >= since))
            .take(limit)
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn fetch_funding(&self, symbol: &str) -> Result<FundingRate, ExchangeError> {
        self.funding
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|series| series.last().cloned())
            .ok_or_else(|| ExchangeError::Transient("no funding seeded".to_string()))
    }

    async fn fetch_mark_index_last(&self, symbol: &str) -> Result<PriceSnapshot, ExchangeError> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::Transient("no price seeded".to_string()))
    }

    async fn fetch_balances(&self) -> Result<Vec<VenueBalance>, ExchangeError> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn fetch_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<VenuePosition>, ExchangeError> {
        let positions = self.positions.lock().unwrap();
        Ok(positions
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }

    async fn submit_order(&self, req: &VenueOrderRequest) -> Result<VenueOrderAck, ExchangeError> {
        if self
            .fail_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return Err(ExchangeError::Transient("simulated submit failure".to_string()));
        }

        let mut orders = self.orders.lock().unwrap();
        // clOrdId 幂等：重复提交返回原回执，不再生成新订单
        if let Some(existing) = orders.get(&req.client_order_id) {
            return Ok(VenueOrderAck {
                exchange_order_id: existing.exchange_order_id.clone(),
                status: existing.status.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let exchange_order_id = format!("SIM-{:08}", id);
        let (status, filled, avg_price) = if self.auto_fill {
            let price = req
                .price
                .or_else(|| self.resolve_fill_price(&req.symbol))
                .ok_or_else(|| {
                    ExchangeError::Permanent("no fill price available".to_string())
                })?;
            ("FILLED".to_string(), req.quantity, Some(price))
        } else {
            ("ACCEPTED".to_string(), 0.0, None)
        };

        orders.insert(
            req.client_order_id.clone(),
            SimOrder {
                exchange_order_id: exchange_order_id.clone(),
                client_order_id: req.client_order_id.clone(),
                symbol: req.symbol.clone(),
                side: req.side,
                amount: req.quantity,
                filled,
                avg_price,
                status: status.clone(),
                ts: now_ms(),
            },
        );
        Ok(VenueOrderAck {
            exchange_order_id,
            status,
        })
    }

    async fn fetch_order(
        &self,
        _symbol: &str,
        exchange_order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<VenueOrderState, ExchangeError> {
        let orders = self.orders.lock().unwrap();
        let order = orders
            .values()
            .find(|o| {
                exchange_order_id.map_or(false, |id| o.exchange_order_id == id)
                    || client_order_id.map_or(false, |id| o.client_order_id == id)
            })
            .cloned();
        drop(orders);

        let order = order.ok_or_else(|| ExchangeError::Permanent("order not found".to_string()))?;

        let mut scripted = self.scripted_states.lock().unwrap();
        if let Some(queue) = scripted.get_mut(&order.client_order_id) {
            if let Some(state) = queue.pop_front() {
                return Ok(state);
            }
        }
        Ok(order.to_state())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<VenueOrderState>, ExchangeError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .values()
            .filter(|o| o.symbol == symbol)
            .filter(|o| matches!(o.status.as_str(), "ACCEPTED" | "PARTIALLY_FILLED"))
            .map(|o| o.to_state())
            .collect())
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        exchange_order_id: &str,
    ) -> Result<(), ExchangeError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .values_mut()
            .find(|o| o.exchange_order_id == exchange_order_id)
            .ok_or_else(|| ExchangeError::Permanent("order not found".to_string()))?;
        if matches!(order.status.as_str(), "FILLED" | "CANCELED" | "REJECTED") {
            return Err(ExchangeError::Permanent("order already terminal".to_string()));
        }
        order.status = "CANCELED".to_string();
        order.ts = now_ms();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_domain::OrderType;

    fn request(cid: &str) -> VenueOrderRequest {
        VenueOrderRequest {
            symbol: "BTC-USDT-SWAP".to_string(),
            client_order_id: cid.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: 1.0,
            price: None,
            td_mode: "cross".to_string(),
            pos_side: None,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn duplicate_client_order_id_returns_same_ack() {
        let exchange = SimulatedExchange::new(true);
        exchange.set_fill_price(50_000.0);
        let first = exchange.submit_order(&request("cid-a")).await.unwrap();
        let second = exchange.submit_order(&request("cid-a")).await.unwrap();
        assert_eq!(first.exchange_order_id, second.exchange_order_id);
        assert_eq!(exchange.submitted_order_count(), 1);
    }

    #[tokio::test]
    async fn fail_next_submits_then_succeeds() {
        let exchange = SimulatedExchange::new(true);
        exchange.set_fill_price(50_000.0);
        exchange.fail_next_submits(1);
        assert!(exchange.submit_order(&request("cid-b")).await.is_err());
        assert!(exchange.submit_order(&request("cid-b")).await.is_ok());
    }
}
