//! OKX 交易所适配器（HTTPS + HMAC 签名）
//!
//! 模拟盘与实盘共用同一域名，通过 `x-simulated-trading` 请求头区分。
//! 所有响应先映射为 [`ExchangeError`] 分类，再交由调用方决定是否退避。

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_core::config::settings::OkxSettings;
use alpha_arena_domain::{
    Candle, Exchange, ExchangeError, FundingRate, PriceSnapshot, Timeframe, VenueBalance,
    VenueOrderAck, VenueOrderRequest, VenueOrderState, VenuePosition,
};

const OKX_BASE_URL: &str = "https://www.okx.com";

#[derive(Deserialize)]
struct OkxEnvelope {
    code: String,
    msg: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub struct OkxExchange {
    client: Client,
    api_key: String,
    api_secret: String,
    passphrase: String,
    is_demo: bool,
}

impl OkxExchange {
    pub fn new(settings: &OkxSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            passphrase: settings.passphrase.clone(),
            is_demo: settings.is_demo,
        })
    }

    fn generate_signature(&self, timestamp: &str, method: &Method, path: &str, body: &str) -> String {
        let sign_payload = format!("{}{}{}{}", timestamp, method.as_str(), path, body);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(sign_payload.as_bytes());
        base64::encode(mac.finalize().into_bytes())
    }

    async fn send_request(
        &self,
        method: Method,
        path: &str,
        body: &str,
        signed: bool,
    ) -> Result<serde_json::Value, ExchangeError> {
        let url = format!("{}{}", OKX_BASE_URL, path);
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");

        if signed {
            let timestamp = chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string();
            let signature = self.generate_signature(&timestamp, &method, path, body);
            builder = builder
                .header("OK-ACCESS-KEY", &self.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", &self.passphrase);
        }
        // 模拟盘开关
        if self.is_demo {
            builder = builder.header("x-simulated-trading", "1");
        }
        if !body.is_empty() {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout
            } else {
                ExchangeError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transient(e.to_string()))?;
        debug!("okx path:{} status:{} body_len:{}", path, status, text.len());

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ExchangeError::Transient(format!("okx {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(ExchangeError::Permanent(format!("okx {}: {}", status, text)));
        }

        let envelope: OkxEnvelope = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Transient(format!("okx decode failed: {}", e)))?;
        match envelope.code.as_str() {
            "0" => Ok(envelope.data),
            // 50011: 限流
            "50011" => Err(ExchangeError::RateLimited),
            code => Err(ExchangeError::Permanent(format!(
                "okx code {}: {}",
                code, envelope.msg
            ))),
        }
    }

    fn bar_param(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
        }
    }

    fn parse_decimal(value: &serde_json::Value) -> Option<Decimal> {
        value.as_str().and_then(|s| s.parse::<Decimal>().ok())
    }

    fn parse_f64(value: &serde_json::Value) -> Option<f64> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    fn parse_i64(value: &serde_json::Value) -> Option<i64> {
        match value {
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// OKX 订单状态 + 成交量推导统一状态字符串
    fn map_order_state(row: &serde_json::Value) -> VenueOrderState {
        let filled = Self::parse_f64(&row["accFillSz"]).unwrap_or(0.0);
        let amount = Self::parse_f64(&row["sz"]).unwrap_or(0.0);
        let state = row["state"].as_str().unwrap_or("");
        let status = match state {
            "canceled" => "CANCELED".to_string(),
            "filled" => "FILLED".to_string(),
            "partially_filled" => "PARTIALLY_FILLED".to_string(),
            "live" => {
                if filled > 0.0 {
                    "PARTIALLY_FILLED".to_string()
                } else {
                    "ACCEPTED".to_string()
                }
            }
            other => other.to_uppercase(),
        };
        VenueOrderState {
            exchange_order_id: row["ordId"].as_str().map(|s| s.to_string()),
            client_order_id: row["clOrdId"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            status,
            filled,
            amount,
            avg_price: Self::parse_f64(&row["avgPx"]),
            fee: Self::parse_f64(&row["fee"]).map(f64::abs),
            fee_currency: row["feeCcy"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            ts: Self::parse_i64(&row["uTime"])
                .or_else(|| Self::parse_i64(&row["cTime"]))
                .unwrap_or_else(now_ms),
            raw: row.clone(),
        }
    }
}

#[async_trait]
impl Exchange for OkxExchange {
    fn name(&self) -> &'static str {
        "okx"
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut path = format!(
            "/api/v5/market/history-candles?instId={}&bar={}&limit={}",
            symbol,
            Self::bar_param(timeframe),
            limit.min(300)
        );
        if let Some(since) = since_ms {
            // before 返回比该时间戳更新的数据
            path.push_str(&format!("&before={}", since - 1));
        }
        let data = self.send_request(Method::GET, &path, "", false).await?;
        let rows = data.as_array().cloned().unwrap_or_default();

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let cols = match row.as_array() {
                Some(cols) if cols.len() >= 6 => cols.clone(),
                _ => continue,
            };
            // 尾列 confirm=0 表示未收盘，丢弃
            if let Some(confirm) = cols.get(8).and_then(|v| v.as_str()) {
                if confirm == "0" {
                    continue;
                }
            }
            let ts = match Self::parse_i64(&cols[0]) {
                Some(ts) => ts,
                None => continue,
            };
            let (open, high, low, close, volume) = match (
                Self::parse_decimal(&cols[1]),
                Self::parse_decimal(&cols[2]),
                Self::parse_decimal(&cols[3]),
                Self::parse_decimal(&cols[4]),
                Self::parse_decimal(&cols[5]),
            ) {
                (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
                _ => continue,
            };
            candles.push(Candle {
                symbol: symbol.to_string(),
                timeframe,
                ts,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        // OKX 返回新在前，转为升序
        candles.sort_by_key(|c| c.ts);
        if let Some(since) = since_ms {
            candles.retain(|c| c.ts >= since);
        }
        Ok(candles)
    }

    async fn fetch_funding(&self, symbol: &str) -> Result<FundingRate, ExchangeError> {
        let path = format!("/api/v5/public/funding-rate?instId={}", symbol);
        let data = self.send_request(Method::GET, &path, "", false).await?;
        let row = data
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| ExchangeError::Transient("empty funding response".to_string()))?;
        let rate = Self::parse_decimal(&row["fundingRate"])
            .ok_or_else(|| ExchangeError::Transient("missing fundingRate".to_string()))?;
        Ok(FundingRate {
            symbol: symbol.to_string(),
            ts: Self::parse_i64(&row["fundingTime"]).unwrap_or_else(now_ms),
            rate,
            next_funding_ts: Self::parse_i64(&row["nextFundingTime"]),
        })
    }

    async fn fetch_mark_index_last(&self, symbol: &str) -> Result<PriceSnapshot, ExchangeError> {
        let ticker_path = format!("/api/v5/market/ticker?instId={}", symbol);
        let ticker = self.send_request(Method::GET, &ticker_path, "", false).await?;
        let ticker_row = ticker.as_array().and_then(|rows| rows.first()).cloned();

        let mark_path = format!(
            "/api/v5/public/mark-price?instType=SWAP&instId={}",
            symbol
        );
        // 标记价失败时降级为只记录 last
        let mark_row = match self.send_request(Method::GET, &mark_path, "", false).await {
            Ok(data) => data.as_array().and_then(|rows| rows.first()).cloned(),
            Err(_) => None,
        };

        let last = ticker_row
            .as_ref()
            .and_then(|row| Self::parse_decimal(&row["last"]));
        let index = ticker_row
            .as_ref()
            .and_then(|row| Self::parse_decimal(&row["idxPx"]));
        let mark = mark_row
            .as_ref()
            .and_then(|row| Self::parse_decimal(&row["markPx"]));
        let ts = ticker_row
            .as_ref()
            .and_then(|row| Self::parse_i64(&row["ts"]))
            .unwrap_or_else(now_ms);

        if last.is_none() && mark.is_none() && index.is_none() {
            return Err(ExchangeError::Transient("empty ticker response".to_string()));
        }
        Ok(PriceSnapshot {
            symbol: symbol.to_string(),
            ts,
            last,
            mark,
            index,
        })
    }

    async fn fetch_balances(&self) -> Result<Vec<VenueBalance>, ExchangeError> {
        let data = self
            .send_request(Method::GET, "/api/v5/account/balance", "", true)
            .await?;
        let mut balances = Vec::new();
        if let Some(details) = data
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| row["details"].as_array())
        {
            for detail in details {
                let currency = match detail["ccy"].as_str() {
                    Some(c) => c.to_string(),
                    None => continue,
                };
                let total = match Self::parse_f64(&detail["eq"])
                    .or_else(|| Self::parse_f64(&detail["cashBal"]))
                {
                    Some(t) => t,
                    None => continue,
                };
                balances.push(VenueBalance {
                    currency,
                    total,
                    free: Self::parse_f64(&detail["availBal"]),
                    used: Self::parse_f64(&detail["frozenBal"]),
                });
            }
        }
        Ok(balances)
    }

    async fn fetch_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<VenuePosition>, ExchangeError> {
        let mut path = "/api/v5/account/positions?instType=SWAP".to_string();
        if let Some(symbol) = symbol {
            path.push_str(&format!("&instId={}", symbol));
        }
        let data = self.send_request(Method::GET, &path, "", true).await?;
        let mut positions = Vec::new();
        for row in data.as_array().cloned().unwrap_or_default() {
            let symbol = match row["instId"].as_str() {
                Some(s) => s.to_string(),
                None => continue,
            };
            let size = Self::parse_f64(&row["pos"]).unwrap_or(0.0);
            if size == 0.0 {
                continue;
            }
            let side = match row["posSide"].as_str() {
                Some("long") => "LONG".to_string(),
                Some("short") => "SHORT".to_string(),
                // net 模式按符号判方向
                _ => {
                    if size > 0.0 {
                        "LONG".to_string()
                    } else {
                        "SHORT".to_string()
                    }
                }
            };
            positions.push(VenuePosition {
                symbol,
                side,
                size: size.abs(),
                entry_price: Self::parse_f64(&row["avgPx"]).unwrap_or(0.0),
                mark_price: Self::parse_f64(&row["markPx"]),
                unrealized_pnl: Self::parse_f64(&row["upl"]),
                leverage: Self::parse_f64(&row["lever"]),
                margin: Self::parse_f64(&row["margin"]).or_else(|| Self::parse_f64(&row["imr"])),
                liquidation_price: Self::parse_f64(&row["liqPx"]),
                raw: row.clone(),
            });
        }
        Ok(positions)
    }

    async fn submit_order(&self, req: &VenueOrderRequest) -> Result<VenueOrderAck, ExchangeError> {
        let mut body = serde_json::json!({
            "instId": req.symbol,
            "tdMode": req.td_mode,
            "clOrdId": req.client_order_id,
            "side": req.side.as_str().to_lowercase(),
            "ordType": req.order_type.as_str().to_lowercase(),
            "sz": req.quantity.to_string(),
        });
        if let Some(price) = req.price {
            body["px"] = serde_json::json!(price.to_string());
        }
        if let Some(pos_side) = &req.pos_side {
            body["posSide"] = serde_json::json!(pos_side);
        }
        if req.reduce_only {
            body["reduceOnly"] = serde_json::json!(true);
        }

        let data = self
            .send_request(Method::POST, "/api/v5/trade/order", &body.to_string(), true)
            .await?;
        let row = data
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| ExchangeError::Transient("empty order response".to_string()))?;
        let s_code = row["sCode"].as_str().unwrap_or("0");
        if s_code != "0" {
            let msg = row["sMsg"].as_str().unwrap_or("order rejected");
            return Err(ExchangeError::Permanent(format!("okx sCode {}: {}", s_code, msg)));
        }
        let exchange_order_id = row["ordId"]
            .as_str()
            .ok_or_else(|| ExchangeError::Transient("missing ordId".to_string()))?
            .to_string();
        Ok(VenueOrderAck {
            exchange_order_id,
            status: "ACCEPTED".to_string(),
        })
    }

    async fn fetch_order(
        &self,
        symbol: &str,
        exchange_order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<VenueOrderState, ExchangeError> {
        let mut path = format!("/api/v5/trade/order?instId={}", symbol);
        match (exchange_order_id, client_order_id) {
            (Some(ord_id), _) => path.push_str(&format!("&ordId={}", ord_id)),
            (None, Some(cl_ord_id)) => path.push_str(&format!("&clOrdId={}", cl_ord_id)),
            (None, None) => {
                return Err(ExchangeError::Permanent(
                    "fetch_order requires an order id".to_string(),
                ))
            }
        }
        let data = self.send_request(Method::GET, &path, "", true).await?;
        let row = data
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| ExchangeError::Permanent("order not found".to_string()))?;
        Ok(Self::map_order_state(row))
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<VenueOrderState>, ExchangeError> {
        let path = format!("/api/v5/trade/orders-pending?instId={}", symbol);
        let data = self.send_request(Method::GET, &path, "", true).await?;
        Ok(data
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(Self::map_order_state)
            .collect())
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        exchange_order_id: &str,
    ) -> Result<(), ExchangeError> {
        let body = serde_json::json!({
            "instId": symbol,
            "ordId": exchange_order_id,
        });
        self.send_request(
            Method::POST,
            "/api/v5/trade/cancel-order",
            &body.to_string(),
            true,
        )
        .await?;
        Ok(())
    }
}
