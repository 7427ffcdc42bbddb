//! 回测结果实体

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{OrderSide, Timeframe};

/// 一次回测运行，连同子表在一个事务内写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub id: i64,
    pub run_id: String,
    pub created_at: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_ts: i64,
    pub end_ts: i64,
    pub initial_capital: Decimal,
    pub params_json: String,
    pub metrics_json: Option<String>,
    pub equity_curve_json: Option<String>,
    pub schema_version: i64,
}

/// 回测成交（一次完整开平仓）
///
/// `return_pct` 固定为比例（0.05 = 5%），展示层再换算百分比
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub id: i64,
    pub backtest_id: i64,
    pub side: OrderSide,
    pub entry_ts: i64,
    pub entry_price: Decimal,
    pub exit_ts: i64,
    pub exit_price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub pnl: Decimal,
    pub return_pct: f64,
    pub reason: String,
}

/// 回测持仓轨迹点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestPositionPoint {
    pub id: i64,
    pub backtest_id: i64,
    pub ts: i64,
    pub side: String,
    pub size: Decimal,
    pub entry_price: Decimal,
}

/// 回测期间的策略决策记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestDecisionRow {
    pub id: i64,
    pub backtest_id: i64,
    pub ts: i64,
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
}
