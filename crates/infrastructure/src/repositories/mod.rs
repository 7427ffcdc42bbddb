//! sqlx 仓储实现
//!
//! Store 独占持久化行的所有权；其他组件只持有瞬态拷贝。
//! 金额字段以定点小数文本落库，读出时还原为 `Decimal`。

mod backtest_repository;
mod balance_repository;
mod candle_repository;
mod decision_repository;
mod funding_repository;
mod ingestion_repository;
mod integrity_repository;
mod llm_run_repository;
mod order_repository;
mod position_repository;
mod price_repository;
mod risk_event_repository;
mod trade_repository;

pub use backtest_repository::BacktestRepository;
pub use balance_repository::BalanceRepository;
pub use candle_repository::CandleRepository;
pub use decision_repository::DecisionRepository;
pub use funding_repository::FundingRepository;
pub use ingestion_repository::IngestionRunRepository;
pub use integrity_repository::IntegrityRepository;
pub use llm_run_repository::LlmRunRepository;
pub use order_repository::{LifecycleInput, OrderRepository};
pub use position_repository::PositionRepository;
pub use price_repository::PriceSnapshotRepository;
pub use risk_event_repository::RiskEventRepository;
pub use trade_repository::TradeRepository;

use rust_decimal::Decimal;

pub(crate) fn parse_dec(text: &str) -> anyhow::Result<Decimal> {
    text.parse::<Decimal>()
        .map_err(|e| anyhow::anyhow!("invalid decimal '{}': {}", text, e))
}

pub(crate) fn parse_dec_opt(text: &Option<String>) -> anyhow::Result<Option<Decimal>> {
    match text {
        Some(t) => Ok(Some(parse_dec(t)?)),
        None => Ok(None),
    }
}

pub(crate) fn dec_opt_string(value: &Option<Decimal>) -> Option<String> {
    value.as_ref().map(|d| d.to_string())
}
