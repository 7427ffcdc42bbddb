//! 命令行定义

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about = "Alpha Arena 单币永续交易核心")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 应用未执行的数据库迁移
    Migrate,
    /// 一次性回补历史数据
    Ingest(IngestArgs),
    /// 启动交易循环
    Daemon(DaemonArgs),
    /// 运行回测并落库
    Backtest(BacktestArgs),
}

#[derive(Args)]
pub struct IngestArgs {
    /// 交易对，如 BTC-USDT-SWAP
    #[arg(long)]
    pub symbol: Option<String>,
    /// 逗号分隔的周期列表，如 15m,1h,4h
    #[arg(long)]
    pub timeframes: Option<String>,
    /// 回补天数
    #[arg(long, default_value_t = 30)]
    pub since_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutorKind {
    Simulated,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionMode {
    Portfolio,
    Llm,
}

#[derive(Args)]
pub struct DaemonArgs {
    #[arg(long)]
    pub symbol: Option<String>,
    /// 决策周期
    #[arg(long, default_value = "1h")]
    pub timeframe: String,
    #[arg(long, value_enum, default_value_t = ExecutorKind::Simulated)]
    pub executor: ExecutorKind,
    #[arg(long, value_enum, default_value_t = DecisionMode::Portfolio)]
    pub decision_mode: DecisionMode,
}

#[derive(Args)]
pub struct BacktestArgs {
    #[arg(long)]
    pub symbol: Option<String>,
    #[arg(long, default_value = "1h")]
    pub timeframe: String,
    #[arg(long, default_value = "ema_trend")]
    pub strategy: String,
    /// 开始时间，RFC3339 或毫秒时间戳
    #[arg(long)]
    pub start: String,
    /// 结束时间，RFC3339 或毫秒时间戳
    #[arg(long)]
    pub end: String,
    #[arg(long, default_value_t = 10_000.0)]
    pub capital: f64,
    #[arg(long, default_value_t = 0.0005)]
    pub fee: f64,
    /// 滑点（基点）
    #[arg(long, default_value_t = 0.0)]
    pub slippage_bps: f64,
    /// 是否计提资金费
    #[arg(long, default_value_t = false)]
    pub funding: bool,
}

/// 解析 RFC3339 或毫秒时间戳
pub fn parse_time(input: &str) -> anyhow::Result<i64> {
    if let Ok(ms) = input.parse::<i64>() {
        return Ok(ms);
    }
    let parsed = chrono::DateTime::parse_from_rfc3339(input)
        .map_err(|e| anyhow::anyhow!("invalid time '{}': {}", input, e))?;
    Ok(parsed.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_accepts_both_forms() {
        assert_eq!(parse_time("1704067200000").unwrap(), 1_704_067_200_000);
        assert_eq!(
            parse_time("2024-01-01T00:00:00Z").unwrap(),
            1_704_067_200_000
        );
        assert!(parse_time("yesterday").is_err());
    }
}
