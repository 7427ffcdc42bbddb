//! backtest 子命令

use std::str::FromStr;

use tracing::{error, info};

use alpha_arena_backtest::{BacktestEngine, BacktestRequest};
use alpha_arena_core::config::settings::get_settings;
use alpha_arena_core::database::sqlx_pool::get_db_pool;
use alpha_arena_domain::Timeframe;
use alpha_arena_strategies::RegimeThresholds;

use crate::app::{parse_time, BacktestArgs};
use crate::exit_codes;

pub async fn run(args: BacktestArgs) -> anyhow::Result<u8> {
    let settings = get_settings();
    let symbol = args
        .symbol
        .unwrap_or_else(|| settings.okx.default_symbol.clone());
    let timeframe = match Timeframe::from_str(&args.timeframe) {
        Ok(tf) => tf,
        Err(e) => {
            error!("无效周期: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let (start_ts, end_ts) = match (parse_time(&args.start), parse_time(&args.end)) {
        (Ok(start), Ok(end)) if start < end => (start, end),
        (Ok(_), Ok(_)) => {
            error!("start 必须早于 end");
            return Ok(exit_codes::CONFIG_ERROR);
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("时间解析失败: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let mut request = BacktestRequest::new(&symbol, timeframe, start_ts, end_ts);
    request.initial_capital = args.capital;
    request.strategy_id = args.strategy.clone();
    request.fee_rate = args.fee;
    request.slippage_bps = args.slippage_bps;
    request.funding_enabled = args.funding;

    let thresholds = RegimeThresholds {
        adx_trend: settings.regime.adx_trend_threshold,
        adx_range: settings.regime.adx_range_threshold,
        bb_width: settings.regime.bb_width_threshold,
        vol_kill: settings.regime.vol_kill_threshold,
        ema_slope: settings.regime.ema_slope_threshold,
    };
    let engine = BacktestEngine::new(get_db_pool().clone()).with_regime_thresholds(thresholds);

    let outcome = engine.run(&request).await?;
    info!(
        "回测完成 run_id={} 总收益 {:.2}% 最大回撤 {:.2}% 交易 {} 笔 胜率 {:.1}%",
        outcome.run_id,
        outcome.metrics.total_return * 100.0,
        outcome.metrics.max_drawdown * 100.0,
        outcome.metrics.trade_count,
        outcome.metrics.win_rate * 100.0
    );
    println!("Backtest Summary");
    println!("Symbol: {} | Timeframe: {}", symbol, timeframe);
    println!("Strategy: {}", args.strategy);
    println!("Total Return: {:.2}%", outcome.metrics.total_return * 100.0);
    println!("Max Drawdown: {:.2}%", outcome.metrics.max_drawdown * 100.0);
    println!("Sharpe: {:.2}", outcome.metrics.sharpe);
    println!("Total Trades: {}", outcome.metrics.trade_count);
    println!("Win Rate: {:.2}%", outcome.metrics.win_rate * 100.0);
    println!("Backtest ID: {} (run {})", outcome.backtest_id, outcome.run_id);
    Ok(exit_codes::OK)
}
