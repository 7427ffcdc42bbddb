//! 回测端到端：720根1h干净上涨行情跑 EMA 趋势策略，
//! 应当盈利、至少一笔成交、曲线首点等于初始资金，
//! 且同样输入重复运行结果一致。

use alpha_arena_core::database::migrations::migrate;
use alpha_arena_core::database::sqlx_pool::connect_pool;
use alpha_arena_domain::{Candle, Timeframe};
use alpha_arena_infrastructure::{BacktestRepository, CandleRepository};
use alpha_arena_backtest::{BacktestEngine, BacktestRequest};
use sqlx::SqlitePool;

/// 单边上涨 + 周期性小回调的确定性行情
fn uptrend_candles(n: usize, start_ts: i64) -> Vec<Candle> {
    let interval = Timeframe::H1.interval_ms();
    let mut closes = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    for i in 0..n {
        // 总体 +0.3%/bar，每7根回调一次
        let drift = if i % 7 == 6 { -0.004 } else { 0.004 };
        price *= 1.0 + drift;
        closes.push(price);
    }
    (0..n)
        .map(|i| {
            let close = closes[i];
            let open = if i == 0 { 100.0 } else { closes[i - 1] };
            let high = close.max(open) * 1.002;
            let low = close.min(open) * 0.998;
            // 周期性放量
            let volume = if i % 5 == 0 { 240.0 } else { 100.0 };
            Candle {
                symbol: "BTC-USDT-SWAP".to_string(),
                timeframe: Timeframe::H1,
                ts: start_ts + i as i64 * interval,
                open: format!("{:.6}", open).parse().unwrap(),
                high: format!("{:.6}", high).parse().unwrap(),
                low: format!("{:.6}", low).parse().unwrap(),
                close: format!("{:.6}", close).parse().unwrap(),
                volume: format!("{:.2}", volume).parse().unwrap(),
            }
        })
        .collect()
}

async fn seeded_pool() -> (SqlitePool, i64, i64) {
    let pool = connect_pool("sqlite::memory:").await.unwrap();
    migrate(&pool).await.unwrap();

    let interval = Timeframe::H1.interval_ms();
    // 2024-01-01T00:00Z
    let start_ts = 1_704_067_200_000_i64;
    let candles = uptrend_candles(720, start_ts);
    CandleRepository::new(pool.clone())
        .upsert_candles(&candles)
        .await
        .unwrap();
    (pool, start_ts, start_ts + 719 * interval)
}

fn request(start_ts: i64, end_ts: i64) -> BacktestRequest {
    let mut request = BacktestRequest::new("BTC-USDT-SWAP", Timeframe::H1, start_ts, end_ts);
    request.initial_capital = 10_000.0;
    request.fee_rate = 0.0005;
    request.slippage_bps = 0.0;
    // 温和放宽入场过滤，保证合成行情里能建仓
    request.strategy_params = Some(serde_json::json!({
        "rsi_min": 40.0,
        "rsi_max": 95.0,
        "volume_threshold": 0.8,
        "max_extension_atr": 5.0,
    }));
    request
}

#[tokio::test]
async fn clean_uptrend_is_profitable_and_persisted() {
    let (pool, start_ts, end_ts) = seeded_pool().await;
    let engine = BacktestEngine::new(pool.clone());
    let outcome = engine.run(&request(start_ts, end_ts)).await.unwrap();

    // 曲线首点等于初始资金
    assert_eq!(outcome.equity_curve[0].equity, 10_000.0);
    assert_eq!(outcome.equity_curve[0].ts, start_ts);

    // 盈利且至少一笔成交
    assert!(
        outcome.final_equity > 10_000.0,
        "final equity {} not profitable",
        outcome.final_equity
    );
    assert!(outcome.metrics.trade_count >= 1);

    // total_return 与 final/initial 一致（1e-6 容差）
    let expected = outcome.final_equity / 10_000.0 - 1.0;
    assert!((outcome.metrics.total_return - expected).abs() < 1e-6);

    // 回撤非负
    assert!(outcome.metrics.max_drawdown >= 0.0);
    assert!(outcome.equity_curve.iter().all(|p| p.drawdown >= 0.0));

    // 子表行数与交易日志一致
    let repo = BacktestRepository::new(pool);
    let persisted = repo.trade_count(outcome.backtest_id).await.unwrap();
    assert_eq!(persisted, outcome.metrics.trade_count);
}

#[tokio::test]
async fn identical_inputs_produce_identical_results() {
    let (pool, start_ts, end_ts) = seeded_pool().await;
    let engine = BacktestEngine::new(pool.clone());

    let first = engine.run(&request(start_ts, end_ts)).await.unwrap();
    let second = engine.run(&request(start_ts, end_ts)).await.unwrap();

    assert_eq!(first.final_equity, second.final_equity);
    assert_eq!(
        serde_json::to_string(&first.metrics).unwrap(),
        serde_json::to_string(&second.metrics).unwrap()
    );
    assert_eq!(first.equity_curve.len(), second.equity_curve.len());
}

#[tokio::test]
async fn empty_range_is_an_error() {
    let pool = connect_pool("sqlite::memory:").await.unwrap();
    migrate(&pool).await.unwrap();
    let engine = BacktestEngine::new(pool);
    let result = engine
        .run(&BacktestRequest::new("BTC-USDT-SWAP", Timeframe::H1, 0, 1_000_000))
        .await;
    assert!(result.is_err());
}
