//! 缺口检测与修复的端到端验证：
//! 100根15mK线中挖掉第50..53根，扫描应产出恰好一条 missing_bars=4 的 GAP，
//! 修复完成后再次扫描不再有新缺口。

use std::sync::Arc;

use alpha_arena_core::database::migrations::migrate;
use alpha_arena_core::database::sqlx_pool::connect_pool;
use alpha_arena_domain::{Candle, IntegrityEventType, RepairStatus, Timeframe};
use alpha_arena_infrastructure::{CandleRepository, IntegrityRepository, SimulatedExchange};
use alpha_arena_market::{IntegrityService, RepairWorker};

fn candle(ts: i64) -> Candle {
    Candle {
        symbol: "BTC-USDT-SWAP".to_string(),
        timeframe: Timeframe::M15,
        ts,
        open: "100".parse().unwrap(),
        high: "101".parse().unwrap(),
        low: "99".parse().unwrap(),
        close: "100.5".parse().unwrap(),
        volume: "3".parse().unwrap(),
    }
}

#[tokio::test]
async fn scan_repair_scan_clears_gap() {
    let pool = connect_pool("sqlite::memory:").await.unwrap();
    migrate(&pool).await.unwrap();

    let interval = Timeframe::M15.interval_ms();
    let base = 1_700_000_100_000_i64 / interval * interval;
    let full: Vec<Candle> = (0..100).map(|i| candle(base + i as i64 * interval)).collect();

    // 交易所有完整数据，库里缺 50..=53
    let exchange = Arc::new(SimulatedExchange::new(false));
    exchange.seed_candles(full.clone());

    let with_hole: Vec<Candle> = full
        .iter()
        .enumerate()
        .filter(|(i, _)| !(50..=53).contains(i))
        .map(|(_, c)| c.clone())
        .collect();
    let candle_repo = CandleRepository::new(pool.clone());
    candle_repo.upsert_candles(&with_hole).await.unwrap();

    let range = (base, base + 99 * interval);
    let integrity = IntegrityService::new(pool.clone());
    let summary = integrity
        .scan("BTC-USDT-SWAP", &[Timeframe::M15], Some(range), true)
        .await
        .unwrap();
    assert_eq!(summary.gaps, 1);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(summary.enqueued_jobs.len(), 1);

    let integrity_repo = IntegrityRepository::new(pool.clone());
    let gaps = integrity_repo
        .events_since("BTC-USDT-SWAP", Timeframe::M15, IntegrityEventType::Gap, 0)
        .await
        .unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].missing_bars, 4);
    assert_eq!(gaps[0].start_ts, base + 50 * interval);
    assert_eq!(gaps[0].end_ts, base + 53 * interval);

    // 修复工作者跑一轮
    let worker = RepairWorker::new(pool.clone(), exchange, 300);
    let job_id = worker.run_once().await.unwrap().expect("one job claimed");
    let job = integrity_repo.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, RepairStatus::Done);
    assert_eq!(job.repaired_bars, 4);

    // REPAIR 事件引用了任务ID
    let repairs = integrity_repo
        .events_since("BTC-USDT-SWAP", Timeframe::M15, IntegrityEventType::Repair, 0)
        .await
        .unwrap();
    assert_eq!(repairs.len(), 1);
    assert_eq!(repairs[0].repair_job_id.as_deref(), Some(job_id.as_str()));

    // 修复后不再产生新缺口
    let rescan = integrity
        .scan("BTC-USDT-SWAP", &[Timeframe::M15], Some(range), false)
        .await
        .unwrap();
    assert_eq!(rescan.gaps, 0);
    assert_eq!(candle_repo.count("BTC-USDT-SWAP", Timeframe::M15).await.unwrap(), 100);
}
