//! ingest 子命令：一次性回补

use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info};

use alpha_arena_core::config::settings::get_settings;
use alpha_arena_core::database::sqlx_pool::get_db_pool;
use alpha_arena_domain::Timeframe;
use alpha_arena_infrastructure::OkxExchange;
use alpha_arena_market::ingest::{IngestConfig, IngestService};

use crate::app::IngestArgs;
use crate::exit_codes;

pub async fn run(args: IngestArgs) -> anyhow::Result<u8> {
    let settings = get_settings();
    let symbol = args
        .symbol
        .unwrap_or_else(|| settings.okx.default_symbol.clone());
    let timeframe_list = match &args.timeframes {
        Some(csv) => csv.split(',').map(|s| s.trim().to_string()).collect(),
        None => settings.okx.timeframes.clone(),
    };
    let mut timeframes = Vec::new();
    for raw in &timeframe_list {
        match Timeframe::from_str(raw) {
            Ok(tf) => timeframes.push(tf),
            Err(e) => {
                error!("无效周期 {}: {}", raw, e);
                return Ok(exit_codes::CONFIG_ERROR);
            }
        }
    }

    let exchange = Arc::new(OkxExchange::new(&settings.okx)?);
    let config = IngestConfig {
        batch_limit: settings.ingest_batch_limit,
        initial_backfill_days: args.since_days,
        max_retries: settings.ingest_max_retries,
    };
    let service = IngestService::new(get_db_pool().clone(), exchange, config);

    let mut venue_failures = 0usize;
    for timeframe in &timeframes {
        match service.sync_candles(&symbol, *timeframe).await {
            Ok(inserted) => info!("backfill {} {}: {} bars", symbol, timeframe, inserted),
            Err(e) => {
                error!("backfill {} {} failed: {:#}", symbol, timeframe, e);
                venue_failures += 1;
            }
        }
    }
    if let Err(e) = service.sync_derivatives(&symbol).await {
        error!("derivatives backfill failed: {:#}", e);
    }

    if venue_failures == timeframes.len() && !timeframes.is_empty() {
        return Ok(exit_codes::VENUE_UNREACHABLE);
    }
    Ok(exit_codes::OK)
}
