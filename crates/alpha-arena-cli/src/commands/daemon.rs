//! daemon 子命令：并行交易循环
//!
//! 循环拓扑：K线拉取 / 衍生品拉取 / 完整性扫描 / 修复工作者 /
//! 决策周期 / 账户同步 / 订单同步，各自独立节拍，互不阻塞。
//! 决策周期内部有重入保护：上一轮未结束时跳过本轮。

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Duration;
use tracing::{error, info, warn};

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_core::config::settings::get_settings;
use alpha_arena_core::config::shutdown_manager::ShutdownManager;
use alpha_arena_core::database::sqlx_pool::{close_db_pool, get_db_pool};
use alpha_arena_decision::{
    FeedbackAnalyzer, LlmDecisionEngine, LlmOutcome, PerformanceScores, PortfolioScheduler,
    SchedulerConfig, SchedulerContext, SchedulerOutcome,
};
use alpha_arena_decision::llm::ProposalRequest;
use alpha_arena_domain::{
    Decision, DecisionSource, Exchange, MarketSnapshot, Position, Timeframe,
};
use alpha_arena_execution::allocator::AllocatorConfig;
use alpha_arena_execution::{
    AccountSync, LiveExecutor, LiveExecutorConfig, OrderExecutor, OrderIntent, OrderLocks,
    OrderSync, PortfolioAllocator, SimulatedExecutor, SlippageModel,
};
use alpha_arena_infrastructure::repositories::{
    BalanceRepository, DecisionRepository, PositionRepository, TradeRepository,
};
use alpha_arena_infrastructure::OkxExchange;
use alpha_arena_market::ingest::{IngestConfig, IngestService};
use alpha_arena_market::{DataService, IntegrityService, RepairWorker};
use alpha_arena_risk::{RiskCheckContext, RiskGate};
use alpha_arena_strategies::{RegimeClassifier, RegimeReading, RegimeThresholds, StrategyRegistry};

use crate::app::{DaemonArgs, DecisionMode, ExecutorKind};
use crate::exit_codes;
use crate::scheduler::TaskScheduler;

/// 决策周期共享的上下文
struct CycleContext {
    symbol: String,
    timeframe: Timeframe,
    data: DataService,
    registry: StrategyRegistry,
    classifier: RegimeClassifier,
    scheduler: PortfolioScheduler,
    allocator: PortfolioAllocator,
    risk_gate: RiskGate,
    decisions: DecisionRepository,
    positions: PositionRepository,
    balances: BalanceRepository,
    trades: TradeRepository,
    feedback: FeedbackAnalyzer,
    llm: Option<LlmDecisionEngine>,
    executor: Arc<dyn OrderExecutor>,
    simulated: Option<Arc<SimulatedExecutor>>,
    live_routing: bool,
    trading_enabled: Arc<AtomicBool>,
}

pub async fn run(args: DaemonArgs) -> anyhow::Result<u8> {
    let settings = get_settings();
    let symbol = args
        .symbol
        .clone()
        .unwrap_or_else(|| settings.okx.default_symbol.clone());
    let timeframe = match Timeframe::from_str(&args.timeframe) {
        Ok(tf) => tf,
        Err(e) => {
            error!("无效周期: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    // 启动时杀开关检查：实盘执行要求显式打开
    if args.executor == ExecutorKind::Live && !settings.trading_enabled {
        error!("TRADING_ENABLED=false，拒绝以 live 执行器启动");
        return Ok(exit_codes::KILL_SWITCH);
    }

    let pool = get_db_pool().clone();
    let exchange: Arc<dyn Exchange> = Arc::new(OkxExchange::new(&settings.okx)?);
    let locks = OrderLocks::new();
    let trading_enabled = Arc::new(AtomicBool::new(settings.trading_enabled));

    // 执行器
    let (executor, simulated): (Arc<dyn OrderExecutor>, Option<Arc<SimulatedExecutor>>) =
        match args.executor {
            ExecutorKind::Simulated => {
                let sim = Arc::new(SimulatedExecutor::new(
                    pool.clone(),
                    0.0005,
                    SlippageModel::FixedBps(2.0),
                ));
                (sim.clone(), Some(sim))
            }
            ExecutorKind::Live => {
                let live = Arc::new(LiveExecutor::new(
                    pool.clone(),
                    exchange.clone(),
                    locks.clone(),
                    LiveExecutorConfig {
                        td_mode: settings.okx.td_mode.clone(),
                        pos_mode: settings.okx.pos_mode.clone(),
                        wait_fill: settings.okx.wait_fill,
                        fill_timeout_s: settings.okx.fill_timeout_s,
                        fill_interval_s: settings.okx.fill_interval_s,
                        max_submit_retries: 3,
                    },
                    trading_enabled.clone(),
                ));
                (live, None)
            }
        };

    let llm = if args.decision_mode == DecisionMode::Llm {
        let engine = LlmDecisionEngine::new(pool.clone(), settings.llm.clone())?;
        if !engine.is_configured() {
            error!("decision-mode=llm 但 LLM_API_KEY/LLM_MODEL 未配置");
            return Ok(exit_codes::CONFIG_ERROR);
        }
        Some(engine)
    } else {
        None
    };

    let thresholds = RegimeThresholds {
        adx_trend: settings.regime.adx_trend_threshold,
        adx_range: settings.regime.adx_range_threshold,
        bb_width: settings.regime.bb_width_threshold,
        vol_kill: settings.regime.vol_kill_threshold,
        ema_slope: settings.regime.ema_slope_threshold,
    };
    let ctx = Arc::new(CycleContext {
        symbol: symbol.clone(),
        timeframe,
        data: DataService::new(pool.clone()),
        registry: StrategyRegistry::with_defaults(),
        classifier: RegimeClassifier::new(thresholds),
        scheduler: PortfolioScheduler::new(SchedulerConfig {
            top_k: settings.portfolio.top_k,
            min_score: settings.portfolio.min_score,
            global_leverage: settings.portfolio.global_leverage,
            diff_threshold_bps: settings.portfolio.diff_threshold_bps,
            min_notional: settings.portfolio.min_notional,
            regime_weight: settings.portfolio.regime_weight,
            performance_weight: settings.portfolio.performance_weight,
        }),
        allocator: PortfolioAllocator::new(AllocatorConfig {
            min_notional: settings.portfolio.min_notional,
            leverage: settings.portfolio.global_leverage,
        }),
        risk_gate: RiskGate::new(pool.clone(), &settings.risk),
        decisions: DecisionRepository::new(pool.clone()),
        positions: PositionRepository::new(pool.clone()),
        balances: BalanceRepository::new(pool.clone()),
        trades: TradeRepository::new(pool.clone()),
        feedback: FeedbackAnalyzer::new(pool.clone()),
        llm,
        executor,
        simulated,
        live_routing: args.executor == ExecutorKind::Live,
        trading_enabled,
    });

    let ingest = Arc::new(IngestService::new(
        pool.clone(),
        exchange.clone(),
        IngestConfig {
            batch_limit: settings.ingest_batch_limit,
            initial_backfill_days: settings.initial_backfill_days,
            max_retries: settings.ingest_max_retries,
        },
    ));
    let integrity = Arc::new(IntegrityService::new(pool.clone()));
    let repair = Arc::new(RepairWorker::new(
        pool.clone(),
        exchange.clone(),
        settings.ingest_batch_limit,
    ));
    let key_tail: String = settings
        .okx
        .api_key
        .chars()
        .rev()
        .take(6)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let account_id = if key_tail.is_empty() {
        "okx-default".to_string()
    } else {
        format!("okx-{}", key_tail)
    };
    let account_sync = Arc::new(AccountSync::new(
        pool.clone(),
        exchange.clone(),
        account_id,
        settings.position_drift_tolerance,
    ));
    let order_sync = Arc::new(OrderSync::new(
        pool.clone(),
        exchange.clone(),
        locks.clone(),
        settings.reconcile_grace_s,
    ));

    let mut ingest_timeframes = vec![timeframe];
    for raw in &settings.okx.timeframes {
        if let Ok(tf) = Timeframe::from_str(raw) {
            if !ingest_timeframes.contains(&tf) {
                ingest_timeframes.push(tf);
            }
        }
    }

    let mut scheduler = TaskScheduler::new();

    // K线拉取循环：单循环内的失败不影响其他循环
    {
        let ingest = ingest.clone();
        let symbol = symbol.clone();
        let timeframes = ingest_timeframes.clone();
        scheduler.add_periodic_task(
            "candle_ingest",
            Duration::from_secs(settings.intervals.ingest),
            move || {
                let ingest = ingest.clone();
                let symbol = symbol.clone();
                let timeframes = timeframes.clone();
                async move {
                    for tf in &timeframes {
                        if let Err(e) = ingest.sync_candles(&symbol, *tf).await {
                            warn!("candle ingest {} {} failed: {:#}", symbol, tf, e);
                        }
                    }
                }
            },
        );
    }

    // 衍生品拉取循环
    {
        let ingest = ingest.clone();
        let symbol = symbol.clone();
        scheduler.add_periodic_task(
            "derivatives_ingest",
            Duration::from_secs(settings.intervals.derivatives),
            move || {
                let ingest = ingest.clone();
                let symbol = symbol.clone();
                async move {
                    if let Err(e) = ingest.sync_derivatives(&symbol).await {
                        warn!("derivatives ingest failed: {:#}", e);
                    }
                }
            },
        );
    }

    // 完整性扫描循环（发现缺口即入队修复）
    {
        let integrity = integrity.clone();
        let symbol = symbol.clone();
        let timeframes = ingest_timeframes.clone();
        scheduler.add_periodic_task(
            "integrity_scan",
            Duration::from_secs(settings.intervals.integrity_scan),
            move || {
                let integrity = integrity.clone();
                let symbol = symbol.clone();
                let timeframes = timeframes.clone();
                async move {
                    if let Err(e) = integrity.scan(&symbol, &timeframes, None, true).await {
                        warn!("integrity scan failed: {:#}", e);
                    }
                }
            },
        );
    }

    // 修复工作者循环
    {
        let repair = repair.clone();
        scheduler.add_periodic_task(
            "repair_worker",
            Duration::from_secs(settings.intervals.repair),
            move || {
                let repair = repair.clone();
                async move {
                    if let Err(e) = repair.run_once().await {
                        warn!("repair worker failed: {:#}", e);
                    }
                }
            },
        );
    }

    // 决策周期（重入跳过）
    {
        let ctx = ctx.clone();
        let cycle_running = Arc::new(AtomicBool::new(false));
        scheduler.add_periodic_task(
            "decision_cycle",
            Duration::from_secs(settings.intervals.decision),
            move || {
                let ctx = ctx.clone();
                let running = cycle_running.clone();
                async move {
                    if running
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        info!("decision cycle still running, tick skipped");
                        return;
                    }
                    if let Err(e) = decision_cycle(&ctx).await {
                        error!("decision cycle failed: {:#}", e);
                    }
                    running.store(false, Ordering::Release);
                }
            },
        );
    }

    // 对账循环：仅实盘
    if args.executor == ExecutorKind::Live {
        {
            let account_sync = account_sync.clone();
            let symbol = symbol.clone();
            scheduler.add_periodic_task(
                "account_sync",
                Duration::from_secs(settings.intervals.account),
                move || {
                    let account_sync = account_sync.clone();
                    let symbol = symbol.clone();
                    async move {
                        if let Err(e) = account_sync.run_once(&symbol).await {
                            warn!("account sync failed: {:#}", e);
                        }
                    }
                },
            );
        }
        {
            let order_sync = order_sync.clone();
            let symbol = symbol.clone();
            scheduler.add_periodic_task(
                "order_sync",
                Duration::from_secs(settings.intervals.order),
                move || {
                    let order_sync = order_sync.clone();
                    let symbol = symbol.clone();
                    async move {
                        if let Err(e) = order_sync.run_once(&symbol).await {
                            warn!("order sync failed: {:#}", e);
                        }
                    }
                },
            );
        }
    }

    info!(
        "daemon started: symbol={} timeframe={} executor={:?} decision={:?}",
        symbol, timeframe, args.executor, args.decision_mode
    );

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，开始优雅关闭");
    scheduler.shutdown().await;

    // 清理阶段带超时保护：数据库连接池收尾
    let manager = ShutdownManager::new_default();
    manager
        .register_shutdown_hook("db_cleanup".to_string(), || async {
            close_db_pool().await
        })
        .await;
    manager.shutdown().await?;
    Ok(exit_codes::OK)
}

/// 一次完整的决策周期：快照 -> 状态 -> 信号 -> 调度/LLM -> 风控 -> 执行
async fn decision_cycle(ctx: &CycleContext) -> anyhow::Result<()> {
    let snapshot = ctx
        .data
        .get_snapshot(&ctx.symbol, ctx.timeframe, 300)
        .await?;

    // 数据过期即降级 HOLD
    let stale_max = 2 * ctx.timeframe.interval_ms();
    if snapshot.is_stale(now_ms(), stale_max) {
        warn!(
            "market data stale (> {}ms), decision degraded to HOLD",
            stale_max
        );
        return Ok(());
    }

    let reading = ctx.classifier.classify(&snapshot.candles);
    let equity = ctx.balances.latest_total("USDT").await?.unwrap_or(0.0);
    if equity <= 0.0 {
        warn!("equity unavailable, skipping decision cycle");
        return Ok(());
    }
    let current = ctx.positions.get(&ctx.symbol).await?;
    let mark_price = snapshot.last_price().unwrap_or(0.0);
    if mark_price <= 0.0 {
        return Ok(());
    }
    let current_weight = current
        .as_ref()
        .map(|p| p.signed_notional(mark_price) / equity)
        .unwrap_or(0.0);

    // LLM 优先，拒绝时回落组合调度
    let decision = match self::llm_decision(ctx, &snapshot, &reading).await {
        Some(decision) => Some(decision),
        None => portfolio_decision(ctx, &snapshot, &reading, equity, current_weight).await?,
    };
    let decision = match decision {
        Some(decision) => decision,
        None => return Ok(()),
    };
    ctx.decisions.insert(&decision).await?;

    // 目标仓位 -> 子订单
    let intents = ctx
        .allocator
        .build_intents(&decision, equity, mark_price, current.as_ref());
    if intents.is_empty() {
        return Ok(());
    }

    if let Some(simulated) = &ctx.simulated {
        simulated.set_reference(mark_price, reading.atr_pct);
    }

    for intent in intents {
        // 先平后开的拆单之间仓位会变化，风控前重新读取
        let current = ctx.positions.get(&ctx.symbol).await?;
        match gate_check(ctx, &decision, &intent, equity, mark_price, current.as_ref()).await? {
            Ok(()) => {
                match ctx.executor.submit(&intent).await {
                    Ok(order) => info!(
                        "order {} {} {} -> {}",
                        order.client_order_id, intent.side, intent.quantity, order.status
                    ),
                    Err(e) => error!("order submit failed: {:#}", e),
                }
            }
            Err(block) => {
                warn!("decision dropped by risk gate: {}", block);
                // 平仓腿被拦截时不再继续开仓腿
                break;
            }
        }
    }
    Ok(())
}

async fn llm_decision(
    ctx: &CycleContext,
    snapshot: &MarketSnapshot,
    reading: &RegimeReading,
) -> Option<Decision> {
    let llm = ctx.llm.as_ref()?;
    let enabled = ctx.registry.enabled_ids();
    let feedback = ctx
        .feedback
        .summary(&ctx.symbol, ctx.timeframe, 20)
        .await
        .ok();

    let request = ProposalRequest {
        symbol: ctx.symbol.clone(),
        timeframe: ctx.timeframe.as_str().to_string(),
        regime: reading.regime.as_str().to_string(),
        last_price: snapshot.last_price().unwrap_or(0.0),
        indicators: serde_json::json!({
            "adx": reading.adx,
            "bb_width": reading.bb_width,
            "atr_pct": reading.atr_pct,
        }),
        enabled_strategies: ctx
            .registry
            .list_enabled()
            .iter()
            .map(|spec| {
                serde_json::json!({
                    "id": spec.key,
                    "name": spec.name,
                    "description": spec.description,
                })
            })
            .collect(),
        feedback_summary: feedback,
    };

    match llm.propose(&request, &enabled).await {
        LlmOutcome::Proposal(proposal) => Some(Decision {
            id: 0,
            ts: snapshot.last_ts().unwrap_or_else(now_ms),
            symbol: ctx.symbol.clone(),
            timeframe: ctx.timeframe,
            regime: proposal.regime,
            allocations: proposal.allocations,
            total_position: proposal.total_position,
            confidence: Some(proposal.confidence),
            reasoning: proposal.reasoning,
            source: DecisionSource::Llm,
            prompt_version: Some("v1".to_string()),
            model_version: Some(proposal.model_version),
        }),
        LlmOutcome::Rejected { reason } => {
            info!("LLM proposal rejected ({}), falling back to scheduler", reason);
            None
        }
    }
}

async fn portfolio_decision(
    ctx: &CycleContext,
    snapshot: &MarketSnapshot,
    reading: &RegimeReading,
    equity: f64,
    current_weight: f64,
) -> anyhow::Result<Option<Decision>> {
    let strategies = ctx.registry.enabled_strategies();
    let signals: Vec<_> = strategies
        .iter()
        .map(|s| (*s, s.signal(snapshot)))
        .collect();

    let performance = PerformanceScores::load(
        get_db_pool(),
        &ctx.symbol,
        ctx.timeframe,
        50,
    )
    .await
    .unwrap_or_default();

    let scheduler_ctx = SchedulerContext {
        ts: snapshot.last_ts().unwrap_or_else(now_ms),
        symbol: ctx.symbol.clone(),
        timeframe: ctx.timeframe,
        regime: reading.regime,
        equity,
        current_weight,
    };
    match ctx.scheduler.schedule(&scheduler_ctx, &signals, &performance) {
        SchedulerOutcome::Decide(decision) => Ok(Some(decision)),
        SchedulerOutcome::Hold { reason } => {
            info!("HOLD: {}", reason);
            Ok(None)
        }
    }
}

async fn gate_check(
    ctx: &CycleContext,
    decision: &Decision,
    intent: &OrderIntent,
    equity: f64,
    mark_price: f64,
    current: Option<&Position>,
) -> anyhow::Result<Result<(), alpha_arena_risk::RiskBlock>> {
    let now = now_ms();
    let day_start = now - now.rem_euclid(24 * 60 * 60 * 1000);
    let realized = ctx
        .trades
        .realized_pnl_between(&ctx.symbol, day_start, now)
        .await?;
    let daily_realized_loss = (-realized).max(0.0);

    // 连续亏损与距上次亏损的K线数
    let recent = ctx.trades.recent(&ctx.symbol, 20).await?;
    let mut loss_streak = 0i64;
    let mut last_loss_ts = None;
    for trade in &recent {
        match trade.realized_pnl.as_ref().map(|p| p.to_string().parse::<f64>().unwrap_or(0.0)) {
            Some(pnl) if pnl < 0.0 => {
                loss_streak += 1;
                if last_loss_ts.is_none() {
                    last_loss_ts = Some(trade.ts);
                }
            }
            Some(pnl) if pnl > 0.0 => break,
            _ => continue,
        }
    }
    let bars_since_last_loss = last_loss_ts
        .map(|ts| (now - ts) / ctx.timeframe.interval_ms())
        .unwrap_or(i64::MAX);

    let order_notional = intent.quantity * mark_price;
    let current_signed = current.map(|p| p.signed_notional(mark_price)).unwrap_or(0.0);
    let intent_signed = match intent.side {
        alpha_arena_domain::OrderSide::Buy => order_notional,
        alpha_arena_domain::OrderSide::Sell => -order_notional,
    };
    let resulting = (current_signed + intent_signed).abs();
    let resulting_leverage = if equity > 0.0 { resulting / equity } else { f64::MAX };
    // 反向开仓但未带 reduce_only 视为冲突
    let conflicting_position = !intent.reduce_only
        && current_signed != 0.0
        && intent_signed.signum() != current_signed.signum()
        && intent_signed.abs() > current_signed.abs();

    let risk_ctx = RiskCheckContext {
        ts: now,
        symbol: ctx.symbol.clone(),
        confidence: decision.confidence,
        order_notional,
        resulting_leverage,
        equity,
        daily_realized_loss,
        recent_loss_streak: loss_streak,
        bars_since_last_loss,
        trading_enabled: ctx.trading_enabled.load(Ordering::Acquire),
        is_closing: intent.reduce_only,
        conflicting_position,
        live_routing: ctx.live_routing,
    };
    ctx.risk_gate.check(&risk_ctx).await
}
