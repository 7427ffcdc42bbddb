//! 回测引擎
//!
//! K线收盘出信号，下一根开盘按配置滑点成交；资金费率按结算期计提。
//! 运行结果连同成交、持仓轨迹、决策在一个事务内落库。

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use alpha_arena_common::utils::time::now_s;
use alpha_arena_common::CandleItem;
use alpha_arena_domain::{
    BacktestDecisionRow, BacktestPositionPoint, BacktestRun, BacktestTrade, Candle,
    MarketSnapshot, OrderSide, SignalIntent, Timeframe,
};
use alpha_arena_infrastructure::BacktestRepository;
use alpha_arena_market::DataService;
use alpha_arena_strategies::{RegimeClassifier, RegimeThresholds, StrategyRegistry};

use crate::metrics::{BacktestMetrics, ClosedTrade, EquityPoint};

const SCHEMA_VERSION: i64 = 1;

/// 回测请求
#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_ts: i64,
    pub end_ts: i64,
    pub initial_capital: f64,
    pub strategy_id: String,
    pub strategy_params: Option<serde_json::Value>,
    pub fee_rate: f64,
    pub slippage_bps: f64,
    pub funding_enabled: bool,
    /// 每次出信号时策略可见的K线窗口
    pub signal_window: usize,
    /// 时间止损：持仓满 N 根K线仍无有利波动则离场（0 关闭）
    pub time_stop_bars: usize,
}

impl BacktestRequest {
    pub fn new(symbol: &str, timeframe: Timeframe, start_ts: i64, end_ts: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            start_ts,
            end_ts,
            initial_capital: 10_000.0,
            strategy_id: "ema_trend".to_string(),
            strategy_params: None,
            fee_rate: 0.0005,
            slippage_bps: 0.0,
            funding_enabled: false,
            signal_window: 300,
            time_stop_bars: 24,
        }
    }
}

/// 回测产出
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub backtest_id: i64,
    pub run_id: String,
    pub final_equity: f64,
    pub metrics: BacktestMetrics,
    pub equity_curve: Vec<EquityPoint>,
}

/// 持仓内的账本
struct OpenPosition {
    direction: i8,
    entry_price: f64,
    entry_equity: f64,
    entry_ts: i64,
    entry_index: usize,
    quantity: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    /// 持仓期间最有利的价格（多头最高/空头最低）
    best_price: f64,
}

impl OpenPosition {
    /// 按止损距离反推一个 ATR 近似（止损默认 2 ATR）
    fn atr_proxy(&self) -> f64 {
        match self.stop_loss {
            Some(stop) => (self.entry_price - stop).abs() / 2.0,
            None => self.entry_price * 0.01,
        }
    }

    /// 有利波动是否仍不足 1 ATR
    fn lacks_favorable_excursion(&self) -> bool {
        let excursion = if self.direction == 1 {
            self.best_price - self.entry_price
        } else {
            self.entry_price - self.best_price
        };
        excursion < self.atr_proxy()
    }
}

pub struct BacktestEngine {
    data: DataService,
    repository: BacktestRepository,
    registry: StrategyRegistry,
    regime_thresholds: RegimeThresholds,
}

impl BacktestEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            data: DataService::new(pool.clone()),
            repository: BacktestRepository::new(pool),
            registry: StrategyRegistry::with_defaults(),
            regime_thresholds: RegimeThresholds::default(),
        }
    }

    pub fn with_regime_thresholds(mut self, thresholds: RegimeThresholds) -> Self {
        self.regime_thresholds = thresholds;
        self
    }

    pub async fn run(&self, request: &BacktestRequest) -> anyhow::Result<BacktestOutcome> {
        let candles = self
            .data
            .get_candles_range(
                &request.symbol,
                request.timeframe,
                request.start_ts,
                request.end_ts,
            )
            .await?;
        if candles.len() < 2 {
            return Err(anyhow::anyhow!(
                "not enough candles for backtest: {} bars in range",
                candles.len()
            ));
        }
        let items: Vec<CandleItem> = candles.iter().map(Candle::to_item).collect();

        let strategy = self
            .registry
            .build(&request.strategy_id, request.strategy_params.as_ref())?;
        let classifier = RegimeClassifier::new(self.regime_thresholds.clone());

        let funding = if request.funding_enabled {
            self.data
                .get_funding_history(&request.symbol, 5000)
                .await?
                .iter()
                .map(|f| f.to_view())
                .filter(|f| f.ts >= request.start_ts && f.ts <= request.end_ts)
                .collect()
        } else {
            Vec::new()
        };

        let mut equity = request.initial_capital;
        let mut position: Option<OpenPosition> = None;
        let mut funding_pnl = 0.0_f64;
        let mut peak = equity;

        let mut equity_curve: Vec<EquityPoint> = vec![EquityPoint {
            ts: items[0].ts(),
            equity,
            drawdown: 0.0,
        }];
        let mut closed_trades: Vec<ClosedTrade> = Vec::new();
        let mut trade_rows: Vec<BacktestTrade> = Vec::new();
        let mut position_rows: Vec<BacktestPositionPoint> = Vec::new();
        let mut decision_rows: Vec<BacktestDecisionRow> = Vec::new();

        for i in 0..items.len() - 1 {
            let next_bar = items[i + 1];
            let window_start = (i + 1).saturating_sub(request.signal_window);
            let window = &items[window_start..=i];

            // 与实盘共用的状态分类与门控
            let reading = classifier.classify(window);
            let snapshot = MarketSnapshot {
                symbol: request.symbol.clone(),
                timeframe: request.timeframe,
                candles: window.to_vec(),
                funding: funding_asof(&funding, items[i].ts()),
                funding_history: funding
                    .iter()
                    .filter(|f| f.ts <= items[i].ts())
                    .cloned()
                    .collect(),
                prices: None,
            };
            let mut signal = strategy.signal(&snapshot);
            if !strategy.accepts_regime(reading.regime) {
                // 状态不匹配的策略本周期视为 FLAT
                signal.intent = SignalIntent::Flat;
                signal.target_weight = 0.0;
            }
            if signal.is_actionable() {
                decision_rows.push(BacktestDecisionRow {
                    id: 0,
                    backtest_id: 0,
                    ts: items[i].ts(),
                    action: signal.intent.as_str().to_string(),
                    confidence: signal.confidence,
                    reasoning: signal.reason.clone(),
                });
            }

            // 持仓内的止损/止盈优先于信号（用下一根K线的高低近似触发）
            if let Some(open) = &mut position {
                open.best_price = if open.direction == 1 {
                    open.best_price.max(items[i].h())
                } else {
                    open.best_price.min(items[i].l())
                };
            }
            let stop_exit = position.as_ref().and_then(|open| stop_hit(open, &next_bar));
            if let Some(exit_price) = stop_exit {
                Self::close_position(
                    &mut equity,
                    &mut position,
                    exit_price,
                    next_bar.ts(),
                    request.fee_rate,
                    "stop",
                    &mut closed_trades,
                    &mut trade_rows,
                    &mut position_rows,
                );
            }

            // 时间止损：持仓过久且始终没有有利波动
            if request.time_stop_bars > 0 {
                let timed_out = position.as_ref().map_or(false, |open| {
                    i + 1 - open.entry_index >= request.time_stop_bars
                        && open.lacks_favorable_excursion()
                });
                if timed_out {
                    Self::close_position(
                        &mut equity,
                        &mut position,
                        next_bar.o(),
                        next_bar.ts(),
                        request.fee_rate,
                        "time_stop",
                        &mut closed_trades,
                        &mut trade_rows,
                        &mut position_rows,
                    );
                }
            }

            let exec_price = slip(next_bar.o(), &signal.intent, request.slippage_bps);
            match signal.intent {
                SignalIntent::Long => {
                    if position.as_ref().map(|p| p.direction) == Some(-1) {
                        Self::close_position(
                            &mut equity,
                            &mut position,
                            exec_price,
                            next_bar.ts(),
                            request.fee_rate,
                            "reverse_to_long",
                            &mut closed_trades,
                            &mut trade_rows,
                            &mut position_rows,
                        );
                    }
                    if position.is_none() {
                        Self::open_position(
                            &mut equity,
                            &mut position,
                            1,
                            exec_price,
                            next_bar.ts(),
                            i + 1,
                            request.fee_rate,
                            &signal.stop_loss,
                            &signal.take_profit,
                            &mut position_rows,
                        );
                    }
                }
                SignalIntent::Short => {
                    if position.as_ref().map(|p| p.direction) == Some(1) {
                        Self::close_position(
                            &mut equity,
                            &mut position,
                            exec_price,
                            next_bar.ts(),
                            request.fee_rate,
                            "reverse_to_short",
                            &mut closed_trades,
                            &mut trade_rows,
                            &mut position_rows,
                        );
                    }
                    if position.is_none() {
                        Self::open_position(
                            &mut equity,
                            &mut position,
                            -1,
                            exec_price,
                            next_bar.ts(),
                            i + 1,
                            request.fee_rate,
                            &signal.stop_loss,
                            &signal.take_profit,
                            &mut position_rows,
                        );
                    }
                }
                SignalIntent::CloseLong => {
                    if position.as_ref().map(|p| p.direction) == Some(1) {
                        Self::close_position(
                            &mut equity,
                            &mut position,
                            exec_price,
                            next_bar.ts(),
                            request.fee_rate,
                            "close_long",
                            &mut closed_trades,
                            &mut trade_rows,
                            &mut position_rows,
                        );
                    }
                }
                SignalIntent::CloseShort => {
                    if position.as_ref().map(|p| p.direction) == Some(-1) {
                        Self::close_position(
                            &mut equity,
                            &mut position,
                            exec_price,
                            next_bar.ts(),
                            request.fee_rate,
                            "close_short",
                            &mut closed_trades,
                            &mut trade_rows,
                            &mut position_rows,
                        );
                    }
                }
                SignalIntent::Flat => {}
            }

            // 资金费计提：落在 (bar_i, bar_i+1] 的结算期
            if request.funding_enabled {
                if let Some(open) = &position {
                    for event in funding
                        .iter()
                        .filter(|f| f.ts > items[i].ts() && f.ts <= next_bar.ts())
                    {
                        let notional = mark_equity(open, next_bar.c());
                        // 正费率多头付费
                        let charge = event.rate * notional * open.direction as f64;
                        funding_pnl -= charge;
                        equity -= charge;
                    }
                }
            }

            let marked = position
                .as_ref()
                .map(|p| mark_equity(p, next_bar.c()))
                .unwrap_or(equity);
            peak = peak.max(marked);
            equity_curve.push(EquityPoint {
                ts: next_bar.ts(),
                equity: marked,
                drawdown: if peak > 0.0 { (peak - marked) / peak } else { 0.0 },
            });
        }

        // 末根K线收盘强制平仓
        if position.is_some() {
            let last = items[items.len() - 1];
            Self::close_position(
                &mut equity,
                &mut position,
                last.c(),
                last.ts(),
                request.fee_rate,
                "final_close",
                &mut closed_trades,
                &mut trade_rows,
                &mut position_rows,
            );
            if let Some(point) = equity_curve.last_mut() {
                point.equity = equity;
                point.drawdown = if peak > 0.0 { (peak - equity).max(0.0) / peak } else { 0.0 };
            }
        }

        let metrics = BacktestMetrics::compute(
            request.initial_capital,
            &equity_curve,
            &closed_trades,
            request.timeframe.bars_per_year(),
            funding_pnl,
        );

        let run_id = Uuid::new_v4().simple().to_string();
        let params_json = serde_json::json!({
            "strategy_key": request.strategy_id,
            "strategy_params": request.strategy_params,
            "fee_rate": request.fee_rate,
            "slippage_bps": request.slippage_bps,
            "signal_window": request.signal_window,
            "funding_enabled": request.funding_enabled,
        });
        let run = BacktestRun {
            id: 0,
            run_id: run_id.clone(),
            created_at: now_s(),
            symbol: request.symbol.clone(),
            timeframe: request.timeframe,
            start_ts: request.start_ts,
            end_ts: request.end_ts,
            initial_capital: Decimal::from_f64(request.initial_capital)
                .unwrap_or(Decimal::ZERO),
            params_json: params_json.to_string(),
            metrics_json: Some(serde_json::to_string(&metrics)?),
            equity_curve_json: Some(serde_json::to_string(&equity_curve)?),
            schema_version: SCHEMA_VERSION,
        };
        let backtest_id = self
            .repository
            .insert_run(&run, &trade_rows, &position_rows, &decision_rows)
            .await?;

        info!(
            "backtest {} done: {} trades, return {:.2}%",
            run_id,
            trade_rows.len(),
            metrics.total_return * 100.0
        );
        Ok(BacktestOutcome {
            backtest_id,
            run_id,
            final_equity: equity,
            metrics,
            equity_curve,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn open_position(
        equity: &mut f64,
        position: &mut Option<OpenPosition>,
        direction: i8,
        price: f64,
        ts: i64,
        entry_index: usize,
        fee_rate: f64,
        stop_loss: &Option<f64>,
        take_profit: &Option<f64>,
        position_rows: &mut Vec<BacktestPositionPoint>,
    ) {
        if price <= 0.0 {
            return;
        }
        let fee = *equity * fee_rate;
        *equity -= fee;
        let quantity = *equity / price;
        *position = Some(OpenPosition {
            direction,
            entry_price: price,
            entry_equity: *equity,
            entry_ts: ts,
            entry_index,
            quantity,
            stop_loss: *stop_loss,
            take_profit: *take_profit,
            best_price: price,
        });
        position_rows.push(BacktestPositionPoint {
            id: 0,
            backtest_id: 0,
            ts,
            side: if direction == 1 { "LONG" } else { "SHORT" }.to_string(),
            size: Decimal::from_f64(quantity).unwrap_or(Decimal::ZERO),
            entry_price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn close_position(
        equity: &mut f64,
        position: &mut Option<OpenPosition>,
        price: f64,
        ts: i64,
        fee_rate: f64,
        reason: &str,
        closed_trades: &mut Vec<ClosedTrade>,
        trade_rows: &mut Vec<BacktestTrade>,
        position_rows: &mut Vec<BacktestPositionPoint>,
    ) {
        let open = match position.take() {
            Some(open) => open,
            None => return,
        };
        if open.entry_price <= 0.0 || price <= 0.0 {
            return;
        }
        let gross = mark_equity(&open, price);
        let fee = gross * fee_rate;
        let exit_equity = gross - fee;
        let pnl = exit_equity - open.entry_equity;
        let return_ratio = exit_equity / open.entry_equity - 1.0;
        *equity = exit_equity;

        closed_trades.push(ClosedTrade {
            pnl,
            return_ratio,
        });
        trade_rows.push(BacktestTrade {
            id: 0,
            backtest_id: 0,
            side: if open.direction == 1 { OrderSide::Buy } else { OrderSide::Sell },
            entry_ts: open.entry_ts,
            entry_price: Decimal::from_f64(open.entry_price).unwrap_or(Decimal::ZERO),
            exit_ts: ts,
            exit_price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
            amount: Decimal::from_f64(open.quantity).unwrap_or(Decimal::ZERO),
            fee: Decimal::from_f64(fee).unwrap_or(Decimal::ZERO),
            pnl: Decimal::from_f64(pnl).unwrap_or(Decimal::ZERO),
            // 固定存比例，展示层再转百分比
            return_pct: return_ratio,
            reason: reason.to_string(),
        });
        position_rows.push(BacktestPositionPoint {
            id: 0,
            backtest_id: 0,
            ts,
            side: "FLAT".to_string(),
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
        });
    }
}

/// 持仓按现价折算的权益
fn mark_equity(open: &OpenPosition, price: f64) -> f64 {
    if open.entry_price <= 0.0 || price <= 0.0 {
        return open.entry_equity;
    }
    if open.direction == 1 {
        open.entry_equity * (price / open.entry_price)
    } else {
        open.entry_equity * (open.entry_price / price)
    }
}

/// 下一根K线内是否触发止损/止盈，返回近似成交价
fn stop_hit(open: &OpenPosition, bar: &CandleItem) -> Option<f64> {
    if open.direction == 1 {
        if let Some(stop) = open.stop_loss {
            if bar.l() <= stop {
                return Some(stop);
            }
        }
        if let Some(tp) = open.take_profit {
            if bar.h() >= tp {
                return Some(tp);
            }
        }
    } else {
        if let Some(stop) = open.stop_loss {
            if bar.h() >= stop {
                return Some(stop);
            }
        }
        if let Some(tp) = open.take_profit {
            if bar.l() <= tp {
                return Some(tp);
            }
        }
    }
    None
}

/// 买入向上滑、卖出向下滑
fn slip(price: f64, intent: &SignalIntent, slippage_bps: f64) -> f64 {
    let direction = match intent {
        SignalIntent::Long | SignalIntent::CloseShort => 1.0,
        SignalIntent::Short | SignalIntent::CloseLong => -1.0,
        SignalIntent::Flat => 0.0,
    };
    price * (1.0 + direction * slippage_bps / 10_000.0)
}

fn funding_asof(
    funding: &[alpha_arena_domain::FundingView],
    ts: i64,
) -> Option<alpha_arena_domain::FundingView> {
    funding.iter().rev().find(|f| f.ts <= ts).cloned()
}
