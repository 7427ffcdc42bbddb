//! 运行配置
//!
//! 全部来自环境变量，启动时加载一次，之后只读。
//! 修改配置需要重启进程。

use once_cell::sync::OnceCell;

use alpha_arena_common::utils::env::{
    env_csv, env_f64, env_i64, env_is_true, env_or_default, env_u64,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// OKX 接入配置
#[derive(Debug, Clone)]
pub struct OkxSettings {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
    /// 模拟盘开关，选择 demo / live 端点
    pub is_demo: bool,
    /// tdMode: cross / isolated
    pub td_mode: String,
    /// posMode: net / long_short
    pub pos_mode: String,
    pub default_symbol: String,
    pub timeframes: Vec<String>,
    /// 下单后是否轮询等待成交
    pub wait_fill: bool,
    pub fill_timeout_s: f64,
    pub fill_interval_s: f64,
}

/// 风控阈值
#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub max_notional: f64,
    pub max_leverage: f64,
    pub min_confidence: f64,
    /// 当日已实现亏损超过该比例后禁止新开仓（平仓不受限）
    pub max_daily_loss_pct: f64,
    /// 连续亏损 N 笔后冷却
    pub cooldown_losses: i64,
    /// 冷却期长度（按K线数）
    pub cooldown_bars: i64,
}

/// 市场状态分类阈值
#[derive(Debug, Clone)]
pub struct RegimeSettings {
    /// ADX 高于此值视为趋势
    pub adx_trend_threshold: f64,
    /// ADX 低于此值视为震荡
    pub adx_range_threshold: f64,
    pub bb_width_threshold: f64,
    /// ATR 百分位高于此值判定为高波动
    pub vol_kill_threshold: f64,
    /// EMA55 斜率阈值（5根K线的相对变化）
    pub ema_slope_threshold: f64,
}

/// 组合调度参数
#[derive(Debug, Clone)]
pub struct PortfolioSettings {
    pub global_leverage: f64,
    /// 目标仓位变化阈值（基点）
    pub diff_threshold_bps: f64,
    pub min_notional: f64,
    pub top_k: usize,
    pub min_score: f64,
    pub regime_weight: f64,
    pub performance_weight: f64,
}

/// LLM 决策引擎配置
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: String,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout_s: u64,
}

/// 各循环的节拍（秒）
#[derive(Debug, Clone)]
pub struct IntervalSettings {
    pub ingest: u64,
    pub derivatives: u64,
    pub integrity_scan: u64,
    pub repair: u64,
    pub decision: u64,
    pub account: u64,
    pub order: u64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub trading_enabled: bool,
    pub api_write_enabled: bool,
    pub okx: OkxSettings,
    pub risk: RiskSettings,
    pub regime: RegimeSettings,
    pub portfolio: PortfolioSettings,
    pub llm: LlmSettings,
    pub intervals: IntervalSettings,
    /// 首次拉取回补的天数
    pub initial_backfill_days: i64,
    /// 单次拉取的最大K线数
    pub ingest_batch_limit: usize,
    /// 拉取失败的重试预算
    pub ingest_max_retries: u32,
    /// 本地订单缺少 exchange_order_id 的容忍时间（秒）
    pub reconcile_grace_s: i64,
    /// 对账仓位漂移容忍比例
    pub position_drift_tolerance: f64,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self {
            database_url: env_or_default("DATABASE_URL", "sqlite://data/alpha_arena.db?mode=rwc"),
            trading_enabled: env_is_true("TRADING_ENABLED", false),
            api_write_enabled: env_is_true("API_WRITE_ENABLED", false),
            okx: OkxSettings {
                api_key: env_or_default("OKX_API_KEY", ""),
                api_secret: env_or_default("OKX_API_SECRET", ""),
                passphrase: env_or_default("OKX_PASSPHRASE", ""),
                is_demo: env_is_true("OKX_IS_DEMO", true),
                td_mode: env_or_default("OKX_TD_MODE", "cross"),
                pos_mode: env_or_default("OKX_POS_MODE", "net"),
                default_symbol: env_or_default("OKX_DEFAULT_SYMBOL", "BTC-USDT-SWAP"),
                timeframes: env_csv("OKX_TIMEFRAMES", &["15m", "1h", "4h", "1d"]),
                wait_fill: env_is_true("OKX_WAIT_FILL", true),
                fill_timeout_s: env_f64("OKX_FILL_TIMEOUT_S", 8.0),
                fill_interval_s: env_f64("OKX_FILL_INTERVAL_S", 1.0),
            },
            risk: RiskSettings {
                max_notional: env_f64("RISK_MAX_NOTIONAL", 20000.0),
                max_leverage: env_f64("RISK_MAX_LEVERAGE", 3.0),
                min_confidence: env_f64("RISK_MIN_CONFIDENCE", 0.6),
                max_daily_loss_pct: env_f64("RISK_MAX_DAILY_LOSS_PCT", 0.05),
                cooldown_losses: env_i64("RISK_COOLDOWN_LOSSES", 3),
                cooldown_bars: env_i64("RISK_COOLDOWN_BARS", 6),
            },
            regime: RegimeSettings {
                adx_trend_threshold: env_f64("REGIME_ADX_THRESHOLD", 20.0),
                adx_range_threshold: env_f64("REGIME_ADX_RANGE_THRESHOLD", 18.0),
                bb_width_threshold: env_f64("REGIME_BB_WIDTH_THRESHOLD", 0.04),
                vol_kill_threshold: env_f64("REGIME_VOL_KILL_THRESHOLD", 85.0),
                ema_slope_threshold: env_f64("REGIME_EMA_SLOPE_THRESHOLD", 0.004),
            },
            portfolio: PortfolioSettings {
                global_leverage: env_f64("PORTFOLIO_GLOBAL_LEVERAGE", 1.0),
                diff_threshold_bps: env_f64("PORTFOLIO_DIFF_THRESHOLD", 10.0),
                min_notional: env_f64("PORTFOLIO_MIN_NOTIONAL", 10.0),
                top_k: env_u64("PORTFOLIO_TOP_K", 3) as usize,
                min_score: env_f64("PORTFOLIO_MIN_SCORE", 0.45),
                regime_weight: env_f64("PORTFOLIO_REGIME_WEIGHT", 0.6),
                performance_weight: env_f64("PORTFOLIO_PERFORMANCE_WEIGHT", 0.4),
            },
            llm: LlmSettings {
                provider: env_or_default("LLM_PROVIDER", ""),
                api_base: env_or_default("LLM_API_BASE", "https://api.deepseek.com/v1"),
                api_key: env_or_default("LLM_API_KEY", ""),
                model: env_or_default("LLM_MODEL", "deepseek-chat"),
                timeout_s: env_u64("LLM_TIMEOUT_S", 30),
            },
            intervals: IntervalSettings {
                ingest: env_u64("INGEST_INTERVAL", 60),
                derivatives: env_u64("DERIVATIVES_INTERVAL", 60),
                integrity_scan: env_u64("INTEGRITY_SCAN_INTERVAL", 3600),
                repair: env_u64("REPAIR_INTERVAL", 30),
                decision: env_u64("DECISION_INTERVAL", 900),
                account: env_u64("ACCOUNT_INTERVAL", 60),
                order: env_u64("ORDER_INTERVAL", 30),
            },
            initial_backfill_days: env_i64("INGEST_BACKFILL_DAYS", 30),
            ingest_batch_limit: env_u64("INGEST_BATCH_LIMIT", 300) as usize,
            ingest_max_retries: env_u64("INGEST_MAX_RETRIES", 5) as u32,
            reconcile_grace_s: env_i64("RECONCILE_GRACE_S", 60),
            position_drift_tolerance: env_f64("POSITION_DRIFT_TOLERANCE", 0.02),
        }
    }
}

/// 初始化全局配置（只允许一次）
pub fn init_settings() -> anyhow::Result<&'static Settings> {
    SETTINGS
        .set(Settings::from_env())
        .map_err(|_| anyhow::anyhow!("配置已初始化"))?;
    Ok(SETTINGS.get().expect("settings just set"))
}

/// 获取全局配置，未初始化时按当前环境加载
pub fn get_settings() -> &'static Settings {
    SETTINGS.get_or_init(Settings::from_env)
}
