//! 风控闸门

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;

use alpha_arena_common::utils::time::now_s;
use alpha_arena_core::config::settings::RiskSettings;
use alpha_arena_domain::{RiskEvent, RiskLevel};
use alpha_arena_infrastructure::RiskEventRepository;

use crate::policies::{
    CooldownRule, DailyLossRule, KillSwitchRule, MaxLeverageRule, MaxNotionalRule,
    MinConfidenceRule, PositionLimitRule, RiskRule,
};

/// 被风控拦截
#[derive(Debug, Error)]
#[error("risk blocked by {rule}: {reason}")]
pub struct RiskBlock {
    pub rule: &'static str,
    pub reason: String,
}

/// 一次风控检查的全部输入
#[derive(Debug, Clone)]
pub struct RiskCheckContext {
    pub ts: i64,
    pub symbol: String,
    pub confidence: Option<f64>,
    /// 本次委托的名义价值
    pub order_notional: f64,
    /// 成交后的总杠杆（总名义 / 权益）
    pub resulting_leverage: f64,
    pub equity: f64,
    /// 当日已实现亏损（亏损为正值）
    pub daily_realized_loss: f64,
    pub recent_loss_streak: i64,
    pub bars_since_last_loss: i64,
    pub trading_enabled: bool,
    /// 纯平仓/减仓单豁免开仓类规则
    pub is_closing: bool,
    /// 存在反向持仓且本单会开新方向
    pub conflicting_position: bool,
    /// 是否会路由到真实交易所
    pub live_routing: bool,
}

pub struct RiskGate {
    rules: Vec<Box<dyn RiskRule>>,
    events: RiskEventRepository,
}

impl RiskGate {
    pub fn new(pool: SqlitePool, settings: &RiskSettings) -> Self {
        let rules: Vec<Box<dyn RiskRule>> = vec![
            Box::new(KillSwitchRule),
            Box::new(MinConfidenceRule {
                min_confidence: settings.min_confidence,
            }),
            Box::new(MaxNotionalRule {
                max_notional: settings.max_notional,
            }),
            Box::new(MaxLeverageRule {
                max_leverage: settings.max_leverage,
            }),
            Box::new(DailyLossRule {
                max_daily_loss_pct: settings.max_daily_loss_pct,
            }),
            Box::new(CooldownRule {
                loss_streak: settings.cooldown_losses,
                cooldown_bars: settings.cooldown_bars,
            }),
            Box::new(PositionLimitRule),
        ];
        Self {
            rules,
            events: RiskEventRepository::new(pool),
        }
    }

    /// 依序执行全部规则；首个失败即拦截并落 RiskEvent(BLOCK)
    pub async fn check(&self, ctx: &RiskCheckContext) -> anyhow::Result<Result<(), RiskBlock>> {
        for rule in &self.rules {
            if let Err(reason) = rule.check(ctx) {
                warn!("risk block {} on {}: {}", rule.name(), ctx.symbol, reason);
                self.events
                    .insert(&RiskEvent::new(
                        now_s(),
                        &ctx.symbol,
                        RiskLevel::Block,
                        rule.name(),
                        reason.clone(),
                    ))
                    .await?;
                return Ok(Err(RiskBlock {
                    rule: rule.name(),
                    reason,
                }));
            }
        }
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::migrations::migrate;
    use alpha_arena_core::database::sqlx_pool::connect_pool;

    fn settings() -> RiskSettings {
        RiskSettings {
            max_notional: 20_000.0,
            max_leverage: 3.0,
            min_confidence: 0.6,
            max_daily_loss_pct: 0.05,
            cooldown_losses: 3,
            cooldown_bars: 6,
        }
    }

    fn ctx() -> RiskCheckContext {
        RiskCheckContext {
            ts: 0,
            symbol: "BTC-USDT-SWAP".to_string(),
            confidence: Some(0.8),
            order_notional: 5_000.0,
            resulting_leverage: 1.0,
            equity: 10_000.0,
            daily_realized_loss: 0.0,
            recent_loss_streak: 0,
            bars_since_last_loss: 100,
            trading_enabled: true,
            is_closing: false,
            conflicting_position: false,
            live_routing: true,
        }
    }

    async fn gate() -> (RiskGate, RiskEventRepository) {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        (
            RiskGate::new(pool.clone(), &settings()),
            RiskEventRepository::new(pool),
        )
    }

    #[tokio::test]
    async fn healthy_context_passes() {
        let (gate, _) = gate().await;
        assert!(gate.check(&ctx()).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn excess_leverage_is_blocked_and_recorded() {
        let (gate, events) = gate().await;
        let mut context = ctx();
        context.resulting_leverage = 5.0;
        let block = gate.check(&context).await.unwrap().unwrap_err();
        assert_eq!(block.rule, "LEVERAGE");
        assert_eq!(events.count_by_rule("BTC-USDT-SWAP", "LEVERAGE").await.unwrap(), 1);

        // 下一周期合规请求照常通过
        let mut retry = ctx();
        retry.resulting_leverage = 2.0;
        assert!(gate.check(&retry).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn kill_switch_blocks_live_routing_only() {
        let (gate, _) = gate().await;
        let mut context = ctx();
        context.trading_enabled = false;
        let block = gate.check(&context).await.unwrap().unwrap_err();
        assert_eq!(block.rule, "KILL_SWITCH");

        // 模拟盘路由不受杀开关约束
        context.live_routing = false;
        assert!(gate.check(&context).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn daily_loss_blocks_opens_but_allows_closes() {
        let (gate, _) = gate().await;
        let mut context = ctx();
        context.daily_realized_loss = 600.0; // 6% > 5%
        let block = gate.check(&context).await.unwrap().unwrap_err();
        assert_eq!(block.rule, "DAILY_LOSS");

        context.is_closing = true;
        assert!(gate.check(&context).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cooldown_after_loss_streak() {
        let (gate, _) = gate().await;
        let mut context = ctx();
        context.recent_loss_streak = 3;
        context.bars_since_last_loss = 2;
        let block = gate.check(&context).await.unwrap().unwrap_err();
        assert_eq!(block.rule, "COOLDOWN");

        context.bars_since_last_loss = 10;
        assert!(gate.check(&context).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn conflicting_position_is_blocked() {
        let (gate, _) = gate().await;
        let mut context = ctx();
        context.conflicting_position = true;
        let block = gate.check(&context).await.unwrap().unwrap_err();
        assert_eq!(block.rule, "POSITION_LIMIT");
    }

    #[tokio::test]
    async fn low_confidence_is_blocked() {
        let (gate, _) = gate().await;
        let mut context = ctx();
        context.confidence = Some(0.3);
        let block = gate.check(&context).await.unwrap().unwrap_err();
        assert_eq!(block.rule, "MIN_CONFIDENCE");
    }
}
