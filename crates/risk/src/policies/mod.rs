//! 风控规则集

use crate::gate::RiskCheckContext;

/// 单条风控规则
pub trait RiskRule: Send + Sync {
    /// 规则名，记入 RiskEvent.rule
    fn name(&self) -> &'static str;

    /// 通过返回 Ok，失败返回拒绝原因
    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String>;
}

/// 杀开关：实盘路由必须显式打开
pub struct KillSwitchRule;

impl RiskRule for KillSwitchRule {
    fn name(&self) -> &'static str {
        "KILL_SWITCH"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.live_routing && !ctx.trading_enabled {
            return Err("TRADING_ENABLED is false, live order blocked".to_string());
        }
        Ok(())
    }
}

/// 最低置信度
pub struct MinConfidenceRule {
    pub min_confidence: f64,
}

impl RiskRule for MinConfidenceRule {
    fn name(&self) -> &'static str {
        "MIN_CONFIDENCE"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if let Some(confidence) = ctx.confidence {
            if confidence < self.min_confidence {
                return Err(format!(
                    "confidence {:.2} below {:.2}",
                    confidence, self.min_confidence
                ));
            }
        }
        Ok(())
    }
}

/// 单笔名义价值上限
pub struct MaxNotionalRule {
    pub max_notional: f64,
}

impl RiskRule for MaxNotionalRule {
    fn name(&self) -> &'static str {
        "NOTIONAL"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.order_notional > self.max_notional {
            return Err(format!(
                "notional {:.2} exceeds max {:.2}",
                ctx.order_notional, self.max_notional
            ));
        }
        Ok(())
    }
}

/// 成交后杠杆上限
pub struct MaxLeverageRule {
    pub max_leverage: f64,
}

impl RiskRule for MaxLeverageRule {
    fn name(&self) -> &'static str {
        "LEVERAGE"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.resulting_leverage > self.max_leverage {
            return Err(format!(
                "leverage {:.2} exceeds max {:.2}",
                ctx.resulting_leverage, self.max_leverage
            ));
        }
        Ok(())
    }
}

/// 当日亏损熔断：超限后只许平仓
pub struct DailyLossRule {
    pub max_daily_loss_pct: f64,
}

impl RiskRule for DailyLossRule {
    fn name(&self) -> &'static str {
        "DAILY_LOSS"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.is_closing || ctx.equity <= 0.0 {
            return Ok(());
        }
        let loss_ratio = ctx.daily_realized_loss / ctx.equity;
        if loss_ratio >= self.max_daily_loss_pct {
            return Err(format!(
                "daily loss {:.2}% crossed {:.2}%, new opens suspended",
                loss_ratio * 100.0,
                self.max_daily_loss_pct * 100.0
            ));
        }
        Ok(())
    }
}

/// 连亏冷却：连续亏损后暂停开仓若干根K线
pub struct CooldownRule {
    pub loss_streak: i64,
    pub cooldown_bars: i64,
}

impl RiskRule for CooldownRule {
    fn name(&self) -> &'static str {
        "COOLDOWN"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.is_closing {
            return Ok(());
        }
        if ctx.recent_loss_streak >= self.loss_streak
            && ctx.bars_since_last_loss < self.cooldown_bars
        {
            return Err(format!(
                "{} consecutive losses, cooling down ({}/{} bars)",
                ctx.recent_loss_streak, ctx.bars_since_last_loss, self.cooldown_bars
            ));
        }
        Ok(())
    }
}

/// V1 独占：一个 symbol 同时只允许一个方向的仓位
pub struct PositionLimitRule;

impl RiskRule for PositionLimitRule {
    fn name(&self) -> &'static str {
        "POSITION_LIMIT"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.conflicting_position {
            return Err("opposite position still open, close it first".to_string());
        }
        Ok(())
    }
}
