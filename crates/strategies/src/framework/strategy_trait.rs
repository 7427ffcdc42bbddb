//! 策略执行接口定义
//!
//! 所有策略实现此 trait，统一由注册表管理和调度

use alpha_arena_domain::{MarketSnapshot, Regime};

use super::signal::StrategySignal;

/// 策略接口
///
/// 实现必须是纯函数式的：同一快照多次调用返回相同信号，
/// 不得访问数据库/交易所，不得休眠
pub trait Strategy: Send + Sync {
    /// 策略唯一标识，如 "ema_trend"
    fn id(&self) -> &'static str;

    /// 展示名称
    fn name(&self) -> &'static str;

    /// 适用的市场状态集合；为空表示不受状态门控
    fn required_regimes(&self) -> &'static [Regime];

    /// 从市场快照生成信号
    ///
    /// 数据不足（指标预热未完成、K线为空）必须输出 FLAT，不得报错
    fn signal(&self, snapshot: &MarketSnapshot) -> StrategySignal;

    /// 当前市场状态是否在本策略适用范围内
    fn accepts_regime(&self, regime: Regime) -> bool {
        let regimes = self.required_regimes();
        regimes.is_empty() || regimes.contains(&regime)
    }
}
