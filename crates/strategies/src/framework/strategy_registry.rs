//! 策略注册表
//!
//! 以 strategy_id 为键做运行时分发；参数通过 JSON 覆盖默认值

use std::collections::HashMap;

use alpha_arena_domain::Regime;

use crate::implementations::{
    BollingerRangeStrategy, BreakoutStrategy, EmaTrendStrategy, FundingRateArbitrageStrategy,
    GridTradingStrategy, MeanReversionStrategy, MomentumStrategy,
};

use super::strategy_trait::Strategy;

type StrategyFactory = fn(Option<&serde_json::Value>) -> anyhow::Result<Box<dyn Strategy>>;

/// 策略元信息
#[derive(Debug, Clone)]
pub struct StrategySpec {
    pub key: &'static str,
    pub name: &'static str,
    pub enabled: bool,
    pub description: &'static str,
    pub regimes: &'static [Regime],
    factory: StrategyFactory,
}

fn merge_params<T>(params: Option<&serde_json::Value>) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match params {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(T::default()),
    }
}

fn specs() -> Vec<StrategySpec> {
    vec![
        StrategySpec {
            key: "ema_trend",
            name: "EMA Trend",
            enabled: true,
            description: "EMA 多头排列趋势跟随",
            regimes: &[Regime::Trend],
            factory: |p| Ok(Box::new(EmaTrendStrategy::new(merge_params(p)?))),
        },
        StrategySpec {
            key: "bollinger_range",
            name: "Bollinger Range",
            enabled: true,
            description: "布林带低波动区间回归",
            regimes: &[Regime::Range],
            factory: |p| Ok(Box::new(BollingerRangeStrategy::new(merge_params(p)?))),
        },
        StrategySpec {
            key: "funding_rate_arbitrage",
            name: "Funding Rate Arbitrage",
            enabled: true,
            description: "资金费率套利（永续腿）",
            regimes: &[],
            factory: |p| Ok(Box::new(FundingRateArbitrageStrategy::new(merge_params(p)?))),
        },
        StrategySpec {
            key: "breakout",
            name: "Breakout",
            enabled: false,
            description: "关键位放量突破",
            regimes: &[Regime::Breakout, Regime::Trend],
            factory: |p| Ok(Box::new(BreakoutStrategy::new(merge_params(p)?))),
        },
        StrategySpec {
            key: "grid_trading",
            name: "Grid Trading",
            enabled: false,
            description: "布林中轨等距网格",
            regimes: &[Regime::Range],
            factory: |p| Ok(Box::new(GridTradingStrategy::new(merge_params(p)?))),
        },
        StrategySpec {
            key: "momentum",
            name: "Momentum",
            enabled: false,
            description: "多因子动量",
            regimes: &[Regime::Trend, Regime::Breakout],
            factory: |p| Ok(Box::new(MomentumStrategy::new(merge_params(p)?))),
        },
        StrategySpec {
            key: "mean_reversion",
            name: "Mean Reversion",
            enabled: false,
            description: "Z分数均值回归",
            regimes: &[Regime::Range],
            factory: |p| Ok(Box::new(MeanReversionStrategy::new(merge_params(p)?))),
        },
    ]
}

/// 策略注册表：默认参数的启用策略实例 + 元信息
pub struct StrategyRegistry {
    specs: Vec<StrategySpec>,
    instances: HashMap<&'static str, Box<dyn Strategy>>,
}

impl StrategyRegistry {
    /// 按默认配置构建全部策略实例
    pub fn with_defaults() -> Self {
        let specs = specs();
        let mut instances = HashMap::new();
        for spec in &specs {
            let strategy = (spec.factory)(None).expect("default params are valid");
            instances.insert(spec.key, strategy);
        }
        Self { specs, instances }
    }

    pub fn list_all(&self) -> &[StrategySpec] {
        &self.specs
    }

    pub fn list_enabled(&self) -> Vec<&StrategySpec> {
        self.specs.iter().filter(|s| s.enabled).collect()
    }

    pub fn enabled_ids(&self) -> Vec<&'static str> {
        self.specs
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.key)
            .collect()
    }

    pub fn get_spec(&self, key: &str) -> Option<&StrategySpec> {
        self.specs.iter().find(|s| s.key == key)
    }

    /// 默认参数实例
    pub fn get(&self, key: &str) -> Option<&dyn Strategy> {
        self.instances.get(key).map(|b| b.as_ref())
    }

    /// 启用策略的实例列表
    pub fn enabled_strategies(&self) -> Vec<&dyn Strategy> {
        self.specs
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| self.get(s.key))
            .collect()
    }

    /// 用 JSON 参数覆盖默认值构建实例
    pub fn build(
        &self,
        key: &str,
        params: Option<&serde_json::Value>,
    ) -> anyhow::Result<Box<dyn Strategy>> {
        let spec = self
            .get_spec(key)
            .ok_or_else(|| anyhow::anyhow!("strategy not found: {}", key))?;
        (spec.factory)(params)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enabled_set() {
        let registry = StrategyRegistry::with_defaults();
        let enabled = registry.enabled_ids();
        assert_eq!(enabled, vec!["ema_trend", "bollinger_range", "funding_rate_arbitrage"]);
        assert_eq!(registry.list_all().len(), 7);
    }

    #[test]
    fn build_with_param_override() {
        let registry = StrategyRegistry::with_defaults();
        let params = serde_json::json!({ "ema_fast": 5 });
        let strategy = registry.build("ema_trend", Some(&params)).unwrap();
        assert_eq!(strategy.id(), "ema_trend");
        assert!(registry.build("nope", None).is_err());
    }
}
