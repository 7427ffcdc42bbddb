//! 组合分配器：目标仓位 -> 子订单意图
//!
//! V1 独占规则在这里落地：目标方向与当前持仓相反时，
//! 先发全量平仓腿（reduce_only），再发开仓腿。

use alpha_arena_domain::{Decision, OrderSide, OrderType, Position, TimeInForce};

use crate::executor::OrderIntent;

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub min_notional: f64,
    pub leverage: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_notional: 10.0,
            leverage: 1.0,
        }
    }
}

pub struct PortfolioAllocator {
    config: AllocatorConfig,
}

impl PortfolioAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    /// 把决策翻译为子订单序列（0、1 或 2 个意图）
    pub fn build_intents(
        &self,
        decision: &Decision,
        equity: f64,
        mark_price: f64,
        current: Option<&Position>,
    ) -> Vec<OrderIntent> {
        if equity <= 0.0 || mark_price <= 0.0 {
            return Vec::new();
        }

        let target_notional = decision.total_position * equity;
        let current_signed = current.map(|p| p.signed_notional(mark_price)).unwrap_or(0.0);
        let delta = target_notional - current_signed;
        if delta.abs() < self.config.min_notional {
            return Vec::new();
        }

        let intent = |side: OrderSide, quantity: f64, reduce_only: bool| OrderIntent {
            symbol: decision.symbol.clone(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            leverage: Some(self.config.leverage),
            confidence: decision.confidence,
            time_in_force: TimeInForce::Gtc,
            reduce_only,
        };

        let opposite_direction = current_signed != 0.0
            && target_notional != 0.0
            && current_signed.signum() != target_notional.signum();

        if opposite_direction {
            // 独占规则：先全平旧仓，再开新方向
            let close_side = if current_signed > 0.0 {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            };
            let close_qty = current_signed.abs() / mark_price;
            let open_side = if target_notional > 0.0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            let open_qty = target_notional.abs() / mark_price;

            let mut intents = vec![intent(close_side, close_qty, true)];
            if target_notional.abs() >= self.config.min_notional {
                intents.push(intent(open_side, open_qty, false));
            }
            return intents;
        }

        let side = if delta > 0.0 { OrderSide::Buy } else { OrderSide::Sell };
        // 同向减仓视为 reduce_only
        let reducing = current_signed != 0.0 && target_notional.abs() < current_signed.abs();
        vec![intent(side, delta.abs() / mark_price, reducing)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_domain::{DecisionSource, PositionSide, Regime, Timeframe};

    fn decision(total_position: f64) -> Decision {
        Decision {
            id: 0,
            ts: 0,
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::H1,
            regime: Regime::Trend,
            allocations: Vec::new(),
            total_position,
            confidence: Some(0.8),
            reasoning: String::new(),
            source: DecisionSource::Portfolio,
            prompt_version: None,
            model_version: None,
        }
    }

    fn long_position(size: &str, entry: &str) -> Position {
        Position {
            symbol: "BTC-USDT-SWAP".to_string(),
            side: PositionSide::Long,
            size: size.parse().unwrap(),
            entry_price: entry.parse().unwrap(),
            leverage: Some(1.0),
            unrealized_pnl: None,
            margin: None,
            liquidation_price: None,
            updated_at: 0,
        }
    }

    #[test]
    fn flat_to_long_emits_single_buy() {
        let allocator = PortfolioAllocator::new(AllocatorConfig::default());
        let intents = allocator.build_intents(&decision(0.5), 10_000.0, 50_000.0, None);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, OrderSide::Buy);
        assert!((intents[0].quantity - 0.1).abs() < 1e-9);
        assert!(!intents[0].reduce_only);
    }

    #[test]
    fn reverse_splits_into_close_then_open() {
        let allocator = PortfolioAllocator::new(AllocatorConfig::default());
        let position = long_position("0.1", "50000");
        let intents =
            allocator.build_intents(&decision(-0.3), 10_000.0, 50_000.0, Some(&position));
        assert_eq!(intents.len(), 2);
        // 平仓腿
        assert_eq!(intents[0].side, OrderSide::Sell);
        assert!(intents[0].reduce_only);
        assert!((intents[0].quantity - 0.1).abs() < 1e-9);
        // 开仓腿
        assert_eq!(intents[1].side, OrderSide::Sell);
        assert!(!intents[1].reduce_only);
        assert!((intents[1].quantity - 0.06).abs() < 1e-9);
    }

    #[test]
    fn tiny_delta_emits_nothing() {
        let allocator = PortfolioAllocator::new(AllocatorConfig::default());
        let position = long_position("0.1", "50000");
        // 目标与当前几乎一致
        let intents =
            allocator.build_intents(&decision(0.50001), 10_000.0, 50_000.0, Some(&position));
        assert!(intents.is_empty());
    }

    #[test]
    fn reduce_keeps_direction_with_reduce_only() {
        let allocator = PortfolioAllocator::new(AllocatorConfig::default());
        let position = long_position("0.1", "50000");
        let intents =
            allocator.build_intents(&decision(0.2), 10_000.0, 50_000.0, Some(&position));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, OrderSide::Sell);
        assert!(intents[0].reduce_only);
    }
}
