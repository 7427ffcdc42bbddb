pub mod signal;
pub mod strategy_registry;
pub mod strategy_trait;
