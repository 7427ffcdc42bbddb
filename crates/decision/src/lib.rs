//! # Alpha Arena Decision
//!
//! 决策域：组合调度（确定性主路径）、LLM 分配器（可选旁路）、
//! 决策反馈分析。LLM 校验失败时无条件回落到组合调度器。

pub mod feedback;
pub mod llm;
pub mod performance;
pub mod portfolio;

pub use feedback::FeedbackAnalyzer;
pub use llm::{LlmDecisionEngine, LlmOutcome, LlmProposal};
pub use performance::PerformanceScores;
pub use portfolio::{PortfolioScheduler, SchedulerConfig, SchedulerContext, SchedulerOutcome};
