//! LLM 分配器（可选）
//!
//! 输出是带标签的两态：`Proposal`（通过全部校验）或 `Rejected`（任一
//! 校验失败）。下游不存在"也许是个 dict"的路径——拒绝即回落到
//! 组合调度器。每次调用的请求、响应、耗时、结果都落 llm_runs 审计。

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;

use alpha_arena_common::utils::time::now_ms;
use alpha_arena_core::config::settings::LlmSettings;
use alpha_arena_domain::{Allocation, Regime};
use alpha_arena_infrastructure::LlmRunRepository;

/// 权重和允许的偏差
const WEIGHT_SUM_TOLERANCE: f64 = 0.05;

/// 模型原始输出结构
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDecision {
    market_regime: String,
    #[serde(default)]
    strategy_allocations: Vec<RawAllocation>,
    total_position: Option<f64>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAllocation {
    strategy_id: String,
    weight: f64,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// 通过校验的分配提案
#[derive(Debug, Clone)]
pub struct LlmProposal {
    pub regime: Regime,
    pub allocations: Vec<Allocation>,
    pub total_position: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub model_version: String,
}

/// 两态结果
#[derive(Debug, Clone)]
pub enum LlmOutcome {
    Proposal(LlmProposal),
    Rejected { reason: String },
}

/// 提案请求载荷
#[derive(Debug, Clone, Serialize)]
pub struct ProposalRequest {
    pub symbol: String,
    pub timeframe: String,
    pub regime: String,
    pub last_price: f64,
    pub indicators: serde_json::Value,
    pub enabled_strategies: Vec<serde_json::Value>,
    pub feedback_summary: Option<String>,
}

pub struct LlmDecisionEngine {
    client: reqwest::Client,
    settings: LlmSettings,
    runs: LlmRunRepository,
}

impl LlmDecisionEngine {
    pub fn new(pool: SqlitePool, settings: LlmSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_s))
            .build()?;
        Ok(Self {
            client,
            settings,
            runs: LlmRunRepository::new(pool),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.settings.api_key.is_empty() && !self.settings.model.is_empty()
    }

    /// 请求一次分配提案；任何失败（网络、解析、校验）都归为 Rejected
    pub async fn propose(&self, request: &ProposalRequest, enabled_ids: &[&str]) -> LlmOutcome {
        let request_json = match serde_json::to_string(request) {
            Ok(json) => json,
            Err(e) => {
                return LlmOutcome::Rejected {
                    reason: format!("request_encode: {}", e),
                }
            }
        };

        let started = Instant::now();
        let response = self.chat(&request_json).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        let (outcome, response_text, error) = match response {
            Ok(text) => match self.validate(&text, enabled_ids) {
                Ok(proposal) => (LlmOutcome::Proposal(proposal), Some(text), None),
                Err(reason) => (
                    LlmOutcome::Rejected {
                        reason: reason.clone(),
                    },
                    Some(text),
                    Some(reason),
                ),
            },
            Err(e) => {
                let reason = format!("llm_error: {}", e);
                (
                    LlmOutcome::Rejected {
                        reason: reason.clone(),
                    },
                    None,
                    Some(reason),
                )
            }
        };

        let outcome_label = match &outcome {
            LlmOutcome::Proposal(_) => "accepted",
            LlmOutcome::Rejected { .. } => "rejected",
        };
        if let Err(e) = self
            .runs
            .insert(
                now_ms(),
                &self.settings.provider,
                &self.settings.model,
                &request_json,
                response_text.as_deref(),
                latency_ms,
                outcome_label,
                error.as_deref(),
            )
            .await
        {
            warn!("failed to record llm run: {}", e);
        }
        outcome
    }

    /// OpenAI 兼容 chat 接口，要求 JSON 输出
    async fn chat(&self, user_payload: &str) -> anyhow::Result<String> {
        let system = "你是加密货币永续合约的策略分配器。\
            根据市场快照、当前市场状态与策略表现反馈，输出 JSON：\
            {\"market_regime\", \"strategy_allocations\": \
            [{\"strategy_id\", \"weight\", \"confidence\", \"reasoning\"}], \
            \"total_position\", \"confidence\", \"reasoning\"}。\
            权重相加必须等于 1，total_position 在 [-1, 1] 之间。只输出 JSON。";

        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user_payload},
            ],
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
        });

        let url = format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!("llm http {}: {}", status, text));
        }
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing message content"))?;
        Ok(content.to_string())
    }

    /// 全量校验；任一失败返回拒绝原因
    fn validate(&self, raw_text: &str, enabled_ids: &[&str]) -> Result<LlmProposal, String> {
        let raw: RawDecision = serde_json::from_str(raw_text)
            .map_err(|e| format!("decode_failed: {}", e))?;

        let regime: Regime = raw
            .market_regime
            .parse()
            .map_err(|_| format!("unknown_regime: {}", raw.market_regime))?;

        if raw.strategy_allocations.is_empty() {
            return Err("empty_allocations".to_string());
        }
        for allocation in &raw.strategy_allocations {
            if allocation.weight < 0.0 {
                return Err(format!("negative_weight: {}", allocation.strategy_id));
            }
            if !(0.0..=1.0).contains(&allocation.confidence) {
                return Err(format!("confidence_out_of_range: {}", allocation.strategy_id));
            }
            let id = allocation.strategy_id.trim().to_lowercase();
            if !enabled_ids.contains(&id.as_str()) {
                return Err(format!("unknown_strategy: {}", allocation.strategy_id));
            }
        }
        let weight_sum: f64 = raw.strategy_allocations.iter().map(|a| a.weight).sum();
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("weight_sum_mismatch: {:.4}", weight_sum));
        }
        let total_position = raw.total_position.unwrap_or(0.0);
        if !(-1.0..=1.0).contains(&total_position) {
            return Err(format!("position_out_of_range: {:.4}", total_position));
        }
        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(format!("confidence_out_of_range: {:.4}", raw.confidence));
        }

        Ok(LlmProposal {
            regime,
            allocations: raw
                .strategy_allocations
                .iter()
                .map(|a| Allocation {
                    strategy_id: a.strategy_id.trim().to_lowercase(),
                    weight: a.weight,
                    confidence: a.confidence,
                })
                .collect(),
            total_position,
            confidence: raw.confidence,
            reasoning: raw.reasoning,
            model_version: self.settings.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_arena_core::database::sqlx_pool::connect_pool;

    async fn engine() -> LlmDecisionEngine {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let settings = LlmSettings {
            provider: "deepseek".to_string(),
            api_base: "https://api.deepseek.com/v1".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            timeout_s: 5,
        };
        LlmDecisionEngine::new(pool, settings).unwrap()
    }

    const ENABLED: &[&str] = &["ema_trend", "bollinger_range"];

    #[tokio::test]
    async fn valid_response_passes_validation() {
        let engine = engine().await;
        let raw = serde_json::json!({
            "market_regime": "TREND",
            "strategy_allocations": [
                {"strategy_id": "ema_trend", "weight": 0.7, "confidence": 0.8, "reasoning": "trend"},
                {"strategy_id": "bollinger_range", "weight": 0.3, "confidence": 0.6, "reasoning": "hedge"},
            ],
            "total_position": 0.5,
            "confidence": 0.8,
            "reasoning": "trend following",
        });
        let proposal = engine.validate(&raw.to_string(), ENABLED).unwrap();
        assert_eq!(proposal.regime, Regime::Trend);
        assert_eq!(proposal.allocations.len(), 2);
    }

    #[tokio::test]
    async fn weight_sum_mismatch_rejected() {
        let engine = engine().await;
        let raw = serde_json::json!({
            "market_regime": "TREND",
            "strategy_allocations": [
                {"strategy_id": "ema_trend", "weight": 0.5, "confidence": 0.8, "reasoning": ""},
            ],
            "total_position": 0.5,
            "confidence": 0.8,
        });
        let err = engine.validate(&raw.to_string(), ENABLED).unwrap_err();
        assert!(err.starts_with("weight_sum_mismatch"));
    }

    #[tokio::test]
    async fn unknown_strategy_rejected() {
        let engine = engine().await;
        let raw = serde_json::json!({
            "market_regime": "RANGE",
            "strategy_allocations": [
                {"strategy_id": "moon_shot", "weight": 1.0, "confidence": 0.9, "reasoning": ""},
            ],
            "total_position": 0.2,
            "confidence": 0.9,
        });
        let err = engine.validate(&raw.to_string(), ENABLED).unwrap_err();
        assert!(err.starts_with("unknown_strategy"));
    }

    #[tokio::test]
    async fn out_of_range_position_rejected() {
        let engine = engine().await;
        let raw = serde_json::json!({
            "market_regime": "TREND",
            "strategy_allocations": [
                {"strategy_id": "ema_trend", "weight": 1.0, "confidence": 0.9, "reasoning": ""},
            ],
            "total_position": 1.5,
            "confidence": 0.9,
        });
        let err = engine.validate(&raw.to_string(), ENABLED).unwrap_err();
        assert!(err.starts_with("position_out_of_range"));
    }

    #[tokio::test]
    async fn negative_weight_rejected() {
        let engine = engine().await;
        let raw = serde_json::json!({
            "market_regime": "TREND",
            "strategy_allocations": [
                {"strategy_id": "ema_trend", "weight": 1.5, "confidence": 0.9, "reasoning": ""},
                {"strategy_id": "bollinger_range", "weight": -0.5, "confidence": 0.9, "reasoning": ""},
            ],
            "total_position": 0.5,
            "confidence": 0.9,
        });
        let err = engine.validate(&raw.to_string(), ENABLED).unwrap_err();
        assert!(err.starts_with("negative_weight"));
    }
}
