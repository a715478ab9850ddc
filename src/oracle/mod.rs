//! LLM oracle: the narrow boundary between the orchestrator and whatever
//! model is actually proposing trades.
//!
//! The oracle is treated as a pure `(system_prompt, user_prompt) -> text`
//! function — a single-method trait lets the orchestrator be driven by a
//! deterministic fake in tests without caring which concrete backend is
//! wired in at runtime.

pub mod openrouter;

use anyhow::Result;

/// One call's worth of response content plus whatever reasoning trace the
/// backend surfaced alongside it.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub reasoning_content: String,
    pub model: String,
}

/// A trading-decision oracle: takes a system prompt and a per-cycle user
/// prompt, returns raw text for the orchestrator to parse.
#[async_trait::async_trait]
pub trait LlmOracle: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmResponse>;
}

pub use openrouter::OpenRouterOracle;
