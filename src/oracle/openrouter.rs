//! Concrete `LlmOracle` backed by an OpenRouter-compatible chat-completion
//! endpoint.
//!
//! This is the one piece of the engine that genuinely talks to an external
//! model; the wire format is an OpenAI-style `/chat/completions` body, which
//! is what OpenRouter fronts regardless of the underlying model.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::oracle::{LlmOracle, LlmResponse};

pub struct OpenRouterOracle {
    config: OracleConfig,
    http: reqwest::Client,
}

impl OpenRouterOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }
}

#[async_trait::async_trait]
impl LlmOracle for OpenRouterOracle {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmResponse> {
        let mut body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        if self.config.model.contains("grok") {
            body["reasoning"] = json!({ "effort": self.config.reasoning_effort });
        }

        info!(model = %self.config.model, "calling LLM oracle");

        let url = format!("{}/chat/completions", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", "https://github.com/meridian-swing-engine")
            .json(&body)
            .timeout(std::time::Duration::from_secs_f64(self.config.timeout_secs))
            .send()
            .await
            .context("oracle request failed")?
            .error_for_status()
            .context("oracle returned an error status")?;

        let data: Value = resp.json().await.context("oracle response was not valid JSON")?;

        let choice = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .context("oracle response missing choices[0].message")?;

        let content = choice.get("content").and_then(Value::as_str).unwrap_or("").to_string();

        let reasoning = choice
            .get("reasoning_content")
            .and_then(Value::as_str)
            .or_else(|| choice.get("reasoning").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();

        if reasoning.is_empty() {
            debug!("oracle response carried no reasoning field");
        }

        let model = data
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.model)
            .to_string();

        if content.is_empty() {
            warn!("oracle response had empty content");
        }

        Ok(LlmResponse { content, reasoning_content: reasoning, model })
    }
}
