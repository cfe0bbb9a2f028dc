use anyhow::{Context, Result};
use async_trait::async_trait;
use grc_common::LlmConfig;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, ToolSchema};

pub const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolSchema],
}

fn no_tools(tools: &&[ToolSchema]) -> bool {
    tools.is_empty()
}

/// Messages API client
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .context("llm.api_key is not configured (set ANTHROPIC_API_KEY)")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("LLM provider returned error status {}: {}", status, error_text);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        debug!(
            stop_reason = ?completion.stop_reason,
            tool_calls = completion
                .content
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .count(),
            "LLM completion received"
        );

        Ok(completion)
    }
}
