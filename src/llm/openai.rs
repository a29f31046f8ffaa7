//! OpenAI-compatible chat completions provider.
//!
//! Calls `POST {base_url}/chat/completions` with `stream: false`. Works with
//! any endpoint speaking the same format (OpenAI, DeepSeek, vLLM, ...).
//!
//! - System prompt is sent as the first `role: "system"` message.
//! - Token usage comes from `usage.prompt_tokens` / `usage.completion_tokens`
//!   (may be absent).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::LlmClient;
use super::{LlmResponse, Message};
use crate::config::LlmConfig;

// ── API request types ────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

// ── API response types ───────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ── OpenAiClient ─────────────────────────────────────────

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        // Strip trailing slash for consistent URL construction
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            config,
            base_url,
        }
    }

    fn build_request(&self, system_prompt: &str, messages: &[Message]) -> ChatRequest {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            all.push(Message::system(system_prompt));
        }
        all.extend_from_slice(messages);

        ChatRequest {
            model: self.config.model.clone(),
            messages: all,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens_per_request,
            stream: false,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse> {
        let request = self.build_request(system_prompt, messages);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            "Calling chat completions ({}) with {} messages",
            self.config.model,
            messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({status}): {body}");
        }

        let resp: ChatResponse = response.json().await?;
        let llm_response = into_llm_response(resp)?;

        info!(
            "LLM response: {} in / {} out tokens",
            llm_response.input_tokens, llm_response.output_tokens
        );

        Ok(llm_response)
    }

    fn description(&self) -> String {
        format!("{} ({})", self.config.provider, self.config.model)
    }
}

fn into_llm_response(resp: ChatResponse) -> Result<LlmResponse> {
    let Some(choice) = resp.choices.into_iter().next() else {
        anyhow::bail!("LLM API returned no choices");
    };
    let (input_tokens, output_tokens) = resp
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    Ok(LlmResponse {
        text: choice.message.content.unwrap_or_default(),
        input_tokens,
        output_tokens,
    })
}
