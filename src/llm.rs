//! `Agent` backed by an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{Agent, AgentError, ChatMessage};
use crate::api::join_url;
use crate::config::AgentConfig;

const REQUEST_TIMEOUT_SECONDS: u64 = 120;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

pub struct OpenAiCompatibleAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleAgent {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: String,
        temperature: f32,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| AgentError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: join_url(base_url, "chat/completions"),
            api_key,
            model,
            temperature,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(
            &config.base_url,
            api_key,
            config.model.clone(),
            config.temperature,
        )
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Backend(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Backend(format!("status {}: {}", status, body)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Backend(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| AgentError::Backend("model returned no choices".to_string()))
    }
}

#[async_trait]
impl Agent for OpenAiCompatibleAgent {
    async fn ask(
        &self,
        messages: &[ChatMessage],
        token: &CancellationToken,
    ) -> Result<String, AgentError> {
        debug!(model = %self.model, messages = messages.len(), "agent_request");
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            result = self.complete(messages) => result,
        }
    }
}
