//! The language model behind command classification, query refinement and
//! template matching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Participant name attached to every message sent to the model.
pub const AGENT_NAME: &str = "Internal_Developer_Platform";

/// Reply the prompts ask the model to give when it cannot do what was asked.
pub const FAILURE_SENTINEL: &str = "IFAILEDTODOITOHNO";

/// Some backends append this to the end of a reply.
pub const RESPONSE_END_MARKER: &str = "[RESPONSE END]";

pub const DEFAULT_MAX_JSON_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: Some(AGENT_NAME.to_string()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("the request was cancelled")]
    Cancelled,
    #[error("language model request failed: {0}")]
    Backend(String),
    #[error("language model failed to generate json based on input. Response: {response}")]
    Declined { response: String },
    #[error(
        "language model was unable to generate a json response after {attempts} attempts. Last response: {last_response}"
    )]
    InvalidJson {
        attempts: u32,
        last_response: String,
    },
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Send a conversation and return the full text of the reply.
    async fn ask(
        &self,
        messages: &[ChatMessage],
        token: &CancellationToken,
    ) -> Result<String, AgentError>;
}

/// Strip the end marker and a surrounding Markdown code fence from a reply.
pub fn clean_response(response: &str) -> String {
    let text = response.replace(RESPONSE_END_MARKER, "");
    let trimmed = text.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (```json) on the opening line.
    let body = fenced.split_once('\n').map_or("", |(_, rest)| rest);
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Ask until the reply parses as JSON.
///
/// A reply containing [`FAILURE_SENTINEL`] fails immediately. Other unparsable
/// replies are retried up to `max_attempts` times in total.
pub async fn ask_for_json(
    agent: &dyn Agent,
    messages: &[ChatMessage],
    token: &CancellationToken,
    max_attempts: u32,
) -> Result<Value, AgentError> {
    let max_attempts = max_attempts.max(1);
    let mut last_response = String::new();

    for attempt in 1..=max_attempts {
        if token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let response = agent.ask(messages, token).await?;
        if response.contains(FAILURE_SENTINEL) {
            debug!(attempt, "agent_declined");
            return Err(AgentError::Declined { response });
        }
        match serde_json::from_str::<Value>(&clean_response(&response)) {
            Ok(json) => return Ok(json),
            Err(e) => {
                warn!(attempt, error = %e, "agent_json_parse_failed");
                last_response = response;
            }
        }
    }

    Err(AgentError::InvalidJson {
        attempts: max_attempts,
        last_response,
    })
}
