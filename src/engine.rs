//! Turn processing: resolve the command, run it, collect the reply.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{Agent, ChatMessage, DEFAULT_MAX_JSON_ATTEMPTS, clean_response};
use crate::api::PlatformApi;
use crate::catalog::TemplateCatalog;
use crate::command::{AgentCommand, TurnInput, resolve_command};
use crate::config::{Config, NotificationsConfig};
use crate::dispatch::dispatch;
use crate::fulfillment::HELP_FOLLOW_UP;
use crate::notify::Notifier;
use crate::prompts::ANSWER_QUESTIONS_PROMPT;
use crate::session::SessionState;
use crate::submission::PollSettings;

/// Tunables that flow from configuration into the turn handlers.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_json_attempts: u32,
    pub polling: PollSettings,
    pub repo_url_base: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_json_attempts: DEFAULT_MAX_JSON_ATTEMPTS,
            polling: PollSettings::default(),
            repo_url_base: NotificationsConfig::default().repo_url_base,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_json_attempts: config.agent.max_json_attempts.max(1),
            polling: PollSettings::from(&config.polling),
            repo_url_base: config.notifications.repo_url_base.clone(),
        }
    }
}

/// Collaborators shared by every turn of a session.
pub struct Services {
    pub agent: Arc<dyn Agent>,
    pub api: Arc<dyn PlatformApi>,
    pub catalog: TemplateCatalog,
    pub notifier: Arc<dyn Notifier>,
    pub settings: EngineSettings,
}

/// Everything one turn produced, in the order it should be shown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: Vec<String>,
    /// Suggested next replies.
    pub follow_ups: Vec<String>,
    /// Set when the turn ended in an error result rather than a reply.
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn report(&mut self, chunk: impl Into<String>) {
        self.content.push(chunk.into());
    }

    pub fn follow_up(&mut self, reply: impl Into<String>) {
        self.follow_ups.push(reply.into());
    }

    /// All content chunks joined together.
    pub fn text(&self) -> String {
        self.content.concat()
    }
}

pub(crate) fn format_help_message() -> String {
    let mut lines = vec!["Supported commands:".to_string()];
    for command in AgentCommand::SLASH_COMMANDS {
        if let Some(token) = command.token() {
            lines.push(format!("- `{}`: {}", token, command.description()));
        }
    }
    lines.push(String::new());
    lines.push("Free-form chat:".to_string());
    lines.push(
        "- Anything without a leading `/` is matched to one of the commands above.".to_string(),
    );
    lines.push("- While a request is being filled in, `/previous`, `/skip` and `/cancel` move through the inputs.".to_string());
    lines.join("\n")
}

/// One chat session: shared services plus the state only this engine mutates.
pub struct ChatEngine {
    services: Services,
    session: SessionState,
}

impl ChatEngine {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            session: SessionState::default(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    #[cfg(test)]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Process one turn to completion.
    pub async fn handle_turn(&mut self, input: &TurnInput, token: &CancellationToken) -> ChatResponse {
        let request = resolve_command(
            &self.session,
            input,
            self.services.agent.as_ref(),
            token,
            self.services.settings.max_json_attempts,
        )
        .await;
        debug!(
            command = %request.command,
            in_progress = %self.session.command_in_progress,
            "turn_started"
        );

        let needs_catalog = matches!(
            request.command,
            AgentCommand::FindTemplate | AgentCommand::Fulfill | AgentCommand::Question
        );
        if needs_catalog && self.services.catalog.is_empty() {
            self.reload_catalog().await;
        }

        match request.command {
            AgentCommand::Question => self.answer_question(&request.argument, token).await,
            AgentCommand::Help => {
                let mut response = ChatResponse::default();
                response.report(format_help_message());
                response
            }
            AgentCommand::None | AgentCommand::FindCommand => {
                let mut response = ChatResponse::default();
                response.report("Hmmm. Not sure what you want me to do. Can you try rephrasing?");
                response.follow_up(HELP_FOLLOW_UP);
                response
            }
            _ => dispatch(&self.services, &mut self.session, &request, token).await,
        }
    }

    /// Fetch the template list again, keeping the current one on failure.
    pub async fn reload_catalog(&mut self) {
        let Services {
            api,
            catalog,
            notifier,
            ..
        } = &mut self.services;
        match catalog.refresh(api.as_ref(), notifier.as_ref()).await {
            Ok(count) => info!(count, "catalog_reloaded"),
            Err(e) => warn!(error = %e, "catalog_reload_failed"),
        }
    }

    async fn answer_question(&self, question: &str, token: &CancellationToken) -> ChatResponse {
        let mut response = ChatResponse::default();
        if question.trim().is_empty() {
            response.report("What would you like to know about the platform or its templates?");
            return response;
        }

        let summaries = match serde_json::to_string(&self.services.catalog.summaries()) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "template_summaries_encode_failed");
                "[]".to_string()
            }
        };
        let messages = [
            ChatMessage::system(format!("Here are the available templates: {}", summaries)),
            ChatMessage::system(ANSWER_QUESTIONS_PROMPT),
            ChatMessage::user(question.trim()),
        ];
        match self.services.agent.ask(&messages, token).await {
            Ok(answer) => {
                info!(templates = self.services.catalog.len(), "question_answered");
                response.report(clean_response(&answer));
            }
            Err(e) => {
                warn!(error = %e, "question_failed");
                response.report(format!("Oh man, I hit a problem!! {}", e));
                response.follow_up(HELP_FOLLOW_UP);
            }
        }
        response
    }
}
