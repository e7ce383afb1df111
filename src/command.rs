//! Command vocabulary and resolution of a chat turn into a command.

use std::fmt;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{Agent, ChatMessage, ask_for_json};
use crate::prompts::COMMAND_SELECTION_PROMPT;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentCommand {
    /// Not resolved yet. The initial and reset value of a session, never returned.
    #[default]
    FindCommand,
    FindTemplate,
    Fulfill,
    Cancel,
    Help,
    Question,
    None,
}

impl AgentCommand {
    /// Commands reachable through a slash token.
    pub const SLASH_COMMANDS: [AgentCommand; 5] = [
        AgentCommand::FindTemplate,
        AgentCommand::Fulfill,
        AgentCommand::Cancel,
        AgentCommand::Question,
        AgentCommand::Help,
    ];

    /// Wire token, e.g. `/fulfill`. `None` for the internal states.
    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::FindTemplate => Some("/template"),
            Self::Fulfill => Some("/fulfill"),
            Self::Cancel => Some("/cancel"),
            Self::Help => Some("/help"),
            Self::Question => Some("/question"),
            Self::FindCommand | Self::None => None,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::SLASH_COMMANDS
            .into_iter()
            .find(|c| c.token() == Some(token))
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::FindTemplate => "Search the templates available to request.",
            Self::Fulfill => "Fulfill a template, collecting its inputs one at a time.",
            Self::Cancel => "Cancel whatever command is in flight.",
            Self::Help => "Show this list of commands.",
            Self::Question => "Ask a question about the platform and its templates.",
            Self::FindCommand | Self::None => "",
        }
    }

    /// Whether this command owns the conversation across turns.
    pub fn is_in_progress(self) -> bool {
        !matches!(self, Self::FindCommand | Self::None)
    }
}

impl fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token() {
            Some(token) => write!(f, "{}", token),
            None => write!(f, "{:?}", self),
        }
    }
}

/// One chat turn as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub prompt: String,
    /// Command picked by the chat surface (without the leading `/`).
    pub slash_command: Option<String>,
}

impl TurnInput {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            slash_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: AgentCommand,
    pub argument: String,
}

impl CommandRequest {
    pub fn new(command: AgentCommand, argument: impl Into<String>) -> Self {
        Self {
            command,
            argument: argument.into(),
        }
    }
}

/// First token selects the command, the rest is the argument.
fn parse_tokens<S: AsRef<str>>(tokens: &[S]) -> CommandRequest {
    let command = tokens
        .first()
        .and_then(|t| AgentCommand::from_token(t.as_ref().trim()))
        .unwrap_or(AgentCommand::None);
    let argument = tokens
        .iter()
        .skip(1)
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    CommandRequest { command, argument }
}

/// Remove a leading echo of `token` from a continuation turn.
fn strip_command_echo<'a>(prompt: &'a str, token: Option<&str>) -> &'a str {
    let Some(token) = token else {
        return prompt;
    };
    match prompt.strip_prefix(token) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => prompt,
    }
}

fn is_cancel(input: &TurnInput, prompt: &str) -> bool {
    input.slash_command.as_deref() == Some("cancel")
        || prompt.starts_with("/abort")
        || prompt.starts_with("/cancel")
}

/// Resolve a turn into a command given the session.
///
/// Never fails: when the agent cannot classify free text the result is
/// `AgentCommand::None`.
pub async fn resolve_command(
    state: &SessionState,
    input: &TurnInput,
    agent: &dyn Agent,
    token: &CancellationToken,
    max_json_attempts: u32,
) -> CommandRequest {
    let prompt = input.prompt.trim();

    if is_cancel(input, prompt) {
        return CommandRequest::new(AgentCommand::Cancel, "");
    }

    let in_progress = state.command_in_progress;
    if in_progress.is_in_progress() {
        let argument = strip_command_echo(prompt, in_progress.token());
        return CommandRequest::new(in_progress, argument);
    }

    if let Some(name) = &input.slash_command {
        let mut tokens = vec![format!("/{}", name)];
        tokens.extend(prompt.split(' ').map(str::to_string));
        return parse_tokens(&tokens);
    }
    if prompt.starts_with('/') {
        return parse_tokens(&prompt.split(' ').collect::<Vec<_>>());
    }
    if prompt.is_empty() {
        return CommandRequest::new(AgentCommand::None, "");
    }

    let messages = [
        ChatMessage::system(COMMAND_SELECTION_PROMPT),
        ChatMessage::user(prompt),
    ];
    match ask_for_json(agent, &messages, token, max_json_attempts).await {
        Ok(Value::Array(items)) => {
            let tokens: Vec<&str> = items.iter().map(|v| v.as_str().unwrap_or("")).collect();
            let request = parse_tokens(&tokens);
            info!(command = %request.command, argument = %request.argument, "command_resolved");
            request
        }
        Ok(other) => {
            debug!(response = %other, "command_resolution_not_an_array");
            CommandRequest::new(AgentCommand::None, "")
        }
        Err(e) => {
            info!(error = %e, "command_resolution_failed");
            CommandRequest::new(AgentCommand::None, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedAgent;

    async fn resolve(state: &SessionState, input: TurnInput, agent: &ScriptedAgent) -> CommandRequest {
        resolve_command(state, &input, agent, &CancellationToken::new(), 5).await
    }

    fn fulfilling() -> SessionState {
        SessionState {
            command_in_progress: AgentCommand::Fulfill,
            fulfillment: None,
        }
    }

    #[test]
    fn test_token_mapping_round_trips() {
        for command in AgentCommand::SLASH_COMMANDS {
            let token = command.token().unwrap();
            assert_eq!(AgentCommand::from_token(token), Some(command));
        }
        assert_eq!(AgentCommand::from_token("/azd-template"), None);
        assert_eq!(AgentCommand::None.token(), None);
        assert_eq!(AgentCommand::FindCommand.token(), None);
    }

    #[test]
    fn test_strip_command_echo() {
        assert_eq!(strip_command_echo("/fulfill prod", Some("/fulfill")), "prod");
        assert_eq!(strip_command_echo("/fulfill", Some("/fulfill")), "");
        assert_eq!(strip_command_echo("/fulfillment", Some("/fulfill")), "/fulfillment");
        assert_eq!(strip_command_echo("prod", Some("/fulfill")), "prod");
    }

    #[tokio::test]
    async fn test_cancel_overrides_in_progress_command() {
        let agent = ScriptedAgent::empty();
        for prompt in ["/cancel", "/abort now", "  /cancel please"] {
            let request = resolve(&fulfilling(), TurnInput::text(prompt), &agent).await;
            assert_eq!(request, CommandRequest::new(AgentCommand::Cancel, ""));
        }
        let explicit = TurnInput {
            prompt: "whatever".to_string(),
            slash_command: Some("cancel".to_string()),
        };
        assert_eq!(
            resolve(&fulfilling(), explicit, &agent).await.command,
            AgentCommand::Cancel
        );
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_in_progress_command_consumes_turn() {
        let agent = ScriptedAgent::empty();
        let request = resolve(&fulfilling(), TurnInput::text("  prod "), &agent).await;
        assert_eq!(request, CommandRequest::new(AgentCommand::Fulfill, "prod"));

        let request = resolve(&fulfilling(), TurnInput::text("/template web"), &agent).await;
        assert_eq!(request, CommandRequest::new(AgentCommand::Fulfill, "/template web"));

        let request = resolve(&fulfilling(), TurnInput::text("/fulfill yes"), &agent).await;
        assert_eq!(request.argument, "yes");
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_slash_text_is_parsed_directly() {
        let agent = ScriptedAgent::empty();
        let state = SessionState::default();
        let request = resolve(&state, TurnInput::text("/fulfill  Web App"), &agent).await;
        assert_eq!(request, CommandRequest::new(AgentCommand::Fulfill, "Web App"));

        let request = resolve(&state, TurnInput::text("/unknown thing"), &agent).await;
        assert_eq!(request, CommandRequest::new(AgentCommand::None, "thing"));
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_slash_command() {
        let agent = ScriptedAgent::empty();
        let input = TurnInput {
            prompt: "react apps".to_string(),
            slash_command: Some("template".to_string()),
        };
        let request = resolve(&SessionState::default(), input, &agent).await;
        assert_eq!(request, CommandRequest::new(AgentCommand::FindTemplate, "react apps"));
    }

    #[tokio::test]
    async fn test_free_text_is_classified_by_agent() {
        let agent = ScriptedAgent::new([r#"["/template", "with kubernetes"]"#]);
        let request = resolve(
            &SessionState::default(),
            TurnInput::text("what templates have kubernetes"),
            &agent,
        )
        .await;
        assert_eq!(request, CommandRequest::new(AgentCommand::FindTemplate, "with kubernetes"));
        let sent = agent.requests();
        assert_eq!(sent[0][0].content, COMMAND_SELECTION_PROMPT);
        assert_eq!(sent[0][1].content, "what templates have kubernetes");
    }

    #[tokio::test]
    async fn test_agent_failure_resolves_to_none() {
        let agent = ScriptedAgent::new(["IFAILEDTODOITOHNO"]);
        let request = resolve(&SessionState::default(), TurnInput::text("hello"), &agent).await;
        assert_eq!(request, CommandRequest::new(AgentCommand::None, ""));

        let agent = ScriptedAgent::new([r#"{"command": "/template"}"#]);
        let request = resolve(&SessionState::default(), TurnInput::text("hello"), &agent).await;
        assert_eq!(request.command, AgentCommand::None);
    }

    #[tokio::test]
    async fn test_empty_turn_is_none_without_agent_call() {
        let agent = ScriptedAgent::empty();
        let request = resolve(&SessionState::default(), TurnInput::text("   "), &agent).await;
        assert_eq!(request.command, AgentCommand::None);
        assert_eq!(agent.call_count(), 0);
    }
}
