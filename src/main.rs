mod agent;
mod api;
mod catalog;
mod command;
mod config;
mod discovery;
mod dispatch;
mod engine;
mod fields;
mod fulfillment;
mod llm;
mod logging;
mod notify;
mod prompts;
mod search_query;
mod session;
mod submission;
mod template;
#[cfg(test)]
mod test_support;
mod validators;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::api::{HttpPlatformApi, PlatformApi};
use crate::catalog::TemplateCatalog;
use crate::command::TurnInput;
use crate::config::ConfigLoadStatus;
use crate::engine::{ChatEngine, ChatResponse, EngineSettings, Services};
use crate::llm::OpenAiCompatibleAgent;
use crate::notify::{ChannelNotifier, Notification, Notifier};

/// Participant mention the chat surface accepts in front of a turn.
const PARTICIPANT_MENTION: &str = "@devplat";

#[derive(Debug, Parser)]
#[command(name = "devplat", version, about = "Chat with the Internal Developer Platform")]
struct Cli {
    /// Use this config file instead of the global one.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Platform API base URL, overriding the configured one.
    #[arg(long, value_name = "URL")]
    api_base_url: Option<String>,

    /// Log level or filter directive, e.g. `debug` or `devplat=trace`.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Contract a path by replacing the home directory with `~` for display.
fn contract_path(path: &std::path::Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(suffix) = path.strip_prefix(&home)
    {
        return format!("~/{}", suffix.display());
    }
    path.display().to_string()
}

/// Turn a line typed at the prompt into a chat turn.
///
/// A bare number picks one of the follow-ups offered by the previous turn.
/// An empty line is only a turn while a command is in progress, where it
/// answers the current field with an empty string.
fn turn_from_line(line: &str, follow_ups: &[String], in_progress: bool) -> Option<TurnInput> {
    let mut text = line.trim();
    if let Some(rest) = text.strip_prefix(PARTICIPANT_MENTION) {
        text = rest.trim();
    }
    if let Ok(choice) = text.parse::<usize>()
        && let Some(follow_up) = choice.checked_sub(1).and_then(|i| follow_ups.get(i))
    {
        return Some(TurnInput::text(follow_up.clone()));
    }
    if text.is_empty() && !in_progress {
        return None;
    }
    Some(TurnInput::text(text))
}

fn print_response(response: &ChatResponse) {
    let text = response.text();
    if !text.is_empty() {
        println!("{}", text.trim_end());
    }
    if let Some(error) = &response.error {
        println!("Error: {}", error);
    }
    if !response.follow_ups.is_empty() {
        println!();
        for (i, follow_up) in response.follow_ups.iter().enumerate() {
            println!("  [{}] {}", i + 1, follow_up);
        }
    }
    println!();
}

fn print_notification(notification: &Notification) {
    println!("\n[notification] {}", notification.message);
    if let Some(action) = &notification.action {
        println!("  {}: {}", action.label, action.target);
    }
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Run one turn. Ctrl-C while it runs cancels the turn, not the program.
async fn run_turn(engine: &mut ChatEngine, input: &TurnInput) -> ChatResponse {
    let token = CancellationToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };
    let started = Instant::now();
    let response = engine.handle_turn(input, &token).await;
    watcher.abort();
    debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        cancelled = token.is_cancelled(),
        "turn_finished"
    );
    response
}

async fn run_chat(
    engine: &mut ChatEngine,
    notifications: &mut UnboundedReceiver<Notification>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut follow_ups: Vec<String> = Vec::new();

    println!("Hi! I'm the Internal Developer Platform assistant. Type /help to see what I can do.\n");
    print_prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    info!("input_closed");
                    return Ok(());
                };
                let in_progress = engine.session().command_in_progress.is_in_progress();
                let Some(input) = turn_from_line(&line, &follow_ups, in_progress) else {
                    print_prompt();
                    continue;
                };
                let response = run_turn(engine, &input).await;
                print_response(&response);
                follow_ups = response.follow_ups;
                print_prompt();
            }
            Some(notification) = notifications.recv() => {
                print_notification(&notification);
                print_prompt();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                println!();
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let start_time = Instant::now();
    dotenvy::dotenv().ok();

    let mut loaded_config = config::load_config(cli.config.as_deref());
    if let Some(base_url) = cli.api_base_url {
        loaded_config.config.api.base_url = base_url;
    }
    if let Some(level) = cli.log_level {
        loaded_config.config.logging.level = level;
    }

    // Initialize logging before anything else talks to the network
    let logging = match logging::init(&loaded_config.config.logging.level) {
        Ok(ctx) => {
            logging::cleanup_old_logs(&ctx.log_directory);
            Some(ctx)
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    debug!(
        config_path = %loaded_config.config_path.display(),
        project_config = ?loaded_config.project_config_path,
        status = ?loaded_config.status,
        "config_loaded"
    );
    match &loaded_config.status {
        ConfigLoadStatus::Created => println!(
            "Created config file at {}",
            contract_path(&loaded_config.config_path)
        ),
        ConfigLoadStatus::Error(message) => eprintln!(
            "Warning: {} ({}), using defaults",
            message,
            contract_path(&loaded_config.config_path)
        ),
        ConfigLoadStatus::Loaded => {}
    }
    let config = loaded_config.config;

    let (sender, mut notifications) = mpsc::unbounded_channel();
    let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(sender));
    let api: Arc<dyn PlatformApi> = Arc::new(
        HttpPlatformApi::from_config(&config.api).context("failed to create platform client")?,
    );
    let agent: Arc<dyn Agent> = Arc::new(
        OpenAiCompatibleAgent::from_config(&config.agent)
            .context("failed to create language model client")?,
    );

    let catalog = match TemplateCatalog::load(api.as_ref(), notifier.as_ref()).await {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "catalog_load_failed");
            eprintln!(
                "Warning: could not load templates from {}: {}",
                config.api.base_url, e
            );
            TemplateCatalog::empty().context("failed to create template index")?
        }
    };
    info!(
        templates = catalog.len(),
        api = %config.api.base_url,
        model = %config.agent.model,
        "chat_ready"
    );

    let mut engine = ChatEngine::new(Services {
        agent,
        api,
        catalog,
        notifier,
        settings: EngineSettings::from_config(&config),
    });
    let result = run_chat(&mut engine, &mut notifications).await;

    if let Some(ctx) = &logging {
        info!(
            session_id = %ctx.session_id,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "session_end"
        );
    }
    result
}
