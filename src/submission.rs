//! Submitting a fulfillment request and following it to completion.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, PlatformApi, STATUS_ACCEPTED, STATUS_OK, TemplateRequest};
use crate::config::PollingConfig;
use crate::notify::{Notification, Notifier};
use crate::session::FulfillmentState;
use crate::template::REPO_ENTITY_KIND;

/// Input value that names the repository a template creates.
const REPO_NAME_FIELD: &str = "name";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("the platform rejected the request. Status: {status}")]
    Rejected { status: u16 },
    #[error("the platform accepted the request but did not return its id")]
    MissingRequestId,
    #[error("could not encode the input values: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_attempts: u32,
    /// Used when neither the status nor the accept response has `Retry-After`.
    pub default_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            default_interval: Duration::from_secs(config.default_interval_secs),
        }
    }
}

/// Everything the background poll needs, copied out of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PollJob {
    pub request_id: String,
    pub template_title: String,
    pub creates: Vec<String>,
    /// Collected `name` value when the template creates a repository.
    pub repo_name: Option<String>,
    /// `Retry-After` of the accept response, in seconds.
    pub accept_retry_after: Option<u64>,
}

impl PollJob {
    pub fn new(state: &FulfillmentState, request_id: String, accept_retry_after: Option<u64>) -> Self {
        let creates = state.template.creates_kinds();
        let repo_name = if creates.iter().any(|k| k == REPO_ENTITY_KIND) {
            state
                .collected_values
                .get(REPO_NAME_FIELD)
                .map(|v| v.to_string())
                .filter(|n| !n.is_empty())
        } else {
            None
        };
        Self {
            request_id,
            template_title: state.template.title().to_string(),
            creates,
            repo_name,
            accept_retry_after,
        }
    }

    fn completion_notification(&self, repo_url_base: &str, status_text: &str) -> Notification {
        match &self.repo_name {
            Some(name) => Notification::repo_ready(repo_url_base, name),
            None => Notification::request_complete(&self.request_id, status_text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { attempts: u32 },
    TimedOut { attempts: u32 },
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// The platform is still working on it; a notification follows.
    Accepted {
        request_id: String,
        poll: JoinHandle<PollOutcome>,
    },
    Completed { request_id: Option<String> },
}

impl SubmitOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Accepted { request_id, .. } => format!(
                "\nRequest {} submitted! I'll let you know when it's done!",
                request_id
            ),
            Self::Completed {
                request_id: Some(id),
            } => format!("\nRequest {} complete!", id),
            Self::Completed { request_id: None } => "\nRequest complete!".to_string(),
        }
    }
}

/// Post the collected values. An accepted request is polled in the background.
pub async fn submit_fulfillment(
    api: Arc<dyn PlatformApi>,
    notifier: Arc<dyn Notifier>,
    state: &FulfillmentState,
    settings: PollSettings,
    repo_url_base: &str,
) -> Result<SubmitOutcome, SubmitError> {
    let request = TemplateRequest {
        template_ref: state.template.template_ref(),
        provider: state.template.metadata.provider.clone(),
        input_json: state.input_json()?,
    };
    info!(template_ref = %request.template_ref, "fulfillment_submitting");

    let result = api.submit_fulfillment(&request).await?;
    if !result.success {
        warn!(status = result.status, body = %result.text, "fulfillment_rejected");
        return Err(SubmitError::Rejected {
            status: result.status,
        });
    }

    if result.status == STATUS_ACCEPTED {
        let request_id = result.id().ok_or(SubmitError::MissingRequestId)?;
        info!(request_id = %request_id, "fulfillment_accepted");
        let job = PollJob::new(state, request_id.clone(), result.retry_after);
        let poll = spawn_status_poll(api, notifier, job, settings, repo_url_base.to_string());
        return Ok(SubmitOutcome::Accepted { request_id, poll });
    }

    info!(status = result.status, "fulfillment_completed");
    Ok(SubmitOutcome::Completed {
        request_id: result.id(),
    })
}

fn interval_from(seconds: Option<u64>) -> Option<Duration> {
    seconds.filter(|s| *s > 0).map(Duration::from_secs)
}

/// Poll the status endpoint until the request completes or attempts run out.
///
/// Exactly one notification is sent either way.
pub fn spawn_status_poll(
    api: Arc<dyn PlatformApi>,
    notifier: Arc<dyn Notifier>,
    job: PollJob,
    settings: PollSettings,
    repo_url_base: String,
) -> JoinHandle<PollOutcome> {
    tokio::spawn(async move {
        let fallback =
            interval_from(job.accept_retry_after).unwrap_or(settings.default_interval);
        let mut interval = fallback;

        for attempt in 1..=settings.max_attempts {
            tokio::time::sleep(interval).await;
            match api.fulfillment_status(&job.request_id).await {
                Ok(result) if result.status == STATUS_OK => {
                    info!(request_id = %job.request_id, attempt, creates = ?job.creates, "fulfillment_done");
                    notifier.notify(job.completion_notification(&repo_url_base, &result.text));
                    return PollOutcome::Completed { attempts: attempt };
                }
                Ok(result) => {
                    if result.status == STATUS_ACCEPTED {
                        debug!(request_id = %job.request_id, attempt, "fulfillment_still_running");
                    } else {
                        warn!(
                            request_id = %job.request_id,
                            attempt,
                            status = result.status,
                            "fulfillment_status_unexpected"
                        );
                    }
                    interval = interval_from(result.retry_after).unwrap_or(fallback);
                }
                Err(e) => {
                    warn!(request_id = %job.request_id, attempt, error = %e, "fulfillment_status_failed");
                    interval = fallback;
                }
            }
        }

        warn!(
            request_id = %job.request_id,
            attempts = settings.max_attempts,
            template = %job.template_title,
            "fulfillment_poll_timed_out"
        );
        notifier.notify(Notification::poll_timeout(
            &job.request_id,
            settings.max_attempts,
        ));
        PollOutcome::TimedOut {
            attempts: settings.max_attempts,
        }
    })
}
