//! Out-of-band notifications shown outside the chat turn that caused them.

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::api::ProviderAuthInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub label: String,
    /// URL the action opens.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action: None,
        }
    }

    pub fn with_action(
        message: impl Into<String>,
        label: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            action: Some(NotificationAction {
                label: label.into(),
                target: target.into(),
            }),
        }
    }

    /// The repository created by a fulfillment is ready.
    pub fn repo_ready(repo_url_base: &str, repo_name: &str) -> Self {
        let url = format!("{}/{}", repo_url_base.trim_end_matches('/'), repo_name);
        Self::with_action(format!("{} is ready! Clone it now?", url), "Clone repo", url)
    }

    pub fn request_complete(request_id: &str, status_text: &str) -> Self {
        Self::info(format!(
            "Internal Developer Platform request {} is complete! {}",
            request_id, status_text
        ))
    }

    pub fn poll_timeout(request_id: &str, attempts: u32) -> Self {
        Self::info(format!(
            "Request {} is still not complete after {} status checks. Giving up.",
            request_id, attempts
        ))
    }

    /// The platform needs the user to authorize a provider before it can act.
    pub fn authorize_provider(info: &ProviderAuthInfo) -> Self {
        Self::with_action(
            format!(
                "The Internal Developer Platform needs access to {}. Authorize it to continue.",
                info.realm
            ),
            format!("Authorize {}", info.realm),
            info.authorization_uri.clone(),
        )
    }
}

/// Sink for notifications. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to the chat surface over an unbounded channel.
pub struct ChannelNotifier {
    sender: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: UnboundedSender<Notification>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            warn!("notification_dropped_receiver_closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_repo_ready_message_and_action() {
        let n = Notification::repo_ready("https://github.com/", "my-service");
        assert_eq!(n.message, "https://github.com/my-service is ready! Clone it now?");
        let action = n.action.unwrap();
        assert_eq!(action.label, "Clone repo");
        assert_eq!(action.target, "https://github.com/my-service");
    }

    #[test]
    fn test_request_complete_message() {
        let n = Notification::request_complete("abc", "{\"state\":\"done\"}");
        assert_eq!(
            n.message,
            "Internal Developer Platform request abc is complete! {\"state\":\"done\"}"
        );
        assert!(n.action.is_none());
    }

    #[test]
    fn test_poll_timeout_message() {
        let n = Notification::poll_timeout("abc", 3);
        assert_eq!(
            n.message,
            "Request abc is still not complete after 3 status checks. Giving up."
        );
    }

    #[test]
    fn test_authorize_provider_links_to_uri() {
        let info = ProviderAuthInfo {
            realm: "GitHub".to_string(),
            authorization_uri: "https://auth.example.com".to_string(),
        };
        let n = Notification::authorize_provider(&info);
        assert!(n.message.contains("GitHub"));
        assert_eq!(n.action.unwrap().target, "https://auth.example.com");
    }

    #[test]
    fn test_channel_notifier_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = ChannelNotifier::new(tx);
        notifier.notify(Notification::info("hello"));
        assert_eq!(rx.try_recv().unwrap().message, "hello");
    }

    #[test]
    fn test_channel_notifier_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelNotifier::new(tx).notify(Notification::info("lost"));
    }
}
