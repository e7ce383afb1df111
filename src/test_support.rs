//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentError, ChatMessage};
use crate::api::{ApiError, ApiResult, HttpMethod, PlatformApi, STATUS_ACCEPTED};
use crate::catalog::TemplateCatalog;
use crate::engine::{EngineSettings, Services};
use crate::notify::{Notification, Notifier};
use crate::template::Template;

#[derive(Default)]
struct AgentScript {
    responses: VecDeque<String>,
    requests: Vec<Vec<ChatMessage>>,
}

/// Agent that replays canned replies in order and records what it was sent.
#[derive(Clone, Default)]
pub struct ScriptedAgent {
    script: Arc<Mutex<AgentScript>>,
}

impl ScriptedAgent {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let agent = Self::default();
        for response in responses {
            agent.push(response);
        }
        agent
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&self, response: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .responses
            .push_back(response.into());
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.script.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn ask(
        &self,
        messages: &[ChatMessage],
        token: &CancellationToken,
    ) -> Result<String, AgentError> {
        if token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let mut script = self.script.lock().unwrap();
        script.requests.push(messages.to_vec());
        script
            .responses
            .pop_front()
            .ok_or_else(|| AgentError::Backend("no scripted response left".to_string()))
    }
}

#[derive(Default)]
struct ApiScript {
    responses: HashMap<String, VecDeque<ApiResult>>,
    calls: Vec<(String, Option<Value>)>,
}

/// Platform API answering from per-path queues.
///
/// Unscripted calls answer `202 Accepted` with an empty body.
#[derive(Default)]
pub struct MockPlatformApi {
    script: Mutex<ApiScript>,
}

impl MockPlatformApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, result: ApiResult) {
        self.script
            .lock()
            .unwrap()
            .responses
            .entry(path.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    pub fn bodies_sent_to(&self, path: &str) -> Vec<Value> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| p == path)
            .filter_map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl PlatformApi for MockPlatformApi {
    async fn call(
        &self,
        path: &str,
        _method: HttpMethod,
        body: Option<Value>,
    ) -> Result<ApiResult, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((path.to_string(), body));
        let scripted = script
            .responses
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| ApiResult::from_parts(STATUS_ACCEPTED, None, String::new())))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// Handles on the mocks wired into a [`Services`].
pub struct TestHandles {
    pub api: Arc<MockPlatformApi>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn services_with(templates: Vec<Template>, agent: ScriptedAgent) -> (Services, TestHandles) {
    let api = Arc::new(MockPlatformApi::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let services = Services {
        agent: Arc::new(agent),
        api: api.clone(),
        catalog: TemplateCatalog::from_templates(templates).unwrap(),
        notifier: notifier.clone(),
        settings: EngineSettings::default(),
    };
    (services, TestHandles { api, notifier })
}
