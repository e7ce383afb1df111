//! Client for the Internal Developer Platform HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName, RETRY_AFTER, WWW_AUTHENTICATE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ApiConfig;

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// Statuses the platform uses for success. 202 means "accepted, still running".
const SUCCESS_STATUSES: &[u16] = &[200, 201, 202];
pub const STATUS_OK: u16 = 200;
pub const STATUS_ACCEPTED: u16 = 202;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("platform API base URL is not configured")]
    MissingBaseUrl,
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request to `{path}` failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Provider authorization the platform asks for through `WWW-Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAuthInfo {
    pub realm: String,
    pub authorization_uri: String,
}

/// Outcome of one platform call. Transport failures are `ApiError` instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResult {
    pub success: bool,
    pub status: u16,
    /// Seconds from the `Retry-After` header.
    pub retry_after: Option<u64>,
    pub auth_challenge: Option<ProviderAuthInfo>,
    pub text: String,
    /// Parsed body, `Value::Null` when the body is not JSON.
    pub json: Value,
}

impl ApiResult {
    pub fn from_parts(status: u16, retry_after: Option<u64>, text: String) -> Self {
        let json = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            success: is_success_status(status),
            status,
            retry_after,
            auth_challenge: None,
            text,
            json,
        }
    }

    /// Identifier of the created request (`{"id": ...}` in the body).
    pub fn id(&self) -> Option<String> {
        match self.json.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub fn is_success_status(status: u16) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Body of a fulfillment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    pub template_ref: String,
    #[serde(default)]
    pub provider: Option<String>,
    /// Collected input values, serialized as a single JSON document.
    pub input_json: String,
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn call(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<ApiResult, ApiError>;

    async fn list_templates(&self) -> Result<ApiResult, ApiError> {
        self.call("entities/template", HttpMethod::Get, None).await
    }

    async fn submit_fulfillment(&self, request: &TemplateRequest) -> Result<ApiResult, ApiError> {
        let body = serde_json::to_value(request)?;
        self.call("entities", HttpMethod::Post, Some(body)).await
    }

    async fn fulfillment_status(&self, id: &str) -> Result<ApiResult, ApiError> {
        self.call(&format!("status/{}", id), HttpMethod::Get, None)
            .await
    }
}

/// Parse a provider challenge such as
/// `Bearer realm="GitHub",authorization_uri="https://...",scopes="api://..."`.
/// Parameters other than `realm` and `authorization_uri` are ignored.
pub fn parse_www_authenticate(header: &str) -> Option<ProviderAuthInfo> {
    let mut realm = None;
    let mut authorization_uri = None;

    for param in header.split(',') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let key = key.strip_prefix("Bearer ").unwrap_or(key).trim();
        let value = value.trim().replace('"', "");
        match key {
            "realm" => realm = Some(value),
            "authorization_uri" => authorization_uri = Some(value),
            _ => {}
        }
    }

    Some(ProviderAuthInfo {
        realm: realm?,
        authorization_uri: authorization_uri?,
    })
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// `PlatformApi` over HTTP with an optional bearer token.
pub struct HttpPlatformApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPlatformApi {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, ApiError> {
        if base_url.trim().is_empty() {
            return Err(ApiError::MissingBaseUrl);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            warn!(env = %config.token_env, "platform_token_missing");
        }
        Self::new(config.base_url.clone(), token)
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn call(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<ApiResult, ApiError> {
        let url = join_url(&self.base_url, path);
        let mut request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        }
        .header(ACCEPT, "application/json")
        .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let transport = |source| ApiError::Transport {
            path: path.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let retry_after = header(RETRY_AFTER).and_then(|v| v.trim().parse::<u64>().ok());
        let auth_challenge = if status == STATUS_OK {
            header(WWW_AUTHENTICATE).and_then(|v| parse_www_authenticate(&v))
        } else {
            None
        };

        let text = response.text().await.map_err(transport)?;
        debug!(path, status, "platform_api_response");

        let mut result = ApiResult::from_parts(status, retry_after, text);
        result.auth_challenge = auth_challenge;
        Ok(result)
    }
}
