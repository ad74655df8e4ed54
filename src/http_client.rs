//! HTTP transport abstraction.
//!
//! The engine only ever sends a finished [`RequestTemplate`] through the
//! [`Transport`] trait, so tests inject a fake and never open a socket.
//! Transport failures and non-2xx responses both come back as
//! [`EngineError::Transport`]; nothing is retried here.

use crate::error::EngineError;
use crate::template::RequestTemplate;
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// A completed 2xx exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
    /// Best-effort parse of `body`; `None` when empty or not JSON.
    pub json: Option<Value>,
}

impl HttpResponse {
    /// Builds a response from body text, parsing JSON when possible.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let json = parse_response_json(&body);
        Self {
            status,
            headers: IndexMap::new(),
            body,
            json,
        }
    }
}

/// Parses a response body as JSON, ignoring failures.
pub fn parse_response_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Trait for issuing assembled requests.
///
/// # Errors
///
/// Implementations return [`EngineError::Transport`] when the exchange cannot
/// complete or the server answers with a non-2xx status. The error keeps the
/// status code and the parsed error body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestTemplate) -> Result<HttpResponse, EngineError>;
}

/// Transport implementation using reqwest.
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

fn network_error(err: reqwest::Error) -> EngineError {
    EngineError::Transport {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
        body: None,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestTemplate) -> Result<HttpResponse, EngineError> {
        let mut builder = self.client.request(request.method.clone(), &request.url).timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        info!("{} {}", request.method, request.url);
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let text = response.text().await.map_err(network_error)?;
        debug!("Response {} ({} bytes)", status.as_u16(), text.len());

        let json = parse_response_json(&text);
        if !status.is_success() {
            let message = status.canonical_reason().unwrap_or("unexpected status").to_string();
            let body = json.or_else(|| (!text.is_empty()).then(|| Value::String(text.clone())));
            return Err(EngineError::Transport {
                status: Some(status.as_u16()),
                message,
                body,
            });
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body: text,
            json,
        })
    }
}
