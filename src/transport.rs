// Raw HTTP transport
// Request/response descriptors and the wire-level seam the gateway sits on

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::error::TransportError;

/// An outbound request descriptor. Carries no authorization header; the
/// gateway decides what credential to attach.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Self {
        self.body = serde_json::to_value(body).ok();
        self
    }
}

/// A received HTTP response: status plus parsed body. Non-JSON bodies are
/// kept as a JSON string so error text is never lost.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Best-effort human-readable error message. The backend reports errors
    /// as `{"detail": "..."}`.
    pub fn error_message(&self) -> String {
        self.body
            .get("detail")
            .and_then(|d| d.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.body.to_string())
    }
}

/// The "send HTTP request" primitive the gateway is built on. Production
/// code uses [`HttpTransport`]; tests inject scripted implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single request, attaching `bearer` as an Authorization header
    /// when present. Returns the response whatever its status; `Err` means
    /// no response was received at all.
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> std::result::Result<ApiResponse, TransportError>;
}

/// Transport over a pooled reqwest client
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url, request_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn build_url(&self, request: &ApiRequest) -> std::result::Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| TransportError::Other(format!("invalid request path: {}", e)))?;

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> std::result::Result<ApiResponse, TransportError> {
        let url = self.build_url(request)?;

        tracing::debug!(
            method = %request.method,
            url = %url,
            authenticated = bearer.is_some(),
            "Sending HTTP request"
        );

        let mut builder = self.client.request(request.method.clone(), url);

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        tracing::debug!(status = status, "Received HTTP response");

        let body = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}
