//! Provider-call boundary.
//!
//! The orchestrator sees every backend through [`ProviderClient`]: given a
//! provider, model and messages, return content plus usage or a
//! [`ProviderCallError`]. HTTP details stay inside implementations.

#[cfg(feature = "ollama")]
pub mod ollama;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ModelMessage, Usage};

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// Response from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: Usage,
}

/// A failed provider call, as raw material for classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderCallError {
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Kind of failure at the origin (`"timeout"`, `"connect"`, `"http"`, ...).
    pub origin_type: Option<String>,
    pub inner_message: Option<String>,
}

impl ProviderCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            origin_type: None,
            inner_message: None,
        }
    }

    /// An HTTP error response.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            message: format!("{status} {body}").trim_end().to_string(),
            status: Some(status),
            origin_type: Some("http".to_string()),
            inner_message: (!body.is_empty()).then_some(body),
        }
    }

    pub fn with_origin(mut self, origin_type: impl Into<String>) -> Self {
        self.origin_type = Some(origin_type.into());
        self
    }

    pub fn with_inner(mut self, inner_message: impl Into<String>) -> Self {
        self.inner_message = Some(inner_message.into());
        self
    }
}

impl From<reqwest::Error> for ProviderCallError {
    fn from(err: reqwest::Error) -> Self {
        let origin = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_decode() {
            "decode"
        } else {
            "http"
        };
        let mut call_error = Self::new(err.to_string()).with_origin(origin);
        call_error.status = err.status().map(|s| s.as_u16());
        if let Some(source) = std::error::Error::source(&err) {
            call_error.inner_message = Some(source.to_string());
        }
        call_error
    }
}

/// The provider-call collaborator.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderCallError>;
}

/// Routes calls to a per-provider client.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for a provider key, replacing any previous one.
    pub fn register(&mut self, provider: impl Into<String>, client: Arc<dyn ProviderClient>) {
        self.clients.insert(provider.into(), client);
    }

    pub fn with_client(
        mut self,
        provider: impl Into<String>,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        self.register(provider, client);
        self
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.clients.contains_key(provider)
    }

    /// List all registered provider keys.
    pub fn provider_keys(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ProviderClient for ProviderRegistry {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderCallError> {
        let client = self.clients.get(&request.provider).ok_or_else(|| {
            ProviderCallError::new(format!(
                "no client registered for provider '{}'",
                request.provider
            ))
            .with_origin("configuration")
        })?;
        client.call(request).await
    }
}
