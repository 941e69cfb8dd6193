//! Ollama local provider (native `/api/chat` endpoint).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{FallbackError, Result};
use crate::types::Usage;

use super::{ProviderCallError, ProviderClient, ProviderRequest, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

const CHAT_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(CHAT_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Base URL from `OLLAMA_BASE_URL`, else the default local port.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the server answers on `/api/tags`. Connection failures are `false`.
    pub async fn is_running(&self) -> bool {
        match self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, base_url = %self.base_url, "ollama health check failed");
                false
            }
        }
    }

    /// Names of locally installed models.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FallbackError::config(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
    async fn call(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderCallError> {
        let mut options = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            options.insert("temperature".into(), temperature.into());
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".into(), max_tokens.into());
        }
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
            "options": options,
        });

        debug!(model = %request.model, base_url = %self.base_url, "ollama chat request");
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderCallError::http(status.as_u16(), error_text(&text)));
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(ProviderResponse {
            content: parsed.message.content,
            usage: Usage::new(parsed.prompt_eval_count, parsed.eval_count),
        })
    }
}

/// Ollama wraps failures as `{"error": "..."}`; fall back to the raw body.
fn error_text(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
