//! Shared test helpers: a scripted provider and a static rate-limit oracle.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use hydra_fallback::config::{FallbackConfig, ProviderSettings};
use hydra_fallback::provider::{
    ProviderCallError, ProviderClient, ProviderRequest, ProviderResponse,
};
use hydra_fallback::ratelimit::RateLimitOracle;
use hydra_fallback::types::Usage;

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(ProviderCallError),
    /// Never completes; for cancellation tests.
    Hang,
}

impl Reply {
    pub fn http(status: u16, body: &str) -> Self {
        Self::Fail(ProviderCallError::http(status, body))
    }
}

/// Replies per `provider/model`: queued replies first, then the sticky one,
/// then a default text reply.
#[derive(Default)]
pub struct ScriptedProvider {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `target` gets `reply`.
    pub fn always(self, target: &str, reply: Reply) -> Self {
        self.sticky.lock().unwrap().insert(target.to_string(), reply);
        self
    }

    /// The next call to `target` gets `reply`.
    pub fn then(self, target: &str, reply: Reply) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Targets called, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn reply_for(&self, target: &str) -> Reply {
        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.sticky
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_else(|| Reply::Text(format!("answer from {target}")))
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderCallError> {
        let target = format!("{}/{}", request.provider, request.model);
        self.calls.lock().unwrap().push(target.clone());
        match self.reply_for(&target) {
            Reply::Text(content) => Ok(ProviderResponse {
                content,
                usage: Usage::new(10, 20),
            }),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Marks a fixed set of `provider/model` targets unavailable.
#[derive(Default)]
pub struct StaticOracle {
    unavailable: HashSet<String>,
    recorded: AtomicUsize,
}

impl StaticOracle {
    pub fn unavailable(targets: &[&str]) -> Self {
        Self {
            unavailable: targets.iter().map(|t| t.to_string()).collect(),
            recorded: AtomicUsize::new(0),
        }
    }

    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl RateLimitOracle for StaticOracle {
    fn is_available(&self, provider: &str, model: &str) -> bool {
        !self.unavailable.contains(&format!("{provider}/{model}"))
    }

    fn record_request(&self, _provider: &str, _model: &str) {
        self.recorded.fetch_add(1, Ordering::SeqCst);
    }
}

/// anthropic (opus, sonnet, haiku), openai (gpt-4o, gpt-4o-mini), both
/// credentialed, then local ollama.
pub fn test_config() -> FallbackConfig {
    FallbackConfig::empty()
        .with_provider(
            "anthropic",
            ProviderSettings::new(["opus", "sonnet", "haiku"]).with_credentials(true),
        )
        .with_provider(
            "openai",
            ProviderSettings::new(["gpt-4o", "gpt-4o-mini"]).with_credentials(true),
        )
        .with_provider("ollama", ProviderSettings::local(["llama3.2:3b"]))
}
