//! Usage tracking across requests.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::types::usage::Usage;

/// Receives one record per provider call, successful or not.
pub trait UsageRecorder: Send + Sync {
    fn record(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        is_error: bool,
    );
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageRecorder;

impl UsageRecorder for NoopUsageRecorder {
    fn record(&self, _: &str, _: &str, _: u32, _: u32, _: bool) {}
}

/// Totals for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub usage: Usage,
    pub requests: u64,
    pub errors: u64,
}

/// Tracks cumulative usage per provider.
#[derive(Clone, Default)]
pub struct UsageTracker {
    inner: Arc<RwLock<BTreeMap<String, ProviderUsage>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for one provider.
    pub fn provider_usage(&self, provider: &str) -> ProviderUsage {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Totals across all providers.
    pub fn total_usage(&self) -> Usage {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut total = Usage::default();
        for entry in inner.values() {
            total.merge(&entry.usage);
        }
        total
    }

    pub fn snapshot(&self) -> BTreeMap<String, ProviderUsage> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reset all tracking.
    pub fn reset(&self) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl UsageRecorder for UsageTracker {
    fn record(
        &self,
        provider: &str,
        _model: &str,
        input_tokens: u32,
        output_tokens: u32,
        is_error: bool,
    ) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = inner.entry(provider.to_string()).or_default();
        entry.usage.merge(&Usage::new(input_tokens, output_tokens));
        entry.requests += 1;
        if is_error {
            entry.errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_accumulates_per_provider() {
        let tracker = UsageTracker::new();
        tracker.record("anthropic", "opus", 10, 20, false);
        tracker.record("anthropic", "sonnet", 0, 0, true);
        tracker.record("openai", "gpt-4o", 3, 7, false);

        let anthropic = tracker.provider_usage("anthropic");
        assert_eq!(anthropic.requests, 2);
        assert_eq!(anthropic.errors, 1);
        assert_eq!(anthropic.usage, Usage::new(10, 20));
        assert_eq!(tracker.total_usage(), Usage::new(13, 27));

        tracker.reset();
        assert!(tracker.snapshot().is_empty());
    }
}
