//! Provider fallback and retry engine.
//!
//! [`policy`] turns a classified failure into a [`FallbackDecision`],
//! [`chain`] resolves that decision into the next [`ProviderCandidate`], and
//! [`orchestrator`] drives one request through attempts until it succeeds or
//! runs out of options.

pub mod chain;
pub mod orchestrator;
pub mod policy;

pub use chain::ChainResolver;
pub use orchestrator::{ExecuteOptions, Orchestrator, RequestOutcome, Termination};
pub use policy::{decide, FallbackPolicy};

pub use crate::error::FallbackType;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::ModelRef;

/// Verdict of the decision policy for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackDecision {
    pub should_fallback: bool,
    pub fallback_type: FallbackType,
    pub wait_ms: u64,
    pub reason: String,
}

impl FallbackDecision {
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            should_fallback: false,
            fallback_type: FallbackType::None,
            wait_ms: 0,
            reason: reason.into(),
        }
    }

    pub fn proceed(fallback_type: FallbackType, wait_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            should_fallback: true,
            fallback_type,
            wait_ms,
            reason: reason.into(),
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

/// One fallback target produced by the chain resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub provider: String,
    pub model: String,
    /// True when the candidate leaves the provider of the failed attempt.
    pub is_new_provider: bool,
}

impl ProviderCandidate {
    pub fn target(&self) -> ModelRef {
        ModelRef::new(&self.provider, &self.model)
    }
}

/// Provider/model pairs already attempted within one request.
///
/// Insertion-only; a fresh set is created for every request.
#[derive(Debug, Clone, Default)]
pub struct TriedSet {
    pairs: HashSet<(String, String)>,
}

impl TriedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair; returns false if it was already present.
    pub fn insert(&mut self, provider: &str, model: &str) -> bool {
        self.pairs.insert((provider.to_string(), model.to_string()))
    }

    pub fn contains(&self, provider: &str, model: &str) -> bool {
        self.pairs
            .contains(&(provider.to_string(), model.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<'a> FromIterator<&'a ModelRef> for TriedSet {
    fn from_iter<I: IntoIterator<Item = &'a ModelRef>>(iter: I) -> Self {
        let mut set = Self::new();
        for target in iter {
            set.insert(&target.provider, &target.model);
        }
        set
    }
}
