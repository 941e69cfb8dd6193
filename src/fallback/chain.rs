//! Resolution of the next provider/model after a fallback decision.

use std::sync::Arc;

use super::{FallbackType, ProviderCandidate, TriedSet};
use crate::config::FallbackConfig;
use crate::ratelimit::RateLimitOracle;

/// Walks the configured model chains and provider order.
///
/// Earlier chain entries win within a provider; across providers the
/// configured priority order is authoritative.
#[derive(Clone)]
pub struct ChainResolver {
    config: Arc<FallbackConfig>,
    rate_limits: Arc<dyn RateLimitOracle>,
}

impl ChainResolver {
    pub fn new(config: Arc<FallbackConfig>, rate_limits: Arc<dyn RateLimitOracle>) -> Self {
        Self {
            config,
            rate_limits,
        }
    }

    /// The next target, or `None` when nothing untried and available is
    /// reachable under the current permissions.
    pub fn next_candidate(
        &self,
        current_provider: &str,
        current_model: &str,
        fallback_type: FallbackType,
        cross_provider_allowed: bool,
        tried: &TriedSet,
    ) -> Option<ProviderCandidate> {
        match fallback_type {
            FallbackType::None => None,
            FallbackType::Retry => Some(ProviderCandidate {
                provider: current_provider.to_string(),
                model: current_model.to_string(),
                is_new_provider: false,
            }),
            FallbackType::SwitchProvider if cross_provider_allowed => {
                self.next_provider(current_provider, tried)
            }
            FallbackType::SwitchModel | FallbackType::SwitchProvider => {
                self.next_model(current_provider, current_model, tried)
            }
        }
    }

    /// Scan the current provider's chain after the current model.
    fn next_model(
        &self,
        provider: &str,
        model: &str,
        tried: &TriedSet,
    ) -> Option<ProviderCandidate> {
        let chain = self.config.chain(provider);
        let start = chain
            .iter()
            .position(|m| m == model)
            .map_or(0, |index| index + 1);
        chain[start..]
            .iter()
            .find(|m| self.usable(provider, m, tried))
            .map(|m| ProviderCandidate {
                provider: provider.to_string(),
                model: m.clone(),
                is_new_provider: false,
            })
    }

    /// First untried, available model of the next eligible provider.
    fn next_provider(&self, current: &str, tried: &TriedSet) -> Option<ProviderCandidate> {
        self.config
            .effective_order()
            .into_iter()
            .filter(|name| *name != current && self.config.is_eligible(name))
            .find_map(|name| {
                self.config
                    .chain(name)
                    .iter()
                    .find(|m| self.usable(name, m, tried))
                    .map(|m| ProviderCandidate {
                        provider: name.to_string(),
                        model: m.clone(),
                        is_new_provider: true,
                    })
            })
    }

    fn usable(&self, provider: &str, model: &str, tried: &TriedSet) -> bool {
        if tried.contains(provider, model) {
            return false;
        }
        let available = self.rate_limits.is_available(provider, model);
        if !available {
            tracing::debug!(provider, model, "skipping rate-limited candidate");
        }
        available
    }
}
