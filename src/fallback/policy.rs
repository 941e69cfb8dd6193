//! Decision policy: what to do after a classified failure.

use serde::{Deserialize, Serialize};

use super::{FallbackDecision, FallbackType};
use crate::error::{ClassifiedError, ErrorCategory};

/// Wait caps and backoff factors applied by [`FallbackPolicy::decide`].
///
/// The defaults are empirical and tunable through the `[policy]` config table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub rate_limit_wait_cap_ms: u64,
    pub overloaded_wait_cap_ms: u64,
    pub server_backoff_multiplier: f64,
    pub server_wait_cap_ms: u64,
    pub network_wait_cap_ms: u64,
    pub unknown_step_ms: u64,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            rate_limit_wait_cap_ms: 60_000,
            overloaded_wait_cap_ms: 30_000,
            server_backoff_multiplier: 1.5,
            server_wait_cap_ms: 30_000,
            network_wait_cap_ms: 15_000,
            unknown_step_ms: 1_000,
        }
    }
}

impl FallbackPolicy {
    /// Decide how to continue after failed attempt number `attempt` (1-based).
    ///
    /// Order matters: the attempt budget is checked before recoverability, and
    /// unrecoverable auth failures may still move to another provider.
    pub fn decide(
        &self,
        error: &ClassifiedError,
        attempt: u32,
        max_attempts: u32,
        allow_cross_provider: bool,
    ) -> FallbackDecision {
        if attempt >= max_attempts {
            return FallbackDecision::stop(format!(
                "attempt budget exhausted ({attempt}/{max_attempts})"
            ));
        }

        if !error.recoverable {
            if error.category == ErrorCategory::AuthError && allow_cross_provider {
                return FallbackDecision::proceed(
                    FallbackType::SwitchProvider,
                    0,
                    "authentication failed; trying a provider with different credentials",
                );
            }
            return FallbackDecision::stop(format!(
                "{} is not recoverable",
                error.category
            ));
        }

        let retry_after = error.retry_after_ms;
        match error.category {
            ErrorCategory::RateLimit => {
                let fallback_type = if allow_cross_provider {
                    FallbackType::SwitchProvider
                } else {
                    FallbackType::SwitchModel
                };
                FallbackDecision::proceed(
                    fallback_type,
                    retry_after.min(self.rate_limit_wait_cap_ms),
                    "rate limited",
                )
            }
            ErrorCategory::Overloaded => FallbackDecision::proceed(
                FallbackType::SwitchModel,
                retry_after.min(self.overloaded_wait_cap_ms),
                "model overloaded",
            ),
            ErrorCategory::ServerError => {
                let scaled =
                    retry_after as f64 * self.server_backoff_multiplier.powi(attempt as i32);
                let wait = scaled.min(self.server_wait_cap_ms as f64).round() as u64;
                FallbackDecision::proceed(FallbackType::Retry, wait, "server error; backing off")
            }
            ErrorCategory::NetworkError => FallbackDecision::proceed(
                FallbackType::Retry,
                retry_after
                    .saturating_mul(u64::from(attempt))
                    .min(self.network_wait_cap_ms),
                "network error; backing off",
            ),
            _ => FallbackDecision::proceed(
                FallbackType::Retry,
                self.unknown_step_ms.saturating_mul(u64::from(attempt)),
                "recoverable failure; retrying",
            ),
        }
    }
}

/// Decide with the default policy.
pub fn decide(
    error: &ClassifiedError,
    attempt: u32,
    max_attempts: u32,
    allow_cross_provider: bool,
) -> FallbackDecision {
    FallbackPolicy::default().decide(error, attempt, max_attempts, allow_cross_provider)
}
