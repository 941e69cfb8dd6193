//! Failure categories and their static recovery policy.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad failure category for routing recovery logic.
///
/// The variant order is the classification precedence: a message matching
/// signals from several categories resolves to the earliest one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    Overloaded,
    AuthError,
    ServerError,
    NetworkError,
    ValidationError,
    Unknown,
}

/// How a request should move after a failure.
///
/// Used both as the classifier's hint and as the decision policy's verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum FallbackType {
    /// Same provider and model, after a wait.
    Retry,
    /// Next model in the current provider's chain.
    SwitchModel,
    /// First usable model of another provider.
    SwitchProvider,
    None,
}

/// Static recovery metadata attached to a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub recoverable: bool,
    pub base_retry_after_ms: u64,
    pub fallback_hint: FallbackType,
}

impl ErrorCategory {
    /// Categories in classification order, `Unknown` last.
    pub const ALL: [ErrorCategory; 7] = [
        Self::RateLimit,
        Self::Overloaded,
        Self::AuthError,
        Self::ServerError,
        Self::NetworkError,
        Self::ValidationError,
        Self::Unknown,
    ];

    /// The policy entry for this category.
    pub const fn policy(self) -> CategoryPolicy {
        match self {
            Self::RateLimit => CategoryPolicy {
                recoverable: true,
                base_retry_after_ms: 60_000,
                fallback_hint: FallbackType::SwitchProvider,
            },
            Self::Overloaded => CategoryPolicy {
                recoverable: true,
                base_retry_after_ms: 30_000,
                fallback_hint: FallbackType::SwitchModel,
            },
            // Credentials may be valid on another provider.
            Self::AuthError => CategoryPolicy {
                recoverable: false,
                base_retry_after_ms: 0,
                fallback_hint: FallbackType::SwitchProvider,
            },
            Self::ServerError => CategoryPolicy {
                recoverable: true,
                base_retry_after_ms: 5_000,
                fallback_hint: FallbackType::Retry,
            },
            Self::NetworkError => CategoryPolicy {
                recoverable: true,
                base_retry_after_ms: 2_000,
                fallback_hint: FallbackType::Retry,
            },
            Self::ValidationError => CategoryPolicy {
                recoverable: false,
                base_retry_after_ms: 0,
                fallback_hint: FallbackType::None,
            },
            Self::Unknown => CategoryPolicy {
                recoverable: false,
                base_retry_after_ms: 1_000,
                fallback_hint: FallbackType::None,
            },
        }
    }

    pub const fn is_recoverable(self) -> bool {
        self.policy().recoverable
    }
}
