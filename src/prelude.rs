//! Convenience re-exports for common use.

pub use crate::config::{FallbackConfig, ProviderSettings};
pub use crate::error::{
    ClassifiedError, ErrorCategory, ErrorClassifier, FallbackError, FallbackType, Result,
    StructuredError,
};
pub use crate::fallback::{
    ChainResolver, ExecuteOptions, FallbackDecision, FallbackPolicy, Orchestrator,
    RequestOutcome, Termination,
};
pub use crate::models::{ModelRef, ModelSelector, TaskHint};
pub use crate::provider::{ProviderCallError, ProviderClient, ProviderRequest, ProviderResponse};
pub use crate::ratelimit::RateLimitOracle;
pub use crate::types::{ModelMessage, Role, Usage};
