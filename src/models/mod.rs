//! Provider/model identities and initial model selection.

pub mod provider_key;
pub mod selector;

pub use provider_key::ProviderKey;
pub use selector::{ChainHeadSelector, ModelSelector, TaskHint};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FallbackError;

/// A concrete provider/model target.
///
/// Displays as `provider/model`, the form recorded in a request's fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl FromStr for ModelRef {
    type Err = FallbackError;

    /// Parse `provider/model`, or `provider:model` when there is no slash.
    ///
    /// Model ids may themselves contain `:` (e.g. `ollama/llama3.2:3b`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = s
            .split_once('/')
            .or_else(|| s.split_once(':'))
            .ok_or_else(|| {
                FallbackError::invalid_argument(format!(
                    "Invalid model reference '{s}': expected 'provider/model'"
                ))
            })?;
        if provider.trim().is_empty() || model.trim().is_empty() {
            return Err(FallbackError::invalid_argument(format!(
                "Invalid model reference '{s}': provider and model must be non-empty"
            )));
        }
        let provider = ProviderKey::parse(provider)
            .map(|key| key.as_str().to_string())
            .unwrap_or_else(|| provider.to_string());
        Ok(Self::new(provider, model))
    }
}
