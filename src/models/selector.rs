//! Initial model selection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ModelRef;
use crate::config::FallbackConfig;

/// Rough shape of the task, used to pick a starting point in a chain.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskHint {
    Simple,
    #[default]
    Standard,
    Complex,
}

/// Chooses the first target of a request when the caller does not.
pub trait ModelSelector: Send + Sync {
    fn select_optimal(&self, task: TaskHint, estimated_tokens: u32) -> Option<ModelRef>;
}

/// Picks from the configured chains: complex tasks start at the head of the
/// first eligible provider's chain, simple tasks at its economy tail.
///
/// Local providers are skipped for prompts above `local_token_limit`.
pub struct ChainHeadSelector {
    config: Arc<FallbackConfig>,
    local_token_limit: u32,
}

impl ChainHeadSelector {
    pub fn new(config: Arc<FallbackConfig>) -> Self {
        Self {
            config,
            local_token_limit: 8_000,
        }
    }

    pub fn with_local_token_limit(mut self, limit: u32) -> Self {
        self.local_token_limit = limit;
        self
    }
}

impl ModelSelector for ChainHeadSelector {
    fn select_optimal(&self, task: TaskHint, estimated_tokens: u32) -> Option<ModelRef> {
        let provider = self.config.effective_order().into_iter().find(|name| {
            let Some(settings) = self.config.provider(name) else {
                return false;
            };
            let fits_locally =
                settings.requires_credentials || estimated_tokens <= self.local_token_limit;
            settings.is_eligible() && !settings.chain.is_empty() && fits_locally
        })?;

        let chain = self.config.chain(provider);
        let index = match task {
            TaskHint::Complex => 0,
            TaskHint::Standard => chain.len() / 2,
            TaskHint::Simple => chain.len() - 1,
        };
        chain
            .get(index)
            .map(|model| ModelRef::new(provider, model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;

    fn config() -> Arc<FallbackConfig> {
        Arc::new(
            FallbackConfig::empty()
                .with_provider(
                    "ollama",
                    ProviderSettings::local(["llama3.2:3b"]),
                )
                .with_provider(
                    "anthropic",
                    ProviderSettings::new(["opus", "sonnet", "haiku"]).with_credentials(true),
                ),
        )
    }

    #[test]
    fn task_hint_picks_position_in_chain() {
        let mut base = (*config()).clone();
        base.provider_order = vec!["anthropic".into(), "ollama".into()];
        let selector = ChainHeadSelector::new(Arc::new(base));

        assert_eq!(
            selector.select_optimal(TaskHint::Complex, 10),
            Some(ModelRef::new("anthropic", "opus"))
        );
        assert_eq!(
            selector.select_optimal(TaskHint::Standard, 10),
            Some(ModelRef::new("anthropic", "sonnet"))
        );
        assert_eq!(
            selector.select_optimal(TaskHint::Simple, 10),
            Some(ModelRef::new("anthropic", "haiku"))
        );
    }

    #[test]
    fn large_prompts_skip_local_providers() {
        let selector = ChainHeadSelector::new(config()).with_local_token_limit(100);

        assert_eq!(
            selector.select_optimal(TaskHint::Complex, 50),
            Some(ModelRef::new("ollama", "llama3.2:3b"))
        );
        assert_eq!(
            selector.select_optimal(TaskHint::Complex, 500),
            Some(ModelRef::new("anthropic", "opus"))
        );
    }

    #[test]
    fn nothing_eligible_selects_nothing() {
        let selector = ChainHeadSelector::new(Arc::new(FallbackConfig::empty()));
        assert_eq!(selector.select_optimal(TaskHint::Simple, 1), None);
    }
}
