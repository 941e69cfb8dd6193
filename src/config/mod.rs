//! Fallback configuration (layered: built-in defaults > TOML file > env).
//!
//! A [`FallbackConfig`] is an immutable snapshot once loaded; the resolver and
//! orchestrator share it behind an `Arc`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FallbackError, Result};
use crate::fallback::FallbackPolicy;
use crate::models::provider_key::{credential_env_vars_for, ProviderKey};
use crate::models::ModelRef;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_ORDER: [&str; 4] = ["anthropic", "openai", "google", "ollama"];

/// Per-provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Models in degradation order: most capable first, economy last.
    #[serde(default)]
    pub chain: Vec<String>,
    #[serde(default = "default_true")]
    pub requires_credentials: bool,
    /// Set from the environment layer; may be forced in the file.
    #[serde(default)]
    pub has_credentials: bool,
}

fn default_true() -> bool {
    true
}

impl ProviderSettings {
    /// A cloud provider that needs credentials.
    pub fn new<S: Into<String>>(chain: impl IntoIterator<Item = S>) -> Self {
        Self {
            enabled: true,
            chain: chain.into_iter().map(Into::into).collect(),
            requires_credentials: true,
            has_credentials: false,
        }
    }

    /// A local provider (no credentials required).
    pub fn local<S: Into<String>>(chain: impl IntoIterator<Item = S>) -> Self {
        Self {
            requires_credentials: false,
            ..Self::new(chain)
        }
    }

    pub fn with_credentials(mut self, has_credentials: bool) -> Self {
        self.has_credentials = has_credentials;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled and either local or credentialed.
    pub fn is_eligible(&self) -> bool {
        self.enabled && (!self.requires_credentials || self.has_credentials)
    }

    /// Index of `model` in the chain.
    pub fn position(&self, model: &str) -> Option<usize> {
        self.chain.iter().position(|m| m == model)
    }
}

/// Complete configuration for the fallback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub auto_fallback: bool,
    pub cross_provider: bool,
    /// Move local providers to the front of the priority order.
    pub prefer_local: bool,
    /// Cross-provider failover priority.
    pub provider_order: Vec<String>,
    pub providers: BTreeMap<String, ProviderSettings>,
    pub policy: FallbackPolicy,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        let providers = BTreeMap::from([
            (
                "anthropic".to_string(),
                ProviderSettings::new(["opus", "sonnet", "haiku"]),
            ),
            (
                "openai".to_string(),
                ProviderSettings::new(["gpt-4o", "gpt-4o-mini"]),
            ),
            (
                "google".to_string(),
                ProviderSettings::new(["gemini-1.5-pro", "gemini-1.5-flash"]),
            ),
            (
                "ollama".to_string(),
                ProviderSettings::local(["llama3.2:3b", "qwen2.5-coder:7b"]),
            ),
        ]);
        Self {
            providers,
            provider_order: DEFAULT_ORDER.into_iter().map(String::from).collect(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            auto_fallback: true,
            cross_provider: true,
            prefer_local: false,
            policy: FallbackPolicy::default(),
        }
    }
}

impl FallbackConfig {
    /// A config with no providers, for embedders that build their own.
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
            provider_order: Vec::new(),
            ..Self::default()
        }
    }

    /// Add or replace a provider; new providers are appended to the order.
    pub fn with_provider(mut self, name: impl Into<String>, settings: ProviderSettings) -> Self {
        let name = name.into();
        if !self.provider_order.contains(&name) {
            self.provider_order.push(name.clone());
        }
        self.providers.insert(name, settings);
        self
    }

    pub fn with_order<S: Into<String>>(mut self, order: impl IntoIterator<Item = S>) -> Self {
        self.provider_order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_credentials(mut self, provider: &str, has_credentials: bool) -> Self {
        if let Some(settings) = self.providers.get_mut(provider) {
            settings.has_credentials = has_credentials;
        }
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }

    /// The configured model chain, empty for unknown providers.
    pub fn chain(&self, provider: &str) -> &[String] {
        self.providers
            .get(provider)
            .map(|settings| settings.chain.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_eligible(&self, provider: &str) -> bool {
        self.providers
            .get(provider)
            .is_some_and(ProviderSettings::is_eligible)
    }

    /// Provider priority order, with local providers first when `prefer_local`.
    pub fn effective_order(&self) -> Vec<&str> {
        let order = self.provider_order.iter().map(String::as_str);
        if !self.prefer_local {
            return order.collect();
        }
        let (local, remote): (Vec<&str>, Vec<&str>) = order.partition(|name| {
            self.providers
                .get(*name)
                .is_some_and(|settings| !settings.requires_credentials)
        });
        local.into_iter().chain(remote).collect()
    }

    /// First model of the first eligible provider; falls back to the first
    /// configured provider when none is eligible.
    pub fn default_target(&self) -> Option<ModelRef> {
        let order = self.effective_order();
        let pick = order
            .iter()
            .copied()
            .find(|name| self.is_eligible(name) && !self.chain(name).is_empty())
            .or_else(|| order.iter().copied().find(|name| !self.chain(name).is_empty()))?;
        self.chain(pick)
            .first()
            .map(|model| ModelRef::new(pick, model.clone()))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        for name in &self.provider_order {
            if !self.providers.contains_key(name) {
                return Err(FallbackError::config(format!(
                    "provider_order names unknown provider '{name}'"
                )));
            }
        }
        if self.policy.server_backoff_multiplier < 1.0 {
            return Err(FallbackError::config(
                "policy.server_backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Parse a TOML document; absent keys keep their defaults, except that a
    /// document without `provider_order` ranks the providers it declares.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(raw)?;
        let order_given = table.contains_key("provider_order");
        let mut config: Self = toml::Value::Table(table).try_into()?;
        if !order_given {
            config.provider_order = config.derived_order();
        }
        config.mark_local_providers();
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Default config file path (`~/.hydra/fallback.toml`).
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".hydra"))
            .unwrap_or_else(|| PathBuf::from(".hydra"))
            .join("fallback.toml")
    }

    /// Load the file layer only. A missing file yields the defaults.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map_err(|err| match err {
                FallbackError::Toml(inner) => FallbackError::config(format!(
                    "{}: {inner}",
                    path.display()
                )),
                other => other,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(FallbackError::Io(err)),
        }
    }

    /// Load the file layer (default path when `None`), then the process env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = Self::load_file(&path)?;
        let _ = dotenvy::dotenv();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            "loaded fallback config"
        );
        Ok(config)
    }

    /// Built-in defaults plus the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply the environment layer through an arbitrary lookup.
    ///
    /// Reads credential presence per provider and the `HYDRA_*` overrides.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());

        for (name, settings) in self.providers.iter_mut() {
            if !settings.requires_credentials {
                continue;
            }
            if credential_env_vars_for(name).iter().any(|var| present(var)) {
                settings.has_credentials = true;
            }
        }

        if let Some(raw) = lookup("HYDRA_MAX_ATTEMPTS") {
            self.max_attempts = parse_env("HYDRA_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("HYDRA_RETRY_DELAY_MS") {
            self.retry_delay_ms = parse_env("HYDRA_RETRY_DELAY_MS", &raw)?;
        }
        if let Some(raw) = lookup("HYDRA_AUTO_FALLBACK") {
            self.auto_fallback = parse_bool("HYDRA_AUTO_FALLBACK", &raw)?;
        }
        if let Some(raw) = lookup("HYDRA_CROSS_PROVIDER") {
            self.cross_provider = parse_bool("HYDRA_CROSS_PROVIDER", &raw)?;
        }
        if let Some(raw) = lookup("HYDRA_PREFER_LOCAL") {
            self.prefer_local = parse_bool("HYDRA_PREFER_LOCAL", &raw)?;
        }
        if let Some(raw) = lookup("HYDRA_PROVIDER_ORDER") {
            self.provider_order = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        self.validate()
    }

    /// Built-in ranking for known providers, then the rest by name.
    fn derived_order(&self) -> Vec<String> {
        let known = DEFAULT_ORDER
            .into_iter()
            .filter(|name| self.providers.contains_key(*name));
        let custom = self
            .providers
            .keys()
            .map(String::as_str)
            .filter(|name| !DEFAULT_ORDER.contains(name));
        known.chain(custom).map(String::from).collect()
    }

    fn mark_local_providers(&mut self) {
        for (name, settings) in self.providers.iter_mut() {
            if ProviderKey::parse(name).is_some_and(ProviderKey::is_local) {
                settings.requires_credentials = false;
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| FallbackError::config(format!("{key} has invalid value '{raw}'")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FallbackError::config(format!(
            "{key} has invalid value '{raw}'"
        ))),
    }
}
