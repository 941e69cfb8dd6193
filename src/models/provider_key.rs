//! Typed provider identifiers and alias handling.

/// Canonical provider keys with built-in credential conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKey {
    Anthropic,
    OpenAi,
    Google,
    Groq,
    Mistral,
    Ollama,
    LmStudio,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 7] = [
        Self::Anthropic,
        Self::OpenAi,
        Self::Google,
        Self::Groq,
        Self::Mistral,
        Self::Ollama,
        Self::LmStudio,
    ];

    /// Canonical provider key string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
        }
    }

    /// Parse user-facing provider aliases into a typed provider key.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "chatgpt" => Some(Self::OpenAi),
            "google" | "gemini" => Some(Self::Google),
            "groq" => Some(Self::Groq),
            "mistral" => Some(Self::Mistral),
            "ollama" => Some(Self::Ollama),
            "lmstudio" | "lm-studio" => Some(Self::LmStudio),
            _ => None,
        }
    }

    /// Environment variables whose presence means credentials are configured.
    pub const fn credential_env_vars(self) -> &'static [&'static str] {
        match self {
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            Self::Groq => &["GROQ_API_KEY"],
            Self::Mistral => &["MISTRAL_API_KEY"],
            Self::Ollama | Self::LmStudio => &[],
        }
    }

    /// Local inference servers need no credentials.
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Ollama | Self::LmStudio)
    }
}

/// Credential variables for any provider name, falling back to `<NAME>_API_KEY`.
pub fn credential_env_vars_for(provider: &str) -> Vec<String> {
    match ProviderKey::parse(provider) {
        Some(key) => key
            .credential_env_vars()
            .iter()
            .map(|var| (*var).to_string())
            .collect(),
        None => vec![format!(
            "{}_API_KEY",
            provider.to_ascii_uppercase().replace(['-', '.'], "_")
        )],
    }
}
