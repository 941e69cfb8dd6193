//! Data-driven classification of raw provider failures.
//!
//! Each category owns an ordered list of signals (case-insensitive regexes
//! over the failure message, the origin type, and the HTTP status when one is
//! known). Categories are tried in [`ErrorCategory::ALL`] order and the first
//! match wins. Deliberate tie-breaks:
//!
//! - `"503 service overloaded"` is `Overloaded`, not `ServerError`: capacity
//!   signals are checked before bare 5xx codes.
//! - `"429 quota exceeded"` is `RateLimit` even though quota wording could
//!   read as a billing problem.
//! - `"504 gateway timeout"` is `ServerError`, not `NetworkError`: a gateway
//!   answered, so the network path itself is up.
//! - `"401 invalid api key"` is `AuthError`, not `ValidationError`.
//! - `"404 model 'x' not found"` is `Overloaded` with no wait, not
//!   `ValidationError`: the next model in the chain may well exist.
//!
//! The origin type also counts on its own: an origin of `io`, `timeout`,
//! `connect`, `connection` or `dns` is a `NetworkError` whatever the message
//! says, unless an earlier category already matched.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::category::{ErrorCategory, FallbackType};
use super::{FallbackError, Result};

/// Outcome of classifying one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub recoverable: bool,
    pub retry_after_ms: u64,
    pub fallback_hint: FallbackType,
    /// Label of the signal that matched, `None` for the `Unknown` fallback.
    pub matched_signal: Option<String>,
}

impl ClassifiedError {
    /// A classification carrying the static policy of `category`.
    pub fn from_category(category: ErrorCategory) -> Self {
        let policy = category.policy();
        Self {
            category,
            recoverable: policy.recoverable,
            retry_after_ms: policy.base_retry_after_ms,
            fallback_hint: policy.fallback_hint,
            matched_signal: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Signal {
    label: String,
    pattern: Regex,
}

impl Signal {
    fn new(label: &str, pattern: &str) -> Result<Self> {
        Ok(Self {
            label: label.to_string(),
            pattern: Regex::new(&format!("(?i){pattern}"))?,
        })
    }
}

#[derive(Debug, Clone)]
struct CategorySignals {
    category: ErrorCategory,
    signals: Vec<Signal>,
}

/// `(label, regex)` pairs per category, in precedence order.
const DEFAULT_SIGNALS: &[(ErrorCategory, &[(&str, &str)])] = &[
    (
        ErrorCategory::RateLimit,
        &[
            ("rate limit", r"rate[ _-]?limit"),
            ("429", r"\b429\b"),
            ("quota exceeded", r"quota[ _-]?exceeded"),
            ("too many requests", r"too many requests"),
            ("resource exhausted", r"resource[ _-]?exhausted"),
            ("requests per minute", r"requests per (minute|min|day)"),
        ],
    ),
    (
        ErrorCategory::Overloaded,
        &[
            ("overloaded", r"overload"),
            ("529", r"\b529\b"),
            ("at capacity", r"(at|over|exceeded) capacity"),
            ("server busy", r"(server|service) is (currently )?busy"),
            ("high demand", r"high demand"),
            (
                "model not found",
                r#"model\s+(["'`]?[\w.:/-]+["'`]?\s+)?(not found|does not exist)|no such model"#,
            ),
        ],
    ),
    (
        ErrorCategory::AuthError,
        &[
            ("401", r"\b401\b"),
            ("403", r"\b403\b"),
            ("unauthorized", r"unauthori[sz]ed"),
            ("forbidden", r"forbidden"),
            ("invalid api key", r"(invalid|incorrect|missing)[ _-]?(x-)?api[ _-]?key"),
            ("api key not valid", r"api[ _-]?key not valid"),
            ("authentication", r"authentication"),
            ("permission denied", r"permission[ _-]denied"),
        ],
    ),
    (
        ErrorCategory::ServerError,
        &[
            ("500", r"\b500\b"),
            ("502", r"\b502\b"),
            ("503", r"\b503\b"),
            ("504", r"\b504\b"),
            ("internal server error", r"internal[ _-]?(server[ _-]?)?error"),
            ("bad gateway", r"bad gateway"),
            ("service unavailable", r"service unavailable"),
            ("gateway timeout", r"gateway timeout"),
            ("server error", r"server error"),
        ],
    ),
    (
        ErrorCategory::NetworkError,
        &[
            ("timeout", r"time[ _-]?d?[ _-]?out"),
            ("connection", r"connect(ion)?\b"),
            ("econnrefused", r"econn(refused|reset|aborted)"),
            ("etimedout", r"etimedout"),
            ("network", r"network"),
            ("dns", r"\bdns\b|enotfound|name resolution"),
            ("socket hang up", r"socket hang up"),
            ("broken pipe", r"broken pipe"),
            ("unreachable", r"unreachable"),
            ("io error", r"\bio error\b"),
        ],
    ),
    (
        ErrorCategory::ValidationError,
        &[
            ("400", r"\b400\b"),
            ("422", r"\b422\b"),
            ("invalid request", r"invalid[ _-]?request"),
            ("bad request", r"bad request"),
            ("invalid schema", r"invalid[ _-]?schema"),
            ("validation", r"validation"),
            ("malformed", r"malformed"),
            ("context length", r"context[ _-]?(length|window)"),
            ("too many tokens", r"too many tokens"),
            ("unprocessable", r"unprocessable"),
        ],
    ),
];

/// Signals that switch target without waiting.
const IMMEDIATE_SIGNALS: &[&str] = &["model not found"];

/// Origin types that mark a transport failure on their own.
const NETWORK_ORIGINS: &[&str] = &["io", "timeout", "connect", "connection", "dns"];

const RETRY_AFTER_PATTERN: &str =
    r"(?i)retry[ _-]?after[^0-9]{0,4}(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)?";

static DEFAULT_CLASSIFIER: OnceLock<ErrorClassifier> = OnceLock::new();

/// Ordered signal table mapping raw failures to [`ClassifiedError`]s.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    table: Vec<CategorySignals>,
    retry_after: Regex,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::global().clone()
    }
}

impl ErrorClassifier {
    /// The built-in table, compiled once per process.
    pub fn global() -> &'static ErrorClassifier {
        DEFAULT_CLASSIFIER.get_or_init(|| {
            Self::build(DEFAULT_SIGNALS).expect("built-in classifier signals are valid regexes")
        })
    }

    fn build(source: &[(ErrorCategory, &[(&str, &str)])]) -> Result<Self> {
        let mut table = Vec::with_capacity(source.len());
        for (category, signals) in source {
            let signals = signals
                .iter()
                .map(|(label, pattern)| Signal::new(label, pattern))
                .collect::<Result<Vec<_>>>()?;
            table.push(CategorySignals {
                category: *category,
                signals,
            });
        }
        Ok(Self {
            table,
            retry_after: Regex::new(RETRY_AFTER_PATTERN)?,
        })
    }

    /// Append a signal to a category without changing category precedence.
    ///
    /// Adding a signal to `Unknown` is rejected: it is the no-match fallback.
    pub fn with_signal(
        mut self,
        category: ErrorCategory,
        label: &str,
        pattern: &str,
    ) -> Result<Self> {
        if category == ErrorCategory::Unknown {
            return Err(FallbackError::invalid_argument(
                "the unknown category cannot carry signals",
            ));
        }
        let signal = Signal::new(label, pattern)?;
        self.table
            .iter_mut()
            .find(|entry| entry.category == category)
            .ok_or_else(|| {
                FallbackError::invalid_argument(format!(
                    "category {category} is missing from the signal table"
                ))
            })?
            .signals
            .push(signal);
        Ok(self)
    }

    /// Classify a failure message with an optional origin type.
    pub fn classify(&self, raw_message: &str, origin_type: Option<&str>) -> ClassifiedError {
        self.classify_status(raw_message, origin_type, None)
    }

    /// Classify a failure, folding in the HTTP status when the caller has one.
    pub fn classify_status(
        &self,
        raw_message: &str,
        origin_type: Option<&str>,
        status: Option<u16>,
    ) -> ClassifiedError {
        let mut haystack = raw_message.to_string();
        if let Some(origin) = origin_type {
            haystack.push(' ');
            haystack.push_str(origin);
        }
        if let Some(status) = status {
            haystack.push_str(&format!(" {status}"));
        }

        let origin = origin_type
            .map(|origin| origin.trim().to_ascii_lowercase())
            .filter(|origin| NETWORK_ORIGINS.contains(&origin.as_str()));

        let matched = self.table.iter().find_map(|entry| {
            let signal = entry
                .signals
                .iter()
                .find(|signal| signal.pattern.is_match(&haystack))
                .map(|signal| signal.label.clone());
            let signal = match (&origin, entry.category) {
                (Some(origin), ErrorCategory::NetworkError) => {
                    signal.or_else(|| Some(format!("origin {origin}")))
                }
                _ => signal,
            };
            signal.map(|label| (entry.category, label))
        });

        match matched {
            Some((category, label)) => {
                let mut classified = ClassifiedError::from_category(category);
                let immediate = IMMEDIATE_SIGNALS.contains(&label.as_str());
                classified.matched_signal = Some(label);
                if immediate {
                    classified.retry_after_ms = 0;
                } else if classified.recoverable {
                    if let Some(hint) = self.retry_after_hint(raw_message) {
                        classified.retry_after_ms = hint;
                    }
                }
                classified
            }
            None => ClassifiedError::from_category(ErrorCategory::Unknown),
        }
    }

    /// Parse a "retry after N [s|ms]" hint from the message, in milliseconds.
    fn retry_after_hint(&self, message: &str) -> Option<u64> {
        let captures = self.retry_after.captures(message)?;
        let value: f64 = captures.get(1)?.as_str().parse().ok()?;
        let unit = captures
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let millis = if unit.starts_with("ms") || unit.starts_with("milli") {
            value
        } else {
            value * 1000.0
        };
        Some(millis.round() as u64)
    }
}

/// Classify with the built-in table.
pub fn classify(raw_message: &str, origin_type: Option<&str>) -> ClassifiedError {
    ErrorClassifier::global().classify(raw_message, origin_type)
}
