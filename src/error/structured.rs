//! Caller-visible failure records and the error-logging collaborator.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::category::{ErrorCategory, FallbackType};
use super::classifier::ClassifiedError;

/// One failed attempt, with enough context to diagnose it without logs.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{operation} failed on {provider}/{model} ({category}): {message}")]
pub struct StructuredError {
    pub message: String,
    pub operation: String,
    pub provider: String,
    pub model: String,
    pub category: ErrorCategory,
    pub recoverable: bool,
    pub retry_after_ms: u64,
    pub fallback_hint: FallbackType,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_message: Option<String>,
}

impl StructuredError {
    /// Build a record from a classification.
    pub fn new(
        message: impl Into<String>,
        operation: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        classified: &ClassifiedError,
    ) -> Self {
        let mut context = BTreeMap::new();
        if let Some(signal) = &classified.matched_signal {
            context.insert("matched_signal".to_string(), signal.clone());
        }
        Self {
            message: message.into(),
            operation: operation.into(),
            provider: provider.into(),
            model: model.into(),
            category: classified.category,
            recoverable: classified.recoverable,
            retry_after_ms: classified.retry_after_ms,
            fallback_hint: classified.fallback_hint,
            timestamp_utc: Utc::now(),
            context,
            origin_type: None,
            inner_message: None,
        }
    }

    pub fn with_origin_type(mut self, origin_type: Option<String>) -> Self {
        self.origin_type = origin_type;
        self
    }

    pub fn with_inner_message(mut self, inner_message: Option<String>) -> Self {
        self.inner_message = inner_message;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// The classification view consumed by the decision policy.
    pub fn classified(&self) -> ClassifiedError {
        ClassifiedError {
            category: self.category,
            recoverable: self.recoverable,
            retry_after_ms: self.retry_after_ms,
            fallback_hint: self.fallback_hint,
            matched_signal: self.context.get("matched_signal").cloned(),
        }
    }
}

/// Sink for failed attempts. Fire-and-forget: implementations must not block
/// for long, and a panicking logger never alters request control flow.
pub trait ErrorLogger: Send + Sync {
    fn log(&self, error: &StructuredError);
}

/// Emits each failure as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLogger;

impl ErrorLogger for TracingErrorLogger {
    fn log(&self, error: &StructuredError) {
        tracing::warn!(
            operation = %error.operation,
            provider = %error.provider,
            model = %error.model,
            category = %error.category,
            recoverable = error.recoverable,
            retry_after_ms = error.retry_after_ms,
            origin_type = error.origin_type.as_deref().unwrap_or(""),
            "{}",
            error.message
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorLogger;

impl ErrorLogger for NoopErrorLogger {
    fn log(&self, _error: &StructuredError) {}
}

/// Keeps every logged failure in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryErrorLogger {
    records: Arc<Mutex<Vec<StructuredError>>>,
}

impl MemoryErrorLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StructuredError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorLogger for MemoryErrorLogger {
    fn log(&self, error: &StructuredError) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(error.clone());
    }
}
