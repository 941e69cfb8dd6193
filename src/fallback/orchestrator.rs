//! Request orchestration: drives one request through attempts, fallbacks and
//! waits until it succeeds or runs out of options.
//!
//! All retry state (tried set, fallback path, attempt counter, error log) lives
//! in a per-call `RequestRun`, so concurrent `execute` calls share nothing but
//! the read-only config and the rate-limit oracle.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::Serialize;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChainResolver, TriedSet};
use crate::config::FallbackConfig;
use crate::error::{
    ClassifiedError, ErrorCategory, ErrorClassifier, ErrorLogger, StructuredError,
    TracingErrorLogger,
};
use crate::models::{ModelRef, ModelSelector, TaskHint};
use crate::provider::{ProviderClient, ProviderRequest, ProviderResponse};
use crate::ratelimit::{RateLimitOracle, Unlimited};
use crate::types::{estimate_tokens, ModelMessage, Usage};
use crate::util::retry::BackoffPolicy;
use crate::util::usage::{NoopUsageRecorder, UsageRecorder};

/// Per-request parameters. Unset limits fall back to the config.
#[derive(Debug, Clone, Builder)]
pub struct ExecuteOptions {
    pub messages: Vec<ModelMessage>,
    #[builder(into)]
    pub provider: Option<String>,
    #[builder(into)]
    pub model: Option<String>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub auto_fallback: Option<bool>,
    pub cross_provider: Option<bool>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    #[builder(default)]
    pub task_hint: TaskHint,
    /// Operation name recorded on each failure.
    #[builder(into, default = String::from("chat"))]
    pub operation: String,
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn new(messages: Vec<ModelMessage>) -> Self {
        Self::builder().messages(messages).build()
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Termination {
    Success,
    /// The attempt budget was spent.
    Exhausted,
    /// The resolver found no untried, available target.
    NoFallbackAvailable,
    /// The failure cannot be fixed by retrying (validation, auth without
    /// cross-provider permission, unknown).
    NonRecoverable,
    Canceled,
}

/// Terminal value of one request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub request_id: Uuid,
    pub success: bool,
    pub content: Option<String>,
    pub usage: Option<Usage>,
    /// Last attempted (or successful) provider and model.
    pub provider: String,
    pub model: String,
    pub attempts: u32,
    /// `provider/model` per attempt, in order.
    pub fallback_path: Vec<String>,
    pub termination: Termination,
    pub error: Option<StructuredError>,
    /// Every failure recorded during the request.
    pub errors: Vec<StructuredError>,
}

struct RequestRun {
    id: Uuid,
    tried: TriedSet,
    path: Vec<String>,
    errors: Vec<StructuredError>,
    attempts: u32,
}

impl RequestRun {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tried: TriedSet::new(),
            path: Vec::new(),
            errors: Vec::new(),
            attempts: 0,
        }
    }

    fn begin_attempt(&mut self, target: &ModelRef) -> u32 {
        self.tried.insert(&target.provider, &target.model);
        self.path.push(target.to_string());
        self.attempts += 1;
        self.attempts
    }

    fn succeed(self, target: ModelRef, response: ProviderResponse) -> RequestOutcome {
        info!(
            request_id = %self.id,
            provider = %target.provider,
            model = %target.model,
            attempts = self.attempts,
            "request succeeded"
        );
        RequestOutcome {
            request_id: self.id,
            success: true,
            content: Some(response.content),
            usage: Some(response.usage),
            provider: target.provider,
            model: target.model,
            attempts: self.attempts,
            fallback_path: self.path,
            termination: Termination::Success,
            error: None,
            errors: self.errors,
        }
    }

    fn fail(
        self,
        target: ModelRef,
        termination: Termination,
        error: Option<StructuredError>,
    ) -> RequestOutcome {
        info!(
            request_id = %self.id,
            provider = %target.provider,
            model = %target.model,
            attempts = self.attempts,
            %termination,
            "request failed"
        );
        RequestOutcome {
            request_id: self.id,
            success: false,
            content: None,
            usage: None,
            provider: target.provider,
            model: target.model,
            attempts: self.attempts,
            fallback_path: self.path,
            termination,
            error,
            errors: self.errors,
        }
    }
}

enum AttemptResult {
    Success(ProviderResponse),
    Failed(StructuredError),
    Canceled,
}

enum Step {
    Continue { next: ModelRef, wait: Duration },
    Stop { termination: Termination, reason: String },
}

/// Entry point of the fallback engine.
pub struct Orchestrator {
    config: Arc<FallbackConfig>,
    client: Arc<dyn ProviderClient>,
    rate_limits: Arc<dyn RateLimitOracle>,
    resolver: ChainResolver,
    usage: Arc<dyn UsageRecorder>,
    selector: Option<Arc<dyn ModelSelector>>,
    error_logger: Arc<dyn ErrorLogger>,
    classifier: ErrorClassifier,
}

impl Orchestrator {
    /// Orchestrator with no rate limits, no usage tracking, no model
    /// selector, and failures logged through `tracing`.
    pub fn new(config: Arc<FallbackConfig>, client: Arc<dyn ProviderClient>) -> Self {
        let rate_limits: Arc<dyn RateLimitOracle> = Arc::new(Unlimited);
        Self {
            resolver: ChainResolver::new(config.clone(), rate_limits.clone()),
            config,
            client,
            rate_limits,
            usage: Arc::new(NoopUsageRecorder),
            selector: None,
            error_logger: Arc::new(TracingErrorLogger),
            classifier: ErrorClassifier::default(),
        }
    }

    pub fn with_rate_limits(mut self, rate_limits: Arc<dyn RateLimitOracle>) -> Self {
        self.resolver = ChainResolver::new(self.config.clone(), rate_limits.clone());
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_usage_recorder(mut self, usage: Arc<dyn UsageRecorder>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_model_selector(mut self, selector: Arc<dyn ModelSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_error_logger(mut self, error_logger: Arc<dyn ErrorLogger>) -> Self {
        self.error_logger = error_logger;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Run one request to completion. Never returns an error: failures are
    /// reported in [`RequestOutcome::error`].
    pub async fn execute(&self, options: ExecuteOptions) -> RequestOutcome {
        let max_attempts = options.max_attempts.unwrap_or(self.config.max_attempts);
        let auto_fallback = options.auto_fallback.unwrap_or(self.config.auto_fallback);
        let cross_provider = options.cross_provider.unwrap_or(self.config.cross_provider);
        let backoff = BackoffPolicy::default().with_initial_backoff(Duration::from_millis(
            options.retry_delay_ms.unwrap_or(self.config.retry_delay_ms),
        ));
        let cancel = options.cancel.clone().unwrap_or_default();
        let mut run = RequestRun::new();

        let mut current = match self.initial_target(&options) {
            Ok(target) => target,
            Err(message) => {
                let classified = ClassifiedError::from_category(ErrorCategory::ValidationError);
                let error = StructuredError::new(message, &options.operation, "", "", &classified);
                self.report(&error);
                return run.fail(
                    ModelRef::new("", ""),
                    Termination::NoFallbackAvailable,
                    Some(error),
                );
            }
        };
        debug!(
            request_id = %run.id,
            target = %current,
            max_attempts,
            auto_fallback,
            cross_provider,
            "request selected initial target"
        );

        loop {
            if cancel.is_cancelled() {
                return self.canceled(run, current, &options);
            }
            if run.attempts >= max_attempts {
                let error = run.errors.last().cloned();
                return run.fail(current, Termination::Exhausted, error);
            }

            let attempt = run.begin_attempt(&current);
            let failure = match self.attempt(&current, attempt, &options, &cancel).await {
                AttemptResult::Success(response) => return run.succeed(current, response),
                AttemptResult::Canceled => return self.canceled(run, current, &options),
                AttemptResult::Failed(error) => error,
            };
            self.report(&failure);
            run.errors.push(failure.clone());

            let classified = failure.classified();
            let step = if auto_fallback {
                self.next_with_fallback(
                    &run.tried,
                    &current,
                    &classified,
                    attempt,
                    max_attempts,
                    cross_provider,
                )
            } else {
                next_in_place(&current, &classified, attempt, max_attempts, &backoff)
            };

            let (next, wait) = match step {
                Step::Continue { next, wait } => (next, wait),
                Step::Stop { termination, reason } => {
                    let error = failure.with_context("termination_reason", reason);
                    return run.fail(current, termination, Some(error));
                }
            };

            debug!(
                request_id = %run.id,
                from = %current,
                to = %next,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "waiting before next attempt"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.canceled(run, current, &options),
                _ = tokio::time::sleep(wait) => {}
            }
            current = next;
        }
    }

    fn initial_target(&self, options: &ExecuteOptions) -> Result<ModelRef, String> {
        match (&options.provider, &options.model) {
            (Some(provider), Some(model)) => Ok(ModelRef::new(provider, model)),
            (Some(provider), None) => self
                .config
                .chain(provider)
                .first()
                .map(|model| ModelRef::new(provider, model.clone()))
                .ok_or_else(|| format!("provider '{provider}' has no configured models")),
            (None, Some(model)) => self
                .config
                .effective_order()
                .into_iter()
                .find(|provider| self.config.chain(provider).iter().any(|m| m == model))
                .map(|provider| ModelRef::new(provider, model.clone()))
                .ok_or_else(|| format!("no configured provider serves model '{model}'")),
            (None, None) => self
                .selector
                .as_ref()
                .and_then(|selector| {
                    selector.select_optimal(options.task_hint, estimate_tokens(&options.messages))
                })
                .or_else(|| self.config.default_target())
                .ok_or_else(|| "no provider/model is configured".to_string()),
        }
    }

    async fn attempt(
        &self,
        target: &ModelRef,
        attempt: u32,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        let (provider, model) = (target.provider.as_str(), target.model.as_str());

        if !self.rate_limits.is_available(provider, model) {
            let mut classified = ClassifiedError::from_category(ErrorCategory::RateLimit);
            classified.matched_signal = Some("local rate limiter".to_string());
            if let Some(reset) = self.rate_limits.time_until_reset(provider, model) {
                classified.retry_after_ms = reset.as_millis() as u64;
            }
            let mut error = StructuredError::new(
                format!("rate limit: {target} has no remaining quota in the current window"),
                &options.operation,
                provider,
                model,
                &classified,
            )
            .with_origin_type(Some("rate_limiter".to_string()))
            .with_context("attempt", attempt);
            if let Some(percent) = self.rate_limits.percent_remaining(provider, model) {
                error = error.with_context("percent_remaining", format!("{percent:.1}"));
            }
            return AttemptResult::Failed(error);
        }

        self.rate_limits.record_request(provider, model);
        let request = ProviderRequest {
            provider: provider.to_string(),
            model: model.to_string(),
            messages: options.messages.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };
        debug!(provider, model, attempt, "calling provider");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return AttemptResult::Canceled,
            result = self.client.call(&request) => result,
        };

        match result {
            Ok(response) => {
                self.usage.record(
                    provider,
                    model,
                    response.usage.input_tokens,
                    response.usage.output_tokens,
                    false,
                );
                AttemptResult::Success(response)
            }
            Err(err) => {
                self.usage.record(provider, model, 0, 0, true);
                let classified = self.classifier.classify_status(
                    &err.message,
                    err.origin_type.as_deref(),
                    err.status,
                );
                let mut error = StructuredError::new(
                    err.message.clone(),
                    &options.operation,
                    provider,
                    model,
                    &classified,
                )
                .with_origin_type(err.origin_type.clone())
                .with_inner_message(err.inner_message.clone())
                .with_context("attempt", attempt);
                if let Some(status) = err.status {
                    error = error.with_context("status", status);
                }
                AttemptResult::Failed(error)
            }
        }
    }

    fn next_with_fallback(
        &self,
        tried: &TriedSet,
        current: &ModelRef,
        classified: &ClassifiedError,
        attempt: u32,
        max_attempts: u32,
        cross_provider: bool,
    ) -> Step {
        let decision = self
            .config
            .policy
            .decide(classified, attempt, max_attempts, cross_provider);
        debug!(
            category = %classified.category,
            fallback_type = %decision.fallback_type,
            wait_ms = decision.wait_ms,
            reason = %decision.reason,
            "fallback decision"
        );
        if !decision.should_fallback {
            let termination = if attempt >= max_attempts {
                Termination::Exhausted
            } else {
                Termination::NonRecoverable
            };
            return Step::Stop {
                termination,
                reason: decision.reason,
            };
        }

        match self.resolver.next_candidate(
            &current.provider,
            &current.model,
            decision.fallback_type,
            cross_provider,
            tried,
        ) {
            Some(candidate) => Step::Continue {
                next: candidate.target(),
                wait: decision.wait(),
            },
            None => Step::Stop {
                termination: Termination::NoFallbackAvailable,
                reason: format!(
                    "{}: no untried candidate for {}",
                    decision.reason, decision.fallback_type
                ),
            },
        }
    }

    fn report(&self, error: &StructuredError) {
        let logger = &self.error_logger;
        if std::panic::catch_unwind(AssertUnwindSafe(|| logger.log(error))).is_err() {
            tracing::warn!("error logger panicked; ignoring");
        }
    }

    fn canceled(
        &self,
        run: RequestRun,
        target: ModelRef,
        options: &ExecuteOptions,
    ) -> RequestOutcome {
        let classified = ClassifiedError::from_category(ErrorCategory::Unknown);
        let error = StructuredError::new(
            "request canceled",
            &options.operation,
            &target.provider,
            &target.model,
            &classified,
        )
        .with_origin_type(Some("cancellation".to_string()));
        run.fail(target, Termination::Canceled, Some(error))
    }
}

/// Same target, exponential backoff, while the failure is recoverable.
fn next_in_place(
    current: &ModelRef,
    classified: &ClassifiedError,
    attempt: u32,
    max_attempts: u32,
    backoff: &BackoffPolicy,
) -> Step {
    if !classified.recoverable {
        return Step::Stop {
            termination: Termination::NonRecoverable,
            reason: format!("{} is not recoverable", classified.category),
        };
    }
    if attempt >= max_attempts {
        return Step::Stop {
            termination: Termination::Exhausted,
            reason: format!("attempt budget exhausted ({attempt}/{max_attempts})"),
        };
    }
    Step::Continue {
        next: current.clone(),
        wait: backoff.delay_for(attempt),
    }
}
