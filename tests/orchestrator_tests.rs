//! End-to-end tests for the request orchestrator.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{test_config, Reply, ScriptedProvider, StaticOracle};
use hydra_fallback::config::{FallbackConfig, ProviderSettings};
use hydra_fallback::error::{ErrorCategory, ErrorLogger, MemoryErrorLogger, StructuredError};
use hydra_fallback::fallback::{ExecuteOptions, Orchestrator, Termination};
use hydra_fallback::models::{ChainHeadSelector, TaskHint};
use hydra_fallback::provider::ProviderCallError;
use hydra_fallback::types::ModelMessage;
use hydra_fallback::util::usage::UsageTracker;

fn orchestrator(provider: &Arc<ScriptedProvider>) -> Orchestrator {
    Orchestrator::new(Arc::new(test_config()), provider.clone())
}

fn prompt() -> Vec<ModelMessage> {
    vec![ModelMessage::user("summarize the release notes")]
}

fn starting_at(provider: &str, model: &str) -> ExecuteOptions {
    ExecuteOptions::builder()
        .messages(prompt())
        .provider(provider)
        .model(model)
        .build()
}

#[tokio::test(start_paused = true)]
async fn rate_limit_switches_provider_and_skips_limited_targets() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(429, "rate limit exceeded")),
    );
    let oracle = Arc::new(StaticOracle::unavailable(&["openai/gpt-4o"]));
    let orchestrator = orchestrator(&provider).with_rate_limits(oracle.clone());

    let outcome = orchestrator.execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(outcome.termination, Termination::Success);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus", "openai/gpt-4o-mini"]);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.provider, "openai");
    assert_eq!(outcome.content.as_deref(), Some("answer from openai/gpt-4o-mini"));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].category, ErrorCategory::RateLimit);
    assert_eq!(oracle.recorded(), 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_without_cross_provider_skips_limited_models() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(429, "rate limit exceeded")),
    );
    let oracle = Arc::new(StaticOracle::unavailable(&["anthropic/sonnet"]));
    let orchestrator = orchestrator(&provider).with_rate_limits(oracle);
    let mut options = starting_at("anthropic", "opus");
    options.cross_provider = Some(false);

    let outcome = orchestrator.execute(options).await;

    assert!(outcome.success);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus", "anthropic/haiku"]);
    assert_eq!(outcome.provider, "anthropic");
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn auth_error_without_cross_provider_stops_after_one_attempt() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(401, "invalid api key")),
    );
    let mut options = starting_at("anthropic", "opus");
    options.cross_provider = Some(false);

    let outcome = orchestrator(&provider).execute(options).await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.termination, Termination::NonRecoverable);
    assert_eq!(provider.call_count(), 1);
    let error = outcome.error.expect("terminal error");
    assert_eq!(error.category, ErrorCategory::AuthError);
    assert!(!error.recoverable);
}

#[tokio::test(start_paused = true)]
async fn auth_error_with_cross_provider_tries_next_provider_immediately() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(401, "invalid api key")),
    );
    let start = tokio::time::Instant::now();

    let outcome = orchestrator(&provider).execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus", "openai/gpt-4o"]);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn repeated_overload_walks_the_chain_until_budget_is_spent() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .always("anthropic/opus", Reply::http(503, "service overloaded"))
            .always("anthropic/sonnet", Reply::http(503, "service overloaded"))
            .always("anthropic/haiku", Reply::http(503, "service overloaded")),
    );
    let mut options = starting_at("anthropic", "opus");
    options.max_attempts = Some(3);

    let outcome = orchestrator(&provider).execute(options).await;

    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::Exhausted);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(
        outcome.fallback_path,
        vec!["anthropic/opus", "anthropic/sonnet", "anthropic/haiku"]
    );
    assert!(outcome
        .errors
        .iter()
        .all(|e| e.category == ErrorCategory::Overloaded));
}

#[tokio::test(start_paused = true)]
async fn malformed_request_is_not_retried() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(400, "invalid schema")),
    );

    let outcome = orchestrator(&provider).execute(starting_at("anthropic", "opus")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::NonRecoverable);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus"]);
    let error = outcome.error.expect("terminal error");
    assert_eq!(error.category, ErrorCategory::ValidationError);
    assert!(!error.recoverable);
}

#[tokio::test(start_paused = true)]
async fn server_errors_retry_in_place_within_budget() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(500, "internal server error")),
    );
    let mut options = starting_at("anthropic", "opus");
    options.max_attempts = Some(4);

    let outcome = orchestrator(&provider).execute(options).await;

    assert_eq!(outcome.termination, Termination::Exhausted);
    assert_eq!(provider.call_count(), 4);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus"; 4]);
}

#[tokio::test(start_paused = true)]
async fn network_errors_back_off_linearly() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then(
                "anthropic/opus",
                Reply::Fail(ProviderCallError::new("connection refused").with_origin("connect")),
            )
            .then(
                "anthropic/opus",
                Reply::Fail(ProviderCallError::new("connection refused").with_origin("connect")),
            ),
    );
    let start = tokio::time::Instant::now();

    let outcome = orchestrator(&provider).execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 3);
    // 2000ms after attempt 1, 4000ms after attempt 2.
    assert_eq!(start.elapsed(), Duration::from_millis(6_000));
}

#[tokio::test(start_paused = true)]
async fn exhausted_chain_without_cross_provider_has_no_fallback() {
    let config =
        FallbackConfig::empty().with_provider("ollama", ProviderSettings::local(["llama3.2:3b"]));
    let provider = Arc::new(
        ScriptedProvider::new().always("ollama/llama3.2:3b", Reply::http(503, "model overloaded")),
    );
    let orchestrator = Orchestrator::new(Arc::new(config), provider.clone());

    let outcome = orchestrator.execute(starting_at("ollama", "llama3.2:3b")).await;

    assert_eq!(outcome.termination, Termination::NoFallbackAvailable);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn provider_switches_never_revisit_a_tried_pair() {
    let limited = Reply::http(429, "too many requests");
    let provider = Arc::new(
        [
            "anthropic/opus",
            "anthropic/sonnet",
            "anthropic/haiku",
            "openai/gpt-4o",
            "openai/gpt-4o-mini",
            "ollama/llama3.2:3b",
        ]
        .into_iter()
        .fold(ScriptedProvider::new(), |p, target| p.always(target, limited.clone())),
    );
    let mut options = starting_at("anthropic", "opus");
    options.max_attempts = Some(10);

    let outcome = orchestrator(&provider).execute(options).await;

    assert_eq!(outcome.termination, Termination::NoFallbackAvailable);
    assert_eq!(outcome.attempts, 6);
    let unique: HashSet<&String> = outcome.fallback_path.iter().collect();
    assert_eq!(unique.len(), outcome.fallback_path.len());
    assert_eq!(
        outcome.fallback_path,
        vec![
            "anthropic/opus",
            "openai/gpt-4o",
            "anthropic/sonnet",
            "openai/gpt-4o-mini",
            "anthropic/haiku",
            "ollama/llama3.2:3b",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_fallback_retries_same_target_with_backoff() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then("anthropic/opus", Reply::http(429, "rate limit exceeded"))
            .then("anthropic/opus", Reply::http(502, "bad gateway")),
    );
    let options = ExecuteOptions::builder()
        .messages(prompt())
        .provider("anthropic")
        .model("opus")
        .auto_fallback(false)
        .retry_delay_ms(100)
        .build();
    let start = tokio::time::Instant::now();

    let outcome = orchestrator(&provider).execute(options).await;

    assert!(outcome.success);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus"; 3]);
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_fallback_stops_on_unrecoverable_error() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(403, "forbidden")),
    );
    let mut options = starting_at("anthropic", "opus");
    options.auto_fallback = Some(false);

    let outcome = orchestrator(&provider).execute(options).await;

    assert_eq!(outcome.termination, Termination::NonRecoverable);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unavailable_target_is_skipped_without_calling_provider() {
    let provider = Arc::new(ScriptedProvider::new());
    let oracle = Arc::new(StaticOracle::unavailable(&["anthropic/opus"]));
    let orchestrator = orchestrator(&provider).with_rate_limits(oracle.clone());

    let outcome = orchestrator.execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(provider.calls(), vec!["openai/gpt-4o"]);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus", "openai/gpt-4o"]);
    assert_eq!(outcome.errors[0].category, ErrorCategory::RateLimit);
    assert_eq!(outcome.errors[0].origin_type.as_deref(), Some("rate_limiter"));
    assert_eq!(oracle.recorded(), 1);
}

#[tokio::test(start_paused = true)]
async fn usage_is_recorded_for_every_call() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(529, "overloaded")),
    );
    let usage = UsageTracker::new();
    let orchestrator = orchestrator(&provider).with_usage_recorder(Arc::new(usage.clone()));

    let outcome = orchestrator.execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(outcome.model, "sonnet");
    let anthropic = usage.provider_usage("anthropic");
    assert_eq!(anthropic.requests, 2);
    assert_eq!(anthropic.errors, 1);
    assert_eq!(anthropic.usage.input_tokens, 10);
    assert_eq!(anthropic.usage.output_tokens, 20);
}

#[tokio::test(start_paused = true)]
async fn every_failure_reaches_the_error_logger() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .always("anthropic/opus", Reply::http(503, "overloaded"))
            .always("anthropic/sonnet", Reply::http(503, "overloaded")),
    );
    let logger = MemoryErrorLogger::new();
    let orchestrator = orchestrator(&provider).with_error_logger(Arc::new(logger.clone()));

    let outcome = orchestrator.execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(logger.len(), 2);
    let records = logger.records();
    assert_eq!(records[0].model, "opus");
    assert_eq!(records[1].model, "sonnet");
    assert_eq!(records[0].operation, "chat");
}

struct PanickingLogger;

impl ErrorLogger for PanickingLogger {
    fn log(&self, _error: &StructuredError) {
        panic!("log sink unavailable");
    }
}

#[tokio::test(start_paused = true)]
async fn logger_panics_do_not_affect_the_request() {
    let provider = Arc::new(
        ScriptedProvider::new().then("anthropic/opus", Reply::http(503, "overloaded")),
    );
    let orchestrator = orchestrator(&provider).with_error_logger(Arc::new(PanickingLogger));

    let outcome = orchestrator.execute(starting_at("anthropic", "opus")).await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_pending_call() {
    let provider = Arc::new(ScriptedProvider::new().always("anthropic/opus", Reply::Hang));
    let cancel = CancellationToken::new();
    let mut options = starting_at("anthropic", "opus");
    options.cancel = Some(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });
    let outcome = orchestrator(&provider).execute(options).await;

    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::Canceled);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_wait_starts_no_further_attempt() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(429, "rate limit exceeded")),
    );
    let cancel = CancellationToken::new();
    let mut options = starting_at("anthropic", "opus");
    options.cancel = Some(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });
    let outcome = orchestrator(&provider).execute(options).await;

    assert_eq!(outcome.termination, Termination::Canceled);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(outcome.fallback_path, vec!["anthropic/opus"]);
}

#[tokio::test(start_paused = true)]
async fn already_canceled_request_makes_no_calls() {
    let provider = Arc::new(ScriptedProvider::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut options = starting_at("anthropic", "opus");
    options.cancel = Some(cancel);

    let outcome = orchestrator(&provider).execute(options).await;

    assert_eq!(outcome.termination, Termination::Canceled);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn initial_target_defaults_to_first_configured_provider() {
    let provider = Arc::new(ScriptedProvider::new());

    let outcome = orchestrator(&provider).execute(ExecuteOptions::new(prompt())).await;

    assert_eq!(outcome.fallback_path, vec!["anthropic/opus"]);
}

#[tokio::test(start_paused = true)]
async fn initial_target_comes_from_model_selector_when_injected() {
    let provider = Arc::new(ScriptedProvider::new());
    let config = Arc::new(test_config());
    let orchestrator = Orchestrator::new(config.clone(), provider.clone())
        .with_model_selector(Arc::new(ChainHeadSelector::new(config)));
    let options = ExecuteOptions::builder()
        .messages(prompt())
        .task_hint(TaskHint::Simple)
        .build();

    let outcome = orchestrator.execute(options).await;

    assert_eq!(outcome.fallback_path, vec!["anthropic/haiku"]);
}

#[tokio::test(start_paused = true)]
async fn model_only_request_finds_its_provider() {
    let provider = Arc::new(ScriptedProvider::new());
    let options = ExecuteOptions::builder()
        .messages(prompt())
        .model("gpt-4o-mini")
        .build();

    let outcome = orchestrator(&provider).execute(options).await;

    assert_eq!(outcome.provider, "openai");
    assert_eq!(outcome.fallback_path, vec!["openai/gpt-4o-mini"]);
}

#[tokio::test(start_paused = true)]
async fn empty_config_fails_without_calling_anything() {
    let provider = Arc::new(ScriptedProvider::new());
    let orchestrator = Orchestrator::new(Arc::new(FallbackConfig::empty()), provider.clone());

    let outcome = orchestrator.execute(ExecuteOptions::new(prompt())).await;

    assert!(!outcome.success);
    assert_eq!(outcome.termination, Termination::NoFallbackAvailable);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(provider.call_count(), 0);
    assert!(outcome.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_keep_separate_state() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then("anthropic/opus", Reply::http(503, "overloaded"))
            .then("anthropic/opus", Reply::http(503, "overloaded")),
    );
    let orchestrator = orchestrator(&provider);

    let (first, second) = tokio::join!(
        orchestrator.execute(starting_at("anthropic", "opus")),
        orchestrator.execute(starting_at("anthropic", "opus")),
    );

    assert_ne!(first.request_id, second.request_id);
    assert_eq!(first.fallback_path, vec!["anthropic/opus", "anthropic/sonnet"]);
    assert_eq!(second.fallback_path, vec!["anthropic/opus", "anthropic/sonnet"]);
}

#[tokio::test(start_paused = true)]
async fn outcome_serializes_with_termination_and_path() {
    let provider = Arc::new(
        ScriptedProvider::new().always("anthropic/opus", Reply::http(400, "bad request")),
    );

    let outcome = orchestrator(&provider).execute(starting_at("anthropic", "opus")).await;
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["termination"], "non_recoverable");
    assert_eq!(json["fallback_path"][0], "anthropic/opus");
    assert_eq!(json["error"]["category"], "validation_error");
}
