//! CLI command handlers.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{AskArgs, ChainArgs, ClassifyArgs, ConfigArgs};
use crate::config::FallbackConfig;
use crate::error::{ErrorClassifier, FallbackError, Result};
use crate::fallback::{ChainResolver, ExecuteOptions, Orchestrator, RequestOutcome, TriedSet};
use crate::provider::ollama::OllamaClient;
use crate::provider::ProviderRegistry;
use crate::ratelimit::Unlimited;
use crate::types::ModelMessage;

/// Handle `hydra-fallback classify <message>`.
pub fn handle_classify(args: &ClassifyArgs) -> Result<()> {
    let classified = ErrorClassifier::global().classify_status(
        &args.message,
        args.origin.as_deref(),
        args.status,
    );
    println!("{}", serde_json::to_string_pretty(&classified)?);
    Ok(())
}

/// Handle `hydra-fallback chain <provider/model>`.
pub fn handle_chain(config_path: Option<&Path>, args: &ChainArgs) -> Result<()> {
    let config = Arc::new(FallbackConfig::load(config_path)?);
    let resolver = ChainResolver::new(config, Arc::new(Unlimited));

    let mut tried: TriedSet = args.tried.iter().collect();
    tried.insert(&args.target.provider, &args.target.model);

    match resolver.next_candidate(
        &args.target.provider,
        &args.target.model,
        args.fallback_type,
        !args.no_cross,
        &tried,
    ) {
        Some(candidate) if candidate.is_new_provider => {
            println!("{} (new provider)", candidate.target());
        }
        Some(candidate) => println!("{}", candidate.target()),
        None => println!("no fallback available"),
    }
    Ok(())
}

/// Handle `hydra-fallback config`.
pub fn handle_config(config_path: Option<&Path>, args: &ConfigArgs) -> Result<()> {
    if args.path {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(FallbackConfig::default_path);
        println!("{}", path.display());
        return Ok(());
    }
    let config = FallbackConfig::load(config_path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Handle `hydra-fallback ask <prompt>`. Ctrl-C cancels the request.
pub async fn handle_ask(config_path: Option<&Path>, args: AskArgs) -> Result<RequestOutcome> {
    let config = Arc::new(FallbackConfig::load(config_path)?);
    let ollama = OllamaClient::from_env()?;
    if !ollama.is_running().await {
        return Err(FallbackError::config(format!(
            "Ollama is not reachable at {}",
            ollama.base_url()
        )));
    }
    let registry = ProviderRegistry::new().with_client("ollama", Arc::new(ollama));
    let orchestrator = Orchestrator::new(config, Arc::new(registry));

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(ModelMessage::system(system));
    }
    messages.push(ModelMessage::user(args.prompt));

    let (provider, model) = match args.model {
        Some(target) => (target.provider, Some(target.model)),
        None => ("ollama".to_string(), None),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let options = ExecuteOptions::builder()
        .messages(messages)
        .provider(provider)
        .maybe_model(model)
        .maybe_max_attempts(args.max_attempts)
        .maybe_temperature(args.temperature)
        .maybe_max_tokens(args.max_tokens)
        .maybe_auto_fallback(args.no_fallback.then_some(false))
        .operation("ask")
        .cancel(cancel)
        .build();

    let outcome = orchestrator.execute(options).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if let Some(content) = &outcome.content {
        println!("{content}");
        eprintln!("via {}", outcome.fallback_path.join(" -> "));
    }
    Ok(outcome)
}
