//! Hydra fallback: provider fallback and retry engine for LLM requests.
//!
//! Classifies provider failures into a fixed set of categories, decides
//! whether to retry in place or degrade to another model or provider, and
//! drives each request until it succeeds or runs out of candidates.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hydra_fallback::prelude::*;
//! use hydra_fallback::provider::ollama::OllamaClient;
//!
//! # async fn example() -> hydra_fallback::error::Result<()> {
//! let config = Arc::new(FallbackConfig::load(None)?);
//! let client = Arc::new(OllamaClient::from_env()?);
//! let orchestrator = Orchestrator::new(config, client);
//!
//! let outcome = orchestrator
//!     .execute(ExecuteOptions::new(vec![ModelMessage::user("Hello!")]))
//!     .await;
//! println!("{:?} via {}", outcome.content, outcome.fallback_path.join(" -> "));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod ratelimit;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
