//! CLI entry point for hydra-fallback.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::FallbackType;
use crate::models::ModelRef;

/// Hydra fallback CLI
#[derive(Parser, Debug)]
#[command(
    name = "hydra-fallback",
    version,
    about = "Inspect and exercise the provider fallback engine"
)]
pub struct Cli {
    /// Config file (defaults to ~/.hydra/fallback.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a raw provider error message
    Classify(ClassifyArgs),
    /// Show the next fallback candidate for a failed target
    Chain(ChainArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
    /// Send a prompt through the orchestrator (Ollama backend)
    Ask(AskArgs),
}

/// Arguments for the `classify` subcommand.
#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Raw error message
    pub message: String,

    /// HTTP status of the failed response
    #[arg(long)]
    pub status: Option<u16>,

    /// Origin type (timeout, connect, http, ...)
    #[arg(long)]
    pub origin: Option<String>,
}

/// Arguments for the `chain` subcommand.
#[derive(Parser, Debug)]
pub struct ChainArgs {
    /// Failed target (provider/model)
    pub target: ModelRef,

    /// Fallback type to resolve
    #[arg(long = "type", default_value = "switch-model")]
    pub fallback_type: FallbackType,

    /// Disallow switching providers
    #[arg(long)]
    pub no_cross: bool,

    /// Targets already tried, comma separated
    #[arg(long, value_delimiter = ',')]
    pub tried: Vec<ModelRef>,
}

/// Arguments for the `config` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Print only the config file path
    #[arg(long)]
    pub path: bool,
}

/// Arguments for the `ask` subcommand.
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// Starting target (provider/model); defaults to the head of the ollama chain
    #[arg(short, long)]
    pub model: Option<ModelRef>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Attempt budget (overrides config)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Retry in place only, never switch models
    #[arg(long)]
    pub no_fallback: bool,

    /// Print the full outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// User prompt
    pub prompt: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
