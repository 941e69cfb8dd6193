//! hydra-fallback CLI binary entry point.

use clap::Parser;
use hydra_fallback::cli::{commands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Classify(args) => commands::handle_classify(&args),
        Commands::Chain(args) => commands::handle_chain(config_path, &args),
        Commands::Config(args) => commands::handle_config(config_path, &args),
        Commands::Ask(args) => match commands::handle_ask(config_path, args).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => {
                if let Some(error) = &outcome.error {
                    eprintln!("Error: {error}");
                }
                eprintln!(
                    "{} after {} attempt(s): {}",
                    outcome.termination,
                    outcome.attempts,
                    outcome.fallback_path.join(" -> ")
                );
                std::process::exit(2);
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
