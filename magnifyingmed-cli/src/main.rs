//! MagnifyingMed CLI: interactive bias analysis of medical AI research.

mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use magnifyingmed_core::provider::{
    AnalysisProvider, MockAnalysisProvider, MockNarrativeGenerator, NarrativeGenerator,
};
use magnifyingmed_core::{AppConfig, ConversationOrchestrator, create_collaborators, load_config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// MagnifyingMed: find under-explored racial bias in medical AI research
#[derive(Parser, Debug)]
#[command(name = "magnifyingmed", version, about, long_about = None)]
struct Cli {
    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Workspace directory (reads .magnifyingmed/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Use built-in demo findings instead of a live model
    #[arg(long)]
    offline: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    show_config: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(cli: &Cli) {
    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(cli.verbose, cli.quiet)));

    let layer = if cli.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).init();
}

fn collaborators(
    config: &AppConfig,
    offline: bool,
) -> anyhow::Result<(Arc<dyn AnalysisProvider>, Arc<dyn NarrativeGenerator>)> {
    if offline {
        tracing::info!("Running offline with demo findings");
        let generator = MockNarrativeGenerator::with_response(
            "(offline mode: narrative generation is disabled; the figures above come from built-in demo findings)",
        );
        return Ok((Arc::new(MockAnalysisProvider::demo()), Arc::new(generator)));
    }
    create_collaborators(config).map_err(|e| {
        anyhow::anyhow!("{}. Set {} or run with --offline.", e, config.llm.api_key_env)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli);

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    if cli.show_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    for warning in config.validate() {
        if !cli.quiet {
            eprintln!("Warning: {}", warning);
        }
    }

    let (provider, generator) = collaborators(&config, cli.offline)?;
    let session = ConversationOrchestrator::new(config, provider, generator)?;
    repl::run_interactive(session).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(log_level(0, false), "warn");
        assert_eq!(log_level(0, true), "error");
        assert_eq!(log_level(1, true), "info");
        assert_eq!(log_level(2, false), "debug");
        assert_eq!(log_level(5, false), "trace");
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["magnifyingmed", "--offline", "-vv", "--model", "gpt-4o-mini"]);
        assert!(cli.offline);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(cli.workspace, PathBuf::from("."));
    }

    #[test]
    fn test_offline_collaborators_need_no_key() {
        let mut config = AppConfig::default();
        config.llm.api_key_env = "MAGNIFYINGMED_CLI_TEST_KEY_NEVER_SET".to_string();
        let (provider, generator) = collaborators(&config, true).unwrap();
        assert_eq!(provider.name(), "mock");
        assert_eq!(generator.model_name(), "mock-model");
        assert!(collaborators(&config, false).is_err());
    }
}
