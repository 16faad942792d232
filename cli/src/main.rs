mod commands;
mod util;

use clap::{Parser, Subcommand};
use resona_core::config::EngineConfig;
use resona_core::error::ErrorReport;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use commands::checkpoint::CheckpointArgs;
use commands::coherence::CoherenceArgs;
use commands::export::ExportArgs;
use commands::validate::ValidateArgs;

#[derive(Parser)]
#[command(
    name = "resona",
    version,
    about = "Resona CLI: coherence corridor scoring and return-mapping validation for agent sessions"
)]
struct Cli {
    /// Log filter (falls back to RUST_LOG, then resona_cli=info,resona_core=info)
    #[arg(long, env = "RESONA_LOG", global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute C(S) over a window of events
    Coherence(CoherenceArgs),
    /// Create a checkpoint with a coherence estimate
    Checkpoint(CheckpointArgs),
    /// Validate a return mapping against a checkpoint
    Validate(ValidateArgs),
    /// Assemble a research export from a bundle of records
    Export(ExportArgs),
}

fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(f) => tracing_subscriber::EnvFilter::new(f),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "resona_cli=info,resona_core=info".into()),
    };

    // stdout carries results; logs go to stderr as JSON
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "rejected engine configuration");
        util::exit_error(&ErrorReport::from(&e))
    });

    let code = match cli.command {
        Commands::Coherence(args) => commands::coherence::run(args, &config),
        Commands::Checkpoint(args) => commands::checkpoint::run(args, &config),
        Commands::Validate(args) => commands::validate::run(args, &config),
        Commands::Export(args) => commands::export::run(args, &config),
    };

    std::process::exit(code);
}
