//! cpv - capture-provenance verifier
//!
//! Verifies proof bundles and exposes the individual primitives (event
//! hashing, completeness invariants, Merkle proofs, time-stamp tokens) for
//! inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpv_core::config::{LogFormat, VerifierConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// Configuration file picked up from the working directory when `--config`
/// is not given.
const DEFAULT_CONFIG: &str = "cpv.toml";

/// cpv - capture-provenance verifier
#[derive(Parser, Debug)]
#[command(name = "cpv")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ./cpv.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error); overrides the config
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify one or more proof bundles
    Verify(commands::verify::VerifyArgs),

    /// Compute an event's EventHash and compare it with the stored one
    HashEvent(commands::inspect::HashEventArgs),

    /// Compute or check the completeness invariant of an event set
    Completeness(commands::inspect::CompletenessArgs),

    /// Build a Merkle tree over event hashes and print its proofs
    Merkle(commands::inspect::MerkleArgs),

    /// Decode an RFC 3161 time-stamp token or response
    InspectToken(commands::inspect::InspectTokenArgs),
}

fn load_config(explicit: Option<&Path>) -> Result<VerifierConfig> {
    match explicit {
        Some(path) => VerifierConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => VerifierConfig::from_file(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("failed to load {DEFAULT_CONFIG}")),
        None => Ok(VerifierConfig::default()),
    }
}

fn init_logging(cli_level: Option<&str>, config: &VerifierConfig) {
    let level = cli_level.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so that reports on stdout stay machine-readable.
    match config.logging.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.log_level.as_deref(), &config);
    debug!(?config, "configuration loaded");

    let exit_code = match &cli.command {
        Commands::Verify(args) => commands::verify::run(args, &config)?,
        Commands::HashEvent(args) => commands::inspect::hash_event(args)?,
        Commands::Completeness(args) => commands::inspect::completeness(args)?,
        Commands::Merkle(args) => commands::inspect::merkle(args)?,
        Commands::InspectToken(args) => commands::inspect::inspect_token(args)?,
    };

    if exit_code != commands::exit_codes::SUCCESS {
        std::process::exit(i32::from(exit_code));
    }
    Ok(())
}
