// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! tollgate CLI - search a gateway-protected catalog from the command line.
//!
//! # Examples
//!
//! ```bash
//! # All records for a city
//! tollgate search "Dallas, TX"
//!
//! # First 500 records of a county, as JSON
//! tollgate search "Dallas County, TX" --limit 500 --format json --pretty
//!
//! # Resume a failed search
//! tollgate search "75201" --offset 750
//!
//! # Inspect or drop the cached token
//! tollgate cache show
//! tollgate cache clear
//!
//! # Write a default configuration file
//! tollgate config init
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tollgate_catalog::CatalogError;
use tollgate_store::{Config, StoreError};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{cache, config, search};

// ============================================================================
// CLI Definition
// ============================================================================

/// tollgate CLI - resilient catalog search.
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Resilient paginated search for gateway-protected catalogs")]
#[command(long_about = r#"
tollgate acquires authorization tokens from the catalog's anti-automation
gateway, caches them, and walks paginated search results with pacing,
retries, and deduplication.

Examples:
  tollgate search "Dallas, TX"             # Every record for a city
  tollgate search 75201 --limit 100        # First 100 records for a ZIP
  tollgate search "Dallas, TX" -f json     # JSON output
  tollgate cache show                      # Cached token status
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Configuration file (defaults to the platform config dir).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

impl Cli {
    /// Path of the configuration file in effect.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Loads the configuration file in effect.
    pub async fn load_config(&self) -> Result<Config, StoreError> {
        Config::load_from(&self.config_path()).await
    }
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Search the catalog for a location.
    #[command(visible_alias = "s")]
    Search(search::SearchArgs),

    /// Inspect or clear the cached authorization token.
    Cache(cache::CacheArgs),

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Some records were fetched before the search stopped.
    PartialResult = 2,
    /// Configuration could not be loaded or is invalid.
    ConfigError = 3,
}

impl ExitCode {
    /// Exit code for a command error.
    fn for_error(err: &anyhow::Error) -> Self {
        let config_error = err.chain().any(|cause| {
            cause.downcast_ref::<StoreError>().is_some()
                || matches!(
                    cause.downcast_ref::<CatalogError>(),
                    Some(CatalogError::Config(_) | CatalogError::InvalidUrl { .. })
                )
        });
        if config_error {
            ExitCode::ConfigError
        } else {
            ExitCode::Error
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("tollgate=debug,info")
    } else {
        EnvFilter::new("tollgate=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Search(args) => search::run(args, &cli).await,
        Commands::Cache(args) => cache::run(args, &cli).await.map(|()| ExitCode::Success),
        Commands::Config(args) => config::run(args, &cli).await.map(|()| ExitCode::Success),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::for_error(&e)
        }
    };

    if code != ExitCode::Success {
        std::process::exit(code as i32);
    }

    Ok(())
}
