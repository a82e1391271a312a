//! Config command - manage configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use tollgate_store::{Config, default_cache_dir};
use tracing::info;

use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,

    /// Show configuration paths.
    Path,

    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(cli).await,
        ConfigAction::Path => show_paths(cli),
        ConfigAction::Init { force } => init_config(*force, cli).await,
    }
}

async fn show_config(cli: &Cli) -> Result<()> {
    let config = cli.load_config().await?;

    match cli.format {
        OutputFormat::Text => {
            let catalog = &config.catalog;
            let session = &config.session;
            println!("tollgate Configuration");
            println!("{}", "─".repeat(40));
            println!();
            println!("Catalog:        {}", catalog.name);
            println!("Search API:     {}", catalog.search_api_url);
            println!("Landing page:   {}", catalog.landing_url);
            println!("Page size:      {} (max {})", catalog.default_page_size, catalog.max_page_size);
            println!();
            println!(
                "Pacing:         {}-{} ms",
                session.min_delay_ms, session.max_delay_ms
            );
            println!("Concurrency:    {}", session.concurrency);
            println!("Token TTL:      {} s", session.token_ttl_secs);
            println!("Browser:        {}", if config.browser.enabled { "enabled" } else { "disabled" });
            println!("Proxies:        {}", config.proxies.endpoints.len());
            println!(
                "Token cache:    {}",
                if config.cache.redis_url.is_some() { "redis" } else { "in-process" }
            );
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&config)?);
        }
    }

    Ok(())
}

fn show_paths(cli: &Cli) -> Result<()> {
    let config_path = cli.config_path();
    let cache_dir = default_cache_dir();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config file: {}", config_path.display());
            println!("Cache dir:   {}", cache_dir.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_file": config_path.display().to_string(),
                "cache_dir": cache_dir.display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

async fn init_config(force: bool, cli: &Cli) -> Result<()> {
    let path = cli.config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save_to(&path).await?;
    info!(path = %path.display(), "Configuration written");
    println!("Wrote default configuration to {}", path.display());

    Ok(())
}
