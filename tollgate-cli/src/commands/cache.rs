//! Cache command - inspect or drop the cached token.

use anyhow::Result;
use clap::{Args, Subcommand};
use tollgate_store::open_credential_store;
use tracing::info;

use crate::output::{CacheOutput, JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the cache command.
#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheAction {
    /// Show the cached token's status (cookie values are hidden).
    Show,

    /// Drop the cached token so the next search acquires a new one.
    Clear,
}

/// Runs the cache command.
pub async fn run(args: &CacheArgs, cli: &Cli) -> Result<()> {
    let config = cli.load_config().await?;
    let store = open_credential_store(&config.cache).await;
    let key = config.credential_key();

    match args.action {
        CacheAction::Show => {
            let bundle = store.get(&key).await?;
            let output = CacheOutput::new(&key, store.backend_name(), bundle.as_ref());
            match cli.format {
                OutputFormat::Text => {
                    println!("{}", TextFormatter::new(!cli.no_color).format_cache(&output));
                }
                OutputFormat::Json => {
                    println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
                }
            }
        }
        CacheAction::Clear => {
            store.invalidate(&key).await?;
            info!(key = %key, backend = store.backend_name(), "Cached token cleared");
            if !cli.quiet {
                println!("Cleared cached token for {key}");
            }
        }
    }

    Ok(())
}
