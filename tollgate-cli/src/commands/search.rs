//! Search command - walk a location's results.

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tollgate_catalog::{CatalogClient, SearchFilters, SearchQuery};
use tollgate_core::{FieldProjection, RawRecordMapper, Record, RecordMapper};
use tollgate_fetch::{CancellationSignal, EmitOrder};
use tollgate_store::open_credential_store;
use tracing::{info, warn};

use crate::output::{JsonFormatter, SearchOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the search command.
#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Location: "City, ST", "Name County, ST", or a ZIP code.
    pub location: String,

    /// Minimum price.
    #[arg(long)]
    pub price_min: Option<u64>,

    /// Maximum price.
    #[arg(long)]
    pub price_max: Option<u64>,

    /// Minimum bedrooms.
    #[arg(long)]
    pub beds_min: Option<u32>,

    /// Minimum bathrooms.
    #[arg(long)]
    pub baths_min: Option<f32>,

    /// Minimum square footage.
    #[arg(long)]
    pub sqft_min: Option<u64>,

    /// Stop after this many records.
    #[arg(long, short)]
    pub limit: Option<u64>,

    /// Index of the first result; use a previous run's resume index.
    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Records per page (capped by the catalog maximum).
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Pages in flight at once (1-3).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Emit pages as they arrive instead of in index order.
    #[arg(long)]
    pub unordered: bool,

    /// Keep only these record fields (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,
}

impl SearchArgs {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            price_min: self.price_min,
            price_max: self.price_max,
            beds_min: self.beds_min,
            baths_min: self.baths_min,
            sqft_min: self.sqft_min,
        }
    }

    fn query(&self) -> SearchQuery {
        let mut query = SearchQuery::new(self.location.clone())
            .filters(self.filters())
            .offset(self.offset)
            .order(if self.unordered {
                EmitOrder::Unordered
            } else {
                EmitOrder::Ordered
            });
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(size) = self.page_size {
            query = query.page_size(size);
        }
        query
    }

    fn mapper(&self) -> Box<dyn RecordMapper<Output = Value>> {
        if self.fields.is_empty() {
            Box::new(RawRecordMapper)
        } else {
            Box::new(FieldProjection::new(self.fields.iter().cloned()))
        }
    }
}

/// Runs the search command.
pub async fn run(args: &SearchArgs, cli: &Cli) -> Result<ExitCode> {
    let mut config = cli.load_config().await?;
    if let Some(concurrency) = args.concurrency {
        config.session.concurrency = concurrency;
    }

    let store = open_credential_store(&config.cache).await;
    let client = CatalogClient::from_config(&config, store)?;

    let cancel = CancellationSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing pages in flight");
            on_interrupt.cancel();
        }
    });

    info!(location = %args.location, "Starting search");
    let mapper = args.mapper();
    let output = match client.search(&args.query(), cancel).await {
        Ok(outcome) => {
            let records = map_records(mapper.as_ref(), &outcome.records)?;
            SearchOutput::finished(&args.location, records, &outcome)
        }
        Err(err) => {
            warn!(resume_index = err.resume_index, error = %err.source, "Search stopped early");
            let records = map_records(mapper.as_ref(), &err.records)?;
            SearchOutput::failed(&args.location, records, &err, client.metrics())
        }
    };

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            if cli.quiet {
                for record in &output.records {
                    println!("{}", formatter.format_record(record));
                }
            } else {
                println!("{}", formatter.format_search(&output));
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&output)?);
        }
    }

    Ok(exit_code(&output))
}

fn map_records(mapper: &dyn RecordMapper<Output = Value>, records: &[Record]) -> Result<Vec<Value>> {
    Ok(mapper.map_all(records)?)
}

fn exit_code(output: &SearchOutput) -> ExitCode {
    match (&output.error, output.count) {
        (Some(_), 0) => ExitCode::Error,
        (Some(_), _) => ExitCode::PartialResult,
        (None, _) if output.is_partial() => ExitCode::PartialResult,
        (None, _) => ExitCode::Success,
    }
}
