//! chw-transitions - run data records through the record transitions
//!
//! Reads contact documents (JSON array) and data records (one JSON document per
//! line), applies the transitions to each record and writes the resulting
//! records as JSON lines.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chw_common::config::load_config;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chw_transitions::{
    read_record_lines, write_record_lines, FacilityResolver, MemoryStore, Transition,
    TransitionContext, TransitionRunner,
};

/// Command-line arguments for chw-transitions
#[derive(Parser, Debug)]
#[command(name = "chw-transitions")]
#[command(about = "Attach owning facility contacts to data records")]
#[command(version)]
struct Args {
    /// Transitions config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Contact documents (JSON array)
    #[arg(long)]
    contacts: PathBuf,

    /// Data records (JSON lines)
    #[arg(long)]
    records: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG overrides the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    info!("Starting chw-transitions {}", env!("CARGO_PKG_VERSION"));
    info!(
        locale = %config.locale,
        contact_types = config.contact_types.len(),
        forms = config.forms.len(),
        "Configuration ready"
    );

    let store = Arc::new(
        MemoryStore::load_json_file(&args.contacts).context("Failed to load contacts")?,
    );
    let context = Arc::new(TransitionContext::from_config(&config));
    let resolver: Arc<dyn Transition> =
        Arc::new(FacilityResolver::new(store.clone(), store, context));
    let runner = TransitionRunner::new(vec![resolver]);

    let input = File::open(&args.records)
        .with_context(|| format!("Failed to open {}", args.records.display()))?;
    let mut lines = read_record_lines(BufReader::new(input))
        .with_context(|| format!("Failed to read {}", args.records.display()))?;
    info!(records = lines.len(), "Records loaded");

    let summary = runner.run_lines(&mut lines).await;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    write_record_lines(&mut writer, &lines)?;
    writer.flush()?;

    info!(
        processed = summary.processed,
        changed = summary.changed,
        failed = summary.failed,
        rejected = summary.rejected,
        "Run complete"
    );
    Ok(())
}
