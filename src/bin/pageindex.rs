//! pageindex administrative CLI
//!
//! Operates on the durable log-backed store in the data directory.
//!
//! # Examples
//!
//! ```bash
//! # Insert ids at the head of the timeline
//! pageindex add a b c
//!
//! # Read the second presentation page of 20 ids
//! pageindex page 2 --size 20
//!
//! # Drop ids, then repack pages
//! pageindex remove b
//! pageindex compact
//! ```

use clap::{Args, Parser, Subcommand};
use pageindex::config::Settings;
use pageindex::index::{ItemId, PagedIndex};
use pageindex::metrics;
use pageindex::{Catalog, LogStorage, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Paginated item index maintenance
#[derive(Parser, Debug)]
#[command(name = "pageindex")]
#[command(version = pageindex::VERSION)]
#[command(about = "Maintain a paginated item index in a key-value store", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PAGEINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory path, overrides the configuration
    #[arg(long, global = true, env = "PAGEINDEX_DATA")]
    data_dir: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "PAGEINDEX_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert ids at the head, in the given order
    Add {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Remove ids from every page (no repacking)
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Repack underfull pages
    Compact,

    /// Print one presentation page
    Page(PageArgs),

    /// Print every page
    Dump,

    /// Show counts, page usage and drift
    Stats {
        /// Also print Prometheus metrics
        #[arg(long)]
        metrics: bool,
    },

    /// Create an item record and index it
    Register {
        /// External payload locator
        reference: String,
    },

    /// Delete item records, unindex them and compact
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show an item record
    Show { id: String },

    /// Rewrite the store log without superseded records
    Vacuum,

    /// Print the effective configuration
    Config,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
struct PageArgs {
    /// 1-based page number
    number: usize,

    /// Ids per page, defaults to catalog.logical_page_size
    #[arg(short, long)]
    size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;
    metrics::init_metrics();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        settings.storage.data_dir = dir.clone();
    }

    match cli.command {
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Commands::Version => {
            println!("pageindex {}", pageindex::VERSION);
            Ok(())
        }
        command => run(settings, command).await,
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "pageindex.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn to_ids(raw: Vec<String>) -> Vec<ItemId> {
    raw.into_iter().map(ItemId::from).collect()
}

async fn run(settings: Settings, command: Commands) -> anyhow::Result<()> {
    let backend = Arc::new(LogStorage::open(
        &settings.storage.data_dir,
        settings.storage.sync_writes,
    )?);
    let storage = Storage::new(backend.clone());
    let index = Arc::new(PagedIndex::open(storage.clone(), &settings.index)?);
    info!(data_dir = %settings.storage.data_dir.display(), "Store opened");

    match command {
        Commands::Add { ids } => {
            for id in to_ids(ids) {
                index.add(id).await?;
            }
            println!("count: {}", index.meta().await?.count);
        }
        Commands::Remove { ids } => {
            let removed = index.remove(&to_ids(ids)).await?;
            println!("removed: {}", removed);
            println!("count: {}", index.meta().await?.count);
        }
        Commands::Compact => {
            let report = index.compact().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Page(args) => {
            let size = args.size.unwrap_or(settings.catalog.logical_page_size);
            let page = index.logical_page(args.number, size).await?;
            for id in &page.ids {
                println!("{}", id);
            }
            println!("── page {} / {}", page.number, page.total_pages);
        }
        Commands::Dump => {
            for (n, page) in index.pages().await?.iter().enumerate() {
                let ids: Vec<&str> = page.iter().map(ItemId::as_str).collect();
                println!("{:>4} [{}] {}", n, page.len(), ids.join(" "));
            }
        }
        Commands::Stats { metrics: show_metrics } => {
            let stats = index.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("store keys: {}", backend.len());
            println!("log bytes: {}", backend.log_size()?);
            if show_metrics {
                print!("{}", metrics::export_metrics());
            }
        }
        Commands::Register { reference } => {
            let catalog = Catalog::new(storage, index, settings.catalog)?;
            let id = catalog.register(&reference).await?;
            println!("{}", id);
        }
        Commands::Delete { ids } => {
            let catalog = Catalog::new(storage, index, settings.catalog)?;
            let report = catalog.delete(&to_ids(ids)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Show { id } => {
            let catalog = Catalog::new(storage, index, settings.catalog)?;
            let record = catalog.require(&ItemId::from(id)).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Vacuum => {
            let before = backend.log_size()?;
            let keys = backend.vacuum()?;
            println!("keys: {}", keys);
            println!("log bytes: {} -> {}", before, backend.log_size()?);
        }
        Commands::Config | Commands::Version => {}
    }

    Ok(())
}
