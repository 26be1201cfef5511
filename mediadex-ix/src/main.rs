//! mediadex-ix - Media Indexer
//!
//! Command-line entry point: `sync` runs one catalog synchronization pass
//! over the configured media roots, `search` answers faceted queries
//! against the catalog.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mediadex_common::config::EngineConfig;
use mediadex_common::db::init::init_database;
use mediadex_ix::db::CatalogStore;
use mediadex_ix::probe::{FfmpegThumbnailer, FfprobeProber, FilenameGuesser};
use mediadex_ix::services::{SearchEngine, SearchOrder, SearchRequest, SyncOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediadex-ix", version, about = "Media catalog indexer")]
struct Cli {
    /// Configuration file (falls back to MEDIADEX_CONFIG, then the
    /// platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one synchronization pass over the media roots
    Sync {
        /// Override the configured media roots
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
    },
    /// Query the catalog
    Search {
        /// Free text; every word must match the name or a path
        text: Vec<String>,

        /// Comma-separated codec group, all required; repeat the flag for
        /// alternatives (e.g. --codecs h264,aac --codecs h265)
        #[arg(long = "codecs")]
        codec_groups: Vec<String>,

        #[arg(long)]
        min_width: Option<i64>,

        #[arg(long)]
        min_height: Option<i64>,

        #[arg(long)]
        category: Option<String>,

        /// Required tag; repeatable, all must be present
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Accepted mime type; repeatable, any may match
        #[arg(long = "mime")]
        mime: Vec<String>,

        /// Exact content hash (64 hex characters)
        #[arg(long = "hash")]
        content_hash: Option<String>,

        #[arg(long, value_enum, default_value_t = OrderArg::PathAsc)]
        order: OrderArg,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    PathAsc,
    PathDesc,
    IndexedAsc,
    IndexedDesc,
}

impl From<OrderArg> for SearchOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::PathAsc => SearchOrder::PathAsc,
            OrderArg::PathDesc => SearchOrder::PathDesc,
            OrderArg::IndexedAsc => SearchOrder::LastIndexedAsc,
            OrderArg::IndexedDesc => SearchOrder::LastIndexedDesc,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;

    info!("mediadex-ix {}", env!("CARGO_PKG_VERSION"));
    info!("Catalog: {}", config.database_path.display());

    match cli.command {
        Command::Sync { roots } => {
            if !roots.is_empty() {
                config.media_roots = roots;
            }
            if config.media_roots.is_empty() {
                anyhow::bail!("no media roots configured; set media_roots or pass --root");
            }

            let pool = init_database(&config.database_path).await?;
            let orchestrator = SyncOrchestrator::new(
                &config,
                CatalogStore::new(pool),
                Arc::new(FfprobeProber::new()),
                Arc::new(FfmpegThumbnailer::new(
                    config.thumbnail_dir.clone(),
                    FfprobeProber::new(),
                )),
                Arc::new(FilenameGuesser::new()),
            )?;

            let report = orchestrator.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Search {
            text,
            codec_groups,
            min_width,
            min_height,
            category,
            tags,
            mime,
            content_hash,
            order,
            offset,
            limit,
        } => {
            let pool = init_database(&config.database_path).await?;
            let engine = SearchEngine::new(CatalogStore::new(pool));

            let request = SearchRequest {
                text: (!text.is_empty()).then(|| text.join(" ")),
                codec_groups: codec_groups
                    .iter()
                    .map(|group| group.split(',').map(|c| c.trim().to_string()).collect())
                    .collect(),
                min_width,
                min_height,
                category,
                tags,
                mime,
                content_hash,
                order: order.into(),
                offset,
                limit,
            };

            let page = engine.search(&request).await?;
            println!("{} of {} match(es)", page.items.len(), page.total);
            for medium in &page.items {
                println!(
                    "{}  {:<14}  {}",
                    medium.content_hash,
                    medium.category,
                    medium.paths.join(", ")
                );
            }
        }
    }

    Ok(())
}
