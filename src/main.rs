use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quilt_harvester::config;
use quilt_harvester::discovery::{IiifProbeSource, ManuscriptDiscovery};
use quilt_harvester::fetcher::{HttpTransport, RateLimitedFetcher, ReqwestTransport};
use quilt_harvester::harvest::{mark_images_hook, Harvester, IdRange, RunSummary};
use quilt_harvester::iiif::IiifUrls;
use quilt_harvester::image_queue::{HttpImageFetcher, ImageDownloadQueue};
use quilt_harvester::record_store::{RecordStore, SqliteRecordStore};
use quilt_harvester::stats::RunStatistics;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory for the database, images and metadata snapshots.
    #[clap(long, value_parser = parse_path, default_value = "output")]
    pub output_dir: PathBuf,

    /// Path to the SQLite database file. Defaults to `<output-dir>/quilt_data.db`.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Minimum seconds between two metadata requests.
    #[clap(long, default_value_t = 1.0)]
    pub request_delay_secs: f64,

    /// Timeout in seconds for a single HTTP request.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Number of concurrent image download workers.
    #[clap(long, default_value_t = 4)]
    pub image_workers: usize,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest a contiguous range of item numbers.
    Harvest {
        /// First item number, inclusive.
        #[clap(long, default_value_t = 1)]
        start: u32,

        /// Last item number, inclusive.
        #[clap(long)]
        end: u32,

        /// Resume an interrupted run at this item number.
        #[clap(long)]
        resume_from: Option<u32>,

        /// Store metadata without discovering pages or downloading images.
        #[clap(long)]
        metadata_only: bool,
    },

    /// Re-visit records that were not checked recently.
    RefreshStale {
        /// Records last checked more than this many hours ago are refreshed.
        #[clap(long, default_value_t = 24 * 7)]
        older_than_hours: u64,

        #[clap(long)]
        limit: Option<usize>,

        #[clap(long)]
        metadata_only: bool,
    },

    /// Download missing images for stored records without refetching metadata.
    BackfillImages {
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Print store statistics and exit.
    Stats,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            output_dir: args.output_dir.clone(),
            database_path: args.db_path.clone(),
            request_delay_secs: args.request_delay_secs,
            request_timeout_secs: args.request_timeout_secs,
            image_workers: args.image_workers,
        }
    }
}

fn print_store_stats(store: &dyn RecordStore) -> Result<()> {
    let stats = store.stats()?;
    info!("Store statistics:");
    info!("  total records:          {}", stats.total_records);
    info!("  with images:            {}", stats.with_images);
    info!("  without images:         {}", stats.without_images);
    info!("  updated in last 7 days: {}", stats.updated_last_7_days);
    info!("  new in last 30 days:    {}", stats.new_last_30_days);
    if let Some(last_updated) = stats.last_updated.and_then(chrono::DateTime::from_timestamp_millis)
    {
        info!("  last update:            {}", last_updated.to_rfc3339());
    }
    info!(
        "  database size:          {:#}",
        byte_unit::Byte::from(stats.database_size_bytes)
    );
    info!(
        "  integrity:              {}",
        if stats.healthy { "ok" } else { "FAILED" }
    );
    Ok(())
}

fn log_run(summary: &RunSummary, started: Instant) {
    if summary.cancelled {
        warn!(
            "Run interrupted after {} id(s); restart from the next id to resume",
            summary.ids_visited
        );
    }
    summary.stats.log_summary(started.elapsed());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  output_dir: {:?}", app_config.output_dir);
    info!("  database: {:?}", app_config.database_path);
    info!("  metadata delay: {:?}", app_config.fetcher.request_delay());
    info!("  image workers: {}", app_config.images.workers);

    std::fs::create_dir_all(&app_config.output_dir)
        .with_context(|| format!("Failed to create {:?}", app_config.output_dir))?;
    let store = Arc::new(SqliteRecordStore::new(&app_config.database_path)?);

    if let Command::Stats = cli_args.command {
        return print_store_stats(store.as_ref());
    }

    let stats = Arc::new(RunStatistics::new());
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
        &app_config.fetcher.user_agent,
        app_config.fetcher.request_timeout(),
    )?);
    let fetcher =
        RateLimitedFetcher::new(transport.clone(), &app_config.fetcher).with_stats(stats.clone());

    let urls = IiifUrls::new(
        &app_config.discovery.tile_base_url,
        &app_config.discovery.service_path,
    );
    let prober = IiifProbeSource::new(
        transport.clone(),
        urls,
        app_config.discovery.probe_delay(),
    );
    let discovery = ManuscriptDiscovery::new(Arc::new(prober), app_config.discovery.clone());

    let store_dyn: Arc<dyn RecordStore> = store.clone();
    let mut harvester = Harvester::new(
        Arc::new(fetcher),
        discovery,
        store_dyn.clone(),
        &app_config,
        stats.clone(),
    );

    let needs_images = match &cli_args.command {
        Command::Harvest { metadata_only, .. } | Command::RefreshStale { metadata_only, .. } => {
            !metadata_only
        }
        Command::BackfillImages { .. } => true,
        Command::Stats => false,
    };
    if needs_images {
        let image_fetcher = HttpImageFetcher::new(
            transport,
            app_config.images.request_delay(),
            app_config.images.max_bytes,
        );
        let queue = ImageDownloadQueue::start(
            Arc::new(image_fetcher),
            &app_config.images,
            stats.clone(),
            Some(mark_images_hook(store_dyn)),
        );
        harvester = harvester.with_image_queue(queue);
    }

    let shutdown_token = CancellationToken::new();
    {
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, finishing current item...");
                token.cancel();
            }
        });
    }

    let started = Instant::now();
    let summary = match cli_args.command {
        Command::Harvest {
            start,
            end,
            resume_from,
            metadata_only,
        } => {
            let mut range = IdRange::new(
                &app_config.harvest.id_prefix,
                app_config.harvest.id_width,
                start,
                end,
            )?;
            if let Some(number) = resume_from {
                range = range.resume_from(number)?;
            }
            harvester
                .harvest(&range, metadata_only, &shutdown_token)
                .await
        }
        Command::RefreshStale {
            older_than_hours,
            limit,
            metadata_only,
        } => {
            harvester
                .refresh_stale(
                    Duration::from_secs(older_than_hours * 3600),
                    limit,
                    metadata_only,
                    &shutdown_token,
                )
                .await?
        }
        Command::BackfillImages { limit } => {
            harvester.backfill_images(limit, &shutdown_token).await?
        }
        Command::Stats => return Ok(()),
    };

    info!("Waiting for queued image downloads to finish...");
    harvester.shutdown().await?;

    // Image counters moved while the queue drained.
    let summary = RunSummary {
        stats: stats.snapshot(),
        ..summary
    };
    log_run(&summary, started);
    print_store_stats(store.as_ref())?;

    info!("Harvester stopped");
    Ok(())
}
