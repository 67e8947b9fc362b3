//! Pipeline assembly for end-to-end tests
//!
//! Wires the production components the same way the binary does, over a
//! [`FakeArchive`] and a SQLite file in a temporary output directory.

use super::archive::FakeArchive;
use super::constants::*;
use quilt_harvester::config::{AppConfig, CliConfig};
use quilt_harvester::discovery::{IiifProbeSource, ManuscriptDiscovery};
use quilt_harvester::fetcher::{HttpTransport, RateLimitedFetcher};
use quilt_harvester::harvest::{mark_images_hook, Harvester, IdRange, RunSummary};
use quilt_harvester::iiif::IiifUrls;
use quilt_harvester::image_queue::{HttpImageFetcher, ImageDownloadQueue};
use quilt_harvester::record_store::{RecordStore, SqliteRecordStore};
use quilt_harvester::stats::RunStatistics;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestHarvester {
    pub archive: Arc<FakeArchive>,
    pub config: AppConfig,

    // Keeps the output directory alive until drop
    _output_dir: TempDir,
}

impl TestHarvester {
    /// Creates a harvester config with no request delays and millisecond backoffs.
    pub fn new() -> Self {
        let output_dir = TempDir::new().expect("Failed to create temp dir");
        let cli = CliConfig {
            output_dir: output_dir.path().to_path_buf(),
            request_delay_secs: 0.0,
            ..CliConfig::default()
        };
        let mut config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");

        config.fetcher.base_url = ARCHIVE_BASE_URL.to_string();
        config.fetcher.max_delay_ms = 0;
        config.fetcher.transport_retries = 2;
        config.fetcher.initial_backoff_ms = 1;
        config.fetcher.max_backoff_ms = 2;

        config.discovery.tile_base_url = TILE_BASE_URL.to_string();
        config.discovery.service_path = SERVICE_PATH.to_string();
        config.discovery.probe_delay_ms = 0;
        config.discovery.probe_concurrency = 2;
        config.discovery.extended_probe_limit = 3;

        config.images.workers = 2;
        config.images.request_delay_ms = 0;
        config.images.initial_backoff_ms = 1;
        config.images.max_backoff_ms = 2;
        config.images.resolutions = TEST_RESOLUTIONS.iter().map(|r| r.to_string()).collect();

        config.harvest.id_prefix = ID_PREFIX.to_string();
        config.harvest.id_width = ID_WIDTH;

        Self {
            archive: Arc::new(FakeArchive::new()),
            config,
            _output_dir: output_dir,
        }
    }

    pub fn open_store(&self) -> Arc<SqliteRecordStore> {
        Arc::new(
            SqliteRecordStore::new(&self.config.database_path).expect("Failed to open store"),
        )
    }

    pub fn range(&self, start: u32, end: u32) -> IdRange {
        IdRange::new(ID_PREFIX, ID_WIDTH, start, end).unwrap()
    }

    /// Assembles a fresh pipeline. Counters start at zero for every build.
    pub fn build(&self, with_images: bool) -> (Harvester, Arc<RunStatistics>) {
        let stats = Arc::new(RunStatistics::new());
        let transport: Arc<dyn HttpTransport> = self.archive.clone();
        let store: Arc<dyn RecordStore> = self.open_store();

        let fetcher =
            RateLimitedFetcher::new(transport.clone(), &self.config.fetcher).with_stats(stats.clone());
        let prober = IiifProbeSource::new(
            transport.clone(),
            IiifUrls::new(TILE_BASE_URL, SERVICE_PATH),
            self.config.discovery.probe_delay(),
        );
        let discovery = ManuscriptDiscovery::new(Arc::new(prober), self.config.discovery.clone());

        let harvester = Harvester::new(
            Arc::new(fetcher),
            discovery,
            store.clone(),
            &self.config,
            stats.clone(),
        );
        if !with_images {
            return (harvester, stats);
        }

        let queue = ImageDownloadQueue::start(
            Arc::new(HttpImageFetcher::new(
                transport,
                self.config.images.request_delay(),
                self.config.images.max_bytes,
            )),
            &self.config.images,
            stats.clone(),
            Some(mark_images_hook(store)),
        );
        (harvester.with_image_queue(queue), stats)
    }

    /// Drains the image queue and returns the summary with final counters.
    pub async fn finish(
        &self,
        harvester: Harvester,
        summary: RunSummary,
        stats: Arc<RunStatistics>,
    ) -> RunSummary {
        harvester.shutdown().await.expect("Image queue failed to drain");
        RunSummary {
            stats: stats.snapshot(),
            ..summary
        }
    }

    /// Runs a full harvest over `start..=end` and waits for every image.
    pub async fn harvest(&self, start: u32, end: u32, metadata_only: bool) -> RunSummary {
        let (harvester, stats) = self.build(!metadata_only);
        let summary = harvester
            .harvest(&self.range(start, end), metadata_only, &CancellationToken::new())
            .await;
        self.finish(harvester, summary, stats).await
    }

    pub async fn backfill(&self) -> RunSummary {
        let (harvester, stats) = self.build(true);
        let summary = harvester
            .backfill_images(None, &CancellationToken::new())
            .await
            .expect("Backfill failed");
        self.finish(harvester, summary, stats).await
    }
}
