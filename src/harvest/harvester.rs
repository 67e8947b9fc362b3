//! Per-id pipeline: fetch, normalize, discover pages, upsert, enqueue images.
//!
//! The harvester blocks on the metadata sequence of each id and hands image work to the
//! [`ImageDownloadQueue`] without waiting for it. Every failure is confined to the id that
//! produced it. Restarting at any id is safe because `upsert` is idempotent.

use super::error::HarvestError;
use super::ids::IdRange;
use crate::config::AppConfig;
use crate::discovery::{DiscoveredPages, ManuscriptDiscovery};
use crate::fetcher::MetadataSource;
use crate::iiif::IiifUrls;
use crate::image_queue::{image_destination, CompletionHook, ImageDownloadQueue, ImageDownloadTask};
use crate::normalizer::normalize;
use crate::record_store::{RecordStore, UpsertOutcome};
use crate::stats::{Counter, RunStatistics, StatsSnapshot};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Extension requested from the tile service and used for files on disk.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Result of one pass over a set of ids.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ids_visited: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
}

/// Completion hook that flags a record once all of its images are on disk.
pub fn mark_images_hook(store: Arc<dyn RecordStore>) -> CompletionHook {
    Arc::new(move |item_id: &str| match store.mark_images_downloaded(item_id) {
        Ok(true) => debug!("All images of {} downloaded", item_id),
        Ok(false) => warn!("Images finished for unknown record {}", item_id),
        Err(e) => error!("Failed to mark images of {} as downloaded: {}", item_id, e),
    })
}

pub struct Harvester {
    source: Arc<dyn MetadataSource>,
    discovery: ManuscriptDiscovery,
    store: Arc<dyn RecordStore>,
    /// `None` runs metadata only.
    images: Option<ImageDownloadQueue>,
    urls: IiifUrls,
    images_dir: PathBuf,
    /// Snapshot directory, when snapshots are enabled.
    metadata_dir: Option<PathBuf>,
    resolutions: Vec<String>,
    report_interval: u64,
    stats: Arc<RunStatistics>,
}

impl Harvester {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        discovery: ManuscriptDiscovery,
        store: Arc<dyn RecordStore>,
        config: &AppConfig,
        stats: Arc<RunStatistics>,
    ) -> Self {
        Self {
            source,
            discovery,
            store,
            images: None,
            urls: IiifUrls::new(
                &config.discovery.tile_base_url,
                &config.discovery.service_path,
            ),
            images_dir: config.images_dir(),
            metadata_dir: config
                .harvest
                .save_metadata_snapshots
                .then(|| config.metadata_dir()),
            resolutions: config.images.resolutions.clone(),
            report_interval: config.harvest.report_interval.max(1),
            stats,
        }
    }

    pub fn with_image_queue(mut self, queue: ImageDownloadQueue) -> Self {
        self.images = Some(queue);
        self
    }

    pub fn stats(&self) -> &Arc<RunStatistics> {
        &self.stats
    }

    // =========================================================================
    // Run modes
    // =========================================================================

    /// Full pipeline over a contiguous id range.
    pub async fn harvest(
        &self,
        range: &IdRange,
        metadata_only: bool,
        shutdown: &CancellationToken,
    ) -> RunSummary {
        info!(
            "Harvesting {} ids starting at {}{}",
            range.len(),
            range.first(),
            if metadata_only { " (metadata only)" } else { "" }
        );
        self.visit_all(range.ids(), metadata_only, shutdown).await
    }

    /// Re-visits records not checked for at least `older_than`.
    pub async fn refresh_stale(
        &self,
        older_than: Duration,
        limit: Option<usize>,
        metadata_only: bool,
        shutdown: &CancellationToken,
    ) -> Result<RunSummary> {
        let ids = self
            .store
            .stale_records(older_than, limit)
            .context("Failed to list stale records")?;
        info!(
            "Refreshing {} record(s) not checked in the last {:?}",
            ids.len(),
            older_than
        );
        Ok(self.visit_all(ids, metadata_only, shutdown).await)
    }

    /// Queues images for stored records whose images are incomplete, without refetching
    /// metadata. Pages are rediscovered from the stored raw payload.
    pub async fn backfill_images(
        &self,
        limit: Option<usize>,
        shutdown: &CancellationToken,
    ) -> Result<RunSummary> {
        if self.images.is_none() {
            bail!("Image backfill needs an image queue");
        }
        let records = self
            .store
            .records_without_images(limit)
            .context("Failed to list records without images")?;
        info!("Backfilling images for {} record(s)", records.len());

        let started = Instant::now();
        let mut visited = 0;
        let mut cancelled = false;
        for record in records {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, stopping before {}", record.item_id);
                cancelled = true;
                break;
            }
            visited += 1;

            let pages = self.discovery.discover(&record.item_id, Some(&record.raw)).await;
            self.stats.add(Counter::PagesDiscovered, pages.len() as u64);
            if let Err(e) = self.store.set_page_count(&record.item_id, pages.len()) {
                warn!("Failed to store page count of {}: {}", record.item_id, e);
            }
            self.enqueue_images(&record.item_id, &pages).await;
        }

        Ok(self.summary(visited, cancelled, started))
    }

    /// Drains the image queue. In-flight downloads finish first.
    pub async fn shutdown(self) -> Result<()> {
        if let Some(queue) = self.images {
            queue.shutdown().await?;
        }
        Ok(())
    }

    // =========================================================================
    // Per-id pipeline
    // =========================================================================

    async fn visit_all<I>(
        &self,
        ids: I,
        metadata_only: bool,
        shutdown: &CancellationToken,
    ) -> RunSummary
    where
        I: IntoIterator<Item = String>,
    {
        let started = Instant::now();
        let mut visited = 0usize;
        let mut cancelled = false;

        for item_id in ids {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, stopping before {}", item_id);
                cancelled = true;
                break;
            }

            self.visit(&item_id, metadata_only).await;
            visited += 1;
            if visited as u64 % self.report_interval == 0 {
                self.stats.snapshot().log_progress(&item_id);
            }
        }

        self.summary(visited, cancelled, started)
    }

    async fn visit(&self, item_id: &str, metadata_only: bool) {
        self.stats.incr(Counter::IdsProcessed);
        match self.process(item_id, metadata_only).await {
            Ok(outcome) => debug!("{}: {}", item_id, outcome.as_str()),
            Err(e) if e.is_not_found() => {
                self.stats.incr(Counter::NotFound);
                debug!("{}: not found, skipping", item_id);
            }
            Err(e) => {
                self.stats.incr(Counter::IdsFailed);
                if let Some(counter) = e.counter() {
                    self.stats.incr(counter);
                }
                error!("Failed to harvest {}: {}", item_id, e);
            }
        }
    }

    /// Runs the pipeline for one id.
    pub async fn process(
        &self,
        item_id: &str,
        metadata_only: bool,
    ) -> Result<UpsertOutcome, HarvestError> {
        let payload = self.source.fetch_item(item_id).await?;
        self.stats.incr(Counter::MetadataFetched);

        let record = normalize(&payload);
        if !record.has_content() {
            return Err(HarvestError::Validation(format!(
                "{} has no usable metadata fields",
                item_id
            )));
        }

        let pages = if metadata_only || self.images.is_none() {
            None
        } else {
            Some(self.discovery.discover(item_id, Some(&payload)).await)
        };

        let outcome = self.store.upsert(item_id, &record)?;
        self.stats.incr(match outcome {
            UpsertOutcome::New => Counter::RecordsNew,
            UpsertOutcome::Changed => Counter::RecordsChanged,
            UpsertOutcome::Unchanged => Counter::RecordsUnchanged,
        });

        // Best effort: the upsert is already committed
        if let Some(pages) = &pages {
            self.stats.add(Counter::PagesDiscovered, pages.len() as u64);
            if let Err(e) = self.store.set_page_count(item_id, pages.len()) {
                self.stats.incr(Counter::StoreErrors);
                warn!("Failed to store page count of {}: {:#}", item_id, e);
            }
        }

        if outcome.wrote_content() {
            if let Some(dir) = &self.metadata_dir {
                if let Err(e) = write_snapshot(dir, item_id, &payload).await {
                    warn!("Failed to save metadata snapshot of {}: {:#}", item_id, e);
                }
            }
            if let Some(pages) = &pages {
                self.enqueue_images(item_id, pages).await;
            }
        }

        Ok(outcome)
    }

    /// One task per discovered page and configured resolution.
    pub fn image_tasks(&self, item_id: &str, pages: &DiscoveredPages) -> Vec<ImageDownloadTask> {
        pages
            .pages
            .iter()
            .flat_map(|page_id| {
                self.resolutions.iter().map(move |resolution| ImageDownloadTask {
                    url: self
                        .urls
                        .image_url(item_id, page_id, resolution, IMAGE_EXTENSION),
                    destination: image_destination(
                        &self.images_dir,
                        item_id,
                        page_id,
                        resolution,
                        IMAGE_EXTENSION,
                    ),
                    record_id: item_id.to_string(),
                    page_id: page_id.clone(),
                    resolution: resolution.clone(),
                })
            })
            .collect()
    }

    async fn enqueue_images(&self, item_id: &str, pages: &DiscoveredPages) {
        let Some(queue) = &self.images else {
            return;
        };
        let tasks = self.image_tasks(item_id, pages);
        if tasks.is_empty() {
            debug!("No pages to download for {}", item_id);
            return;
        }
        let count = tasks.len();
        match queue.enqueue_record(item_id, tasks).await {
            Ok(()) => debug!("Queued {} image(s) for {}", count, item_id),
            Err(e) => error!("Failed to queue images of {}: {}", item_id, e),
        }
    }

    fn summary(&self, ids_visited: usize, cancelled: bool, started: Instant) -> RunSummary {
        RunSummary {
            ids_visited,
            cancelled,
            elapsed: started.elapsed(),
            stats: self.stats.snapshot(),
        }
    }
}

async fn write_snapshot(dir: &Path, item_id: &str, payload: &Value) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(format!("{}.json", item_id));
    let body = serde_json::to_vec_pretty(payload)?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}
