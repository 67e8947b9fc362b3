//! Process-local run counters shared by the harvest loop, the fetcher and the image workers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    IdsProcessed,
    MetadataFetched,
    RecordsNew,
    RecordsChanged,
    RecordsUnchanged,
    NotFound,
    IdsFailed,
    RateLimitHits,
    TransportErrors,
    ValidationErrors,
    StoreErrors,
    PagesDiscovered,
    ImagesQueued,
    ImagesDownloaded,
    ImagesSkipped,
    ImagesFailed,
}

const COUNTER_COUNT: usize = 16;

impl Counter {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
pub struct RunStatistics {
    counters: [AtomicU64; COUNTER_COUNT],
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, amount: u64) {
        self.counters[counter.index()].fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ids_processed: self.get(Counter::IdsProcessed),
            metadata_fetched: self.get(Counter::MetadataFetched),
            records_new: self.get(Counter::RecordsNew),
            records_changed: self.get(Counter::RecordsChanged),
            records_unchanged: self.get(Counter::RecordsUnchanged),
            not_found: self.get(Counter::NotFound),
            ids_failed: self.get(Counter::IdsFailed),
            rate_limit_hits: self.get(Counter::RateLimitHits),
            transport_errors: self.get(Counter::TransportErrors),
            validation_errors: self.get(Counter::ValidationErrors),
            store_errors: self.get(Counter::StoreErrors),
            pages_discovered: self.get(Counter::PagesDiscovered),
            images_queued: self.get(Counter::ImagesQueued),
            images_downloaded: self.get(Counter::ImagesDownloaded),
            images_skipped: self.get(Counter::ImagesSkipped),
            images_failed: self.get(Counter::ImagesFailed),
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ids_processed: u64,
    pub metadata_fetched: u64,
    pub records_new: u64,
    pub records_changed: u64,
    pub records_unchanged: u64,
    pub not_found: u64,
    pub ids_failed: u64,
    pub rate_limit_hits: u64,
    pub transport_errors: u64,
    pub validation_errors: u64,
    pub store_errors: u64,
    pub pages_discovered: u64,
    pub images_queued: u64,
    pub images_downloaded: u64,
    pub images_skipped: u64,
    pub images_failed: u64,
}

impl StatsSnapshot {
    /// Share of existing upstream records that were stored, as a percentage.
    /// `None` when no upstream record was attempted.
    pub fn success_rate(&self) -> Option<f64> {
        let attempted = self.ids_processed.saturating_sub(self.not_found);
        if attempted == 0 {
            return None;
        }
        let stored = self.records_new + self.records_changed + self.records_unchanged;
        Some(stored as f64 * 100.0 / attempted as f64)
    }

    pub fn log_progress(&self, current_id: &str) {
        info!(
            "Progress at {}: {} processed, {} new, {} changed, {} unchanged, {} not found, {} failed, {} images queued",
            current_id,
            self.ids_processed,
            self.records_new,
            self.records_changed,
            self.records_unchanged,
            self.not_found,
            self.ids_failed,
            self.images_queued
        );
    }

    pub fn log_summary(&self, elapsed: Duration) {
        info!("Run finished in {:.1}s", elapsed.as_secs_f64());
        info!("  ids processed:      {}", self.ids_processed);
        info!("  metadata fetched:   {}", self.metadata_fetched);
        info!("  records new:        {}", self.records_new);
        info!("  records changed:    {}", self.records_changed);
        info!("  records unchanged:  {}", self.records_unchanged);
        info!("  not found:          {}", self.not_found);
        info!("  ids failed:         {}", self.ids_failed);
        info!("  rate limit hits:    {}", self.rate_limit_hits);
        info!("  transport errors:   {}", self.transport_errors);
        info!("  validation errors:  {}", self.validation_errors);
        info!("  store errors:       {}", self.store_errors);
        info!("  pages discovered:   {}", self.pages_discovered);
        info!("  images queued:      {}", self.images_queued);
        info!("  images downloaded:  {}", self.images_downloaded);
        info!("  images skipped:     {}", self.images_skipped);
        info!("  images failed:      {}", self.images_failed);
        match self.success_rate() {
            Some(rate) => info!("  success rate:       {:.1}%", rate),
            None => info!("  success rate:       n/a"),
        }
    }
}
