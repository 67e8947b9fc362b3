//! RecordStore trait definition.

use super::models::{RecordQuery, StoreStats, StoredRecord, UpsertOutcome};
use crate::normalizer::CanonicalRecord;
use anyhow::Result;
use std::time::Duration;

/// Typed access to persisted records. No caller issues its own SQL.
pub trait RecordStore: Send + Sync {
    // =========================================================================
    // Change Tracking
    // =========================================================================

    /// Insert or update a record, classifying the visit by content hash.
    ///
    /// Runs in a single transaction. `last_checked` always moves; content fields and
    /// `last_updated` only move when the hash differs.
    fn upsert(&self, item_id: &str, record: &CanonicalRecord) -> Result<UpsertOutcome>;

    /// Ids whose `last_checked` is older than `older_than`, oldest first.
    fn stale_records(&self, older_than: Duration, limit: Option<usize>) -> Result<Vec<String>>;

    // =========================================================================
    // Image Bookkeeping
    // =========================================================================

    /// Returns false when the id is unknown.
    fn mark_images_downloaded(&self, item_id: &str) -> Result<bool>;

    /// Records whose images have not all been downloaded yet, by id.
    fn records_without_images(&self, limit: Option<usize>) -> Result<Vec<StoredRecord>>;

    fn set_page_count(&self, item_id: &str, page_count: usize) -> Result<bool>;

    // =========================================================================
    // Read Queries
    // =========================================================================

    fn get_by_id(&self, item_id: &str) -> Result<Option<StoredRecord>>;

    fn count_all(&self) -> Result<usize>;

    fn list(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>>;

    /// Case-insensitive substring search over title, description, subjects, contributors
    /// and block number, ordered by id.
    fn search(&self, text: &str, page: usize, page_size: usize) -> Result<Vec<StoredRecord>>;

    // =========================================================================
    // Observability
    // =========================================================================

    fn stats(&self) -> Result<StoreStats>;
}
