//! Quilt Harvester Library
//!
//! Incremental harvester for the AIDS Memorial Quilt collection of the Library of Congress.
//! Exposes the pipeline stages for the binary and for integration tests.

pub mod config;
pub mod discovery;
pub mod fetcher;
pub mod harvest;
pub mod iiif;
pub mod image_queue;
pub mod normalizer;
pub mod record_store;
pub mod retry_policy;
pub mod sqlite_persistence;
pub mod stats;

// Re-export commonly used types for convenience
pub use harvest::{Harvester, IdRange, RunSummary};
pub use record_store::{RecordStore, SqliteRecordStore};
pub use stats::{RunStatistics, StatsSnapshot};
