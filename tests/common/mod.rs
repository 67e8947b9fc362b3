//! Common test infrastructure
//!
//! This module provides everything end-to-end tests need to drive the full
//! harvesting pipeline against a fake archive.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{item_payload, TestHarvester};
//!
//! #[tokio::test]
//! async fn test_harvest_one_item() {
//!     let harness = TestHarvester::new();
//!     harness.archive.publish("X0001", item_payload("Block 1", &["a"]), 2);
//!
//!     let summary = harness.harvest(1, 1, false).await;
//!     assert_eq!(summary.stats.records_new, 1);
//! }
//! ```

mod archive;
mod constants;
mod harness;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use archive::{png_bytes, FakeArchive, Request};
pub use constants::*;
pub use harness::TestHarvester;

use serde_json::{json, Value};

/// Item payload shaped like the archive's item API, without any page count.
pub fn item_payload(title: &str, subjects: &[&str]) -> Value {
    json!({
        "item": {
            "title": title,
            "description": format!("{} of the quilt", title),
            "subject": subjects,
            "contributor_names": ["NAMES Project Foundation"],
            "date": "1987",
            "location": ["san francisco"]
        }
    })
}
