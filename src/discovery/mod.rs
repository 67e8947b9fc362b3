//! Manuscript page discovery.
//!
//! The item API does not expose a page count. Discovery first looks for one in the
//! already-fetched payload. Otherwise it probes the image service for `ms0001, ms0002, ...`
//! under bounded concurrency, and as a last resort applies the configured [`FallbackPolicy`].
//! A wrong answer only changes how many image tasks get queued.

mod manuscripts;
mod metadata;
mod models;
mod probe;

pub use manuscripts::ManuscriptDiscovery;
pub use metadata::pages_from_metadata;
pub use models::{page_id, DiscoveredPages, DiscoveryMethod, FallbackPolicy};
pub use probe::{IiifProbeSource, ProbeOutcome, ProbeSource};
