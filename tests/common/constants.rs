//! Shared constants for end-to-end tests
//!
//! When the fake archive layout changes, update only this file.

// ============================================================================
// Fake Archive Endpoints
// ============================================================================

/// Base URL of the fake item API
pub const ARCHIVE_BASE_URL: &str = "http://archive.test";

/// Base URL of the fake IIIF tile service
pub const TILE_BASE_URL: &str = "http://tiles.test/iiif";

/// Service path prefixed to every IIIF identifier
pub const SERVICE_PATH: &str = "service:afc:test";

// ============================================================================
// Item Ids
// ============================================================================

/// Prefix shared by all test item ids, e.g. `X0001`
pub const ID_PREFIX: &str = "X";

/// Zero-padded width of the numeric part
pub const ID_WIDTH: usize = 4;

/// Resolutions requested per page in tests
pub const TEST_RESOLUTIONS: &[&str] = &["200", "800"];
