//! Orchestrates harvesting runs over item ids.

mod error;
mod harvester;
mod ids;

pub use error::HarvestError;
pub use harvester::{mark_images_hook, Harvester, RunSummary, IMAGE_EXTENSION};
pub use ids::IdRange;
