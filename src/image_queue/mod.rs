//! Bounded worker pool that downloads page images to disk.

mod error;
mod fetcher;
mod models;
mod queue;
mod validate;

pub use error::ImageError;
pub use fetcher::{HttpImageFetcher, ImageFetcher};
pub use models::{block_dir_name, image_destination, ImageDownloadTask, TaskOutcome};
pub use queue::{CompletionHook, ImageDownloadQueue};
pub use validate::{validate_image_bytes, validate_image_file, ImageRequirements};

#[cfg(test)]
pub(crate) use validate::test_images;
