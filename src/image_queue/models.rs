use serde::Serialize;
use std::path::{Path, PathBuf};

/// One page image at one resolution.
///
/// A valid file at `destination` is proof of completion, so a task can be re-run at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub record_id: String,
    pub page_id: String,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Downloaded { bytes: u64 },
    /// Destination already held a valid image.
    Skipped,
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

/// Block directory name for an item id: the numeric suffix after the last `_`.
pub fn block_dir_name(item_id: &str) -> String {
    let suffix = item_id.rsplit('_').next().unwrap_or(item_id);
    format!("block_{}", suffix)
}

/// `{images_dir}/block_{suffix}/{page_id}/{page_id}_{resolution}.{ext}`
pub fn image_destination(
    images_dir: &Path,
    item_id: &str,
    page_id: &str,
    resolution: &str,
    ext: &str,
) -> PathBuf {
    let file_resolution = resolution.replace(':', "_");
    images_dir
        .join(block_dir_name(item_id))
        .join(page_id)
        .join(format!("{}_{}.{}", page_id, file_resolution, ext))
}
