//! URL construction for the IIIF image-tile service.

/// Builds info and image URLs for `{tile_base}/{service_path}:{item_id}:{page_id}`.
#[derive(Debug, Clone)]
pub struct IiifUrls {
    tile_base_url: String,
    service_path: String,
}

impl IiifUrls {
    pub fn new(tile_base_url: &str, service_path: &str) -> Self {
        Self {
            tile_base_url: tile_base_url.trim_end_matches('/').to_string(),
            service_path: service_path.trim_matches('/').to_string(),
        }
    }

    fn identifier(&self, item_id: &str, page_id: &str) -> String {
        format!(
            "{}/{}:{}:{}",
            self.tile_base_url, self.service_path, item_id, page_id
        )
    }

    pub fn info_url(&self, item_id: &str, page_id: &str) -> String {
        format!("{}/info.json", self.identifier(item_id, page_id))
    }

    pub fn image_url(&self, item_id: &str, page_id: &str, resolution: &str, ext: &str) -> String {
        format!(
            "{}/full/{}/0/default.{}",
            self.identifier(item_id, page_id),
            size_for_resolution(resolution),
            ext
        )
    }
}

/// Maps a resolution tag to an IIIF size: `800` to `800,`, while `full` and `pct:N` pass through.
pub fn size_for_resolution(resolution: &str) -> String {
    if resolution.chars().all(|c| c.is_ascii_digit()) && !resolution.is_empty() {
        format!("{},", resolution)
    } else {
        resolution.to_string()
    }
}
