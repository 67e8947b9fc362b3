use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub output_dir: Option<String>,
    pub database_path: Option<String>,

    // Per-component sections
    pub fetcher: Option<FetcherConfig>,
    pub discovery: Option<DiscoveryConfig>,
    pub images: Option<ImagesConfig>,
    pub harvest: Option<HarvestConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetcherConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub request_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub rate_limit_retries: Option<u32>,
    pub transport_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub tile_base_url: Option<String>,
    pub service_path: Option<String>,
    pub probe_concurrency: Option<usize>,
    pub probe_delay_ms: Option<u64>,
    pub extended_probe_limit: Option<u32>,
    pub max_pages: Option<u32>,
    /// "single_page" or "none"
    pub fallback: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    pub workers: Option<usize>,
    pub request_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub resolutions: Option<Vec<String>>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HarvestConfig {
    pub id_prefix: Option<String>,
    pub id_width: Option<usize>,
    pub report_interval: Option<u64>,
    pub save_metadata_snapshots: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_sections() {
        let config: FileConfig = toml::from_str(
            r#"
            output_dir = "/data/quilt"

            [fetcher]
            request_delay_ms = 30000
            rate_limit_retries = 2

            [discovery]
            fallback = "none"
            probe_concurrency = 3

            [images]
            resolutions = ["400", "full"]
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir.as_deref(), Some("/data/quilt"));
        assert!(config.database_path.is_none());
        let fetcher = config.fetcher.unwrap();
        assert_eq!(fetcher.request_delay_ms, Some(30000));
        assert_eq!(fetcher.rate_limit_retries, Some(2));
        assert!(fetcher.base_url.is_none());
        let discovery = config.discovery.unwrap();
        assert_eq!(discovery.fallback.as_deref(), Some("none"));
        assert_eq!(discovery.probe_concurrency, Some(3));
        assert_eq!(
            config.images.unwrap().resolutions,
            Some(vec!["400".to_string(), "full".to_string()])
        );
        assert!(config.harvest.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/records.db\"").unwrap();
        writeln!(file, "[harvest]").unwrap();
        writeln!(file, "report_interval = 10").unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.database_path.as_deref(), Some("/tmp/records.db"));
        assert_eq!(config.harvest.unwrap().report_interval, Some(10));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir = [").unwrap();
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
