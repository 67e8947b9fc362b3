mod file_config;

pub use file_config::{DiscoveryConfig, FetcherConfig, FileConfig, HarvestConfig, ImagesConfig};

use crate::discovery::FallbackPolicy;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.loc.gov";
pub const DEFAULT_TILE_BASE_URL: &str = "https://tile.loc.gov/image-services/iiif";
pub const DEFAULT_SERVICE_PATH: &str = "service:afc:afc2019048";
pub const DEFAULT_USER_AGENT: &str = "AIDS-Memorial-Quilt-Scraper/1.0 (Educational Research)";
pub const DEFAULT_ID_PREFIX: &str = "afc2019048_";
pub const DEFAULT_RESOLUTIONS: &[&str] = &["200", "400", "800", "1200", "full"];
pub const DATABASE_FILE_NAME: &str = "quilt_data.db";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub output_dir: PathBuf,
    pub database_path: Option<PathBuf>,
    pub request_delay_secs: f64,
    pub request_timeout_secs: u64,
    pub image_workers: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            database_path: None,
            request_delay_secs: 1.0,
            request_timeout_secs: 30,
            image_workers: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub database_path: PathBuf,

    pub fetcher: FetcherSettings,
    pub discovery: DiscoverySettings,
    pub images: ImageSettings,
    pub harvest: HarvestSettings,
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Minimum interval between two metadata requests.
    pub request_delay_ms: u64,
    /// Ceiling for the escalated interval after HTTP 429.
    pub max_delay_ms: u64,
    pub rate_limit_retries: u32,
    pub transport_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl FetcherSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            request_delay_ms: 1000,
            max_delay_ms: 120_000,
            rate_limit_retries: 5,
            transport_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub tile_base_url: String,
    pub service_path: String,
    /// Probes in flight per batch.
    pub probe_concurrency: usize,
    pub probe_delay_ms: u64,
    /// Probes allowed past the first missing page.
    pub extended_probe_limit: u32,
    pub max_pages: u32,
    pub fallback: FallbackPolicy,
}

impl DiscoverySettings {
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            tile_base_url: DEFAULT_TILE_BASE_URL.to_string(),
            service_path: DEFAULT_SERVICE_PATH.to_string(),
            probe_concurrency: 4,
            probe_delay_ms: 100,
            extended_probe_limit: 50,
            max_pages: 100,
            fallback: FallbackPolicy::SinglePage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub workers: usize,
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub queue_capacity: usize,
    pub resolutions: Vec<String>,
    pub min_width: u32,
    pub min_height: u32,
    pub max_bytes: u64,
}

impl ImageSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            request_delay_ms: 250,
            max_retries: 4,
            initial_backoff_ms: 1000,
            max_backoff_ms: 16_000,
            queue_capacity: 256,
            resolutions: DEFAULT_RESOLUTIONS.iter().map(|s| s.to_string()).collect(),
            min_width: 16,
            min_height: 16,
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub id_prefix: String,
    pub id_width: usize,
    /// Log progress every N processed ids.
    pub report_interval: u64,
    pub save_metadata_snapshots: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            id_width: 4,
            report_interval: 25,
            save_metadata_snapshots: true,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let output_dir = file
            .output_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.output_dir.clone());
        if output_dir.exists() && !output_dir.is_dir() {
            bail!("output_dir is not a directory: {:?}", output_dir);
        }

        let database_path = file
            .database_path
            .map(PathBuf::from)
            .or_else(|| cli.database_path.clone())
            .unwrap_or_else(|| output_dir.join(DATABASE_FILE_NAME));

        if !cli.request_delay_secs.is_finite() || cli.request_delay_secs < 0.0 {
            bail!(
                "request delay must be a non-negative number of seconds, got {}",
                cli.request_delay_secs
            );
        }

        let fetcher_defaults = FetcherSettings::default();
        let f = file.fetcher.unwrap_or_default();
        let fetcher = FetcherSettings {
            base_url: f
                .base_url
                .unwrap_or(fetcher_defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            user_agent: f.user_agent.unwrap_or(fetcher_defaults.user_agent),
            request_timeout_secs: f.request_timeout_secs.unwrap_or(cli.request_timeout_secs),
            request_delay_ms: f
                .request_delay_ms
                .unwrap_or((cli.request_delay_secs * 1000.0).round() as u64),
            max_delay_ms: f.max_delay_ms.unwrap_or(fetcher_defaults.max_delay_ms),
            rate_limit_retries: f
                .rate_limit_retries
                .unwrap_or(fetcher_defaults.rate_limit_retries),
            transport_retries: f
                .transport_retries
                .unwrap_or(fetcher_defaults.transport_retries),
            initial_backoff_ms: f
                .initial_backoff_ms
                .unwrap_or(fetcher_defaults.initial_backoff_ms),
            max_backoff_ms: f.max_backoff_ms.unwrap_or(fetcher_defaults.max_backoff_ms),
        };
        if fetcher.max_delay_ms < fetcher.request_delay_ms {
            bail!(
                "fetcher.max_delay_ms ({}) must not be lower than the request delay ({})",
                fetcher.max_delay_ms,
                fetcher.request_delay_ms
            );
        }

        let discovery_defaults = DiscoverySettings::default();
        let d = file.discovery.unwrap_or_default();
        let fallback = match d.fallback {
            Some(s) => match FallbackPolicy::parse(&s) {
                Some(policy) => policy,
                None => bail!("Unknown discovery fallback policy: {}", s),
            },
            None => discovery_defaults.fallback,
        };
        let discovery = DiscoverySettings {
            tile_base_url: d
                .tile_base_url
                .unwrap_or(discovery_defaults.tile_base_url)
                .trim_end_matches('/')
                .to_string(),
            service_path: d.service_path.unwrap_or(discovery_defaults.service_path),
            probe_concurrency: d
                .probe_concurrency
                .unwrap_or(discovery_defaults.probe_concurrency),
            probe_delay_ms: d.probe_delay_ms.unwrap_or(discovery_defaults.probe_delay_ms),
            extended_probe_limit: d
                .extended_probe_limit
                .unwrap_or(discovery_defaults.extended_probe_limit),
            max_pages: d.max_pages.unwrap_or(discovery_defaults.max_pages),
            fallback,
        };
        if discovery.probe_concurrency == 0 {
            bail!("discovery.probe_concurrency must be at least 1");
        }

        let image_defaults = ImageSettings::default();
        let i = file.images.unwrap_or_default();
        let images = ImageSettings {
            workers: i.workers.unwrap_or(cli.image_workers),
            request_delay_ms: i.request_delay_ms.unwrap_or(image_defaults.request_delay_ms),
            max_retries: i.max_retries.unwrap_or(image_defaults.max_retries),
            initial_backoff_ms: i
                .initial_backoff_ms
                .unwrap_or(image_defaults.initial_backoff_ms),
            max_backoff_ms: i.max_backoff_ms.unwrap_or(image_defaults.max_backoff_ms),
            queue_capacity: i.queue_capacity.unwrap_or(image_defaults.queue_capacity),
            resolutions: i.resolutions.unwrap_or(image_defaults.resolutions),
            min_width: i.min_width.unwrap_or(image_defaults.min_width),
            min_height: i.min_height.unwrap_or(image_defaults.min_height),
            max_bytes: i.max_bytes.unwrap_or(image_defaults.max_bytes),
        };
        if images.workers == 0 {
            bail!("images.workers must be at least 1");
        }
        if images.queue_capacity == 0 {
            bail!("images.queue_capacity must be at least 1");
        }
        if images.resolutions.is_empty() {
            bail!("images.resolutions must not be empty");
        }

        let harvest_defaults = HarvestSettings::default();
        let h = file.harvest.unwrap_or_default();
        let harvest = HarvestSettings {
            id_prefix: h.id_prefix.unwrap_or(harvest_defaults.id_prefix),
            id_width: h.id_width.unwrap_or(harvest_defaults.id_width),
            report_interval: h
                .report_interval
                .unwrap_or(harvest_defaults.report_interval)
                .max(1),
            save_metadata_snapshots: h
                .save_metadata_snapshots
                .unwrap_or(harvest_defaults.save_metadata_snapshots),
        };

        Ok(AppConfig {
            output_dir,
            database_path,
            fetcher,
            discovery,
            images,
            harvest,
        })
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.output_dir.join("metadata")
    }
}
