use crate::fetcher::{HttpTransport, RateLimiter};
use crate::iiif::IiifUrls;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Present,
    Absent,
    /// Neither present nor absent, e.g. a timeout or a 5xx.
    Inconclusive,
}

/// Answers whether a single page exists on the image service.
#[async_trait]
pub trait ProbeSource: Send + Sync {
    async fn probe(&self, item_id: &str, page_id: &str) -> ProbeOutcome;
}

/// Probes `info.json` on the IIIF service, with its own request interval.
pub struct IiifProbeSource {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    urls: IiifUrls,
}

impl IiifProbeSource {
    pub fn new(transport: Arc<dyn HttpTransport>, urls: IiifUrls, probe_delay: Duration) -> Self {
        Self {
            transport,
            // Probes never escalate, the ceiling is the base interval
            limiter: RateLimiter::new(probe_delay, probe_delay),
            urls,
        }
    }
}

#[async_trait]
impl ProbeSource for IiifProbeSource {
    async fn probe(&self, item_id: &str, page_id: &str) -> ProbeOutcome {
        let url = self.urls.info_url(item_id, page_id);
        self.limiter.acquire().await;
        match self.transport.head(&url).await {
            Ok(status) if (200..300).contains(&status) => ProbeOutcome::Present,
            Ok(404) => ProbeOutcome::Absent,
            Ok(status) => {
                debug!("Probe of {} returned HTTP {}", url, status);
                ProbeOutcome::Inconclusive
            }
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                ProbeOutcome::Inconclusive
            }
        }
    }
}
