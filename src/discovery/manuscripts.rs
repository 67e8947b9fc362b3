use super::metadata::pages_from_metadata;
use super::models::{page_id, DiscoveredPages, DiscoveryMethod};
use super::probe::{ProbeOutcome, ProbeSource};
use crate::config::DiscoverySettings;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Determines the page ids of a record, caching results for the lifetime of the instance.
pub struct ManuscriptDiscovery {
    probe: Arc<dyn ProbeSource>,
    settings: DiscoverySettings,
    cache: Mutex<HashMap<String, DiscoveredPages>>,
}

impl ManuscriptDiscovery {
    pub fn new(probe: Arc<dyn ProbeSource>, settings: DiscoverySettings) -> Self {
        Self {
            probe,
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Pages of `item_id`, from metadata if it says enough, otherwise by probing the image
    /// service, otherwise per the configured fallback policy.
    pub async fn discover(&self, item_id: &str, metadata: Option<&Value>) -> DiscoveredPages {
        if let Some(cached) = self.cached(item_id) {
            return cached;
        }

        let discovered = match metadata.and_then(|m| pages_from_metadata(m, self.settings.max_pages))
        {
            Some(pages) => DiscoveredPages {
                pages,
                method: DiscoveryMethod::Metadata,
            },
            None => {
                let pages = self.probe_pages(item_id).await;
                if pages.is_empty() {
                    DiscoveredPages {
                        pages: self.settings.fallback.pages(),
                        method: DiscoveryMethod::Fallback,
                    }
                } else {
                    DiscoveredPages {
                        pages,
                        method: DiscoveryMethod::Probe,
                    }
                }
            }
        };

        info!(
            "Discovered {} page(s) for {} via {}",
            discovered.len(),
            item_id,
            discovered.method.as_str()
        );
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(item_id.to_string(), discovered.clone());
        }
        discovered
    }

    fn cached(&self, item_id: &str) -> Option<DiscoveredPages> {
        self.cache.lock().ok()?.get(item_id).cloned()
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Probes `ms0001, ms0002, ...` in batches of `probe_concurrency`.
    ///
    /// The first absent page marks the likely end. After it, at most `extended_probe_limit`
    /// further pages are probed, so sparse numbering is still picked up. Inconclusive probes
    /// neither add a page nor mark the end.
    async fn probe_pages(&self, item_id: &str) -> BTreeSet<String> {
        let max_pages = self.settings.max_pages;
        let extended_limit = self.settings.extended_probe_limit;
        let concurrency = self.settings.probe_concurrency.max(1) as u32;

        let mut present = BTreeSet::new();
        let mut first_gap: Option<u32> = None;
        let mut probed_past_gap: u32 = 0;
        let mut next: u32 = 1;

        while next <= max_pages {
            let remaining_budget = match first_gap {
                Some(_) => extended_limit.saturating_sub(probed_past_gap),
                None => concurrency,
            };
            let batch_size = concurrency
                .min(remaining_budget)
                .min(max_pages - next + 1);
            if batch_size == 0 {
                break;
            }

            let numbers: Vec<u32> = (next..next + batch_size).collect();
            let outcomes = join_all(numbers.iter().map(|n| {
                let page = page_id(*n);
                async move { self.probe.probe(item_id, &page).await }
            }))
            .await;

            for (n, outcome) in numbers.iter().zip(outcomes) {
                if first_gap.is_some_and(|gap| *n > gap) {
                    probed_past_gap += 1;
                }
                match outcome {
                    ProbeOutcome::Present => {
                        present.insert(page_id(*n));
                    }
                    ProbeOutcome::Absent => {
                        if first_gap.is_none() {
                            debug!("First missing page for {} is {}", item_id, page_id(*n));
                            first_gap = Some(*n);
                        }
                    }
                    ProbeOutcome::Inconclusive => {}
                }
            }
            next += batch_size;
        }
        present
    }
}
