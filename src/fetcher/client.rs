use super::rate_limiter::RateLimiter;
use super::transport::{HttpTransport, TransportError};
use crate::config::FetcherSettings;
use crate::retry_policy::{RetryPolicy, Retryable};
use crate::stats::{Counter, RunStatistics};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("still rate limited after {attempts} attempts: {url}")]
    RateLimited { url: String, attempts: u32 },

    #[error("unavailable after {attempts} attempts: {url}: {reason}")]
    Unavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("unexpected HTTP status {status}: {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid JSON from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// One failed attempt, before retry bookkeeping.
enum AttemptFailure {
    Transport(TransportError),
    ServerError(u16),
}

impl Retryable for AttemptFailure {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptFailure::Transport(TransportError::BodyTooLarge { .. }) => false,
            AttemptFailure::Transport(_) => true,
            AttemptFailure::ServerError(_) => true,
        }
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Transport(e) => write!(f, "{}", e),
            AttemptFailure::ServerError(status) => write!(f, "HTTP {}", status),
        }
    }
}

/// Source of raw item metadata, keyed by item id.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_item(&self, item_id: &str) -> Result<Value, FetchError>;
}

/// JSON fetcher that shares one global request interval across all callers.
pub struct RateLimitedFetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    base_url: String,
    rate_limit_retries: u32,
    retry_policy: RetryPolicy,
    stats: Option<Arc<RunStatistics>>,
}

impl RateLimitedFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: &FetcherSettings) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(settings.request_delay(), settings.max_delay()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            rate_limit_retries: settings.rate_limit_retries,
            retry_policy: RetryPolicy::for_fetcher(settings),
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Arc<RunStatistics>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn item_url(&self, item_id: &str) -> String {
        format!("{}/item/{}/", self.base_url, item_id)
    }

    /// Fetches `url` and decodes the body as JSON.
    ///
    /// HTTP 429 escalates the shared interval and retries up to `rate_limit_retries` times.
    /// Transport errors and 5xx responses back off exponentially per the retry policy.
    pub async fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let mut throttled_attempts: u32 = 0;
        let mut failed_attempts: u32 = 0;

        loop {
            self.limiter.acquire().await;
            debug!("GET {}", url);

            let failure = match self.transport.get(url, params, None).await {
                Ok(response) if response.is_success() => {
                    self.limiter.relax().await;
                    return serde_json::from_slice(&response.body).map_err(|e| {
                        FetchError::Decode {
                            url: url.to_string(),
                            reason: e.to_string(),
                        }
                    });
                }
                Ok(response) if response.status == 404 => {
                    return Err(FetchError::NotFound {
                        url: url.to_string(),
                    });
                }
                Ok(response) if response.status == 429 => {
                    throttled_attempts += 1;
                    if let Some(stats) = &self.stats {
                        stats.incr(Counter::RateLimitHits);
                    }
                    let delay = self.limiter.escalate().await;
                    if throttled_attempts > self.rate_limit_retries {
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            attempts: throttled_attempts,
                        });
                    }
                    warn!(
                        "Rate limited on {} (attempt {}), request interval now {:?}",
                        url, throttled_attempts, delay
                    );
                    continue;
                }
                Ok(response) if response.status >= 500 => {
                    AttemptFailure::ServerError(response.status)
                }
                Ok(response) => {
                    return Err(FetchError::UnexpectedStatus {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                Err(e) => AttemptFailure::Transport(e),
            };

            if !self.retry_policy.should_retry(&failure, failed_attempts) {
                return Err(FetchError::Unavailable {
                    url: url.to_string(),
                    attempts: failed_attempts + 1,
                    reason: failure.to_string(),
                });
            }
            let backoff = self.retry_policy.backoff(failed_attempts);
            failed_attempts += 1;
            warn!(
                "Request to {} failed ({}), retry {} in {:?}",
                url, failure, failed_attempts, backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl MetadataSource for RateLimitedFetcher {
    async fn fetch_item(&self, item_id: &str) -> Result<Value, FetchError> {
        self.fetch(&self.item_url(item_id), &[("fo", "json")]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::transport::HttpResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Replays scripted responses and records every requested URL.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            query: &[(&str, &str)],
            _max_body_bytes: Option<u64>,
        ) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push((
                url.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }

        async fn head(&self, _url: &str) -> Result<u16, TransportError> {
            Ok(200)
        }
    }

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: code,
            content_type: None,
            body: Vec::new(),
        })
    }

    fn json(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            content_type: Some("application/json".into()),
            body: body.as_bytes().to_vec(),
        })
    }

    fn fast_settings() -> FetcherSettings {
        FetcherSettings {
            base_url: "http://archive.test/".into(),
            request_delay_ms: 5,
            max_delay_ms: 40,
            rate_limit_retries: 3,
            transport_retries: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            ..FetcherSettings::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_item_builds_url_and_decodes() {
        let transport = ScriptedTransport::new(vec![json(r#"{"item": {"title": "Block 1"}}"#)]);
        let fetcher = RateLimitedFetcher::new(transport.clone(), &fast_settings());

        let value = fetcher.fetch_item("afc2019048_0001").await.unwrap();

        assert_eq!(value["item"]["title"], "Block 1");
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].0, "http://archive.test/item/afc2019048_0001/");
        assert_eq!(requests[0].1, vec![("fo".to_string(), "json".to_string())]);
    }

    #[tokio::test]
    async fn test_404_is_not_found_without_retry() {
        let transport = ScriptedTransport::new(vec![status(404), json("{}")]);
        let fetcher = RateLimitedFetcher::new(transport.clone(), &fast_settings());

        let result = fetcher.fetch_item("missing").await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_429_escalates_then_succeeds() {
        let transport = ScriptedTransport::new(vec![status(429), status(429), json("{}")]);
        let stats = Arc::new(RunStatistics::new());
        let fetcher =
            RateLimitedFetcher::new(transport.clone(), &fast_settings()).with_stats(stats.clone());

        fetcher.fetch_item("x").await.unwrap();

        assert_eq!(transport.request_count(), 3);
        assert_eq!(stats.get(Counter::RateLimitHits), 2);
        // 5ms -> 10ms -> 20ms, then one relax step on success
        assert_eq!(fetcher.limiter().current_delay().await, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_429_gives_up_after_retries() {
        let transport = ScriptedTransport::new((0..10).map(|_| status(429)).collect());
        let fetcher = RateLimitedFetcher::new(transport.clone(), &fast_settings());

        let result = fetcher.fetch_item("x").await;

        match result {
            Err(FetchError::RateLimited { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected RateLimited, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 4);
        assert_eq!(fetcher.limiter().current_delay().await, Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_transport_errors_retry_then_surface_unavailable() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connection("refused".into())),
            status(503),
            Err(TransportError::Timeout),
            json("{}"),
        ]);
        let fetcher = RateLimitedFetcher::new(transport.clone(), &fast_settings());

        let result = fetcher.fetch_item("x").await;

        match result {
            Err(FetchError::Unavailable { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn test_transport_error_recovers() {
        let transport =
            ScriptedTransport::new(vec![Err(TransportError::Timeout), json(r#"{"ok": true}"#)]);
        let fetcher = RateLimitedFetcher::new(transport.clone(), &fast_settings());

        let value = fetcher.fetch_item("x").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let transport = ScriptedTransport::new(vec![json("<html>oops</html>")]);
        let fetcher = RateLimitedFetcher::new(transport, &fast_settings());

        assert!(matches!(
            fetcher.fetch_item("x").await,
            Err(FetchError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![status(403), json("{}")]);
        let fetcher = RateLimitedFetcher::new(transport.clone(), &fast_settings());

        assert!(matches!(
            fetcher.fetch_item("x").await,
            Err(FetchError::UnexpectedStatus { status: 403, .. })
        ));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_fetches_are_spaced() {
        let transport = ScriptedTransport::new((0..4).map(|_| json("{}")).collect());
        let settings = FetcherSettings {
            request_delay_ms: 30,
            ..fast_settings()
        };
        let fetcher = RateLimitedFetcher::new(transport, &settings);

        let start = Instant::now();
        for i in 0..4 {
            fetcher.fetch_item(&format!("id{}", i)).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
