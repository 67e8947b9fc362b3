use super::error::ImageError;
use crate::fetcher::{HttpTransport, RateLimiter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Downloads raw image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// Image fetcher with its own short request interval, independent of the metadata limiter.
pub struct HttpImageFetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, request_delay: Duration, max_bytes: u64) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(request_delay, request_delay),
            max_bytes,
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        self.limiter.acquire().await;
        let response = self.transport.get(url, &[], Some(self.max_bytes)).await?;

        match response.status {
            404 => return Err(ImageError::NotFound(url.to_string())),
            status if !response.is_success() => return Err(ImageError::Status(status)),
            _ => {}
        }
        if let Some(content_type) = &response.content_type {
            if !content_type.starts_with("image/") {
                return Err(ImageError::ContentType(content_type.clone()));
            }
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{HttpResponse, TransportError};

    struct OneResponse(HttpResponse);

    #[async_trait]
    impl HttpTransport for OneResponse {
        async fn get(
            &self,
            _url: &str,
            _query: &[(&str, &str)],
            _max_body_bytes: Option<u64>,
        ) -> Result<HttpResponse, TransportError> {
            Ok(self.0.clone())
        }

        async fn head(&self, _url: &str) -> Result<u16, TransportError> {
            Ok(self.0.status)
        }
    }

    fn fetcher(status: u16, content_type: Option<&str>) -> HttpImageFetcher {
        HttpImageFetcher::new(
            Arc::new(OneResponse(HttpResponse {
                status,
                content_type: content_type.map(str::to_string),
                body: vec![1, 2, 3],
            })),
            Duration::ZERO,
            1024,
        )
    }

    #[tokio::test]
    async fn test_image_response() {
        let bytes = fetcher(200, Some("image/jpeg")).fetch("u").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        assert!(matches!(
            fetcher(404, None).fetch("u").await,
            Err(ImageError::NotFound(_))
        ));
        assert!(matches!(
            fetcher(500, None).fetch("u").await,
            Err(ImageError::Status(500))
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_image_content_type() {
        assert!(matches!(
            fetcher(200, Some("text/html; charset=utf-8")).fetch("u").await,
            Err(ImageError::ContentType(_))
        ));
    }
}
