//! HTTP transport seam used by the fetcher, the discovery prober and the image fetcher.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },
    #[error("request failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs a GET and buffers at most `max_body_bytes` of the body.
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        max_body_bytes: Option<u64>,
    ) -> Result<HttpResponse, TransportError>;

    /// Checks a resource without downloading its body.
    async fn head(&self, url: &str) -> Result<u16, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        max_body_bytes: Option<u64>,
    ) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let (Some(limit), Some(length)) = (max_body_bytes, response.content_length()) {
            if length > limit {
                return Err(TransportError::BodyTooLarge { limit });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            body.extend_from_slice(&chunk);
            if let Some(limit) = max_body_bytes {
                if body.len() as u64 > limit {
                    return Err(TransportError::BodyTooLarge { limit });
                }
            }
        }

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    async fn head(&self, url: &str) -> Result<u16, TransportError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(response.status().as_u16())
    }
}
