//! Rate-limited access to the remote archive.
//!
//! All metadata requests go through one [`RateLimitedFetcher`], which serializes calls behind a
//! single global interval. The interval doubles on HTTP 429 up to a ceiling and relaxes again
//! on success. The HTTP layer itself sits behind [`HttpTransport`] so it can be replaced in tests.

mod client;
mod rate_limiter;
mod transport;

pub use client::{FetchError, MetadataSource, RateLimitedFetcher};
pub use rate_limiter::RateLimiter;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
