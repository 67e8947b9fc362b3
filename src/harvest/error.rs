//! Per-id failure taxonomy.
//!
//! Every variant is isolated to the id that produced it: the run loop counts it,
//! logs it and moves on to the next id.

use crate::fetcher::FetchError;
use crate::stats::Counter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// No upstream record for this id. Expected for gaps in the id space.
    #[error("no record for {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid metadata: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl HarvestError {
    /// Kind-specific counter incremented when this error ends an id.
    /// Rate limiting has none here, the fetcher counts every 429 as it happens.
    pub fn counter(&self) -> Option<Counter> {
        match self {
            HarvestError::NotFound(_) => Some(Counter::NotFound),
            HarvestError::RateLimited(_) => None,
            HarvestError::Transport(_) => Some(Counter::TransportErrors),
            HarvestError::Validation(_) => Some(Counter::ValidationErrors),
            HarvestError::Store(_) => Some(Counter::StoreErrors),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HarvestError::NotFound(_))
    }
}

impl From<FetchError> for HarvestError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { url } => HarvestError::NotFound(url),
            e @ FetchError::RateLimited { .. } => HarvestError::RateLimited(e.to_string()),
            e @ (FetchError::Unavailable { .. } | FetchError::UnexpectedStatus { .. }) => {
                HarvestError::Transport(e.to_string())
            }
            e @ FetchError::Decode { .. } => HarvestError::Validation(e.to_string()),
        }
    }
}
