use crate::fetcher::TransportError;
use crate::retry_policy::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("unexpected content type {0}")]
    ContentType(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("empty image")]
    Empty,

    #[error("not an image (detected {0})")]
    NotAnImage(String),

    #[error("undecodable image: {0}")]
    Undecodable(String),

    #[error("image too small: {width}x{height}")]
    TooSmall { width: u32, height: u32 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl Retryable for ImageError {
    fn is_retryable(&self) -> bool {
        match self {
            ImageError::NotFound(_) => false,
            ImageError::Status(status) => *status == 429 || *status >= 500,
            ImageError::Transport(TransportError::BodyTooLarge { .. }) => false,
            _ => true,
        }
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::Storage(err.to_string())
    }
}
