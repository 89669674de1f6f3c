use thiserror::Error;

/// Errors surfaced by store access, encoding, and notification delivery.
///
/// A missing store is not an error: every operation silently becomes a no-op
/// in a headless context.
#[derive(Error, Debug)]
pub enum Error {
    #[error("stored value for key {key:?} is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("quota exceeded writing key {key:?}: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("storage error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
