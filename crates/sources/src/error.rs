use crate::client::Domain;
use thiserror::Error;
use tripwatch_location::LocationError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("location could not be resolved: {0}")]
    LocationUnresolved(String),

    #[error("{domain} fetch failed: {message}")]
    SourceFetchFailed { domain: Domain, message: String },

    #[error("cache serialization failed: {0}")]
    CacheSerializationFailed(String),
}

impl SourceError {
    pub fn fetch_failed(domain: Domain, message: impl std::fmt::Display) -> Self {
        SourceError::SourceFetchFailed {
            domain,
            message: message.to_string(),
        }
    }

    /// Map a location failure for `domain`. Only a genuinely unknown place is
    /// "unresolved"; transport trouble is a fetch failure.
    pub fn from_location(domain: Domain, err: LocationError) -> Self {
        match err {
            LocationError::Unresolved(what) => SourceError::LocationUnresolved(what),
            other => SourceError::fetch_failed(domain, other),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::CacheSerializationFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
