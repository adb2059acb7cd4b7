use thiserror::Error;

/// Errors raised while resolving or describing a location.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    /// A place name or coordinate pair could not be turned into a position.
    #[error("location could not be resolved: {0}")]
    Unresolved(String),

    /// The provider exists but cannot answer right now (permission, no fix, offline).
    #[error("location provider unavailable: {0}")]
    Unavailable(String),

    /// Transport or decoding failure talking to a remote service.
    #[error("location request failed: {0}")]
    Request(String),
}

pub type Result<T> = std::result::Result<T, LocationError>;
