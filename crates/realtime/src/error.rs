use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RealtimeError {
    /// No usable location: the given one could not be resolved, or none was
    /// available from the device or configuration.
    #[error("location could not be resolved: {0}")]
    LocationUnresolved(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
