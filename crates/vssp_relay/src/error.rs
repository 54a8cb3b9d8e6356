use std::path::PathBuf;
use thiserror::Error;
use vssp_core::PolicyError;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<PolicyError> for RelayError {
    fn from(e: PolicyError) -> Self {
        RelayError::InvalidConfig(e.to_string())
    }
}

/// A viewer could not take an envelope. The viewer is dropped from the
/// registry; other viewers are unaffected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ViewerDeliveryError {
    #[error("viewer connection closed")]
    Closed,
}
