//! Error types for the pub/sub core and its store adapters.

use thiserror::Error;

/// Main error type for broker and store operations.
#[derive(Debug, Error)]
pub enum FanlogError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Store read failed: {0}")]
    StoreRead(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl FanlogError {
    /// Wrap any error raised while writing a record.
    pub fn write(e: impl std::fmt::Display) -> Self {
        FanlogError::StoreWrite(e.to_string())
    }

    /// Wrap any error raised while reading records.
    pub fn read(e: impl std::fmt::Display) -> Self {
        FanlogError::StoreRead(e.to_string())
    }

    /// Reclassify a store failure as a failed write.
    pub(crate) fn into_write(self) -> Self {
        match self {
            FanlogError::StoreWrite(_) | FanlogError::InvalidRequest(_) => self,
            other => FanlogError::write(other),
        }
    }

    /// Reclassify a store failure as a failed read.
    pub(crate) fn into_read(self) -> Self {
        match self {
            FanlogError::StoreRead(_) | FanlogError::InvalidRequest(_) => self,
            other => FanlogError::read(other),
        }
    }

    /// True for failures caused by the caller rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FanlogError::InvalidRequest(_))
    }
}

impl From<serde_json::Error> for FanlogError {
    fn from(e: serde_json::Error) -> Self {
        FanlogError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for FanlogError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        FanlogError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for FanlogError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        FanlogError::Deserialization(e.to_string())
    }
}

/// Why a single push to a connection failed.
///
/// Never escalated into a [`FanlogError`]; only collected in delivery reports.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryFailure {
    #[error("connection {0} is gone")]
    Gone(String),

    #[error("connection {0} has a full send buffer")]
    Backlogged(String),

    #[error("connection {0} was closed by the client")]
    Closed(String),

    #[error("push to connection {0} panicked")]
    Panicked(String),
}

/// Result type for broker and store operations.
pub type Result<T> = std::result::Result<T, FanlogError>;
