//! Error taxonomy shared by the store, the alert engine and their collaborators.

use crate::types::Series;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Malformed or physically implausible reading, rejected before storage.
    #[error("invalid {series} sample: {reason}")]
    InvalidSample { series: Series, reason: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("metric source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}

impl MonitorError {
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(format!("{context}: {err}"))
    }
}
