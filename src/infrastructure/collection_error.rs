//! Failure taxonomy for one collection run
//!
//! Every variant is recovered inside the collector and turned into a degraded
//! quote (cached or missing). Only delivery failures reach the caller, and
//! then only as a boolean outcome.

use crate::domain::FetchMode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CollectionError {
    #[error("{mode} fetch failed for {url}: {reason}")]
    FetchFailure {
        mode: FetchMode,
        url: String,
        reason: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("No extractable value found in {mode} page for {commodity}")]
    ParseFailure { commodity: String, mode: FetchMode },

    #[error("Implausible value {value} for {commodity}")]
    ValidationFailure { commodity: String, value: f64 },

    #[error("No cached value for {commodity}")]
    CacheMiss { commodity: String },

    #[error("Delivery to '{destination}' failed: {reason}")]
    DeliveryFailure { destination: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl CollectionError {
    pub fn fetch_failure(mode: FetchMode, url: &str, reason: impl ToString) -> Self {
        Self::FetchFailure {
            mode,
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn delivery_failure(destination: &str, reason: impl ToString) -> Self {
        Self::DeliveryFailure {
            destination: destination.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the next fetch strategy (or a later run) may still succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::FetchFailure { .. }
            | Self::Timeout { .. }
            | Self::ParseFailure { .. }
            | Self::ValidationFailure { .. } => true,
            Self::CacheMiss { .. } | Self::DeliveryFailure { .. } | Self::Cancelled => false,
        }
    }
}

pub type CollectionResult<T> = Result<T, CollectionError>;
