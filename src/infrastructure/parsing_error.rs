//! Parsing error types for the page parser strategies
//!
//! A strategy that simply finds nothing returns `Ok(None)`. These errors are
//! reserved for "the page no longer looks like what we expect" so the two
//! cases can be counted separately.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Page structure changed: {reason}")]
    StructureChanged { reason: String },

    #[error("Parser tier '{tier}' panicked: {message}")]
    Panicked { tier: String, message: String },
}

impl ParsingError {
    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn structure_changed(reason: impl Into<String>) -> Self {
        Self::StructureChanged {
            reason: reason.into(),
        }
    }

    /// A bad selector is a programming error; the other kinds are page drift
    #[must_use]
    pub const fn is_page_drift(&self) -> bool {
        !matches!(self, Self::InvalidSelector { .. })
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
