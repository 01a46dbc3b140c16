//! Error types for the fused analysis
//!
//! Most failure paths in trace analysis are soft: a missing field or an unknown
//! machine just means the event is skipped. Only the cases below are surfaced as
//! values, and only [`FusedError::MissingLayout`] stops the processing of a trace.

use thiserror::Error;

use crate::store::Quark;

/// Contract breaches reported by a [`crate::store::StateStore`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Non-monotonic write on attribute {attribute}: last change at {last}, requested {requested}")]
    NonMonotonic {
        attribute: String,
        last: u64,
        requested: u64,
    },

    #[error("Unknown attribute quark {0}")]
    UnknownAttribute(Quark),
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum FusedError {
    #[error("No event layout registered for trace of host '{host}'")]
    MissingLayout { host: String },

    #[error("Trace of host '{host}' was aborted, event ignored")]
    TraceAborted { host: String },

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FusedError {
    /// Whether this error ends the processing of the trace that produced it
    pub fn is_fatal(&self) -> bool {
        matches!(self, FusedError::MissingLayout { .. })
    }
}

pub type Result<T> = std::result::Result<T, FusedError>;
