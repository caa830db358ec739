//! Errors returned by the tracing subsystem.

use thiserror::Error;

/// Errors returned by span construction, snapshotting and store queries.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TraceError {
    /// A caller-supplied argument violated a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}
