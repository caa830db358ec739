//! Errors returned by the stats subsystem.

use thiserror::Error;

/// Errors returned by view registration, queries and aggregation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatsError {
    /// A caller-supplied argument violated a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation is not supported by this configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),
}
