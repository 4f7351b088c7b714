//! Error types for OpenRelay

use thiserror::Error;

/// OpenRelay error type
///
/// Every per-record variant is local to that record: the emitter counts and
/// reports it, then moves on to the next record.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Envelope header missing or unparsable
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Request line of the body could not be parsed for a method
    #[error("unparsable request method")]
    UnparsableMethod,

    /// One output failed to accept a record
    #[error("write to output '{output}' failed: {source}")]
    OutputWrite {
        /// Output name
        output: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// One input failed while reading
    #[error("read from input '{input}' failed: {source}")]
    InputRead {
        /// Input name
        input: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for OpenRelay
pub type RelayResult<T> = Result<T, RelayError>;
