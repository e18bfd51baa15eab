//! Transmission client error types.

use thiserror::Error;

use crate::outcome::{Operation, TransmissionAttempt};

/// Errors from transmission operations.
#[derive(Error, Debug)]
pub enum TransmissionError {
    /// Configuration error (bad endpoint URL, unusable client).
    #[error("transmission configuration error: {0}")]
    Config(String),

    /// The retry cap was reached with only indeterminate outcomes.
    ///
    /// Fatal for the calling operation but recoverable by an operator:
    /// the attempt trail is carried so nothing is silently dropped, and
    /// the document remains queryable.
    #[error("{operation} exhausted after {} indeterminate attempts", attempts.len())]
    Exhausted {
        /// The operation that ran out of attempts.
        operation: Operation,
        /// Every attempt made, in order.
        attempts: Vec<TransmissionAttempt>,
    },
}
