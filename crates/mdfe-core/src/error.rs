//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types shared across the MDF-e stack. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Field-level validation errors name the offending field and the rule
//!   it broke, so the caller can correct the input and resubmit.
//! - Canonicalization errors fail loudly — a manifest that cannot be
//!   canonicalized must never reach the signature engine.
//! - Errors that belong to one component (transmission, lifecycle) live
//!   in that component's crate; this module holds only the shared core.

use thiserror::Error;

/// Top-level error type for the MDF-e stack.
#[derive(Error, Debug)]
pub enum MdfeError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A fiscal field failed validation.
    #[error("invalid field: {0}")]
    InvalidField(#[from] InvalidFieldError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in the canonical form. Monetary
    /// amounts are integers in centavos; weights are integers in grams.
    #[error("float values are not permitted in the canonical form; use integer minor units: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// A fiscal field violated its format rule.
///
/// Returned by the validated constructors in [`crate::identity`] and by
/// the access-key codec in [`crate::access_key`]. These are caller errors:
/// the input must be corrected, they are never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidFieldError {
    /// A numeric field exceeds its fixed width.
    #[error("{field} does not fit in {width} digits: {value}")]
    Overflow {
        /// Name of the offending field.
        field: &'static str,
        /// The fixed digit width of the field.
        width: usize,
        /// The rendered value that overflowed.
        value: String,
    },

    /// A field that must be numeric contains non-digit characters.
    #[error("{field} must contain only digits, got {value:?}")]
    NotNumeric {
        /// Name of the offending field.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A field has the wrong length.
    #[error("{field} must be exactly {expected} characters, got {actual}")]
    WrongLength {
        /// Name of the offending field.
        field: &'static str,
        /// Required length.
        expected: usize,
        /// Observed length.
        actual: usize,
    },

    /// A field value is outside its permitted domain.
    #[error("{field} out of range: {reason}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the violated bound.
        reason: String,
    },

    /// The trailing check digit does not match the recomputed value.
    #[error("check digit mismatch: expected {expected}, found {found}")]
    CheckDigitMismatch {
        /// Check digit recomputed over the body.
        expected: u8,
        /// Check digit present in the input.
        found: u8,
    },
}
