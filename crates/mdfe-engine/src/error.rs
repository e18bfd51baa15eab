//! # Engine Error Taxonomy
//!
//! One error type for the whole lifecycle engine, organized by who has
//! to act:
//!
//! - caller-fix errors (bad input) — [`EngineError::InvalidField`],
//!   [`EngineError::Assembly`], [`EngineError::JustificationTooShort`];
//!   never auto-retried;
//! - operator-visible credential failures — [`EngineError::Signing`];
//! - authority-terminal outcomes are not errors at all: a rejection
//!   lands in the persisted status and is reported on the next query;
//! - infrastructure escalations after policy caps —
//!   [`EngineError::TransmissionExhausted`],
//!   [`EngineError::StatusUnresolved`];
//! - invariant violations that indicate a programming or race bug —
//!   [`EngineError::DuplicateSubmission`],
//!   [`EngineError::ConcurrentTransition`],
//!   [`EngineError::EventOrdering`]; these are never swallowed.

use mdfe_core::error::InvalidFieldError;
use mdfe_core::AccessKey;
use mdfe_crypto::CryptoError;
use mdfe_document::AssemblyError;
use thiserror::Error;

use crate::document::DocumentStatus;
use crate::store::StoreError;

/// Errors from lifecycle engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A fiscal field failed validation.
    #[error("invalid field: {0}")]
    InvalidField(#[from] InvalidFieldError),

    /// Canonical assembly failed (missing fields, key mismatch).
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Credential or signing failure.
    #[error("signing error: {0}")]
    Signing(#[from] CryptoError),

    /// Document store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The requested transition is not allowed from the current status.
    #[error("invalid transition for {access_key}: {from} -> {to}")]
    InvalidTransition {
        /// The document's access key.
        access_key: AccessKey,
        /// Current status.
        from: DocumentStatus,
        /// Attempted target status.
        to: DocumentStatus,
    },

    /// A document already settled by the authority was submitted again.
    ///
    /// The access key is the idempotency key across the whole system; a
    /// second submission would risk the authority seeing two documents.
    #[error("duplicate submission for {access_key}: document is already {status}")]
    DuplicateSubmission {
        /// The document's access key.
        access_key: AccessKey,
        /// The status that makes resubmission a duplicate.
        status: DocumentStatus,
    },

    /// The document's status changed underneath an in-flight operation.
    ///
    /// Raised by the optimistic commit when the re-read status or store
    /// version no longer match what the operation started from.
    #[error("concurrent transition detected for {access_key}")]
    ConcurrentTransition {
        /// The document's access key.
        access_key: AccessKey,
    },

    /// A lifecycle event was constructed out of sequence.
    #[error("event ordering violation for {access_key}: expected sequence {expected}, got {got}")]
    EventOrdering {
        /// The document's access key.
        access_key: AccessKey,
        /// The next sequence number the document will accept.
        expected: u32,
        /// The sequence number that was presented.
        got: u32,
    },

    /// A lifecycle event is not allowed in the document's current status.
    #[error("event not allowed for {access_key}: document is {status}")]
    EventNotAllowed {
        /// The document's access key.
        access_key: AccessKey,
        /// The status that forbids the event.
        status: DocumentStatus,
    },

    /// A cancellation justification is below the minimum length.
    #[error("justification too short: {len} characters, minimum {min}")]
    JustificationTooShort {
        /// Minimum accepted length.
        min: usize,
        /// Observed length.
        len: usize,
    },

    /// The transmission retry cap was reached with only indeterminate
    /// outcomes. The document remains in its resumable status and every
    /// attempt is recorded; an operator must look at the attempt trail.
    #[error("transmission exhausted for {access_key} after {attempts} attempts")]
    TransmissionExhausted {
        /// The document's access key.
        access_key: AccessKey,
        /// Number of attempts recorded.
        attempts: u32,
    },

    /// The poll cap was reached without the authority settling the
    /// document. Surfaced for operator attention; the document stays
    /// queryable.
    #[error("status unresolved for {access_key} after {polls} polls")]
    StatusUnresolved {
        /// The document's access key.
        access_key: AccessKey,
        /// Number of polls performed.
        polls: u32,
    },

    /// The authority rejected a lifecycle event. The document keeps its
    /// status (the event did not take effect) and the failed attempt is
    /// recorded for audit.
    #[error("event rejected for {access_key}: {code}: {reason}")]
    EventRejected {
        /// The document's access key.
        access_key: AccessKey,
        /// The authority's reason code.
        code: u16,
        /// The authority's reason text.
        reason: String,
    },

    /// Transmission-layer failure that is not an exhaustion (e.g. client
    /// configuration).
    #[error("transmission error: {0}")]
    Transmission(mdfe_sefaz::TransmissionError),

    /// A stored record is internally inconsistent (e.g. a signed
    /// document without an envelope).
    #[error("corrupt record for {access_key}: {reason}")]
    CorruptRecord {
        /// The document's access key.
        access_key: AccessKey,
        /// What is inconsistent.
        reason: String,
    },
}
