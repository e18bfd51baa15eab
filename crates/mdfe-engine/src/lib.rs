//! # mdfe-engine — Document Lifecycle Engine
//!
//! Ties the stack together: assembles and freezes canonical forms
//! (`mdfe-document`), signs them (`mdfe-crypto`), transmits them
//! (`mdfe-sefaz`), and owns every state transition in between.
//!
//! - [`document`] — the lifecycle state machine: a typestate API for
//!   fresh in-memory documents and a runtime [`DocumentRecord`] for
//!   persistence.
//! - [`store`] — the compare-and-swap persistence trait plus the
//!   in-memory reference implementation.
//! - [`events`] — closure and cancellation events with per-document
//!   sequence ordering.
//! - [`service`] — [`LifecycleService`], the orchestration core with
//!   per-access-key serialization and optimistic commits.
//! - [`poller`] — the background status poller for documents the
//!   authority answered asynchronously.
//!
//! The error taxonomy lives in [`error::EngineError`]; every failure
//! leaves the affected document in a well-defined, resumable status.

pub mod document;
pub mod error;
pub mod events;
pub mod poller;
pub mod service;
pub mod store;

pub use document::{
    DocumentRecord, DocumentState, DocumentStatus, ManifestDocument, RejectionInfo,
    TransitionRecord,
};
pub use error::EngineError;
pub use events::{EventKind, LifecycleEvent, MIN_CANCEL_JUSTIFICATION};
pub use poller::{PollerAlert, PollerConfig, PollerHandle, StatusPoller};
pub use service::{ClosureRequest, EngineConfig, Issuance, LifecycleService};
pub use store::{DocumentStore, MemoryStore, StoreError, Versioned};
