//! # Document Lifecycle State Machine
//!
//! The manifest document lifecycle, twice over:
//!
//! - a **typestate API** ([`ManifestDocument<S>`]) where each state is a
//!   distinct type and transitions are methods that consume the current
//!   state — an invalid transition is a compile error, not a runtime
//!   check. Used for fresh in-memory documents during the synchronous
//!   phase of their life.
//! - a **runtime record** ([`DocumentRecord`]) for persistence, where
//!   the state is loaded from the store and transitions are validated by
//!   [`DocumentRecord::try_transition()`]. This is what the orchestration
//!   service and poller operate on.
//!
//! ## States
//!
//! ```text
//! Created ──sign()──▶ Signed ──begin_submission()──▶ Submitting
//!                                                      │      │
//!                                         authorize()──┘      └──reject()
//!                                             │                     │
//!                                             ▼                     ▼
//!                                         Authorized            Rejected
//!                                          │      │
//!                                 close()──┘      └──cancel()
//!                                    │                  │
//!                                    ▼                  ▼
//!                                  Closed           Cancelled
//! ```
//!
//! `Rejected`, `Closed`, and `Cancelled` are terminal. `Authorized` is
//! terminal for the submission branch but accepts lifecycle events.
//! `Submitting` may persist across process restarts — an in-flight
//! document is resumed by querying the authority, never by blind
//! resubmission.

use std::marker::PhantomData;

use mdfe_core::{AccessKey, CanonicalBytes, ProtocolNumber, Timestamp};
use mdfe_crypto::SignedEnvelope;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::events::LifecycleEvent;
use mdfe_sefaz::TransmissionAttempt;

// ─── Runtime status ──────────────────────────────────────────────────

/// Runtime document status for persistence and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Assembled with a frozen canonical form, not yet signed.
    Created,
    /// Signed; envelope attached.
    Signed,
    /// In flight at the authority; resumable by query.
    Submitting,
    /// Authorized with a protocol number. Accepts lifecycle events.
    Authorized,
    /// Terminally rejected by the authority.
    Rejected,
    /// Closed by a registered closure event (terminal).
    Closed,
    /// Cancelled by a registered cancellation event (terminal).
    Cancelled,
}

impl DocumentStatus {
    /// The canonical state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Signed => "SIGNED",
            Self::Submitting => "SUBMITTING",
            Self::Authorized => "AUTHORIZED",
            Self::Rejected => "REJECTED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether no transition at all leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Closed | Self::Cancelled)
    }

    /// Whether the document has been settled by the authority (either
    /// way) — the statuses that make a new submission a duplicate.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Authorized | Self::Rejected | Self::Closed | Self::Cancelled
        )
    }

    /// Whether lifecycle events (closure, cancellation) are accepted.
    pub fn accepts_events(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The single source of truth for allowed transitions.
fn transition_allowed(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Created, Signed)
            | (Signed, Submitting)
            | (Submitting, Authorized)
            | (Submitting, Rejected)
            | (Authorized, Closed)
            | (Authorized, Cancelled)
    )
}

// ─── Transition record ───────────────────────────────────────────────

/// One state change in a document's life, kept as an immutable audit
/// trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Status before the transition.
    pub from_status: DocumentStatus,
    /// Status after the transition.
    pub to_status: DocumentStatus,
    /// When the transition occurred (UTC).
    pub timestamp: Timestamp,
    /// Human-readable reason.
    pub reason: Option<String>,
}

// ─── Rejection info ──────────────────────────────────────────────────

/// The authority's terminal rejection, surfaced on later queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionInfo {
    /// Authority reason code.
    pub code: u16,
    /// Authority reason text.
    pub reason: String,
}

// ─── Typestate API ───────────────────────────────────────────────────

/// Document state: assembled, unsigned.
#[derive(Debug, Clone, Copy)]
pub struct Created;

/// Document state: signed, not yet transmitted.
#[derive(Debug, Clone, Copy)]
pub struct Signed;

/// Document state: in flight at the authority.
#[derive(Debug, Clone, Copy)]
pub struct Submitting;

/// Document state: authorized (accepts events).
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

/// Document state: terminally rejected.
#[derive(Debug, Clone, Copy)]
pub struct Rejected;

/// Document state: closed (terminal).
#[derive(Debug, Clone, Copy)]
pub struct Closed;

/// Document state: cancelled (terminal).
#[derive(Debug, Clone, Copy)]
pub struct Cancelled;

mod private {
    pub trait Sealed {}
    impl Sealed for super::Created {}
    impl Sealed for super::Signed {}
    impl Sealed for super::Submitting {}
    impl Sealed for super::Authorized {}
    impl Sealed for super::Rejected {}
    impl Sealed for super::Closed {}
    impl Sealed for super::Cancelled {}
}

/// Marker trait for the document lifecycle states.
///
/// Sealed — only the seven states in this module implement it.
pub trait DocumentState: private::Sealed + std::fmt::Debug {
    /// The runtime status this state corresponds to.
    fn status() -> DocumentStatus;
}

impl DocumentState for Created {
    fn status() -> DocumentStatus {
        DocumentStatus::Created
    }
}
impl DocumentState for Signed {
    fn status() -> DocumentStatus {
        DocumentStatus::Signed
    }
}
impl DocumentState for Submitting {
    fn status() -> DocumentStatus {
        DocumentStatus::Submitting
    }
}
impl DocumentState for Authorized {
    fn status() -> DocumentStatus {
        DocumentStatus::Authorized
    }
}
impl DocumentState for Rejected {
    fn status() -> DocumentStatus {
        DocumentStatus::Rejected
    }
}
impl DocumentState for Closed {
    fn status() -> DocumentStatus {
        DocumentStatus::Closed
    }
}
impl DocumentState for Cancelled {
    fn status() -> DocumentStatus {
        DocumentStatus::Cancelled
    }
}

/// A manifest document parameterized by its lifecycle state.
///
/// Only state-appropriate methods exist: `ManifestDocument<Created>` has
/// `.sign()` but no `.authorize()`; calling the latter is a compile
/// error. The access key and canonical form are frozen at construction
/// and never change across transitions.
#[derive(Debug)]
pub struct ManifestDocument<S: DocumentState> {
    /// The document's immutable access key.
    pub access_key: AccessKey,
    /// Layout version of the canonical form.
    pub layout_version: String,
    /// When the document was created in this system.
    pub created_at: Timestamp,
    /// Emission instant recorded in the document header.
    pub emitted_at: Timestamp,
    canonical_form: CanonicalBytes,
    envelope: Option<SignedEnvelope>,
    protocol: Option<ProtocolNumber>,
    rejection: Option<RejectionInfo>,
    transition_log: Vec<TransitionRecord>,
    _state: PhantomData<S>,
}

impl<S: DocumentState> ManifestDocument<S> {
    /// The runtime status of this document.
    pub fn status(&self) -> DocumentStatus {
        S::status()
    }

    /// The frozen canonical form.
    pub fn canonical_form(&self) -> &CanonicalBytes {
        &self.canonical_form
    }

    /// The signed envelope, present from `Signed` on.
    pub fn envelope(&self) -> Option<&SignedEnvelope> {
        self.envelope.as_ref()
    }

    /// The authorization protocol, present once `Authorized`.
    pub fn protocol(&self) -> Option<&ProtocolNumber> {
        self.protocol.as_ref()
    }

    /// The immutable transition log.
    pub fn transition_log(&self) -> &[TransitionRecord] {
        &self.transition_log
    }

    fn transition_to<T: DocumentState>(mut self, reason: Option<String>) -> ManifestDocument<T> {
        self.transition_log.push(TransitionRecord {
            from_status: S::status(),
            to_status: T::status(),
            timestamp: Timestamp::now(),
            reason,
        });
        ManifestDocument {
            access_key: self.access_key,
            layout_version: self.layout_version,
            created_at: self.created_at,
            emitted_at: self.emitted_at,
            canonical_form: self.canonical_form,
            envelope: self.envelope,
            protocol: self.protocol,
            rejection: self.rejection,
            transition_log: self.transition_log,
            _state: PhantomData,
        }
    }
}

impl ManifestDocument<Created> {
    /// Create a new document around a frozen canonical form.
    ///
    /// Creation itself is not a transition; the log starts empty.
    pub fn new(
        access_key: AccessKey,
        canonical_form: CanonicalBytes,
        emitted_at: Timestamp,
    ) -> Self {
        Self {
            access_key,
            layout_version: mdfe_document::LAYOUT_VERSION.to_string(),
            created_at: Timestamp::now(),
            emitted_at,
            canonical_form,
            envelope: None,
            protocol: None,
            rejection: None,
            transition_log: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Attach a signed envelope (CREATED → SIGNED).
    ///
    /// The envelope must wrap this document's canonical form; a mismatch
    /// means the caller signed the wrong bytes and is rejected before
    /// any state changes.
    pub fn sign(self, envelope: SignedEnvelope) -> Result<ManifestDocument<Signed>, EngineError> {
        if envelope.canonical_form() != &self.canonical_form {
            return Err(EngineError::CorruptRecord {
                access_key: self.access_key.clone(),
                reason: "envelope does not wrap this document's canonical form".to_string(),
            });
        }
        let mut doc = self.transition_to::<Signed>(Some("document signed".to_string()));
        doc.envelope = Some(envelope);
        Ok(doc)
    }
}

impl ManifestDocument<Signed> {
    /// Mark the document in flight (SIGNED → SUBMITTING).
    pub fn begin_submission(self) -> ManifestDocument<Submitting> {
        self.transition_to(Some("submission started".to_string()))
    }
}

impl ManifestDocument<Submitting> {
    /// Record the authority's authorization (SUBMITTING → AUTHORIZED).
    pub fn authorize(
        self,
        protocol: ProtocolNumber,
        authorized_at: Timestamp,
    ) -> ManifestDocument<Authorized> {
        let mut doc = self.transition_to::<Authorized>(Some(format!(
            "authorized at {authorized_at} with protocol {protocol}"
        )));
        doc.protocol = Some(protocol);
        doc
    }

    /// Record the authority's terminal rejection (SUBMITTING → REJECTED).
    pub fn reject(self, rejection: RejectionInfo) -> ManifestDocument<Rejected> {
        let mut doc = self.transition_to::<Rejected>(Some(format!(
            "rejected {}: {}",
            rejection.code, rejection.reason
        )));
        doc.rejection = Some(rejection);
        doc
    }
}

impl ManifestDocument<Authorized> {
    /// Record a registered closure event (AUTHORIZED → CLOSED).
    pub fn close(self, event_protocol: &ProtocolNumber) -> ManifestDocument<Closed> {
        self.transition_to(Some(format!("closed under protocol {event_protocol}")))
    }

    /// Record a registered cancellation event (AUTHORIZED → CANCELLED).
    pub fn cancel(self, event_protocol: &ProtocolNumber) -> ManifestDocument<Cancelled> {
        self.transition_to(Some(format!("cancelled under protocol {event_protocol}")))
    }
}

// ─── Runtime record for persistence ──────────────────────────────────

/// The persisted document: status, frozen form, envelope, and the
/// ordered attempt/event history. One record per access key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// The document's immutable access key.
    pub access_key: AccessKey,
    /// Layout version of the canonical form.
    pub layout_version: String,
    /// Current lifecycle status.
    pub status: DocumentStatus,
    /// When the document was created in this system.
    pub created_at: Timestamp,
    /// Emission instant recorded in the document header.
    pub emitted_at: Timestamp,
    /// The frozen canonical form as its JSON text.
    canonical_form: String,
    /// Signed envelope, present from `Signed` on.
    pub envelope: Option<SignedEnvelope>,
    /// Authorization protocol, present once `Authorized`.
    pub protocol: Option<ProtocolNumber>,
    /// Terminal rejection, present once `Rejected`.
    pub rejection: Option<RejectionInfo>,
    /// Ordered transmission attempt history.
    pub attempts: Vec<TransmissionAttempt>,
    /// Ordered lifecycle event history.
    pub events: Vec<LifecycleEvent>,
    /// Immutable transition log.
    pub transition_log: Vec<TransitionRecord>,
}

impl DocumentRecord {
    /// Rehydrate the frozen canonical form.
    pub fn canonical_form(&self) -> Result<CanonicalBytes, EngineError> {
        CanonicalBytes::from_frozen(self.canonical_form.clone().into_bytes()).map_err(|e| {
            EngineError::CorruptRecord {
                access_key: self.access_key.clone(),
                reason: format!("canonical form: {e}"),
            }
        })
    }

    /// Attempt a runtime-validated transition.
    ///
    /// Rejects anything outside the lifecycle diagram and records the
    /// transition on success. The record is unchanged on error.
    pub fn try_transition(
        &mut self,
        to: DocumentStatus,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        if !transition_allowed(self.status, to) {
            return Err(EngineError::InvalidTransition {
                access_key: self.access_key.clone(),
                from: self.status,
                to,
            });
        }
        self.transition_log.push(TransitionRecord {
            from_status: self.status,
            to_status: to,
            timestamp: Timestamp::now(),
            reason,
        });
        self.status = to;
        Ok(())
    }

    /// The next event sequence number this document will accept.
    ///
    /// Every constructed event consumes a sequence number, including
    /// rejected ones — the audit trail keeps them all.
    pub fn next_event_sequence(&self) -> u32 {
        self.events.len() as u32 + 1
    }

    /// Verify an event's sequence number is the next in order.
    pub fn verify_event_sequence(&self, sequence: u32) -> Result<(), EngineError> {
        let expected = self.next_event_sequence();
        if sequence != expected {
            return Err(EngineError::EventOrdering {
                access_key: self.access_key.clone(),
                expected,
                got: sequence,
            });
        }
        Ok(())
    }
}

/// Convert a typed document into a record for persistence.
macro_rules! impl_into_record {
    ($state:ty) => {
        impl From<ManifestDocument<$state>> for DocumentRecord {
            fn from(doc: ManifestDocument<$state>) -> Self {
                DocumentRecord {
                    access_key: doc.access_key,
                    layout_version: doc.layout_version,
                    status: <$state as DocumentState>::status(),
                    created_at: doc.created_at,
                    emitted_at: doc.emitted_at,
                    canonical_form: String::from_utf8(doc.canonical_form.as_bytes().to_vec())
                        .unwrap_or_default(),
                    envelope: doc.envelope,
                    protocol: doc.protocol,
                    rejection: doc.rejection,
                    attempts: Vec::new(),
                    events: Vec::new(),
                    transition_log: doc.transition_log,
                }
            }
        }
    };
}

impl_into_record!(Created);
impl_into_record!(Signed);
impl_into_record!(Submitting);
impl_into_record!(Authorized);
impl_into_record!(Rejected);
impl_into_record!(Closed);
impl_into_record!(Cancelled);

#[cfg(test)]
mod tests {
    use super::*;
    use mdfe_core::{AccessKeyFields, Cnpj, EmissionType, Uf};
    use mdfe_crypto::SigningCredential;

    fn emitted_at() -> Timestamp {
        Timestamp::parse("2026-08-04T10:00:00Z").unwrap()
    }

    fn access_key() -> AccessKey {
        AccessKey::build(&AccessKeyFields {
            uf: Uf::SP,
            emitted_at: emitted_at(),
            issuer: Cnpj::new("12345678000190").unwrap(),
            series: 1,
            number: 42,
            emission_type: EmissionType::Normal,
            entropy_code: 12_345_678,
        })
        .unwrap()
    }

    fn canonical_form() -> CanonicalBytes {
        CanonicalBytes::new(&serde_json::json!({"chMDFe": access_key().as_str()})).unwrap()
    }

    fn credential() -> SigningCredential {
        SigningCredential::generate(
            Cnpj::new("12345678000190").unwrap(),
            Timestamp::parse("2099-12-31T23:59:59Z").unwrap(),
        )
    }

    fn signed_envelope() -> SignedEnvelope {
        SignedEnvelope::sign(canonical_form(), &credential()).unwrap()
    }

    fn protocol() -> ProtocolNumber {
        ProtocolNumber::new("135200000000001").unwrap()
    }

    // ── Typestate happy paths ────────────────────────────────────────

    #[test]
    fn created_document_starts_clean() {
        let doc = ManifestDocument::<Created>::new(access_key(), canonical_form(), emitted_at());
        assert_eq!(doc.status(), DocumentStatus::Created);
        assert!(doc.envelope().is_none());
        assert!(doc.transition_log().is_empty());
    }

    #[test]
    fn full_authorization_path() {
        let doc = ManifestDocument::<Created>::new(access_key(), canonical_form(), emitted_at());
        let doc = doc.sign(signed_envelope()).unwrap();
        assert_eq!(doc.status(), DocumentStatus::Signed);
        assert!(doc.envelope().is_some());

        let doc = doc.begin_submission();
        assert_eq!(doc.status(), DocumentStatus::Submitting);

        let doc = doc.authorize(protocol(), emitted_at());
        assert_eq!(doc.status(), DocumentStatus::Authorized);
        assert_eq!(doc.protocol().unwrap().as_str(), "135200000000001");
        assert_eq!(doc.transition_log().len(), 3);
    }

    #[test]
    fn rejection_path() {
        let doc = ManifestDocument::<Created>::new(access_key(), canonical_form(), emitted_at())
            .sign(signed_envelope())
            .unwrap()
            .begin_submission()
            .reject(RejectionInfo {
                code: 204,
                reason: "Duplicidade de MDF-e".to_string(),
            });
        assert_eq!(doc.status(), DocumentStatus::Rejected);
        assert!(doc.status().is_terminal());
    }

    #[test]
    fn cancellation_path() {
        let doc = ManifestDocument::<Created>::new(access_key(), canonical_form(), emitted_at())
            .sign(signed_envelope())
            .unwrap()
            .begin_submission()
            .authorize(protocol(), emitted_at())
            .cancel(&ProtocolNumber::new("135200000000002").unwrap());
        assert_eq!(doc.status(), DocumentStatus::Cancelled);
        assert_eq!(doc.transition_log().len(), 4);
    }

    #[test]
    fn sign_rejects_foreign_envelope() {
        let doc = ManifestDocument::<Created>::new(access_key(), canonical_form(), emitted_at());
        let foreign_form = CanonicalBytes::new(&serde_json::json!({"other": true})).unwrap();
        let foreign = SignedEnvelope::sign(foreign_form, &credential()).unwrap();
        assert!(matches!(
            doc.sign(foreign),
            Err(EngineError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn access_key_preserved_across_transitions() {
        let key = access_key();
        let doc = ManifestDocument::<Created>::new(key.clone(), canonical_form(), emitted_at())
            .sign(signed_envelope())
            .unwrap()
            .begin_submission();
        assert_eq!(doc.access_key, key);
    }

    // ── Status predicates ────────────────────────────────────────────

    #[test]
    fn terminal_statuses() {
        assert!(DocumentStatus::Rejected.is_terminal());
        assert!(DocumentStatus::Closed.is_terminal());
        assert!(DocumentStatus::Cancelled.is_terminal());
        assert!(!DocumentStatus::Authorized.is_terminal());
        assert!(!DocumentStatus::Submitting.is_terminal());
    }

    #[test]
    fn settled_statuses_refuse_resubmission() {
        assert!(DocumentStatus::Authorized.is_settled());
        assert!(DocumentStatus::Rejected.is_settled());
        assert!(DocumentStatus::Closed.is_settled());
        assert!(DocumentStatus::Cancelled.is_settled());
        assert!(!DocumentStatus::Submitting.is_settled());
    }

    #[test]
    fn only_authorized_accepts_events() {
        for status in [
            DocumentStatus::Created,
            DocumentStatus::Signed,
            DocumentStatus::Submitting,
            DocumentStatus::Rejected,
            DocumentStatus::Closed,
            DocumentStatus::Cancelled,
        ] {
            assert!(!status.accepts_events(), "{status} must not accept events");
        }
        assert!(DocumentStatus::Authorized.accepts_events());
    }

    #[test]
    fn status_serde_is_screaming_snake() {
        let json = serde_json::to_string(&DocumentStatus::Submitting).unwrap();
        assert_eq!(json, "\"SUBMITTING\"");
    }

    // ── DocumentRecord runtime transitions ───────────────────────────

    fn record() -> DocumentRecord {
        ManifestDocument::<Created>::new(access_key(), canonical_form(), emitted_at()).into()
    }

    #[test]
    fn record_valid_transition_chain() {
        let mut rec = record();
        rec.try_transition(DocumentStatus::Signed, None).unwrap();
        rec.try_transition(DocumentStatus::Submitting, None).unwrap();
        rec.try_transition(DocumentStatus::Authorized, None).unwrap();
        rec.try_transition(DocumentStatus::Closed, None).unwrap();
        assert_eq!(rec.status, DocumentStatus::Closed);
        assert_eq!(rec.transition_log.len(), 4);
    }

    #[test]
    fn record_rejects_skipping_states() {
        let mut rec = record();
        let err = rec
            .try_transition(DocumentStatus::Authorized, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        // Unchanged on error.
        assert_eq!(rec.status, DocumentStatus::Created);
        assert!(rec.transition_log.is_empty());
    }

    #[test]
    fn record_rejects_leaving_terminal_state() {
        let mut rec = record();
        rec.try_transition(DocumentStatus::Signed, None).unwrap();
        rec.try_transition(DocumentStatus::Submitting, None).unwrap();
        rec.try_transition(DocumentStatus::Rejected, None).unwrap();
        assert!(rec
            .try_transition(DocumentStatus::Submitting, None)
            .is_err());
        assert!(rec.try_transition(DocumentStatus::Authorized, None).is_err());
    }

    #[test]
    fn record_preserves_canonical_form() {
        let rec = record();
        let form = rec.canonical_form().unwrap();
        assert_eq!(form, canonical_form());
    }

    #[test]
    fn record_serde_roundtrip() {
        let rec = record();
        let json = serde_json::to_string(&rec).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.access_key, rec.access_key);
        assert_eq!(back.status, DocumentStatus::Created);
        assert_eq!(back.canonical_form().unwrap(), canonical_form());
    }

    #[test]
    fn event_sequence_starts_at_one() {
        let rec = record();
        assert_eq!(rec.next_event_sequence(), 1);
        rec.verify_event_sequence(1).unwrap();
        let err = rec.verify_event_sequence(2).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EventOrdering {
                expected: 1,
                got: 2,
                ..
            }
        ));
    }
}
