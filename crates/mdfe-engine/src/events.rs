//! # Lifecycle Events
//!
//! Post-authorization amendments: closure (the transport ended) and
//! cancellation (the document should never have existed). Each event is
//! tied to its document by access key, ordered by a per-document
//! sequence number starting at 1, signed in its own envelope, and
//! transmitted through the same outcome classification as the document
//! itself.
//!
//! A cancellation requires a justification of at least
//! [`MIN_CANCEL_JUSTIFICATION`] characters and references the
//! authorization protocol it revokes.

use mdfe_core::{AccessKey, CanonicalBytes, MunicipalityCode, ProtocolNumber, Timestamp, Uf};
use mdfe_crypto::SignedEnvelope;
use mdfe_sefaz::TransmissionAttempt;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Minimum accepted cancellation justification length, in characters.
pub const MIN_CANCEL_JUSTIFICATION: usize = 15;

/// Event type code for cancellation.
pub const EVENT_TYPE_CANCELLATION: &str = "110111";

/// Event type code for closure.
pub const EVENT_TYPE_CLOSURE: &str = "110112";

/// What kind of amendment an event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The transport ended at the given place and time.
    Closure {
        /// State where the transport ended.
        uf: Uf,
        /// Municipality where the transport ended.
        municipality: MunicipalityCode,
        /// When the transport ended.
        closed_at: Timestamp,
    },
    /// The document is revoked.
    Cancellation {
        /// The authorization protocol being revoked.
        authorization_protocol: ProtocolNumber,
    },
}

impl EventKind {
    /// The fiscal event type code.
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::Closure { .. } => EVENT_TYPE_CLOSURE,
            Self::Cancellation { .. } => EVENT_TYPE_CANCELLATION,
        }
    }

    /// Short name for logs and transition reasons.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closure { .. } => "closure",
            Self::Cancellation { .. } => "cancellation",
        }
    }
}

/// A lifecycle event with its own envelope and attempt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// The document this event amends.
    pub access_key: AccessKey,
    /// Per-document sequence number, starting at 1.
    pub sequence: u32,
    /// What the event does.
    pub kind: EventKind,
    /// Justification text (required for cancellation).
    pub justification: Option<String>,
    /// Signed envelope over the event payload, set before transmission.
    pub envelope: Option<SignedEnvelope>,
    /// Transmission attempts for this event, in order.
    pub attempts: Vec<TransmissionAttempt>,
    /// Protocol under which the authority registered the event.
    pub registered_protocol: Option<ProtocolNumber>,
    /// When the event was constructed.
    pub created_at: Timestamp,
}

impl LifecycleEvent {
    /// Construct a closure event.
    pub fn closure(
        access_key: AccessKey,
        sequence: u32,
        uf: Uf,
        municipality: MunicipalityCode,
        closed_at: Timestamp,
    ) -> Result<Self, EngineError> {
        Self::new(
            access_key,
            sequence,
            EventKind::Closure {
                uf,
                municipality,
                closed_at,
            },
            None,
        )
    }

    /// Construct a cancellation event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::JustificationTooShort`] when the
    /// justification has fewer than [`MIN_CANCEL_JUSTIFICATION`]
    /// characters.
    pub fn cancellation(
        access_key: AccessKey,
        sequence: u32,
        authorization_protocol: ProtocolNumber,
        justification: &str,
    ) -> Result<Self, EngineError> {
        let justification = justification.trim();
        let len = justification.chars().count();
        if len < MIN_CANCEL_JUSTIFICATION {
            return Err(EngineError::JustificationTooShort {
                min: MIN_CANCEL_JUSTIFICATION,
                len,
            });
        }
        Self::new(
            access_key,
            sequence,
            EventKind::Cancellation {
                authorization_protocol,
            },
            Some(justification.to_string()),
        )
    }

    fn new(
        access_key: AccessKey,
        sequence: u32,
        kind: EventKind,
        justification: Option<String>,
    ) -> Result<Self, EngineError> {
        if sequence == 0 {
            return Err(EngineError::EventOrdering {
                access_key,
                expected: 1,
                got: 0,
            });
        }
        Ok(Self {
            access_key,
            sequence,
            kind,
            justification,
            envelope: None,
            attempts: Vec::new(),
            registered_protocol: None,
            created_at: Timestamp::now(),
        })
    }

    /// Whether the authority has registered this event.
    pub fn is_registered(&self) -> bool {
        self.registered_protocol.is_some()
    }

    /// The canonical payload this event is signed over.
    ///
    /// Deterministic: rendered from stored fields only, so re-rendering
    /// an unchanged event reproduces the same bytes.
    pub fn canonical_payload(&self) -> Result<CanonicalBytes, EngineError> {
        let detail = match &self.kind {
            EventKind::Closure {
                uf,
                municipality,
                closed_at,
            } => serde_json::json!({
                "cUF": uf.code(),
                "cMun": municipality.as_str(),
                "dtEnc": closed_at.to_iso8601(),
            }),
            EventKind::Cancellation {
                authorization_protocol,
            } => serde_json::json!({
                "nProt": authorization_protocol.as_str(),
                "xJust": self.justification,
            }),
        };
        let payload = serde_json::json!({
            "chMDFe": self.access_key.as_str(),
            "tpEvento": self.kind.type_code(),
            "nSeqEvento": self.sequence,
            "dhEvento": self.created_at.to_iso8601(),
            "detEvento": detail,
        });
        CanonicalBytes::new(&payload).map_err(|e| EngineError::CorruptRecord {
            access_key: self.access_key.clone(),
            reason: format!("event payload: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdfe_core::{AccessKeyFields, Cnpj, EmissionType};

    fn access_key() -> AccessKey {
        AccessKey::build(&AccessKeyFields {
            uf: Uf::SP,
            emitted_at: Timestamp::parse("2026-08-04T10:00:00Z").unwrap(),
            issuer: Cnpj::new("12345678000190").unwrap(),
            series: 1,
            number: 42,
            emission_type: EmissionType::Normal,
            entropy_code: 12_345_678,
        })
        .unwrap()
    }

    fn protocol() -> ProtocolNumber {
        ProtocolNumber::new("135200000000001").unwrap()
    }

    #[test]
    fn closure_event_carries_place_and_time() {
        let event = LifecycleEvent::closure(
            access_key(),
            1,
            Uf::RJ,
            MunicipalityCode::new("3304557").unwrap(),
            Timestamp::parse("2026-08-05T18:00:00Z").unwrap(),
        )
        .unwrap();
        assert_eq!(event.kind.type_code(), EVENT_TYPE_CLOSURE);
        assert_eq!(event.sequence, 1);
        assert!(event.justification.is_none());
        assert!(!event.is_registered());
    }

    #[test]
    fn cancellation_requires_long_justification() {
        let err = LifecycleEvent::cancellation(access_key(), 1, protocol(), "curta").unwrap_err();
        assert!(matches!(
            err,
            EngineError::JustificationTooShort { min: 15, len: 5 }
        ));
    }

    #[test]
    fn cancellation_accepts_adequate_justification() {
        let event = LifecycleEvent::cancellation(
            access_key(),
            1,
            protocol(),
            "erro de digitação do motorista, cancelamento solicitado",
        )
        .unwrap();
        assert_eq!(event.kind.type_code(), EVENT_TYPE_CANCELLATION);
        assert!(event.justification.unwrap().contains("cancelamento"));
    }

    #[test]
    fn justification_length_counts_characters_not_bytes() {
        // 15 multibyte characters must pass.
        let justification = "ãõçéíúâêôàèìòù!";
        assert_eq!(justification.chars().count(), 15);
        assert!(LifecycleEvent::cancellation(access_key(), 1, protocol(), justification).is_ok());
    }

    #[test]
    fn sequence_zero_rejected() {
        let err = LifecycleEvent::closure(
            access_key(),
            0,
            Uf::RJ,
            MunicipalityCode::new("3304557").unwrap(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::EventOrdering { got: 0, .. }));
    }

    #[test]
    fn canonical_payload_is_deterministic() {
        let event = LifecycleEvent::cancellation(
            access_key(),
            1,
            protocol(),
            "erro de digitação do motorista, cancelamento solicitado",
        )
        .unwrap();
        let first = event.canonical_payload().unwrap();
        let second = event.canonical_payload().unwrap();
        assert_eq!(first, second);

        let text = std::str::from_utf8(first.as_bytes()).unwrap();
        assert!(text.contains("\"tpEvento\":\"110111\""));
        assert!(text.contains(access_key().as_str()));
    }

    #[test]
    fn payloads_differ_between_kinds() {
        let cancel = LifecycleEvent::cancellation(
            access_key(),
            1,
            protocol(),
            "erro de digitação do motorista, cancelamento solicitado",
        )
        .unwrap();
        let close = LifecycleEvent::closure(
            access_key(),
            1,
            Uf::RJ,
            MunicipalityCode::new("3304557").unwrap(),
            Timestamp::parse("2026-08-05T18:00:00Z").unwrap(),
        )
        .unwrap();
        assert_ne!(
            cancel.canonical_payload().unwrap(),
            close.canonical_payload().unwrap()
        );
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = LifecycleEvent::cancellation(
            access_key(),
            2,
            protocol(),
            "erro de digitação do motorista, cancelamento solicitado",
        )
        .unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let back: LifecycleEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 2);
        assert_eq!(back.kind, event.kind);
    }
}
