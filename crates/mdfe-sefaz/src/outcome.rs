//! # Outcome Classification
//!
//! Every exchange with the authority is reduced to one of three
//! categories, and everything downstream — retries, state transitions,
//! polling — keys off that category alone:
//!
//! - **Authorized** — terminal success; the authority issued a protocol
//!   number.
//! - **Rejected** — terminal failure; the authority validated and
//!   refused. Never retried with the same payload.
//! - **Indeterminate** — the exchange reveals nothing about the
//!   authority-side result: transport failure, timeout, service down,
//!   or a queued response awaiting processing. Retried or polled.
//!
//! The status codes follow the fiscal service convention: `100`
//! authorizes a document, `135`/`136` register an event, `103`/`105`
//! acknowledge a queued batch, `107`-`109` report service health.
//! Anything else in the response band is an authority-side rejection
//! carried with its reason code.

use mdfe_core::{ProtocolNumber, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::{AuthorityResponse, TransportFailure};

/// Authority status code: document authorized.
pub const STATUS_AUTHORIZED: u16 = 100;
/// Authority status code: batch received, awaiting processing.
pub const STATUS_BATCH_RECEIVED: u16 = 103;
/// Authority status code: batch still in processing.
pub const STATUS_BATCH_IN_PROCESS: u16 = 105;
/// Authority status code: service in operation.
pub const STATUS_SERVICE_OK: u16 = 107;
/// Authority status code: service temporarily paralyzed.
pub const STATUS_SERVICE_PAUSED: u16 = 108;
/// Authority status code: service paralyzed without forecast.
pub const STATUS_SERVICE_DOWN: u16 = 109;
/// Authority status code: event registered and linked to the document.
pub const STATUS_EVENT_REGISTERED: u16 = 135;
/// Authority status code: event registered but not linked.
pub const STATUS_EVENT_REGISTERED_UNLINKED: u16 = 136;
/// Authority status code: duplicate access key.
pub const STATUS_DUPLICATE_KEY: u16 = 204;

/// The remote operation an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Submission of a signed document.
    Submit,
    /// Situation query for an access key.
    Query,
    /// Transmission of a signed lifecycle event.
    Event,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submit => "submit",
            Self::Query => "query",
            Self::Event => "event",
        };
        f.write_str(s)
    }
}

/// The three-way classification of a transmission result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionOutcome {
    /// Terminal success — protocol number present.
    Authorized {
        /// The authority-issued protocol number.
        protocol: ProtocolNumber,
        /// When the authority processed the document.
        authorized_at: Timestamp,
    },
    /// Terminal failure — authority validation refused the payload.
    Rejected {
        /// The authority's reason code.
        code: u16,
        /// The authority's reason text.
        reason: String,
    },
    /// The exchange reveals nothing about acceptance or rejection.
    Indeterminate {
        /// Diagnostic description of why the result is unknown.
        reason: String,
    },
}

impl TransmissionOutcome {
    /// Whether this outcome ends the document's transmission (either way).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Indeterminate { .. })
    }

    /// The protocol number, when authorized.
    pub fn protocol(&self) -> Option<&ProtocolNumber> {
        match self {
            Self::Authorized { protocol, .. } => Some(protocol),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransmissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authorized { protocol, .. } => write!(f, "authorized (protocol {protocol})"),
            Self::Rejected { code, reason } => write!(f, "rejected ({code}: {reason})"),
            Self::Indeterminate { reason } => write!(f, "indeterminate ({reason})"),
        }
    }
}

/// One request/response exchange with the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionAttempt {
    /// Unique attempt identifier.
    pub id: Uuid,
    /// The operation this attempt belongs to.
    pub operation: Operation,
    /// Classified result of the exchange.
    pub outcome: TransmissionOutcome,
    /// When the attempt completed.
    pub attempted_at: Timestamp,
}

impl TransmissionAttempt {
    /// Record a fresh attempt with its classified outcome.
    pub fn record(operation: Operation, outcome: TransmissionOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            outcome,
            attempted_at: Timestamp::now(),
        }
    }
}

/// Classify a parsed authority response.
///
/// Authorization and event-registration codes require a protocol number;
/// a success code without one is classified `Indeterminate` (the
/// response is unusable as proof) rather than trusted.
pub fn classify(response: &AuthorityResponse) -> TransmissionOutcome {
    match response.status_code {
        STATUS_AUTHORIZED | STATUS_EVENT_REGISTERED | STATUS_EVENT_REGISTERED_UNLINKED => {
            match &response.protocol {
                Some(protocol) => TransmissionOutcome::Authorized {
                    protocol: protocol.clone(),
                    authorized_at: response.processed_at.unwrap_or_else(Timestamp::now),
                },
                None => TransmissionOutcome::Indeterminate {
                    reason: format!(
                        "status {} without protocol number",
                        response.status_code
                    ),
                },
            }
        }
        STATUS_BATCH_RECEIVED | STATUS_BATCH_IN_PROCESS => TransmissionOutcome::Indeterminate {
            reason: format!("queued by authority: {}", response.message),
        },
        STATUS_SERVICE_OK | STATUS_SERVICE_PAUSED | STATUS_SERVICE_DOWN => {
            TransmissionOutcome::Indeterminate {
                reason: format!(
                    "service status {} during document operation: {}",
                    response.status_code, response.message
                ),
            }
        }
        code => TransmissionOutcome::Rejected {
            code,
            reason: response.message.clone(),
        },
    }
}

/// Classify a transport-level failure.
///
/// A transport failure carries no information about the authority-side
/// result, so the classification is always `Indeterminate`.
pub fn classify_transport(failure: &TransportFailure) -> TransmissionOutcome {
    TransmissionOutcome::Indeterminate {
        reason: failure.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TransportFailureKind;

    fn response(code: u16, protocol: Option<&str>) -> AuthorityResponse {
        AuthorityResponse {
            status_code: code,
            message: "resposta".to_string(),
            protocol: protocol.map(|p| ProtocolNumber::new(p).unwrap()),
            processed_at: Some(Timestamp::parse("2026-08-04T12:00:00Z").unwrap()),
        }
    }

    #[test]
    fn authorized_with_protocol() {
        let outcome = classify(&response(STATUS_AUTHORIZED, Some("135200000000001")));
        match outcome {
            TransmissionOutcome::Authorized { protocol, .. } => {
                assert_eq!(protocol.as_str(), "135200000000001");
            }
            other => panic!("expected Authorized, got {other}"),
        }
        assert!(outcome_is_terminal(STATUS_AUTHORIZED, Some("135200000000001")));
    }

    #[test]
    fn event_registered_is_authorized() {
        let outcome = classify(&response(STATUS_EVENT_REGISTERED, Some("135200000000002")));
        assert!(matches!(outcome, TransmissionOutcome::Authorized { .. }));
    }

    #[test]
    fn success_code_without_protocol_is_indeterminate() {
        let outcome = classify(&response(STATUS_AUTHORIZED, None));
        assert!(matches!(outcome, TransmissionOutcome::Indeterminate { .. }));
    }

    #[test]
    fn queued_is_indeterminate() {
        for code in [STATUS_BATCH_RECEIVED, STATUS_BATCH_IN_PROCESS] {
            let outcome = classify(&response(code, None));
            assert!(
                matches!(outcome, TransmissionOutcome::Indeterminate { .. }),
                "code {code} must be indeterminate"
            );
        }
    }

    #[test]
    fn service_band_is_indeterminate() {
        for code in [STATUS_SERVICE_OK, STATUS_SERVICE_PAUSED, STATUS_SERVICE_DOWN] {
            assert!(!outcome_is_terminal(code, None), "code {code}");
        }
    }

    #[test]
    fn validation_codes_are_rejected() {
        for code in [STATUS_DUPLICATE_KEY, 217, 220, 240, 999] {
            let outcome = classify(&response(code, None));
            match outcome {
                TransmissionOutcome::Rejected { code: got, .. } => assert_eq!(got, code),
                other => panic!("code {code} must be Rejected, got {other}"),
            }
        }
    }

    #[test]
    fn transport_failure_is_never_rejected() {
        for kind in [
            TransportFailureKind::Timeout,
            TransportFailureKind::Connect,
            TransportFailureKind::ServerError,
            TransportFailureKind::Malformed,
        ] {
            let failure = TransportFailure {
                kind,
                detail: "falha".to_string(),
            };
            let outcome = classify_transport(&failure);
            assert!(matches!(outcome, TransmissionOutcome::Indeterminate { .. }));
        }
    }

    #[test]
    fn attempt_record_carries_operation_and_outcome() {
        let attempt = TransmissionAttempt::record(
            Operation::Submit,
            TransmissionOutcome::Indeterminate {
                reason: "timeout".to_string(),
            },
        );
        assert_eq!(attempt.operation, Operation::Submit);
        assert!(!attempt.outcome.is_terminal());
    }

    #[test]
    fn attempt_serde_roundtrip() {
        let attempt = TransmissionAttempt::record(
            Operation::Event,
            TransmissionOutcome::Rejected {
                code: 220,
                reason: "evento fora de ordem".to_string(),
            },
        );
        let json = serde_json::to_string(&attempt).unwrap();
        let back: TransmissionAttempt = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, attempt.id);
        assert_eq!(back.outcome, attempt.outcome);
    }

    fn outcome_is_terminal(code: u16, protocol: Option<&str>) -> bool {
        classify(&response(code, protocol)).is_terminal()
    }
}
