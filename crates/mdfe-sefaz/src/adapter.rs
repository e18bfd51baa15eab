//! # Authority Adapter — Generic Trait Interface
//!
//! Abstracts over the authority backend. Production deployments wire the
//! [`crate::http::HttpAuthorityAdapter`] against the live service; tests
//! use [`crate::stub::ScriptedAuthorityAdapter`]. The lifecycle engine
//! composes transmissions without coupling to a transport or wire
//! format — the exact XML/SOAP contract of a given authority deployment
//! stays behind this boundary.
//!
//! Implementations must be `Send + Sync` so they can be shared across
//! async tasks behind an `Arc`. The trait is object-safe to support
//! runtime adapter selection.

use async_trait::async_trait;
use mdfe_core::{AccessKey, ProtocolNumber, Timestamp};
use mdfe_crypto::SignedEnvelope;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A parsed authority response: status code, reason text, and the
/// protocol number when one was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityResponse {
    /// Authority status code (`cStat`).
    pub status_code: u16,
    /// Authority reason text (`xMotivo`).
    pub message: String,
    /// Protocol number (`nProt`), present on authorization and event
    /// registration.
    pub protocol: Option<ProtocolNumber>,
    /// When the authority processed the request (`dhRecbto`).
    pub processed_at: Option<Timestamp>,
}

/// Why a request never produced a parseable authority response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    /// The request timed out.
    Timeout,
    /// Connection could not be established.
    Connect,
    /// The service answered with a server error (5xx).
    ServerError,
    /// The response body could not be parsed.
    Malformed,
}

/// A transport-level failure. Carries no information about the
/// authority-side result — classification downstream is always
/// `Indeterminate`.
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {detail}")]
pub struct TransportFailure {
    /// Failure category.
    pub kind: TransportFailureKind,
    /// Diagnostic detail.
    pub detail: String,
}

impl TransportFailure {
    /// A timeout failure.
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Timeout,
            detail: detail.into(),
        }
    }

    /// A connection failure.
    pub fn connect(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Connect,
            detail: detail.into(),
        }
    }

    /// A server-side (5xx) failure.
    pub fn server_error(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::ServerError,
            detail: detail.into(),
        }
    }

    /// An unparseable response.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Malformed,
            detail: detail.into(),
        }
    }
}

/// Adapter trait for the remote authority service.
///
/// All methods are side-effect-free on the authority except
/// [`AuthorityAdapter::submit()`] and [`AuthorityAdapter::send_event()`].
/// [`AuthorityAdapter::query()`] is idempotent and is what the status
/// poller drives.
#[async_trait]
pub trait AuthorityAdapter: Send + Sync {
    /// Send a signed document for authorization.
    async fn submit(&self, envelope: &SignedEnvelope)
        -> Result<AuthorityResponse, TransportFailure>;

    /// Query the current situation of an access key.
    async fn query(&self, key: &AccessKey) -> Result<AuthorityResponse, TransportFailure>;

    /// Send a signed lifecycle event (closure, cancellation).
    async fn send_event(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<AuthorityResponse, TransportFailure>;

    /// Query the authority service health.
    async fn service_status(&self) -> Result<AuthorityResponse, TransportFailure>;

    /// Human-readable name of this adapter implementation, for
    /// diagnostics and logging.
    fn adapter_name(&self) -> &str;
}
