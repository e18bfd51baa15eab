//! # Scripted Authority Adapter
//!
//! A deterministic in-memory [`AuthorityAdapter`] for tests: each
//! operation pops the next scripted reply from its queue. Used by the
//! lifecycle engine's tests to exercise retry, classification, and
//! polling paths without a network.
//!
//! The adapter records the digest of every submitted envelope so tests
//! can assert that retries carry the identical signed payload.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mdfe_core::{AccessKey, ProtocolNumber, Timestamp};
use mdfe_crypto::SignedEnvelope;

use crate::adapter::{AuthorityAdapter, AuthorityResponse, TransportFailure};
use crate::outcome::{
    STATUS_AUTHORIZED, STATUS_BATCH_IN_PROCESS, STATUS_EVENT_REGISTERED, STATUS_SERVICE_OK,
};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Produce a parsed authority response.
    Respond(AuthorityResponse),
    /// Fail at the transport level.
    Fail(TransportFailure),
    /// Never complete — exercises caller-side timeouts.
    Hang,
}

impl ScriptedReply {
    /// An authorization response carrying a protocol number.
    pub fn authorized(protocol: &str) -> Self {
        Self::Respond(AuthorityResponse {
            status_code: STATUS_AUTHORIZED,
            message: "Autorizado o uso do MDF-e".to_string(),
            protocol: Some(ProtocolNumber::new(protocol).expect("test protocol")),
            processed_at: Some(Timestamp::now()),
        })
    }

    /// An event-registration response carrying a protocol number.
    pub fn event_registered(protocol: &str) -> Self {
        Self::Respond(AuthorityResponse {
            status_code: STATUS_EVENT_REGISTERED,
            message: "Evento registrado e vinculado ao MDF-e".to_string(),
            protocol: Some(ProtocolNumber::new(protocol).expect("test protocol")),
            processed_at: Some(Timestamp::now()),
        })
    }

    /// An authority-side rejection with a reason code.
    pub fn rejected(code: u16, reason: &str) -> Self {
        Self::Respond(AuthorityResponse {
            status_code: code,
            message: reason.to_string(),
            protocol: None,
            processed_at: Some(Timestamp::now()),
        })
    }

    /// A queued acknowledgement (batch in processing).
    pub fn queued() -> Self {
        Self::Respond(AuthorityResponse {
            status_code: STATUS_BATCH_IN_PROCESS,
            message: "Lote em processamento".to_string(),
            protocol: None,
            processed_at: None,
        })
    }

    /// A service-health OK response.
    pub fn service_ok() -> Self {
        Self::Respond(AuthorityResponse {
            status_code: STATUS_SERVICE_OK,
            message: "Serviço em operação".to_string(),
            protocol: None,
            processed_at: Some(Timestamp::now()),
        })
    }

    /// A connection-level transport failure.
    pub fn connect_failure(detail: &str) -> Self {
        Self::Fail(TransportFailure::connect(detail))
    }
}

#[derive(Default)]
struct Queues {
    submits: VecDeque<ScriptedReply>,
    queries: VecDeque<ScriptedReply>,
    events: VecDeque<ScriptedReply>,
    statuses: VecDeque<ScriptedReply>,
    query_fallback: Option<ScriptedReply>,
}

/// Deterministic scripted authority adapter for tests.
pub struct ScriptedAuthorityAdapter {
    queues: Mutex<Queues>,
    submit_calls: AtomicU32,
    query_calls: AtomicU32,
    event_calls: AtomicU32,
    seen_digests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAuthorityAdapter {
    /// Create an adapter with empty scripts.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            submit_calls: AtomicU32::new(0),
            query_calls: AtomicU32::new(0),
            event_calls: AtomicU32::new(0),
            seen_digests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueue the next reply for `submit`.
    pub fn script_submit(&self, reply: ScriptedReply) {
        self.queues.lock().expect("queues lock").submits.push_back(reply);
    }

    /// Enqueue the next reply for `query`.
    pub fn script_query(&self, reply: ScriptedReply) {
        self.queues.lock().expect("queues lock").queries.push_back(reply);
    }

    /// Enqueue the next reply for `send_event`.
    pub fn script_event(&self, reply: ScriptedReply) {
        self.queues.lock().expect("queues lock").events.push_back(reply);
    }

    /// Enqueue the next reply for `service_status`.
    pub fn script_status(&self, reply: ScriptedReply) {
        self.queues.lock().expect("queues lock").statuses.push_back(reply);
    }

    /// Reply used for `query` when its queue is empty.
    pub fn set_query_fallback(&self, reply: ScriptedReply) {
        self.queues.lock().expect("queues lock").query_fallback = Some(reply);
    }

    /// Digests of every envelope received by `submit`/`send_event`, in
    /// call order. Shared handle — clone before moving the adapter.
    pub fn seen_digests(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen_digests)
    }

    /// How many times `submit` was called.
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// How many times `query` was called.
    pub fn query_calls(&self) -> u32 {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// How many times `send_event` was called.
    pub fn event_calls(&self) -> u32 {
        self.event_calls.load(Ordering::SeqCst)
    }

    async fn play(reply: Option<ScriptedReply>) -> Result<AuthorityResponse, TransportFailure> {
        match reply {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(failure)) => Err(failure),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(TransportFailure::connect("no scripted reply")),
        }
    }
}

impl Default for ScriptedAuthorityAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorityAdapter for ScriptedAuthorityAdapter {
    async fn submit(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<AuthorityResponse, TransportFailure> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_digests
            .lock()
            .expect("digests lock")
            .push(envelope.digest().to_hex());
        let reply = self.queues.lock().expect("queues lock").submits.pop_front();
        Self::play(reply).await
    }

    async fn query(&self, _key: &AccessKey) -> Result<AuthorityResponse, TransportFailure> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut queues = self.queues.lock().expect("queues lock");
            queues
                .queries
                .pop_front()
                .or_else(|| queues.query_fallback.clone())
        };
        Self::play(reply).await
    }

    async fn send_event(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<AuthorityResponse, TransportFailure> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_digests
            .lock()
            .expect("digests lock")
            .push(envelope.digest().to_hex());
        let reply = self.queues.lock().expect("queues lock").events.pop_front();
        Self::play(reply).await
    }

    async fn service_status(&self) -> Result<AuthorityResponse, TransportFailure> {
        let reply = self.queues.lock().expect("queues lock").statuses.pop_front();
        Self::play(reply).await
    }

    fn adapter_name(&self) -> &str {
        "ScriptedAuthorityAdapter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdfe_core::{CanonicalBytes, Cnpj};
    use mdfe_crypto::SigningCredential;

    fn envelope() -> SignedEnvelope {
        let credential = SigningCredential::generate(
            Cnpj::new("12345678000190").unwrap(),
            Timestamp::parse("2099-12-31T23:59:59Z").unwrap(),
        );
        let form = CanonicalBytes::new(&serde_json::json!({"n": 1})).unwrap();
        SignedEnvelope::sign(form, &credential).unwrap()
    }

    #[tokio::test]
    async fn replies_play_in_order() {
        let adapter = ScriptedAuthorityAdapter::new();
        adapter.script_submit(ScriptedReply::queued());
        adapter.script_submit(ScriptedReply::authorized("135200000000001"));

        let first = adapter.submit(&envelope()).await.unwrap();
        assert_eq!(first.status_code, STATUS_BATCH_IN_PROCESS);
        let second = adapter.submit(&envelope()).await.unwrap();
        assert_eq!(second.status_code, STATUS_AUTHORIZED);
        assert_eq!(adapter.submit_calls(), 2);
    }

    #[tokio::test]
    async fn empty_script_fails_transport() {
        let adapter = ScriptedAuthorityAdapter::new();
        let err = adapter.submit(&envelope()).await.unwrap_err();
        assert_eq!(err.kind, crate::adapter::TransportFailureKind::Connect);
    }

    #[tokio::test]
    async fn query_fallback_applies_when_queue_empty() {
        let adapter = ScriptedAuthorityAdapter::new();
        adapter.set_query_fallback(ScriptedReply::queued());
        let key = test_key();
        let response = adapter.query(&key).await.unwrap();
        assert_eq!(response.status_code, STATUS_BATCH_IN_PROCESS);
        assert_eq!(adapter.query_calls(), 1);
    }

    fn test_key() -> AccessKey {
        AccessKey::build(&mdfe_core::AccessKeyFields {
            uf: mdfe_core::Uf::SP,
            emitted_at: Timestamp::parse("2026-08-04T10:00:00Z").unwrap(),
            issuer: Cnpj::new("12345678000190").unwrap(),
            series: 1,
            number: 9,
            emission_type: mdfe_core::EmissionType::Normal,
            entropy_code: 5,
        })
        .unwrap()
    }
}
