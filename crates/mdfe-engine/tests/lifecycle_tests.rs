//! # Lifecycle Engine Integration Tests
//!
//! Drives the full engine — assembly, signing, transmission, polling,
//! events — against the in-memory store and the scripted authority
//! adapter. Time is paused: backoff delays and poll intervals
//! auto-advance, so the retry paths run deterministically and fast.

use std::sync::Arc;
use std::time::Duration;

use mdfe_core::{Cnpj, Cpf, EmissionType, MunicipalityCode, Timestamp, Uf};
use mdfe_crypto::SigningCredential;
use mdfe_document::{CargoInfo, Driver, Issuer, LinkedDocument, Manifest, Route, Vehicle, WeightUnit};
use mdfe_engine::{
    ClosureRequest, DocumentStatus, EngineConfig, EngineError, Issuance, LifecycleService,
    MemoryStore, PollerAlert, PollerConfig, StatusPoller,
};
use mdfe_sefaz::{
    RetryPolicy, ScriptedAuthorityAdapter, ScriptedReply, TransmissionClient, TransmissionOutcome,
};

fn manifest() -> Manifest {
    Manifest {
        issuer: Issuer {
            cnpj: Cnpj::new("12345678000190").unwrap(),
            corporate_name: "Transportes Paulista Ltda".to_string(),
        },
        route: Route {
            origin: Uf::SP,
            destination: Uf::RJ,
        },
        journey_start: Timestamp::parse("2026-08-04T06:00:00Z").unwrap(),
        cargo: CargoInfo {
            total_value_centavos: 1_500_000,
            quantity: 12_000,
            unit: WeightUnit::Kg,
        },
        vehicle: Vehicle {
            plate: "ABC1D23".to_string(),
            renavam: "00123456789".to_string(),
            tare_kg: 7_500,
            capacity_kg: 23_000,
        },
        drivers: vec![Driver {
            name: "José da Silva".to_string(),
            cpf: Cpf::new("52998224725").unwrap(),
        }],
        fiscal_documents: vec![LinkedDocument {
            key: nfe_key(),
            series: 1,
            number: 123,
            value_centavos: 1_500_000,
        }],
    }
}

fn nfe_key() -> mdfe_core::AccessKey {
    let body = "3526081234567800019055001000000123112345678";
    let dv = (0..=9)
        .find(|d| mdfe_core::AccessKey::is_valid(&format!("{body}{d}")))
        .unwrap();
    mdfe_core::AccessKey::parse(&format!("{body}{dv}")).unwrap()
}

fn issuance() -> Issuance {
    Issuance {
        series: 1,
        number: 42,
        emission_type: EmissionType::Normal,
        entropy_code: 12_345_678,
    }
}

fn credential() -> Arc<SigningCredential> {
    Arc::new(SigningCredential::generate(
        Cnpj::new("12345678000190").unwrap(),
        Timestamp::parse("2099-12-31T23:59:59Z").unwrap(),
    ))
}

fn engine(credential: Arc<SigningCredential>) -> (Arc<LifecycleService>, Arc<ScriptedAuthorityAdapter>) {
    let adapter = Arc::new(ScriptedAuthorityAdapter::new());
    let client = TransmissionClient::new(adapter.clone(), RetryPolicy::default());
    let service = Arc::new(LifecycleService::new(
        Arc::new(MemoryStore::new()),
        client,
        credential,
        EngineConfig {
            transmission_timeout: Duration::from_secs(30),
        },
    ));
    (service, adapter)
}

const CANCEL_JUSTIFICATION: &str = "erro de digitação do motorista, cancelamento solicitado";

// ── The end-to-end scenario ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn timeouts_then_authorization_then_cancellation() {
    let (service, adapter) = engine(credential());

    // Three timeouts, then authorization — all inside one submit call.
    for _ in 0..3 {
        adapter.script_submit(ScriptedReply::Hang);
    }
    adapter.script_submit(ScriptedReply::authorized("135200000000001"));

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    assert_eq!(key.as_str().len(), 44);
    assert!(mdfe_core::AccessKey::is_valid(key.as_str()));

    service.sign(&key).await.unwrap();
    assert_eq!(service.status(&key).await.unwrap(), DocumentStatus::Signed);

    let status = service.submit(&key).await.unwrap();
    assert_eq!(status, DocumentStatus::Authorized);

    let record = service.record(&key).await.unwrap();
    assert_eq!(record.protocol.as_ref().unwrap().as_str(), "135200000000001");
    assert_eq!(record.attempts.len(), 4);
    assert!(record.attempts[..3]
        .iter()
        .all(|a| !a.outcome.is_terminal()));
    assert!(matches!(
        record.attempts[3].outcome,
        TransmissionOutcome::Authorized { .. }
    ));

    // Cancel with an adequate justification.
    adapter.script_event(ScriptedReply::event_registered("135200000000002"));
    let status = service.cancel(&key, CANCEL_JUSTIFICATION).await.unwrap();
    assert_eq!(status, DocumentStatus::Cancelled);

    let record = service.record(&key).await.unwrap();
    assert_eq!(record.events.len(), 1);
    let event = &record.events[0];
    assert_eq!(event.sequence, 1);
    assert!(event.is_registered());
    assert_eq!(
        event.registered_protocol.as_ref().unwrap().as_str(),
        "135200000000002"
    );

    // The summary still reads back from the frozen form.
    let summary = service.summary(&key).await.unwrap();
    assert_eq!(summary.issuer_cnpj.as_str(), "12345678000190");
    assert_eq!(summary.origin, Uf::SP);
    assert_eq!(summary.destination, Uf::RJ);
}

// ── Idempotency ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn resubmitting_an_authorized_document_is_a_duplicate() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::authorized("135200000000001"));

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    service.submit(&key).await.unwrap();
    let calls_after_first = adapter.submit_calls();

    let err = service.submit(&key).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::DuplicateSubmission {
            status: DocumentStatus::Authorized,
            ..
        }
    ));
    // No new transmission happened, so no second protocol can exist.
    assert_eq!(adapter.submit_calls(), calls_after_first);
    let record = service.record(&key).await.unwrap();
    let protocols = record
        .attempts
        .iter()
        .filter(|a| a.outcome.protocol().is_some())
        .count();
    assert_eq!(protocols, 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_document_is_terminal() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::rejected(204, "Duplicidade de MDF-e"));

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();

    let status = service.submit(&key).await.unwrap();
    assert_eq!(status, DocumentStatus::Rejected);
    let record = service.record(&key).await.unwrap();
    assert_eq!(record.rejection.as_ref().unwrap().code, 204);

    let err = service.submit(&key).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateSubmission { .. }));
}

// ── Signing failures ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn signing_failure_leaves_document_created() {
    let expired = Arc::new(SigningCredential::generate(
        Cnpj::new("12345678000190").unwrap(),
        Timestamp::parse("2020-01-01T00:00:00Z").unwrap(),
    ));
    let (service, _adapter) = engine(expired);

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    let err = service.sign(&key).await.unwrap_err();
    assert!(matches!(err, EngineError::Signing(_)));
    assert_eq!(service.status(&key).await.unwrap(), DocumentStatus::Created);
}

// ── Resumability ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn inflight_document_resumes_by_query_not_resubmission() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::queued());

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    let status = service.submit(&key).await.unwrap();
    assert_eq!(status, DocumentStatus::Submitting);
    assert_eq!(adapter.submit_calls(), 1);

    // A second submit on an in-flight document must query, not resend.
    adapter.script_query(ScriptedReply::authorized("135200000000001"));
    let status = service.submit(&key).await.unwrap();
    assert_eq!(status, DocumentStatus::Authorized);
    assert_eq!(adapter.submit_calls(), 1, "payload must not be resent");
    assert_eq!(adapter.query_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_submission_stays_resumable() {
    let (service, adapter) = engine(credential());
    for _ in 0..4 {
        adapter.script_submit(ScriptedReply::connect_failure("authority down"));
    }

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();

    let err = service.submit(&key).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::TransmissionExhausted { attempts: 4, .. }
    ));
    // Still in flight, fully recorded, resumable by query.
    assert_eq!(
        service.status(&key).await.unwrap(),
        DocumentStatus::Submitting
    );
    assert_eq!(service.record(&key).await.unwrap().attempts.len(), 4);

    adapter.script_query(ScriptedReply::authorized("135200000000001"));
    let status = service.poll_once(&key).await.unwrap();
    assert_eq!(status, DocumentStatus::Authorized);
}

// ── Poller ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn poller_settles_queued_document() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::queued());

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    service.submit(&key).await.unwrap();

    // First poll still pending, second authorizes.
    adapter.script_query(ScriptedReply::queued());
    adapter.script_query(ScriptedReply::authorized("135200000000001"));

    let (handle, _alerts) = StatusPoller::spawn(
        service.clone(),
        PollerConfig {
            interval: Duration::from_secs(1),
            max_polls_per_document: 10,
        },
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        service.status(&key).await.unwrap(),
        DocumentStatus::Authorized
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn poller_escalates_unresolved_documents() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::queued());
    adapter.set_query_fallback(ScriptedReply::queued());

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    service.submit(&key).await.unwrap();

    let (handle, mut alerts) = StatusPoller::spawn(
        service.clone(),
        PollerConfig {
            interval: Duration::from_secs(1),
            max_polls_per_document: 2,
        },
    );

    let alert = alerts.recv().await.expect("an escalation must arrive");
    match alert {
        PollerAlert::StatusUnresolved { access_key, polls } => {
            assert_eq!(access_key, key);
            assert_eq!(polls, 2);
        }
    }
    // Escalated, not lost: the document is still queryable.
    assert_eq!(
        service.status(&key).await.unwrap(),
        DocumentStatus::Submitting
    );
    handle.shutdown().await;
}

// ── Events ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rejected_event_leaves_document_authorized() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::authorized("135200000000001"));

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    service.submit(&key).await.unwrap();

    adapter.script_event(ScriptedReply::rejected(220, "Evento fora de prazo"));
    let err = service.cancel(&key, CANCEL_JUSTIFICATION).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::EventRejected { code: 220, .. }
    ));
    assert_eq!(
        service.status(&key).await.unwrap(),
        DocumentStatus::Authorized
    );

    // The failed event is on record with sequence 1; the next event
    // takes sequence 2.
    let record = service.record(&key).await.unwrap();
    assert_eq!(record.events.len(), 1);
    assert!(!record.events[0].is_registered());

    adapter.script_event(ScriptedReply::event_registered("135200000000003"));
    let status = service
        .close(
            &key,
            ClosureRequest {
                uf: Uf::RJ,
                municipality: MunicipalityCode::new("3304557").unwrap(),
                closed_at: Timestamp::parse("2026-08-05T18:00:00Z").unwrap(),
            },
        )
        .await
        .unwrap();
    assert_eq!(status, DocumentStatus::Closed);
    let record = service.record(&key).await.unwrap();
    assert_eq!(record.events.len(), 2);
    assert_eq!(record.events[1].sequence, 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_impossible_after_closure() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::authorized("135200000000001"));

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    service.submit(&key).await.unwrap();

    adapter.script_event(ScriptedReply::event_registered("135200000000002"));
    service
        .close(
            &key,
            ClosureRequest {
                uf: Uf::RJ,
                municipality: MunicipalityCode::new("3304557").unwrap(),
                closed_at: Timestamp::parse("2026-08-05T18:00:00Z").unwrap(),
            },
        )
        .await
        .unwrap();

    let err = service.cancel(&key, CANCEL_JUSTIFICATION).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::EventNotAllowed {
            status: DocumentStatus::Closed,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn short_justification_never_reaches_the_authority() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::authorized("135200000000001"));

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();
    service.submit(&key).await.unwrap();

    let err = service.cancel(&key, "curta demais").await.unwrap_err();
    assert!(matches!(err, EngineError::JustificationTooShort { .. }));
    assert_eq!(adapter.event_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn events_on_unauthorized_documents_are_refused() {
    let (service, _adapter) = engine(credential());
    let key = service.create(&manifest(), &issuance()).await.unwrap();

    let err = service.cancel(&key, CANCEL_JUSTIFICATION).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::EventNotAllowed {
            status: DocumentStatus::Created,
            ..
        }
    ));
}

// ── Concurrency ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_submissions_transmit_exactly_once() {
    let (service, adapter) = engine(credential());
    adapter.script_submit(ScriptedReply::authorized("135200000000001"));
    adapter.set_query_fallback(ScriptedReply::queued());

    let key = service.create(&manifest(), &issuance()).await.unwrap();
    service.sign(&key).await.unwrap();

    let (a, b) = tokio::join!(service.submit(&key), service.submit(&key));

    // One of the calls settled the document; the other observed it
    // in-flight (and queried) or settled (and got the duplicate error).
    assert_eq!(adapter.submit_calls(), 1, "exactly one transmission");
    let settled = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Ok(DocumentStatus::Authorized)))
        .count();
    assert!(settled >= 1, "results were {a:?} / {b:?}");
    assert_eq!(
        service.status(&key).await.unwrap(),
        DocumentStatus::Authorized
    );
}

#[tokio::test(start_paused = true)]
async fn duplicate_creation_is_refused() {
    let (service, _adapter) = engine(credential());
    service.create(&manifest(), &issuance()).await.unwrap();
    let err = service.create(&manifest(), &issuance()).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
}
