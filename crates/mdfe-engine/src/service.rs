//! # Lifecycle Service
//!
//! Orchestrates assembly, signing, transmission, and state transitions
//! across a document's life. This is the only component that mutates
//! documents after creation.
//!
//! ## Concurrency discipline
//!
//! Work on each document is serialized by an async lock keyed on its
//! access key; operations on different documents proceed in parallel.
//! The per-key lock is **not** held across a network round-trip: an
//! operation acquires the lock, reads state, commits the in-flight
//! marker, releases, performs I/O, then re-acquires to commit the
//! result. The commit is optimistic — the status is re-read and the
//! store commit is compare-and-swap, so a concurrent mutation surfaces
//! as [`EngineError::ConcurrentTransition`] instead of a lost update.
//!
//! ## Idempotency
//!
//! The access key is the idempotency key across the whole system. A
//! document that the authority has already settled refuses further
//! submissions with [`EngineError::DuplicateSubmission`]; a document
//! found mid-flight is resumed by querying, never resubmitted blindly.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mdfe_core::{AccessKey, AccessKeyFields, EmissionType, Timestamp, Uf};
use mdfe_crypto::{SignedEnvelope, SigningCredential};
use mdfe_document::{assemble, extract_summary, Manifest, ManifestSummary};
use mdfe_sefaz::{TransmissionClient, TransmissionError, TransmissionOutcome};
use tokio::sync::Mutex;

use crate::document::{
    Created, DocumentRecord, DocumentStatus, ManifestDocument, RejectionInfo,
};
use crate::error::EngineError;
use crate::events::{EventKind, LifecycleEvent};
use crate::store::{DocumentStore, Versioned};

/// Issuance parameters for a new document: everything the access key
/// needs beyond what the manifest already carries.
#[derive(Debug, Clone)]
pub struct Issuance {
    /// Document series.
    pub series: u16,
    /// Document number.
    pub number: u32,
    /// Emission type.
    pub emission_type: EmissionType,
    /// Numeric entropy code.
    pub entropy_code: u32,
}

/// Where and when a transport was closed.
#[derive(Debug, Clone)]
pub struct ClosureRequest {
    /// State where the transport ended.
    pub uf: Uf,
    /// Municipality where the transport ended.
    pub municipality: mdfe_core::MunicipalityCode,
    /// When the transport ended.
    pub closed_at: Timestamp,
}

/// Engine configuration, explicitly constructed and passed in.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout applied to each transmission call.
    pub transmission_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transmission_timeout: Duration::from_secs(30),
        }
    }
}

/// The lifecycle orchestration service.
pub struct LifecycleService {
    store: Arc<dyn DocumentStore>,
    client: TransmissionClient,
    credential: Arc<SigningCredential>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: EngineConfig,
}

impl LifecycleService {
    /// Build a service over a store, a transmission client, and a loaded
    /// signing credential.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: TransmissionClient,
        credential: Arc<SigningCredential>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            credential,
            locks: DashMap::new(),
            config,
        }
    }

    fn lock_for(&self, key: &AccessKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn commit(
        &self,
        expected_version: u64,
        record: DocumentRecord,
    ) -> Result<u64, EngineError> {
        let access_key = record.access_key.clone();
        self.store
            .commit(expected_version, record)
            .await
            .map_err(|e| match e {
                crate::store::StoreError::VersionConflict { .. } => {
                    EngineError::ConcurrentTransition { access_key }
                }
                other => other.into(),
            })
    }

    // ── Create ───────────────────────────────────────────────────────

    /// Assemble a manifest into a new document and persist it.
    ///
    /// Builds the access key from the manifest plus issuance parameters,
    /// renders and freezes the canonical form, and stores the document
    /// in `CREATED`. Assembly and field errors are returned synchronously
    /// and nothing is persisted.
    pub async fn create(
        &self,
        manifest: &Manifest,
        issuance: &Issuance,
    ) -> Result<AccessKey, EngineError> {
        let emitted_at = Timestamp::now();
        let access_key = AccessKey::build(&AccessKeyFields {
            uf: manifest.route.origin,
            emitted_at,
            issuer: manifest.issuer.cnpj.clone(),
            series: issuance.series,
            number: issuance.number,
            emission_type: issuance.emission_type,
            entropy_code: issuance.entropy_code,
        })?;
        let form = assemble(manifest, &access_key, emitted_at)?;
        let document = ManifestDocument::<Created>::new(access_key.clone(), form, emitted_at);
        self.store.insert(document.into()).await?;
        tracing::info!(access_key = %access_key, "document created");
        Ok(access_key)
    }

    // ── Sign ─────────────────────────────────────────────────────────

    /// Sign a created document (CREATED → SIGNED).
    ///
    /// A signing failure leaves the document in `CREATED` — no partial
    /// state is persisted.
    pub async fn sign(&self, key: &AccessKey) -> Result<(), EngineError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let Versioned {
            version,
            value: mut record,
        } = self.store.load(key).await?;
        if record.status != DocumentStatus::Created {
            return Err(EngineError::InvalidTransition {
                access_key: key.clone(),
                from: record.status,
                to: DocumentStatus::Signed,
            });
        }

        let form = record.canonical_form()?;
        let envelope = SignedEnvelope::sign(form, &self.credential)?;
        record.envelope = Some(envelope);
        record.try_transition(DocumentStatus::Signed, Some("document signed".to_string()))?;
        self.commit(version, record).await?;
        tracing::info!(access_key = %key, "document signed");
        Ok(())
    }

    // ── Submit ───────────────────────────────────────────────────────

    /// Submit a signed document to the authority.
    ///
    /// Returns the status the document landed in: `AUTHORIZED`,
    /// `REJECTED`, or `SUBMITTING` when the authority queued the
    /// document (the status poller takes over from there).
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateSubmission`] — the document is already
    ///   settled; the signed payload is not retransmitted.
    /// - [`EngineError::TransmissionExhausted`] — the retry cap was
    ///   reached; the document stays `SUBMITTING` with every attempt
    ///   recorded.
    pub async fn submit(&self, key: &AccessKey) -> Result<DocumentStatus, EngineError> {
        let lock = self.lock_for(key);
        let guard = lock.lock().await;

        let Versioned {
            version,
            value: mut record,
        } = self.store.load(key).await?;

        match record.status {
            DocumentStatus::Signed => {}
            DocumentStatus::Submitting => {
                // In flight — possibly from a previous process life.
                // Resume by querying, never by blind resubmission.
                drop(guard);
                return self.poll_once(key).await;
            }
            status if status.is_settled() => {
                return Err(EngineError::DuplicateSubmission {
                    access_key: key.clone(),
                    status,
                });
            }
            status => {
                return Err(EngineError::InvalidTransition {
                    access_key: key.clone(),
                    from: status,
                    to: DocumentStatus::Submitting,
                });
            }
        }

        let envelope = record.envelope.clone().ok_or_else(|| EngineError::CorruptRecord {
            access_key: key.clone(),
            reason: "signed document without envelope".to_string(),
        })?;
        record.try_transition(
            DocumentStatus::Submitting,
            Some("submission started".to_string()),
        )?;
        self.commit(version, record).await?;
        drop(guard);

        // Network I/O happens without the per-document lock.
        let result = self
            .client
            .submit(&envelope, self.config.transmission_timeout)
            .await;

        let _guard = lock.lock().await;
        let Versioned {
            version,
            value: mut record,
        } = self.store.load(key).await?;
        if record.status != DocumentStatus::Submitting {
            return Err(EngineError::ConcurrentTransition {
                access_key: key.clone(),
            });
        }

        let mut pending_error = None;
        match result {
            Ok(attempts) => {
                let last_outcome = attempts.last().map(|a| a.outcome.clone());
                record.attempts.extend(attempts);
                match last_outcome {
                    Some(TransmissionOutcome::Authorized {
                        protocol,
                        authorized_at,
                    }) => {
                        record.try_transition(
                            DocumentStatus::Authorized,
                            Some(format!(
                                "authorized at {authorized_at} with protocol {protocol}"
                            )),
                        )?;
                        record.protocol = Some(protocol);
                    }
                    Some(TransmissionOutcome::Rejected { code, reason }) => {
                        record.try_transition(
                            DocumentStatus::Rejected,
                            Some(format!("rejected {code}: {reason}")),
                        )?;
                        record.rejection = Some(RejectionInfo { code, reason });
                    }
                    // Queued — the poller owns the document now.
                    _ => {}
                }
            }
            Err(TransmissionError::Exhausted { attempts, .. }) => {
                record.attempts.extend(attempts);
                pending_error = Some(EngineError::TransmissionExhausted {
                    access_key: key.clone(),
                    attempts: record.attempts.len() as u32,
                });
            }
            Err(other) => return Err(EngineError::Transmission(other)),
        }

        let status = record.status;
        self.commit(version, record).await?;
        if let Some(err) = pending_error {
            return Err(err);
        }
        tracing::info!(access_key = %key, status = %status, "submission settled");
        Ok(status)
    }

    // ── Poll ─────────────────────────────────────────────────────────

    /// Query the authority once for an in-flight document and apply the
    /// classified result exactly as a submission outcome would be.
    ///
    /// A document no longer in `SUBMITTING` is returned as-is — the
    /// query was a harmless read.
    pub async fn poll_once(&self, key: &AccessKey) -> Result<DocumentStatus, EngineError> {
        let lock = self.lock_for(key);
        {
            let _guard = lock.lock().await;
            let Versioned { value: record, .. } = self.store.load(key).await?;
            if record.status != DocumentStatus::Submitting {
                return Ok(record.status);
            }
        }

        let attempt = self
            .client
            .query(key, self.config.transmission_timeout)
            .await;

        let _guard = lock.lock().await;
        let Versioned {
            version,
            value: mut record,
        } = self.store.load(key).await?;
        if record.status != DocumentStatus::Submitting {
            return Ok(record.status);
        }

        let outcome = attempt.outcome.clone();
        record.attempts.push(attempt);
        match outcome {
            TransmissionOutcome::Authorized {
                protocol,
                authorized_at,
            } => {
                record.try_transition(
                    DocumentStatus::Authorized,
                    Some(format!(
                        "authorized at {authorized_at} with protocol {protocol} (poll)"
                    )),
                )?;
                record.protocol = Some(protocol);
            }
            TransmissionOutcome::Rejected { code, reason } => {
                record.try_transition(
                    DocumentStatus::Rejected,
                    Some(format!("rejected {code}: {reason} (poll)")),
                )?;
                record.rejection = Some(RejectionInfo { code, reason });
            }
            TransmissionOutcome::Indeterminate { .. } => {}
        }

        let status = record.status;
        self.commit(version, record).await?;
        Ok(status)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Close an authorized document (AUTHORIZED → CLOSED).
    pub async fn close(
        &self,
        key: &AccessKey,
        request: ClosureRequest,
    ) -> Result<DocumentStatus, EngineError> {
        self.send_event(key, |sequence, _record| {
            LifecycleEvent::closure(
                key.clone(),
                sequence,
                request.uf,
                request.municipality.clone(),
                request.closed_at,
            )
        })
        .await
    }

    /// Cancel an authorized document (AUTHORIZED → CANCELLED).
    ///
    /// Only valid while the document is `AUTHORIZED` — a registered
    /// closure makes cancellation impossible. The justification must
    /// have at least
    /// [`crate::events::MIN_CANCEL_JUSTIFICATION`] characters.
    pub async fn cancel(
        &self,
        key: &AccessKey,
        justification: &str,
    ) -> Result<DocumentStatus, EngineError> {
        self.send_event(key, |sequence, record| {
            let authorization_protocol =
                record
                    .protocol
                    .clone()
                    .ok_or_else(|| EngineError::CorruptRecord {
                        access_key: key.clone(),
                        reason: "authorized document without protocol".to_string(),
                    })?;
            LifecycleEvent::cancellation(key.clone(), sequence, authorization_protocol, justification)
        })
        .await
    }

    async fn send_event<F>(&self, key: &AccessKey, build: F) -> Result<DocumentStatus, EngineError>
    where
        F: FnOnce(u32, &DocumentRecord) -> Result<LifecycleEvent, EngineError>,
    {
        let lock = self.lock_for(key);
        let guard = lock.lock().await;

        let Versioned { value: record, .. } = self.store.load(key).await?;
        if !record.status.accepts_events() {
            return Err(EngineError::EventNotAllowed {
                access_key: key.clone(),
                status: record.status,
            });
        }

        let sequence = record.next_event_sequence();
        let mut event = build(sequence, &record)?;
        record.verify_event_sequence(event.sequence)?;

        let payload = event.canonical_payload()?;
        let envelope = SignedEnvelope::sign(payload, &self.credential)?;
        event.envelope = Some(envelope.clone());
        drop(guard);

        let result = self
            .client
            .send_event(&envelope, self.config.transmission_timeout)
            .await;

        let _guard = lock.lock().await;
        let Versioned {
            version,
            value: mut record,
        } = self.store.load(key).await?;
        if !record.status.accepts_events() {
            return Err(EngineError::ConcurrentTransition {
                access_key: key.clone(),
            });
        }
        // Another event slipping in between our reads is the same race.
        if record.verify_event_sequence(event.sequence).is_err() {
            return Err(EngineError::ConcurrentTransition {
                access_key: key.clone(),
            });
        }

        let mut pending_error = None;
        match result {
            Ok(attempts) => {
                let last_outcome = attempts.last().map(|a| a.outcome.clone());
                event.attempts = attempts;
                match last_outcome {
                    Some(TransmissionOutcome::Authorized { protocol, .. }) => {
                        event.registered_protocol = Some(protocol.clone());
                        let target = match event.kind {
                            EventKind::Closure { .. } => DocumentStatus::Closed,
                            EventKind::Cancellation { .. } => DocumentStatus::Cancelled,
                        };
                        let name = event.kind.name();
                        record.events.push(event);
                        record.try_transition(
                            target,
                            Some(format!("{name} registered under protocol {protocol}")),
                        )?;
                    }
                    Some(TransmissionOutcome::Rejected { code, reason }) => {
                        // The event did not take effect; the document
                        // keeps its status and the attempt is on record.
                        tracing::warn!(
                            access_key = %key,
                            code,
                            reason = %reason,
                            "lifecycle event rejected"
                        );
                        record.events.push(event);
                        pending_error = Some(EngineError::EventRejected {
                            access_key: key.clone(),
                            code,
                            reason,
                        });
                    }
                    // Indeterminate: recorded, not registered. The
                    // operator re-issues once the authority is reachable.
                    _ => {
                        record.events.push(event);
                    }
                }
            }
            Err(TransmissionError::Exhausted { attempts, .. }) => {
                let total = attempts.len() as u32;
                event.attempts = attempts;
                record.events.push(event);
                pending_error = Some(EngineError::TransmissionExhausted {
                    access_key: key.clone(),
                    attempts: total,
                });
            }
            Err(other) => return Err(EngineError::Transmission(other)),
        }

        let status = record.status;
        self.commit(version, record).await?;
        if let Some(err) = pending_error {
            return Err(err);
        }
        Ok(status)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// The document's current persisted status.
    pub async fn status(&self, key: &AccessKey) -> Result<DocumentStatus, EngineError> {
        Ok(self.store.load(key).await?.value.status)
    }

    /// The full persisted record, for audit.
    pub async fn record(&self, key: &AccessKey) -> Result<DocumentRecord, EngineError> {
        Ok(self.store.load(key).await?.value)
    }

    /// Headline fields parsed back from the frozen canonical form.
    pub async fn summary(&self, key: &AccessKey) -> Result<ManifestSummary, EngineError> {
        let record = self.store.load(key).await?.value;
        Ok(extract_summary(&record.canonical_form()?)?)
    }

    /// Access keys of every document currently in flight.
    pub async fn documents_in_submission(&self) -> Result<Vec<AccessKey>, EngineError> {
        Ok(self
            .store
            .list_by_status(DocumentStatus::Submitting)
            .await?)
    }
}
