//! # Transmission Client
//!
//! Wraps an [`AuthorityAdapter`] with the transmission discipline the
//! lifecycle engine relies on:
//!
//! - every call carries a caller-supplied timeout, and a timeout is
//!   classified `Indeterminate` — it says nothing about the
//!   authority-side result;
//! - transport-level failures are retried with exponential backoff up to
//!   the policy cap, retransmitting the *identical* signed payload (the
//!   envelope is never re-signed, so the authority cannot observe two
//!   distinct documents for one access key);
//! - a queued response stops the retry loop immediately — from there the
//!   status poller owns the document;
//! - exhausting the cap with only indeterminate outcomes surfaces as
//!   [`TransmissionError::Exhausted`] carrying the full attempt trail,
//!   never a silent drop.

use std::sync::Arc;
use std::time::Duration;

use mdfe_core::AccessKey;
use mdfe_crypto::SignedEnvelope;

use crate::adapter::{AuthorityAdapter, AuthorityResponse, TransportFailure};
use crate::error::TransmissionError;
use crate::outcome::{
    classify, classify_transport, Operation, TransmissionAttempt, TransmissionOutcome,
    STATUS_BATCH_IN_PROCESS, STATUS_BATCH_RECEIVED,
};
use crate::retry::RetryPolicy;

/// The transmission client: adapter + retry policy.
pub struct TransmissionClient {
    adapter: Arc<dyn AuthorityAdapter>,
    policy: RetryPolicy,
}

impl TransmissionClient {
    /// Create a client over an adapter with the given retry policy.
    pub fn new(adapter: Arc<dyn AuthorityAdapter>, policy: RetryPolicy) -> Self {
        Self { adapter, policy }
    }

    /// Submit a signed document, retrying per policy.
    ///
    /// Returns the full attempt trail, final attempt last. The trail is
    /// never empty on `Ok`.
    pub async fn submit(
        &self,
        envelope: &SignedEnvelope,
        timeout: Duration,
    ) -> Result<Vec<TransmissionAttempt>, TransmissionError> {
        self.run_with_retry(Operation::Submit, timeout, || self.adapter.submit(envelope))
            .await
    }

    /// Send a signed lifecycle event, retrying per policy.
    pub async fn send_event(
        &self,
        envelope: &SignedEnvelope,
        timeout: Duration,
    ) -> Result<Vec<TransmissionAttempt>, TransmissionError> {
        self.run_with_retry(Operation::Event, timeout, || {
            self.adapter.send_event(envelope)
        })
        .await
    }

    /// Query the situation of an access key — one shot, no retry.
    ///
    /// Queries are idempotent and side-effect-free on the authority; the
    /// status poller owns repetition, so a failed query is simply an
    /// `Indeterminate` attempt.
    pub async fn query(&self, key: &AccessKey, timeout: Duration) -> TransmissionAttempt {
        let outcome = match tokio::time::timeout(timeout, self.adapter.query(key)).await {
            Err(_) => TransmissionOutcome::Indeterminate {
                reason: format!("query timed out after {timeout:?}"),
            },
            Ok(Err(failure)) => classify_transport(&failure),
            Ok(Ok(response)) => classify(&response),
        };
        TransmissionAttempt::record(Operation::Query, outcome)
    }

    /// Query the authority service health, bounded by `timeout`.
    pub async fn service_status(
        &self,
        timeout: Duration,
    ) -> Result<AuthorityResponse, TransportFailure> {
        match tokio::time::timeout(timeout, self.adapter.service_status()).await {
            Err(_) => Err(TransportFailure::timeout(format!(
                "service status timed out after {timeout:?}"
            ))),
            Ok(result) => result,
        }
    }

    async fn run_with_retry<F, Fut>(
        &self,
        operation: Operation,
        timeout: Duration,
        call: F,
    ) -> Result<Vec<TransmissionAttempt>, TransmissionError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<AuthorityResponse, TransportFailure>>,
    {
        let mut attempts = Vec::new();

        for attempt_no in 0..self.policy.max_attempts {
            let result = match tokio::time::timeout(timeout, call()).await {
                Err(_) => Err(TransportFailure::timeout(format!(
                    "{operation} timed out after {timeout:?}"
                ))),
                Ok(inner) => inner,
            };

            match result {
                Ok(response) => {
                    let queued = is_queued(&response);
                    let outcome = classify(&response);
                    let terminal = outcome.is_terminal();
                    attempts.push(TransmissionAttempt::record(operation, outcome));
                    if terminal || queued {
                        // Terminal outcomes end the operation; a queued
                        // acknowledgement hands the document to the poller.
                        return Ok(attempts);
                    }
                }
                Err(failure) => {
                    attempts.push(TransmissionAttempt::record(
                        operation,
                        classify_transport(&failure),
                    ));
                }
            }

            if attempt_no + 1 < self.policy.max_attempts {
                let delay = self.policy.delay_before_retry(attempt_no);
                tracing::warn!(
                    %operation,
                    attempt = attempt_no + 1,
                    max_attempts = self.policy.max_attempts,
                    adapter = self.adapter.adapter_name(),
                    "transmission attempt indeterminate, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            %operation,
            attempts = attempts.len(),
            adapter = self.adapter.adapter_name(),
            "transmission exhausted with only indeterminate outcomes"
        );
        Err(TransmissionError::Exhausted {
            operation,
            attempts,
        })
    }
}

/// Whether a response is a queued acknowledgement (authority took the
/// payload and will process it asynchronously).
fn is_queued(response: &AuthorityResponse) -> bool {
    matches!(
        response.status_code,
        STATUS_BATCH_RECEIVED | STATUS_BATCH_IN_PROCESS
    )
}
