//! # Status Poller
//!
//! Background loop over every document left in `SUBMITTING` after a
//! synchronous submission: each sweep queries the authority for each
//! in-flight document and drives the state machine exactly as a
//! submission outcome would.
//!
//! A document that stays indeterminate beyond the configured poll cap is
//! surfaced as a [`PollerAlert::StatusUnresolved`] for operator
//! attention and skipped from further sweeps — it remains `SUBMITTING`
//! in the store and queryable on the next process start; the poller
//! never loops on it forever.
//!
//! Shutdown is cooperative: the signal is observed between sweeps, an
//! in-flight sweep completes before the task exits, and pending timers
//! die with the task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::document::DocumentStatus;
use crate::service::LifecycleService;
use mdfe_core::AccessKey;

/// Poller configuration, explicitly constructed and passed in.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Maximum polls per document before it is escalated.
    pub max_polls_per_document: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_polls_per_document: 20,
        }
    }
}

/// Operator-facing escalations emitted by the poller.
#[derive(Debug, Clone)]
pub enum PollerAlert {
    /// A document exceeded the poll cap without the authority settling
    /// it.
    StatusUnresolved {
        /// The document's access key.
        access_key: AccessKey,
        /// How many polls were made.
        polls: u32,
    },
}

/// Handle to a running poller: signals shutdown and awaits the task.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the poller: the current sweep finishes, pending timers are
    /// dropped, and the task exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

/// The status poller.
pub struct StatusPoller;

impl StatusPoller {
    /// Spawn the polling loop.
    ///
    /// Returns the shutdown handle and the alert channel. Dropping the
    /// receiver does not stop the poller; alerts are then only logged.
    pub fn spawn(
        service: Arc<LifecycleService>,
        config: PollerConfig,
    ) -> (PollerHandle, mpsc::Receiver<PollerAlert>) {
        let (alert_tx, alert_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut polls: HashMap<String, u32> = HashMap::new();
            let mut unresolved: HashSet<String> = HashSet::new();
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately;
            // consume it so the first sweep happens one interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        sweep(&service, &config, &alert_tx, &mut polls, &mut unresolved).await;
                    }
                }
            }
            tracing::info!("status poller stopped");
        });

        (
            PollerHandle {
                shutdown: shutdown_tx,
                join,
            },
            alert_rx,
        )
    }
}

async fn sweep(
    service: &LifecycleService,
    config: &PollerConfig,
    alerts: &mpsc::Sender<PollerAlert>,
    polls: &mut HashMap<String, u32>,
    unresolved: &mut HashSet<String>,
) {
    let keys = match service.documents_in_submission().await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!(error = %e, "poller could not list in-flight documents");
            return;
        }
    };

    for key in keys {
        let key_str = key.as_str().to_string();
        if unresolved.contains(&key_str) {
            continue;
        }

        let count = polls.entry(key_str.clone()).or_insert(0);
        if *count >= config.max_polls_per_document {
            let err = crate::error::EngineError::StatusUnresolved {
                access_key: key.clone(),
                polls: *count,
            };
            tracing::error!(error = %err, "poll cap reached, escalating");
            unresolved.insert(key_str);
            let _ = alerts
                .send(PollerAlert::StatusUnresolved {
                    access_key: key,
                    polls: *count,
                })
                .await;
            continue;
        }
        *count += 1;

        match service.poll_once(&key).await {
            Ok(DocumentStatus::Submitting) => {
                tracing::debug!(access_key = %key, polls = *count, "still in flight");
            }
            Ok(status) => {
                tracing::info!(access_key = %key, status = %status, "poll settled document");
                polls.remove(&key_str);
            }
            Err(e) => {
                tracing::warn!(access_key = %key, error = %e, "poll failed");
            }
        }
    }
}
