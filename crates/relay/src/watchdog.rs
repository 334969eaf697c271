// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker data-loss detection.
//!
//! A reachable broker that failed over to an empty replica answers pings
//! like a healthy one. The watchdog writes a canary key with a random value
//! and periodically reads it back; a value that no longer matches (including
//! a missing key) means the broker forgot state it had acknowledged, and
//! every request bookkept in it is gone.
//!
//! # Loop
//!
//! 1. Pick a fresh canary key and value.
//! 2. Write it until a write succeeds (backing off `retry_interval` between
//!    attempts), then publish a live token to every waiter.
//! 3. Every `watch_interval`, read the canary. A match refreshes its TTL. A
//!    mismatch retracts the token, fires it, and restarts from step 1.
//!
//! Read or refresh errors while established are transient and only logged.

use keel_broker::Broker;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::keys::KeySpace;

/// Errors from waiting on a data-loss token.
///
/// None of these mean data was lost; loss is reported by cancelling the
/// token a caller already holds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataLossError {
    #[error("broker did not become available within {0:?}")]
    TimedOut(std::time::Duration),
    #[error("wait for data-loss token was cancelled")]
    Cancelled,
    #[error("data-loss watchdog has stopped")]
    Stopped,
}

/// The canary currently guarding the broker.
struct Canary {
    key: String,
    value: String,
}

impl Canary {
    fn fresh(keys: &KeySpace) -> Self {
        Self { key: keys.new_canary_key(), value: uuid::Uuid::new_v4().to_string() }
    }
}

enum WatchOutcome {
    Lost { found: Option<String> },
    Stopped,
}

/// Watches one broker for data loss.
///
/// `None` in the shared slot means "not established"; waiters block until a
/// token appears. Dropping the watchdog stops its loop.
pub struct DataLossWatchdog {
    current: watch::Receiver<Option<CancellationToken>>,
    shutdown: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DataLossWatchdog {
    /// Start watching. Must be called within a tokio runtime.
    pub fn start(broker: Arc<dyn Broker>, keys: KeySpace, config: WatchdogConfig) -> Self {
        let (tx, current) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(broker, keys, config, tx, shutdown.clone()));
        Self { current, shutdown, task: parking_lot::Mutex::new(Some(task)) }
    }

    /// True while a canary is established and matching.
    pub fn is_established(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Get the token that fires when the broker loses data.
    ///
    /// Returns immediately once a canary is established; otherwise waits up
    /// to `time_to_wait`. All concurrent callers receive the same token. A
    /// fired token stays fired: call again to get the next one.
    pub async fn token_for_data_loss_detection(
        &self,
        time_to_wait: std::time::Duration,
        cancel: &CancellationToken,
    ) -> Result<CancellationToken, DataLossError> {
        let ready = self.current.borrow().clone();
        if let Some(token) = ready {
            return Ok(token);
        }

        let mut rx = self.current.clone();
        let wait = async move { rx.wait_for(Option::is_some).await.map(|slot| slot.clone()) };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DataLossError::Cancelled),
            waited = tokio::time::timeout(time_to_wait, wait) => match waited {
                Err(_) => Err(DataLossError::TimedOut(time_to_wait)),
                Ok(Ok(Some(token))) => Ok(token),
                Ok(_) => Err(DataLossError::Stopped),
            },
        }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// The current token is not fired: stopping is not data loss.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "data-loss watchdog task failed");
                }
            }
        }
    }
}

impl Drop for DataLossWatchdog {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run `fut` unless shutdown is requested first.
async fn or_shutdown<F: Future>(shutdown: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn run(
    broker: Arc<dyn Broker>,
    keys: KeySpace,
    config: WatchdogConfig,
    tx: watch::Sender<Option<CancellationToken>>,
    shutdown: CancellationToken,
) {
    loop {
        let canary = Canary::fresh(&keys);
        if !establish(broker.as_ref(), &canary, &config, &shutdown).await {
            break;
        }

        let token = CancellationToken::new();
        tx.send_replace(Some(token.clone()));
        info!(key = %canary.key, "broker canary established");

        match watch_canary(broker.as_ref(), &canary, &config, &shutdown).await {
            WatchOutcome::Stopped => break,
            WatchOutcome::Lost { found } => {
                warn!(
                    key = %canary.key,
                    found = ?found,
                    "broker lost data: canary no longer matches, cancelling dependent work"
                );
                // Retract before firing so no caller is handed a dead token.
                tx.send_replace(None);
                token.cancel();
            }
        }
    }
    debug!("data-loss watchdog stopped");
}

/// Write the canary until it sticks. Returns false on shutdown.
async fn establish(
    broker: &dyn Broker,
    canary: &Canary,
    config: &WatchdogConfig,
    shutdown: &CancellationToken,
) -> bool {
    loop {
        let written =
            or_shutdown(shutdown, broker.set_string(&canary.key, &canary.value, config.canary_ttl()));
        match written.await {
            None => return false,
            Some(Ok(())) => return true,
            Some(Err(e)) => {
                warn!(key = %canary.key, error = %e, "cannot write broker canary, retrying");
            }
        }
        if or_shutdown(shutdown, tokio::time::sleep(config.retry_interval())).await.is_none() {
            return false;
        }
    }
}

/// Check the canary every interval until it stops matching.
async fn watch_canary(
    broker: &dyn Broker,
    canary: &Canary,
    config: &WatchdogConfig,
    shutdown: &CancellationToken,
) -> WatchOutcome {
    loop {
        if or_shutdown(shutdown, tokio::time::sleep(config.watch_interval())).await.is_none() {
            return WatchOutcome::Stopped;
        }

        let read = match or_shutdown(shutdown, broker.get_string(&canary.key)).await {
            None => return WatchOutcome::Stopped,
            Some(read) => read,
        };
        match read {
            Ok(Some(value)) if value == canary.value => {
                match or_shutdown(shutdown, broker.set_ttl(&canary.key, config.canary_ttl())).await {
                    None => return WatchOutcome::Stopped,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(key = %canary.key, error = %e, "cannot refresh broker canary TTL");
                    }
                }
            }
            Ok(found) => return WatchOutcome::Lost { found },
            Err(e) => {
                warn!(key = %canary.key, error = %e, "cannot read broker canary, will retry");
            }
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
