// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use keel_broker::Broker;
use keel_core::{ActivityId, Endpoint};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CancellationConfig;
use crate::keys::KeySpace;

/// Which path observed the cancellation. Logged only.
#[derive(Debug, Clone, Copy)]
enum Observed {
    Notification,
    Marker,
}

/// State shared between the watcher handle and its background task.
struct Signal {
    request_cancelled: CancellationToken,
    sender_cancelled: AtomicBool,
}

impl Signal {
    /// Returns true for the first caller only.
    fn fire(&self, observed: Observed, activity_id: ActivityId) -> bool {
        if self.sender_cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(
            activity_id = %activity_id.short(8),
            via = ?observed,
            "request cancelled by its sender"
        );
        self.request_cancelled.cancel();
        true
    }
}

/// Processing side of the cancellation relay, one per in-flight request.
///
/// Fires [`request_cancelled_token`](Self::request_cancelled_token) once the
/// sender cancels the request, then stops watching. Dropping the watcher
/// stops the background task without awaiting it; prefer
/// [`dispose`](Self::dispose).
pub struct CancellationWatcher {
    signal: Arc<Signal>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CancellationWatcher {
    /// Start watching. Must be called within a tokio runtime.
    pub fn start(
        broker: Arc<dyn Broker>,
        keys: &KeySpace,
        config: &CancellationConfig,
        endpoint: &Endpoint,
        activity_id: ActivityId,
    ) -> Self {
        let signal = Arc::new(Signal {
            request_cancelled: CancellationToken::new(),
            sender_cancelled: AtomicBool::new(false),
        });
        let shutdown = CancellationToken::new();
        let watch = Watch {
            broker,
            channel: keys.cancellation_channel(endpoint, activity_id),
            marker: keys.cancellation_marker(endpoint, activity_id),
            activity_id,
            config: config.clone(),
        };
        let task = tokio::spawn(watch.run(Arc::clone(&signal), shutdown.clone()));
        Self { signal, shutdown, task: Some(task) }
    }

    /// Fires when the sender cancels the request.
    ///
    /// Combine it with the processing operation's own cancellation; it is one
    /// more cancellation source.
    pub fn request_cancelled_token(&self) -> CancellationToken {
        self.signal.request_cancelled.clone()
    }

    pub fn sender_cancelled_the_request(&self) -> bool {
        self.signal.sender_cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the sender cancels the request.
    pub async fn cancelled(&self) {
        self.signal.request_cancelled.cancelled().await;
    }

    /// Stop watching and wait for the background task to finish.
    ///
    /// Teardown errors are logged, never returned. Does not fire the request
    /// token.
    pub async fn dispose(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "cancellation watcher task failed during dispose");
                }
            }
        }
    }
}

impl Drop for CancellationWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Watch {
    broker: Arc<dyn Broker>,
    channel: String,
    marker: String,
    activity_id: ActivityId,
    config: CancellationConfig,
}

impl Watch {
    async fn run(self, signal: Arc<Signal>, shutdown: CancellationToken) {
        let observed = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            () = self.listen() => Some(Observed::Notification),
            () = self.poll() => Some(Observed::Marker),
        };
        if let Some(observed) = observed {
            signal.fire(observed, self.activity_id);
        }
        debug!(activity_id = %self.activity_id.short(8), "cancellation watcher stopped");
    }

    /// Resolves on the first message on the channel. Any payload counts.
    async fn listen(&self) {
        loop {
            match self.broker.subscribe(&self.channel).await {
                Ok(mut subscription) => {
                    if subscription.next().await.is_some() {
                        return;
                    }
                    debug!(channel = %self.channel, "cancellation subscription closed");
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "cannot subscribe for cancellation");
                }
            }
            tokio::time::sleep(self.config.resubscribe_delay()).await;
        }
    }

    /// Resolves once the marker is present. Checks immediately, then every
    /// poll interval.
    async fn poll(&self) {
        loop {
            match self.broker.get_string(&self.marker).await {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => {
                    debug!(marker = %self.marker, error = %e, "cannot check cancellation marker");
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
