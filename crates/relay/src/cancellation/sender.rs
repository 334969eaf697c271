// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use keel_broker::{Broker, BrokerError};
use keel_core::{ActivityId, Endpoint};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CANCELLED_MARKER, CANCELLED_NOTIFICATION};
use crate::config::CancellationConfig;
use crate::keys::KeySpace;

/// Caller side of the cancellation relay.
#[derive(Clone)]
pub struct CancellationSender {
    broker: Arc<dyn Broker>,
    keys: KeySpace,
    config: CancellationConfig,
}

impl CancellationSender {
    pub fn new(broker: Arc<dyn Broker>, keys: KeySpace, config: CancellationConfig) -> Self {
        Self { broker, keys, config }
    }

    /// Tell whoever is processing `activity_id` that the caller abandoned it.
    ///
    /// Never fails: the caller is already tearing down. Errors and the send
    /// timeout are logged. Returns whether the durable marker was written.
    pub async fn try_send_cancellation(&self, endpoint: &Endpoint, activity_id: ActivityId) -> bool {
        let timeout = self.config.send_timeout();
        match tokio::time::timeout(timeout, self.send(endpoint, activity_id)).await {
            Ok(Ok(())) => {
                debug!(%endpoint, activity_id = %activity_id.short(8), "sent request cancellation");
                true
            }
            Ok(Err(e)) => {
                warn!(
                    %endpoint,
                    activity_id = %activity_id.short(8),
                    error = %e,
                    "failed to send request cancellation"
                );
                false
            }
            Err(_) => {
                warn!(
                    %endpoint,
                    activity_id = %activity_id.short(8),
                    ?timeout,
                    "timed out sending request cancellation"
                );
                false
            }
        }
    }

    async fn send(&self, endpoint: &Endpoint, activity_id: ActivityId) -> Result<(), BrokerError> {
        let channel = self.keys.cancellation_channel(endpoint, activity_id);
        if let Err(e) = self.broker.publish(&channel, CANCELLED_NOTIFICATION).await {
            // The marker still reaches a polling watcher.
            warn!(%channel, error = %e, "cancellation publish failed");
        }

        let marker = self.keys.cancellation_marker(endpoint, activity_id);
        self.broker.set_string(&marker, CANCELLED_MARKER, self.config.marker_ttl()).await
    }
}

#[cfg(test)]
#[path = "sender_tests.rs"]
mod tests;
