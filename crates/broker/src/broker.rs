// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

/// Errors from broker operations.
///
/// The relay treats all of these as transient: a broker that cannot answer
/// right now may answer later. Only an explicit canary mismatch is treated
/// as data loss, and that is decided above this layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("broker command failed: {0}")]
    Command(String),
    #[error("broker connection closed")]
    Closed,
}

/// The operations the relay layer needs from a shared key-value + pub/sub
/// broker.
///
/// Implementations are shared across many requests and must not assume
/// exclusive access to the underlying connection.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError>;

    /// Read `key`; `None` when absent or expired.
    async fn get_string(&self, key: &str) -> Result<Option<String>, BrokerError>;

    /// Reset the expiry of `key`. Returns false when the key does not exist.
    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool, BrokerError>;

    /// Remove `key`. Returns false when the key did not exist.
    async fn delete_string(&self, key: &str) -> Result<bool, BrokerError>;

    /// Fire-and-forget publish. Succeeds with zero subscribers.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    /// Subscribe to `channel`. The subscription is live when this returns;
    /// dropping the handle unsubscribes.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;
}

/// A live channel subscription.
///
/// Messages published after the subscription was established are delivered
/// in order. `next` returns `None` once the broker side has gone away; the
/// caller decides whether to resubscribe.
pub struct Subscription {
    channel: String,
    rx: mpsc::UnboundedReceiver<String>,
    _guard: Option<DropGuard>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self { channel: channel.into(), rx, _guard: None }
    }

    /// Tie a background forwarding task's lifetime to this handle.
    pub fn with_guard(mut self, guard: DropGuard) -> Self {
        self._guard = Some(guard);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message on the channel.
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("channel", &self.channel).finish()
    }
}
