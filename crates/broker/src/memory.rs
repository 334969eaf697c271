// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-process broker.
//!
//! Keys expire lazily: an expired entry is dropped the next time it is
//! touched. Pub/sub fans each message out to every live subscription on the
//! channel; subscriptions whose handle was dropped are pruned on publish.
//! Every `SWEEP_EVERY` writes, expired keys and dropped subscriptions are
//! swept from the whole broker so keys and channels that are never touched
//! again do not accumulate. Expiry follows the tokio clock, so paused-time
//! tests can drive it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::broker::{Broker, BrokerError, Subscription};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Writes (sets and subscribes) between full sweeps.
const SWEEP_EVERY: u32 = 64;

#[derive(Default)]
struct State {
    strings: HashMap<String, Entry>,
    channels: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    writes_since_sweep: u32,
}

impl State {
    fn note_write(&mut self) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_EVERY {
            self.writes_since_sweep = 0;
            self.sweep();
        }
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        let (keys, channels) = (self.strings.len(), self.channels.len());
        self.strings.retain(|_, e| e.is_live(now));
        self.channels.retain(|_, subs| {
            subs.retain(|tx| !tx.is_closed());
            !subs.is_empty()
        });
        tracing::trace!(
            expired_keys = keys - self.strings.len(),
            closed_channels = channels - self.channels.len(),
            "swept in-memory broker"
        );
    }

    fn live_entry(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.strings.get(key).is_some_and(|e| !e.is_live(now)) {
            self.strings.remove(key);
        }
        self.strings.get_mut(key)
    }
}

/// Broker held entirely in process memory.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Mutex<State>>,
}

fn check_ttl(ttl: Duration) -> Result<(), BrokerError> {
    if ttl.is_zero() {
        return Err(BrokerError::Command("invalid expire time: 0".to_string()));
    }
    Ok(())
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.lock().strings.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key, as a broker restarted without persistence would.
    /// Subscriptions are left in place.
    pub fn flush_all(&self) {
        self.inner.lock().strings.clear();
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let mut state = self.inner.lock();
        match state.channels.get_mut(channel) {
            Some(subs) => {
                subs.retain(|tx| !tx.is_closed());
                subs.len()
            }
            None => 0,
        }
    }

    /// Remaining time to live of `key`, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.inner.lock();
        let entry = state.live_entry(key)?;
        Some(entry.expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError> {
        check_ttl(ttl)?;
        let entry = Entry { value: value.to_string(), expires_at: Instant::now() + ttl };
        let mut state = self.inner.lock();
        state.strings.insert(key.to_string(), entry);
        state.note_write();
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, BrokerError> {
        Ok(self.inner.lock().live_entry(key).map(|e| e.value.clone()))
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool, BrokerError> {
        check_ttl(ttl)?;
        let mut state = self.inner.lock();
        match state.live_entry(key) {
            Some(entry) => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_string(&self, key: &str) -> Result<bool, BrokerError> {
        let mut state = self.inner.lock();
        let existed = state.live_entry(key).is_some();
        state.strings.remove(key);
        Ok(existed)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.lock();
        if let Some(subs) = state.channels.get_mut(channel) {
            subs.retain(|tx| tx.send(payload.to_string()).is_ok());
            if subs.is_empty() {
                state.channels.remove(channel);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        state.channels.entry(channel.to_string()).or_default().push(tx);
        state.note_write();
        Ok(Subscription::new(channel, rx))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
