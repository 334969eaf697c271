// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fault-injecting broker for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{Broker, BrokerError, Subscription};
use crate::memory::InMemoryBroker;

/// Recorded broker call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    SetString { key: String, value: String },
    GetString { key: String },
    SetTtl { key: String },
    DeleteString { key: String },
    Publish { channel: String, payload: String },
    Subscribe { channel: String },
}

#[derive(Default)]
struct FakeBrokerState {
    calls: Vec<BrokerCall>,
    unavailable: bool,
    drop_publishes: bool,
    latency: Option<Duration>,
}

/// In-memory broker with switchable failures.
///
/// - `set_unavailable(true)` makes every operation fail with
///   [`BrokerError::Unavailable`], as a broker behind a dead network would.
/// - `drop_publishes(true)` accepts publishes but delivers nothing.
/// - `wipe()` forgets every key, as a failover to an empty replica would.
/// - `set_latency` delays every operation.
#[derive(Clone, Default)]
pub struct FakeBroker {
    backing: InMemoryBroker,
    inner: Arc<Mutex<FakeBrokerState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The storage behind the fake, for direct inspection.
    pub fn backing(&self) -> &InMemoryBroker {
        &self.backing
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    pub fn drop_publishes(&self, drop: bool) {
        self.inner.lock().drop_publishes = drop;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    pub fn wipe(&self) {
        self.backing.flush_all();
    }

    /// Replace the value under `key` without recording a call.
    pub async fn overwrite(&self, key: &str, value: &str) {
        let _ = self.backing.set_string(key, value, Duration::from_secs(3600)).await;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    async fn enter(&self, call: BrokerCall) -> Result<(), BrokerError> {
        let latency = {
            let mut state = self.inner.lock();
            state.calls.push(call);
            if state.unavailable {
                return Err(BrokerError::Unavailable("connection refused (fake)".to_string()));
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError> {
        self.enter(BrokerCall::SetString { key: key.to_string(), value: value.to_string() })
            .await?;
        self.backing.set_string(key, value, ttl).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, BrokerError> {
        self.enter(BrokerCall::GetString { key: key.to_string() }).await?;
        self.backing.get_string(key).await
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool, BrokerError> {
        self.enter(BrokerCall::SetTtl { key: key.to_string() }).await?;
        self.backing.set_ttl(key, ttl).await
    }

    async fn delete_string(&self, key: &str) -> Result<bool, BrokerError> {
        self.enter(BrokerCall::DeleteString { key: key.to_string() }).await?;
        self.backing.delete_string(key).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        self.enter(BrokerCall::Publish {
            channel: channel.to_string(),
            payload: payload.to_string(),
        })
        .await?;
        if self.inner.lock().drop_publishes {
            return Ok(());
        }
        self.backing.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        self.enter(BrokerCall::Subscribe { channel: channel.to_string() }).await?;
        self.backing.subscribe(channel).await
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
