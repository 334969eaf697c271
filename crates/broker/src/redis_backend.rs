// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed broker.
//!
//! Commands go through a shared auto-reconnecting connection manager. Each
//! subscription opens its own pub/sub connection, owned by a forwarding task
//! that stops when the [`Subscription`] handle is dropped.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerError, Subscription};

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
        {
            BrokerError::Unavailable(e.to_string())
        } else {
            BrokerError::Command(e.to_string())
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    ttl.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Broker over a Redis server.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBroker {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!(%url, "connected to redis");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let updated: bool =
            redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)).query_async(&mut conn).await?;
        Ok(updated)
    }

    async fn delete_string(&self, key: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let receivers: u64 =
            redis::cmd("PUBLISH").arg(channel).arg(payload).query_async(&mut conn).await?;
        tracing::trace!(%channel, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let guard = stop.clone().drop_guard();
        let name = channel.to_string();

        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            tracing::debug!(channel = %name, "redis subscription stream ended");
                            break;
                        };
                        match msg.get_payload::<String>() {
                            Ok(payload) => {
                                if tx.send(payload).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(channel = %name, error = %e, "undecodable pub/sub payload");
                            }
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(channel, rx).with_guard(guard))
    }
}
