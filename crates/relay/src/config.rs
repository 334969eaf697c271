// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay configuration.
//!
//! Precedence, lowest first: built-in defaults, a TOML document, then
//! `KEEL_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Default namespace prefixed to every broker key and channel.
pub const DEFAULT_NAMESPACE: &str = "keel";

/// Top-level configuration for the broker relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub namespace: String,
    pub watchdog: WatchdogConfig,
    pub cancellation: CancellationConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            watchdog: WatchdogConfig::default(),
            cancellation: CancellationConfig::default(),
        }
    }
}

/// Data-loss watchdog timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Expiry of the canary key; refreshed on every successful check.
    pub canary_ttl_ms: u64,
    /// Time between canary checks once established.
    pub watch_interval_ms: u64,
    /// Backoff between attempts to establish the canary.
    pub retry_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            canary_ttl_ms: 8 * 60 * 60 * 1000,
            watch_interval_ms: 60 * 1000,
            retry_interval_ms: 1000,
        }
    }
}

impl WatchdogConfig {
    pub fn canary_ttl(&self) -> Duration {
        Duration::from_millis(self.canary_ttl_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn with_canary_ttl(mut self, ttl: Duration) -> Self {
        self.canary_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }
}

/// Cancellation relay timings.
///
/// The marker TTL and the send timeout are unrelated to each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CancellationConfig {
    /// Expiry of a cancellation marker.
    pub marker_ttl_ms: u64,
    /// Upper bound on one `try_send_cancellation` call.
    pub send_timeout_ms: u64,
    /// Time between marker checks on the watching side. Bounds the worst
    /// case delivery latency when a notification is missed.
    pub poll_interval_ms: u64,
    /// Backoff before a watcher retries a failed or closed subscription.
    pub resubscribe_delay_ms: u64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            marker_ttl_ms: 15 * 60 * 1000,
            send_timeout_ms: 2 * 60 * 1000,
            poll_interval_ms: 60 * 1000,
            resubscribe_delay_ms: 1000,
        }
    }
}

impl CancellationConfig {
    pub fn marker_ttl(&self) -> Duration {
        Duration::from_millis(self.marker_ttl_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }

    pub fn with_marker_ttl(mut self, ttl: Duration) -> Self {
        self.marker_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay_ms = delay.as_millis() as u64;
        self
    }
}

fn env_ms(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

impl RelayConfig {
    /// Load from a TOML file, then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)?.with_env_overrides().validated()
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `KEEL_*` environment variables. Unparsable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(ns) = std::env::var("KEEL_NAMESPACE") {
            self.namespace = ns;
        }
        let overrides: [(&str, &mut u64); 7] = [
            ("KEEL_CANARY_TTL_MS", &mut self.watchdog.canary_ttl_ms),
            ("KEEL_CANARY_WATCH_INTERVAL_MS", &mut self.watchdog.watch_interval_ms),
            ("KEEL_CANARY_RETRY_MS", &mut self.watchdog.retry_interval_ms),
            ("KEEL_CANCEL_MARKER_TTL_MS", &mut self.cancellation.marker_ttl_ms),
            ("KEEL_CANCEL_SEND_TIMEOUT_MS", &mut self.cancellation.send_timeout_ms),
            ("KEEL_CANCEL_POLL_INTERVAL_MS", &mut self.cancellation.poll_interval_ms),
            ("KEEL_CANCEL_RESUBSCRIBE_MS", &mut self.cancellation.resubscribe_delay_ms),
        ];
        for (name, field) in overrides {
            if let Some(ms) = env_ms(name) {
                *field = ms;
            }
        }
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Reject values the relay cannot run with.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        let durations = [
            ("watchdog.canary_ttl_ms", self.watchdog.canary_ttl_ms),
            ("watchdog.watch_interval_ms", self.watchdog.watch_interval_ms),
            ("watchdog.retry_interval_ms", self.watchdog.retry_interval_ms),
            ("cancellation.marker_ttl_ms", self.cancellation.marker_ttl_ms),
            ("cancellation.send_timeout_ms", self.cancellation.send_timeout_ms),
            ("cancellation.poll_interval_ms", self.cancellation.poll_interval_ms),
            ("cancellation.resubscribe_delay_ms", self.cancellation.resubscribe_delay_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        // The canary must outlive the gap between two checks, or a healthy
        // broker reads as data loss on every check.
        if self.watchdog.canary_ttl_ms <= self.watchdog.watch_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "watchdog.canary_ttl_ms ({}) must exceed watchdog.watch_interval_ms ({})",
                self.watchdog.canary_ttl_ms, self.watchdog.watch_interval_ms
            )));
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
