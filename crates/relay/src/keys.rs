// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker key and channel naming.
//!
//! Only senders and watchers of the same deployment need to agree on these
//! names; they are not an external contract.

use keel_core::{ActivityId, Endpoint};

/// Namespaced names for every key and channel the relay touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `<ns>:canary:<uuid>`, fresh on every call.
    pub fn new_canary_key(&self) -> String {
        format!("{}:canary:{}", self.namespace, uuid::Uuid::new_v4())
    }

    /// `<ns>:cancel:<endpoint>:<activity>`
    pub fn cancellation_marker(&self, endpoint: &Endpoint, activity_id: ActivityId) -> String {
        format!("{}:cancel:{}:{}", self.namespace, endpoint, activity_id)
    }

    /// `<ns>:cancel-channel:<endpoint>:<activity>`
    pub fn cancellation_channel(&self, endpoint: &Endpoint, activity_id: ActivityId) -> String {
        format!("{}:cancel-channel:{}:{}", self.namespace, endpoint, activity_id)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_NAMESPACE)
    }
}

impl From<&crate::RelayConfig> for KeySpace {
    fn from(config: &crate::RelayConfig) -> Self {
        Self::new(config.namespace.clone())
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
