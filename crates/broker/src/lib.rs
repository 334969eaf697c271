// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-broker: the key-value + pub/sub operations the relay layer needs,
//! with in-memory and Redis backends.

mod broker;
mod memory;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake;

#[cfg(feature = "redis")]
mod redis_backend;

pub use broker::{Broker, BrokerError, Subscription};
pub use memory::InMemoryBroker;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BrokerCall, FakeBroker};

#[cfg(feature = "redis")]
pub use redis_backend::RedisBroker;
