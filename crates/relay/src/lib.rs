// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-relay: reliability around a shared broker.
//!
//! - [`DataLossWatchdog`] turns "the broker silently forgot its state" into a
//!   fired cancellation token.
//! - [`CancellationSender`] and [`CancellationWatcher`] carry a caller's
//!   cancellation to the process working on its request.

pub mod cancellation;
mod config;
mod keys;
mod watchdog;

pub use cancellation::{CancellationSender, CancellationWatcher};
pub use config::{CancellationConfig, ConfigError, RelayConfig, WatchdogConfig, DEFAULT_NAMESPACE};
pub use keys::KeySpace;
pub use watchdog::{DataLossError, DataLossWatchdog};
