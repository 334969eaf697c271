// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation relay
//!
//! Carries "the caller gave up" from the process that enqueued a request to
//! the process currently working on it. The sender publishes one notification
//! and writes a marker key; the watcher listens for the notification and polls
//! for the marker, so a notification published before the watcher subscribed
//! is still observed within one poll interval.

mod sender;
mod watcher;

pub use sender::CancellationSender;
pub use watcher::CancellationWatcher;

/// Payload published on a cancellation channel.
pub const CANCELLED_NOTIFICATION: &str = "cancelled";

/// Value stored under a cancellation marker. Only its presence matters.
pub const CANCELLED_MARKER: &str = "1";
