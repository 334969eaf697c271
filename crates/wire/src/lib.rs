// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue message serialization for broker-relayed requests.
//!
//! Wire format: JSON envelope tagged with the message type, wrapped by an
//! ordered transform chain (e.g. zstd). Binary payloads travel out of band.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
pub mod transfer;
mod transform;

use keel_core::{DataStreamError, DataStreamId};
use thiserror::Error;

pub use envelope::{message_type_of, Envelope, QueueMessageSerializer};
pub use transfer::{read_data_stream, rewire_for_forwarding, write_data_stream, TempFileReader};
pub use transform::{StreamTransform, TransformChain, WriteLayer, ZstdCompression, DEFAULT_ZSTD_LEVEL};

/// Errors from serializing or transferring queue messages.
///
/// None of these are transient: they indicate a protocol or versioning
/// defect and are surfaced to the caller without retry.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message envelope was null")]
    NullEnvelope,

    #[error("message type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("data stream {id} declared {declared} bytes but carried {actual}")]
    LengthMismatch { id: DataStreamId, declared: u64, actual: u64 },

    #[error("unexpected data stream {0}")]
    UnexpectedStream(DataStreamId),

    #[error(transparent)]
    DataStream(#[from] DataStreamError),
}
