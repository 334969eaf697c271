// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue message envelopes.
//!
//! Wire format: `{"type": <message type>, "message": <payload>}` as JSON,
//! passed through the configured [`TransformChain`]. Any [`DataStream`] in
//! the payload is written as `{"id", "length"}` and returned alongside the
//! bytes so its content can travel out of band.

use keel_core::{capture_streams, DataStream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::type_name;

use crate::transform::TransformChain;
use crate::ProtocolError;

/// Wrapper binding a payload to the exact type it was written as.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub message_type: String,
    pub message: T,
}

impl<T> Envelope<T> {
    pub fn new(message: T) -> Self {
        Self { message_type: message_type_of::<T>().to_string(), message }
    }
}

/// The tag written for messages of type `T`.
///
/// Stable for a given build; sender and receiver of one deployment share it.
/// The tag is the full type name, wrappers included: a `Box<Req>` is tagged
/// differently from a `Req` even though its JSON is identical.
pub fn message_type_of<T: ?Sized>() -> &'static str {
    type_name::<T>()
}

/// Serializes request and response messages for broker queues.
#[derive(Debug, Clone, Default)]
pub struct QueueMessageSerializer {
    transforms: TransformChain,
}

impl QueueMessageSerializer {
    pub fn new(transforms: TransformChain) -> Self {
        Self { transforms }
    }

    pub fn transforms(&self) -> &TransformChain {
        &self.transforms
    }

    /// Serialize `message`, returning the wire bytes and every data stream
    /// found in it.
    ///
    /// The envelope is tagged with `T` exactly as written (see
    /// [`message_type_of`]); read it back with the same `T`. Pass `&*boxed`
    /// rather than `&boxed` to tag a boxed message as its inner type.
    pub fn write_message<T: Serialize>(
        &self,
        message: &T,
    ) -> Result<(Vec<u8>, Vec<DataStream>), ProtocolError> {
        let envelope = Envelope { message_type: message_type_of::<T>().to_string(), message };
        let mut bytes = Vec::new();
        let (written, streams) = capture_streams(|| -> Result<(), ProtocolError> {
            let mut layer = self.transforms.writer(&mut bytes)?;
            serde_json::to_writer(&mut layer, &envelope)?;
            layer.finish()?;
            Ok(())
        });
        written?;
        tracing::trace!(
            message_type = %envelope.message_type,
            bytes = bytes.len(),
            streams = streams.len(),
            "wrote queue message"
        );
        Ok((bytes, streams))
    }

    /// Deserialize a message written for type `T`.
    ///
    /// Returned streams are placeholders without a writer; attach a reader
    /// to each (see [`crate::transfer::read_data_stream`]) before use.
    pub fn read_message<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<(T, Vec<DataStream>), ProtocolError> {
        let reader = self.transforms.reader(bytes)?;
        let envelope: Option<Envelope<serde_json::Value>> = serde_json::from_reader(reader)?;
        let envelope = envelope.ok_or(ProtocolError::NullEnvelope)?;

        let expected = message_type_of::<T>();
        if envelope.message_type != expected {
            return Err(ProtocolError::TypeMismatch {
                expected: expected.to_string(),
                found: envelope.message_type,
            });
        }

        let (message, streams) =
            capture_streams(|| serde_json::from_value::<T>(envelope.message));
        Ok((message?, streams))
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
