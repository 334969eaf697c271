// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Out-of-band binary payloads.
//!
//! A [`DataStream`] is an identity plus a declared length. The bytes
//! themselves are reached through two capabilities that are attached
//! independently:
//!
//! - a *writer* produces the bytes; the side that created the stream has one.
//! - a *reader* consumes bytes that already crossed the wire; the receiving
//!   transport attaches one.
//!
//! A stream decoded from a message has neither until the transport wires in a
//! reader. Before such a stream can be sent onward it needs a writer again,
//! which [`DataStream::enable_forwarding`] provides by streaming from its
//! reader.
//!
//! When serialized, a `DataStream` emits only `{"id", "length"}`. Inside a
//! [`capture_streams`] scope every stream serialized or deserialized is also
//! collected, so the envelope codec can hand them to the binary transfer.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;

use crate::id::DataStreamId;

/// Errors from data stream operations
#[derive(Debug, Error)]
pub enum DataStreamError {
    #[error("data stream {0} has no writer attached")]
    NoWriter(DataStreamId),
    #[error("data stream {0} has no reader attached")]
    NoReader(DataStreamId),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Produces the bytes of a stream.
pub trait DataStreamWriter: Send + Sync {
    fn write_to(&self, dest: &mut dyn Write) -> io::Result<()>;
}

impl<F> DataStreamWriter for F
where
    F: Fn(&mut dyn Write) -> io::Result<()> + Send + Sync,
{
    fn write_to(&self, dest: &mut dyn Write) -> io::Result<()> {
        self(dest)
    }
}

/// Consumes the bytes of a stream that has been received.
///
/// Implementations must be readable more than once so a received stream can
/// be both inspected locally and forwarded.
pub trait DataStreamReader: Send + Sync {
    fn read_into(&self, dest: &mut dyn Write) -> io::Result<()>;
}

/// Writer that replays whatever the reader of a received stream yields.
struct ForwardingWriter(Arc<dyn DataStreamReader>);

impl DataStreamWriter for ForwardingWriter {
    fn write_to(&self, dest: &mut dyn Write) -> io::Result<()> {
        self.0.read_into(dest)
    }
}

struct Inner {
    id: DataStreamId,
    length: u64,
    writer: RwLock<Option<Arc<dyn DataStreamWriter>>>,
    reader: RwLock<Option<Arc<dyn DataStreamReader>>>,
}

/// A named binary payload kept out of the JSON body.
///
/// Clones share identity and attached capabilities: attaching a reader to
/// the copy returned by the codec is visible through the copy embedded in the
/// decoded message.
#[derive(Clone)]
pub struct DataStream {
    inner: Arc<Inner>,
}

impl DataStream {
    /// Create a stream of `length` bytes produced by `writer`.
    pub fn from_writer(length: u64, writer: impl DataStreamWriter + 'static) -> Self {
        let stream = Self::placeholder(DataStreamId::new(), length);
        stream.attach_writer(writer);
        stream
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into().into();
        let length = bytes.len() as u64;
        Self::from_writer(length, move |dest: &mut dyn Write| dest.write_all(&bytes))
    }

    /// A stream known only by identity and declared length.
    pub fn placeholder(id: DataStreamId, length: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                length,
                writer: RwLock::new(None),
                reader: RwLock::new(None),
            }),
        }
    }

    pub fn id(&self) -> DataStreamId {
        self.inner.id
    }

    pub fn length(&self) -> u64 {
        self.inner.length
    }

    pub fn has_writer(&self) -> bool {
        self.inner.writer.read().is_some()
    }

    pub fn has_reader(&self) -> bool {
        self.inner.reader.read().is_some()
    }

    pub fn attach_writer(&self, writer: impl DataStreamWriter + 'static) {
        *self.inner.writer.write() = Some(Arc::new(writer));
    }

    pub fn attach_reader(&self, reader: impl DataStreamReader + 'static) {
        *self.inner.reader.write() = Some(Arc::new(reader));
    }

    /// Write the stream's bytes using its attached writer.
    pub fn write_to(&self, dest: &mut dyn Write) -> Result<(), DataStreamError> {
        let writer =
            self.inner.writer.read().clone().ok_or(DataStreamError::NoWriter(self.id()))?;
        writer.write_to(dest)?;
        Ok(())
    }

    /// Read the received bytes using the attached reader.
    pub fn read_into(&self, dest: &mut dyn Write) -> Result<(), DataStreamError> {
        let reader =
            self.inner.reader.read().clone().ok_or(DataStreamError::NoReader(self.id()))?;
        reader.read_into(dest)?;
        Ok(())
    }

    /// Convenience for small payloads: read everything into memory.
    pub fn read_to_vec(&self) -> Result<Vec<u8>, DataStreamError> {
        let mut buf = Vec::with_capacity(self.length().min(64 * 1024) as usize);
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Give a received stream a writer that streams from its reader, so it
    /// can be re-sent on another hop.
    ///
    /// A stream that already has a writer is left as is.
    pub fn enable_forwarding(&self) -> Result<(), DataStreamError> {
        if self.has_writer() {
            return Ok(());
        }
        let reader =
            self.inner.reader.read().clone().ok_or(DataStreamError::NoReader(self.id()))?;
        *self.inner.writer.write() = Some(Arc::new(ForwardingWriter(reader)));
        Ok(())
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("id", &self.inner.id)
            .field("length", &self.inner.length)
            .field("has_writer", &self.has_writer())
            .field("has_reader", &self.has_reader())
            .finish()
    }
}

impl PartialEq for DataStream {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id && self.inner.length == other.inner.length
    }
}

impl Eq for DataStream {}

/// The JSON shape of a stream inside a message body.
#[derive(Serialize, Deserialize)]
struct StreamRef {
    id: DataStreamId,
    length: u64,
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<DataStream>>> = const { RefCell::new(None) };
}

fn record(stream: &DataStream) {
    CAPTURED.with(|captured| {
        if let Some(streams) = captured.borrow_mut().as_mut() {
            streams.push(stream.clone());
        }
    });
}

/// Restores the enclosing scope's capture list, even when `f` unwinds.
struct CaptureScope {
    outer: Option<Vec<DataStream>>,
}

impl CaptureScope {
    fn enter() -> Self {
        let outer = CAPTURED.with(|captured| captured.borrow_mut().replace(Vec::new()));
        Self { outer }
    }

    fn collected(&mut self) -> Vec<DataStream> {
        CAPTURED.with(|captured| captured.borrow_mut().replace(Vec::new())).unwrap_or_default()
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        let outer = self.outer.take();
        CAPTURED.with(|captured| *captured.borrow_mut() = outer);
    }
}

/// Run a synchronous (de)serialization and collect every [`DataStream`] it
/// touched, in the order encountered.
///
/// Scopes nest: streams seen by an inner scope are not reported to the outer
/// one.
pub fn capture_streams<R>(f: impl FnOnce() -> R) -> (R, Vec<DataStream>) {
    let mut scope = CaptureScope::enter();
    let result = f();
    let streams = scope.collected();
    (result, streams)
}

impl Serialize for DataStream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        record(self);
        StreamRef { id: self.inner.id, length: self.inner.length }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataStream {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let StreamRef { id, length } = StreamRef::deserialize(deserializer)?;
        let stream = DataStream::placeholder(id, length);
        record(&stream);
        Ok(stream)
    }
}

#[cfg(test)]
#[path = "data_stream_tests.rs"]
mod tests;
