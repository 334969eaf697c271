// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Out-of-band transfer of data stream content.
//!
//! Frame layout:
//!
//! ```text
//! id (16 bytes) | declared length (u64 BE) | chunk* | 0u32
//! chunk = len (u32 BE, non-zero) | len bytes
//! ```
//!
//! The body is written through the stream's own transform chain, so every
//! stream is compressed independently. Chunking bounds the body without
//! knowing its compressed size up front. Received content is spooled to a
//! temporary file rather than held in memory.

use keel_core::{DataStream, DataStreamId, DataStreamReader};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::transform::TransformChain;
use crate::ProtocolError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Buffers writes into length-prefixed chunks.
struct ChunkWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> ChunkWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, buf: Vec::with_capacity(CHUNK_SIZE) }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.inner.write_all(&(self.buf.len() as u32).to_be_bytes())?;
        self.inner.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Emit buffered bytes and the terminator.
    fn finish(mut self) -> io::Result<()> {
        self.emit()?;
        self.inner.write_all(&0u32.to_be_bytes())?;
        self.inner.flush()
    }
}

impl<W: Write> Write for ChunkWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == CHUNK_SIZE {
            self.emit()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit()?;
        self.inner.flush()
    }
}

/// Yields chunk contents until the terminator, then EOF.
struct ChunkReader<R: Read> {
    inner: R,
    remaining: usize,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, remaining: 0, done: false }
    }
}

impl<R: Read> Read for ChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            let mut len = [0u8; 4];
            self.inner.read_exact(&mut len)?;
            self.remaining = u32::from_be_bytes(len) as usize;
            if self.remaining == 0 {
                self.done = true;
                return Ok(0);
            }
        }
        let want = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk"));
        }
        self.remaining -= n;
        Ok(n)
    }
}

struct Counting<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for Counting<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader over content spooled to an anonymous temporary file.
///
/// The file is removed by the OS once the last handle is dropped.
pub struct TempFileReader {
    file: Mutex<File>,
    length: u64,
}

impl TempFileReader {
    pub fn length(&self) -> u64 {
        self.length
    }
}

impl DataStreamReader for TempFileReader {
    fn read_into(&self, dest: &mut dyn Write) -> io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut limited = (&mut *file).take(self.length);
        io::copy(&mut limited, dest)?;
        Ok(())
    }
}

/// Send one stream's content.
///
/// Fails with [`ProtocolError::LengthMismatch`] when the stream's writer
/// produces a different number of bytes than it declared.
pub fn write_data_stream(
    stream: &DataStream,
    dest: &mut dyn Write,
    transforms: &TransformChain,
) -> Result<(), ProtocolError> {
    dest.write_all(stream.id().as_uuid().as_bytes())?;
    dest.write_all(&stream.length().to_be_bytes())?;

    let mut chunks = ChunkWriter::new(&mut *dest);
    let mut layer = transforms.writer(&mut chunks)?;
    let mut counting = Counting { inner: &mut layer, count: 0 };
    stream.write_to(&mut counting)?;
    let written = counting.count;
    layer.finish()?;
    chunks.finish()?;

    if written != stream.length() {
        return Err(ProtocolError::LengthMismatch {
            id: stream.id(),
            declared: stream.length(),
            actual: written,
        });
    }
    tracing::debug!(id = %stream.id(), length = written, "sent data stream");
    Ok(())
}

/// Receive one stream's content and attach it to the matching placeholder
/// from `expected` (as returned by
/// [`QueueMessageSerializer::read_message`](crate::QueueMessageSerializer::read_message)).
pub fn read_data_stream(
    src: &mut dyn Read,
    transforms: &TransformChain,
    expected: &[DataStream],
) -> Result<DataStream, ProtocolError> {
    let mut id = [0u8; 16];
    src.read_exact(&mut id)?;
    let id = DataStreamId::from_uuid(uuid::Uuid::from_bytes(id));
    let mut declared = [0u8; 8];
    src.read_exact(&mut declared)?;
    let declared = u64::from_be_bytes(declared);

    let placeholder = expected
        .iter()
        .find(|s| s.id() == id)
        .ok_or(ProtocolError::UnexpectedStream(id))?;
    if placeholder.length() != declared {
        return Err(ProtocolError::LengthMismatch {
            id,
            declared: placeholder.length(),
            actual: declared,
        });
    }

    let mut file = tempfile::tempfile()?;
    let mut chunks = ChunkReader::new(src);
    let received = {
        // One byte past the declared length is enough to reject an oversized
        // body without spooling all of it.
        let mut body = transforms.reader(&mut chunks)?.take(declared.saturating_add(1));
        io::copy(&mut body, &mut file)?
    };
    if received != declared {
        return Err(ProtocolError::LengthMismatch { id, declared, actual: received });
    }
    // A decoder may stop at its own end marker before the terminator.
    io::copy(&mut chunks, &mut io::sink())?;
    file.flush()?;

    placeholder.attach_reader(TempFileReader { file: Mutex::new(file), length: received });
    tracing::debug!(%id, length = received, "received data stream");
    Ok(placeholder.clone())
}

/// Give every received stream a forwarding writer so the message carrying
/// them can be sent on another hop.
pub fn rewire_for_forwarding(streams: &[DataStream]) -> Result<(), ProtocolError> {
    for stream in streams {
        stream.enable_forwarding()?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
