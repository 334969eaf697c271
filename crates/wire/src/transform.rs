// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered byte-stream transforms (compression) applied around raw wire bytes.
//!
//! A chain wraps a borrowed raw writer or reader. Layers never own the raw
//! stream: finishing a write chain flushes every layer's trailer into the
//! next one down and leaves the caller's stream open.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// A writer that needs an explicit end-of-stream step.
pub trait WriteLayer: Write {
    /// Write any trailing framing into the wrapped writer, then finish it.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// A reversible byte transform.
///
/// Writing through `wrap_writer` and reading the result back through
/// `wrap_reader` must yield the original bytes.
pub trait StreamTransform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn wrap_writer<'a>(
        &self,
        inner: Box<dyn WriteLayer + 'a>,
    ) -> io::Result<Box<dyn WriteLayer + 'a>>;

    fn wrap_reader<'a>(&self, inner: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>>;
}

/// Bottom layer over the caller's stream.
struct Raw<'a>(&'a mut dyn Write);

impl Write for Raw<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl WriteLayer for Raw<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

/// Default zstd level, matching the zstd library default.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// zstd compression.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompression {
    level: i32,
}

impl ZstdCompression {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompression {
    fn default() -> Self {
        Self::new(DEFAULT_ZSTD_LEVEL)
    }
}

struct ZstdLayer<'a> {
    encoder: zstd::stream::write::Encoder<'static, Box<dyn WriteLayer + 'a>>,
}

impl Write for ZstdLayer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl WriteLayer for ZstdLayer<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let inner = self.encoder.finish()?;
        inner.finish()
    }
}

impl StreamTransform for ZstdCompression {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn wrap_writer<'a>(
        &self,
        inner: Box<dyn WriteLayer + 'a>,
    ) -> io::Result<Box<dyn WriteLayer + 'a>> {
        let encoder = zstd::stream::write::Encoder::new(inner, self.level)?;
        Ok(Box::new(ZstdLayer { encoder }))
    }

    fn wrap_reader<'a>(&self, inner: Box<dyn Read + 'a>) -> io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(zstd::stream::read::Decoder::new(inner)?))
    }
}

/// Ordered list of transforms.
///
/// Transforms are layered outward from the raw stream in list order on both
/// the write and the read side, so the first transform is the one closest to
/// the wire.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    transforms: Vec<Arc<dyn StreamTransform>>,
}

impl TransformChain {
    /// A chain that passes bytes through untouched.
    pub fn identity() -> Self {
        Self::default()
    }

    /// A chain with default zstd compression.
    pub fn compressed() -> Self {
        Self::identity().then(ZstdCompression::default())
    }

    /// Append a transform, layered outside the existing ones.
    pub fn then(mut self, transform: impl StreamTransform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Wrap `raw` for writing. Call [`WriteLayer::finish`] when done.
    pub fn writer<'a>(&self, raw: &'a mut dyn Write) -> io::Result<Box<dyn WriteLayer + 'a>> {
        let mut layer: Box<dyn WriteLayer + 'a> = Box::new(Raw(raw));
        for transform in &self.transforms {
            layer = transform.wrap_writer(layer)?;
        }
        Ok(layer)
    }

    /// Wrap `raw` for reading.
    pub fn reader<'a>(&self, raw: impl Read + 'a) -> io::Result<Box<dyn Read + 'a>> {
        let mut layer: Box<dyn Read + 'a> = Box::new(raw);
        for transform in &self.transforms {
            layer = transform.wrap_reader(layer)?;
        }
        Ok(layer)
    }
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
