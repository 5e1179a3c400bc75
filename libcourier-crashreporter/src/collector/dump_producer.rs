// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io;
use std::path::Path;

/// The seam to the underlying dump machinery (a Breakpad- or Crashpad-style
/// backend, or a runtime's own unwinder). This crate never interprets dump
/// contents; it only asks for them to be written and carries the bytes to
/// the collector.
pub trait DumpProducer: Send + Sync {
    /// Writes a raw dump of the current process state to `path`.
    ///
    /// `context_key` is the opaque handle of an in-flight explicit dump
    /// request, None on the fatal path. Backends whose callback API carries
    /// a single opaque value thread this through it; producers never look
    /// the context up themselves.
    ///
    /// May be invoked on an arbitrary, possibly corrupted thread. Producers
    /// must not rely on locks or heap state owned by other threads.
    fn write_dump(&self, path: &Path, context_key: Option<u64>) -> io::Result<()>;
}

/// A producer that writes a caller-supplied byte buffer verbatim. This is
/// the adapter for hosts that run their own unwinder and hand the result
/// over as opaque bytes.
pub struct BufferDumpProducer {
    buffer: Vec<u8>,
}

impl BufferDumpProducer {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }
}

impl DumpProducer for BufferDumpProducer {
    fn write_dump(&self, path: &Path, _context_key: Option<u64>) -> io::Result<()> {
        fs::write(path, &self.buffer)
    }
}
