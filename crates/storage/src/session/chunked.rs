//! Bounded streaming over remote files that are addressed by offset.
//!
//! A transport that cannot keep a file handle open across calls implements
//! [`PositionedFile`]; the adapters here turn it into `Read`/`Write` that
//! never hold more than one [`TRANSFER_CHUNK_SIZE`] chunk in memory.

#![cfg_attr(not(feature = "libsmbclient"), allow(dead_code))]

use std::io::{self, Read, Write};

use crate::tree::TRANSFER_CHUNK_SIZE;

/// Random access to one remote file.
pub(crate) trait PositionedFile: Send {
    /// Read up to `buf.len()` bytes starting at `offset`. `0` means end of file.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;
}

/// Sequential reader issuing one positioned read per call.
pub(crate) struct ChunkedReader<F> {
    file: F,
    offset: u64,
}

impl<F: PositionedFile> ChunkedReader<F> {
    pub(crate) fn new(file: F) -> Self {
        Self { file, offset: 0 }
    }
}

impl<F: PositionedFile> Read for ChunkedReader<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(TRANSFER_CHUNK_SIZE);
        let read = self.file.read_at(self.offset, &mut buf[..len])?;
        self.offset += read as u64;
        Ok(read)
    }
}

/// Sequential writer that stages at most one chunk before writing it out.
pub(crate) struct ChunkedWriter<F: PositionedFile> {
    file: F,
    offset: u64,
    pending: Vec<u8>,
    label: String,
}

impl<F: PositionedFile> ChunkedWriter<F> {
    pub(crate) fn new(file: F, label: impl Into<String>) -> Self {
        Self {
            file,
            offset: 0,
            pending: Vec::with_capacity(TRANSFER_CHUNK_SIZE),
            label: label.into(),
        }
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.file.write_at(self.offset, &self.pending)?;
        self.offset += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

impl<F: PositionedFile> Write for ChunkedWriter<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.pending.len() == TRANSFER_CHUNK_SIZE {
            self.write_pending()?;
        }
        let room = TRANSFER_CHUNK_SIZE - self.pending.len();
        let taken = buf.len().min(room);
        self.pending.extend_from_slice(&buf[..taken]);
        Ok(taken)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_pending()
    }
}

impl<F: PositionedFile> Drop for ChunkedWriter<F> {
    fn drop(&mut self) {
        if let Err(e) = self.write_pending() {
            tracing::warn!(path = %self.label, error = %e, "Failed to write final chunk on close");
        }
    }
}
