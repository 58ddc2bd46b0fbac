//! Seekable in-memory buffer
//!
//! Gives an immutable byte payload a cursor so responses can be read the same
//! way whether they cover the whole payload or a requested range.

use hyper::body::Bytes;
use std::io::{self, Read, Seek, SeekFrom};

/// Read + Seek over a shared byte payload
#[derive(Debug, Clone)]
pub struct SeekableBuffer {
    data: Bytes,
    pos: u64,
}

impl SeekableBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position (may be past the end)
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// Read exactly `len` bytes starting at `start` without copying the payload
    pub fn read_range(&mut self, start: usize, len: usize) -> io::Result<Bytes> {
        self.seek(SeekFrom::Start(start as u64))?;
        let end = start.checked_add(len).filter(|e| *e <= self.data.len());
        let Some(end) = end else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "range extends past end of buffer",
            ));
        };
        self.pos = end as u64;
        Ok(self.data.slice(start..end))
    }
}

impl Read for SeekableBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = self.data.len() as u64;
        if self.pos >= len {
            return Ok(0);
        }

        // pos < len, so it fits in usize
        #[allow(clippy::cast_possible_truncation)]
        let start = self.pos as usize;
        let remaining = &self.data[start..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SeekableBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::Current(d) => (self.pos, d),
            SeekFrom::End(d) => (self.data.len() as u64, d),
        };

        match base.checked_add_signed(offset) {
            Some(abs) => {
                self.pos = abs;
                Ok(abs)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative position",
            )),
        }
    }
}
