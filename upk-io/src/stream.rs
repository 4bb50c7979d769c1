//! Seekable byte stream over any `Read + Seek` source

use std::io::{self, Read, Seek, SeekFrom};

use bitvec::prelude::*;
use upk_format::{PackageRead, Result, UpkError};

/// [`PackageRead`] adapter for files and other seekable readers
///
/// The stream length is captured once at construction.
pub struct ByteStream<R: Read + Seek> {
    inner: R,
    pos: u64,
    len: u64,
    bit: Option<(u8, usize)>,
}

impl<R: Read + Seek> ByteStream<R> {
    /// Wrap a reader, measuring its length and rewinding to offset 0.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            pos: 0,
            len,
            bit: None,
        })
    }

    /// Consume the stream and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> PackageRead for ByteStream<R> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(UpkError::TruncatedStream {
                offset,
                needed: 0,
                available: 0,
            });
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        self.bit = None;
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.bit = None;
        let needed = buf.len() as u64;
        let available = self.len.saturating_sub(self.pos);
        if needed > available {
            return Err(UpkError::TruncatedStream {
                offset: self.pos,
                needed,
                available,
            });
        }
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.pos += needed;
                Ok(())
            }
            // The source shrank underneath us.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(UpkError::TruncatedStream {
                offset: self.pos,
                needed,
                available,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn read_bit(&mut self) -> Result<bool> {
        let (byte, index) = match self.bit {
            Some(state) => state,
            None => {
                let mut buf = [0u8; 1];
                self.read_into(&mut buf)?;
                (buf[0], 0)
            }
        };

        let bit = byte.view_bits::<Msb0>()[index];
        self.bit = if index + 1 < 8 {
            Some((byte, index + 1))
        } else {
            None
        };
        Ok(bit)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.len
    }
}
