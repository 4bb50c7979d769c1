//! Random-access byte stream abstraction
//!
//! Table and property decoders are written against [`PackageRead`] so the
//! same code runs over an in-memory buffer ([`SliceReader`]) or a file
//! (`upk-io`'s `ByteStream`). Implementors supply positioned byte and bit
//! reads; the little-endian and compact-index helpers are provided.

use bitvec::prelude::*;
use byteorder::{ByteOrder, LittleEndian};
use smallvec::SmallVec;

use crate::compact_index::{self, MAX_COMPACT_INDEX_LEN};
use crate::error::{Result, UpkError};

/// Positioned reader consumed by every decoder in the workspace
pub trait PackageRead {
    /// Move the cursor to an absolute offset (`offset <= len()`).
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Fill `buf` from the cursor, failing with `TruncatedStream` on EOF.
    ///
    /// Any partially consumed bit-read byte is discarded first.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read one bit, most significant bit of each byte first.
    fn read_bit(&mut self) -> Result<bool>;

    /// Current absolute offset.
    fn position(&self) -> u64;

    /// Total stream length.
    fn len(&self) -> u64;

    /// Bytes left between the cursor and the end of the stream.
    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    /// Fail with `TruncatedStream` unless `needed` bytes remain.
    fn ensure_remaining(&self, needed: u64) -> Result<()> {
        let available = self.remaining();
        if needed > available {
            return Err(UpkError::TruncatedStream {
                offset: self.position(),
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Read `n` bytes into a new buffer.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(n as u64)?;
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Advance the cursor by `n` bytes.
    fn skip(&mut self, n: u64) -> Result<()> {
        self.ensure_remaining(n)?;
        let target = self.position() + n;
        self.seek(target)
    }

    /// Read `bits` bits (at most 8) MSB first into the low bits of a byte.
    fn read_bits(&mut self, bits: u32) -> Result<u8> {
        debug_assert!(bits <= 8);
        let mut value = 0u8;
        for _ in 0..bits {
            value = (value << 1) | self.read_bit()? as u8;
        }
        Ok(value)
    }

    /// Read a single byte.
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_into(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a little-endian u16.
    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    /// Read a little-endian u32.
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Read a little-endian i32.
    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(LittleEndian::read_i32(&buf))
    }

    /// Read a little-endian u64.
    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    /// Read a little-endian i64.
    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        Ok(LittleEndian::read_i64(&buf))
    }

    /// Read a little-endian IEEE-754 f32.
    fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(LittleEndian::read_f32(&buf))
    }

    /// Read a 16-byte guid.
    fn read_guid(&mut self) -> Result<[u8; 16]> {
        let mut buf = [0u8; 16];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Read a compact index (1-5 bytes).
    fn read_compact_index(&mut self) -> Result<i64> {
        let mut bytes: SmallVec<[u8; MAX_COMPACT_INDEX_LEN]> = SmallVec::new();
        loop {
            let byte = self.read_u8()?;
            bytes.push(byte);
            if !compact_index::continues(bytes.len() - 1, byte) {
                break;
            }
        }
        let (value, _) = compact_index::decode_compact_index(&bytes)?;
        Ok(value)
    }
}

/// In-memory [`PackageRead`] over a borrowed buffer
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit: Option<(u8, usize)>,
}

impl<'a> SliceReader<'a> {
    /// Create a reader positioned at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit: None,
        }
    }

    /// Borrow the bytes between the cursor and the end of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl PackageRead for SliceReader<'_> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.data.len() as u64 {
            return Err(UpkError::TruncatedStream {
                offset,
                needed: 0,
                available: 0,
            });
        }
        self.bit = None;
        self.pos = offset as usize;
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.bit = None;
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(UpkError::TruncatedStream {
                offset: self.pos as u64,
                needed: buf.len() as u64,
                available: (self.data.len() - self.pos) as u64,
            });
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn read_bit(&mut self) -> Result<bool> {
        let (byte, index) = match self.bit {
            Some(state) => state,
            None => {
                let byte = *self.data.get(self.pos).ok_or(UpkError::TruncatedStream {
                    offset: self.pos as u64,
                    needed: 1,
                    available: 0,
                })?;
                self.pos += 1;
                (byte, 0)
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
        self.pos as u64
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}
