//! Big block builder
//!
//! Produces the same framing the decoder reads: big-block header, one
//! length pair per little block, then the payloads. A little block that
//! does not shrink under compression is stored, so its compressed and
//! decompressed lengths match.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use rust_lzo::{worst_compress, LZOContext, LZOError};
use upk_format::block::validate_big_block_codec;
use upk_format::constants::BLOCK_MAGIC;
use upk_format::{Result, UpkError};

use crate::block_decode::lzo_error_message;
use crate::Codec;

/// Default little-block length used by packaging tools (128 KiB)
pub const DEFAULT_LITTLE_BLOCK_LEN: usize = 128 * 1024;

/// Builder for one compressed big block
#[derive(Debug, Clone)]
pub struct BigBlockBuilder {
    codec: Codec,
    little_block_len: usize,
    level: Compression,
}

impl BigBlockBuilder {
    /// Create a builder for the given big-block codec.
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            little_block_len: DEFAULT_LITTLE_BLOCK_LEN,
            level: Compression::default(),
        }
    }

    /// Set the decompressed length of each little block.
    pub fn with_little_block_len(mut self, len: usize) -> Self {
        self.little_block_len = len.max(1);
        self
    }

    /// Set the DEFLATE compression level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    fn compress(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        match self.codec {
            Codec::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
                encoder.write_all(chunk)?;
                Ok(encoder.finish()?)
            }
            Codec::Lzo => {
                let mut ctx = LZOContext::new();
                let mut out = Vec::with_capacity(worst_compress(chunk.len()));
                match ctx.compress(chunk, &mut out) {
                    LZOError::OK => Ok(out),
                    ref other => Err(UpkError::DecompressError(format!(
                        "LZO compression failed: {}",
                        lzo_error_message(other)
                    ))),
                }
            }
            Codec::Raw => Err(UpkError::UnsupportedCompressionCodec(self.codec.id())),
        }
    }

    /// Compress `data` into a single big block.
    pub fn build(&self, data: &[u8]) -> Result<Vec<u8>> {
        validate_big_block_codec(self.codec.id())?;

        let mut pairs = Vec::new();
        let mut payloads = Vec::new();
        for chunk in data.chunks(self.little_block_len) {
            let compressed = self.compress(chunk)?;
            let stored = if compressed.len() < chunk.len() {
                compressed
            } else {
                chunk.to_vec()
            };
            pairs.push((stored.len(), chunk.len()));
            payloads.push(stored);
        }

        let compressed_total: usize = pairs.iter().map(|p| p.0).sum();
        let mut out = Vec::with_capacity(14 + pairs.len() * 8 + compressed_total);
        out.extend_from_slice(&BLOCK_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.codec.id().to_le_bytes());
        out.extend_from_slice(&to_u32(compressed_total)?.to_le_bytes());
        out.extend_from_slice(&to_u32(data.len())?.to_le_bytes());
        for (compressed, decompressed) in &pairs {
            out.extend_from_slice(&to_u32(*compressed)?.to_le_bytes());
            out.extend_from_slice(&to_u32(*decompressed)?.to_le_bytes());
        }
        for payload in &payloads {
            out.extend_from_slice(payload);
        }
        Ok(out)
    }
}

fn to_u32(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| UpkError::LimitExceeded(format!("block length {} exceeds u32", len)))
}
