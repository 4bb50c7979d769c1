//! Compressed big-block / little-block structures
//!
//! A big block starts with its own header (magic, codec, compressed and
//! decompressed totals), followed by one length pair per little block and
//! then the little-block payloads in order.

use crate::constants::{BLOCK_MAGIC, CODEC_DEFLATE, CODEC_LZO, CODEC_RAW};
use crate::error::{Result, UpkError};
use crate::limits::Limits;
use crate::stream::PackageRead;

/// Location and codec of one independently compressed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedBlockDescriptor {
    /// Offset of the unit in the decompressed output
    pub decompressed_offset: u64,
    /// Decompressed length in bytes
    pub decompressed_len: u64,
    /// Offset of the compressed payload in the source
    pub compressed_offset: u64,
    /// Compressed length in bytes
    pub compressed_len: u64,
    /// Codec ID (`0` raw, `1` DEFLATE-family, `2` LZO)
    pub codec: u16,
}

/// Decoded big-block header with its little-block directory
#[derive(Debug, Clone)]
pub struct BigBlockHeader {
    /// Codec named by the big block
    pub codec: u16,
    /// Sum of little-block compressed lengths
    pub compressed_len: u64,
    /// Sum of little-block decompressed lengths
    pub decompressed_len: u64,
    /// Little blocks; decompressed offsets are relative to the big block
    pub blocks: Vec<CompressedBlockDescriptor>,
}

/// Check that a big-block codec ID names a real codec.
pub fn validate_big_block_codec(codec: u16) -> Result<()> {
    match codec {
        CODEC_DEFLATE | CODEC_LZO => Ok(()),
        other => Err(UpkError::UnsupportedCompressionCodec(other)),
    }
}

impl BigBlockHeader {
    /// Decode a big-block header at the reader's position.
    ///
    /// Leaves the reader at the first little-block payload.
    pub fn decode<R: PackageRead + ?Sized>(r: &mut R, limits: &Limits) -> Result<Self> {
        let start = r.position();
        let magic = r.read_u32()?;
        if magic != BLOCK_MAGIC {
            return Err(UpkError::CorruptBlock(format!(
                "bad block magic {:#010x} at offset {}",
                magic, start
            )));
        }

        let codec = r.read_u16()?;
        validate_big_block_codec(codec)?;

        let compressed_len = r.read_u32()? as u64;
        let decompressed_len = r.read_u32()? as u64;
        if decompressed_len > limits.max_archive_uncompressed_len {
            return Err(UpkError::LimitExceeded(format!(
                "Big block decompressed length {} exceeds limit {}",
                decompressed_len, limits.max_archive_uncompressed_len
            )));
        }

        let mut pairs = Vec::new();
        let mut decompressed_sum = 0u64;
        let mut compressed_sum = 0u64;
        while decompressed_sum < decompressed_len {
            let little_compressed = r.read_u32()? as u64;
            let little_decompressed = r.read_u32()? as u64;
            if little_decompressed > limits.max_block_uncompressed_len {
                return Err(UpkError::LimitExceeded(format!(
                    "Little block decompressed length {} exceeds limit {}",
                    little_decompressed, limits.max_block_uncompressed_len
                )));
            }
            decompressed_sum += little_decompressed;
            compressed_sum += little_compressed;
            pairs.push((little_compressed, little_decompressed));
        }

        if decompressed_sum != decompressed_len {
            return Err(UpkError::CorruptBlock(format!(
                "little blocks decompress to {} bytes, big block declares {}",
                decompressed_sum, decompressed_len
            )));
        }
        if compressed_sum != compressed_len {
            return Err(UpkError::CorruptBlock(format!(
                "little blocks hold {} compressed bytes, big block declares {}",
                compressed_sum, compressed_len
            )));
        }

        let mut compressed_offset = r.position();
        let mut decompressed_offset = 0u64;
        let blocks = pairs
            .into_iter()
            .map(|(compressed, decompressed)| {
                let block = CompressedBlockDescriptor {
                    decompressed_offset,
                    decompressed_len: decompressed,
                    compressed_offset,
                    compressed_len: compressed,
                    codec: if compressed == decompressed {
                        CODEC_RAW
                    } else {
                        codec
                    },
                };
                compressed_offset += compressed;
                decompressed_offset += decompressed;
                block
            })
            .collect();

        Ok(Self {
            codec,
            compressed_len,
            decompressed_len,
            blocks,
        })
    }

    /// Offset just past the last little-block payload.
    pub fn end_offset(&self) -> Option<u64> {
        self.blocks
            .last()
            .map(|block| block.compressed_offset + block.compressed_len)
    }
}
