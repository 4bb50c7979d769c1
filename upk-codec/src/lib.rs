//! UPK Codec - Decoder engines
//!
//! This crate provides the decoding engines that run on top of the
//! `upk-format` wire structures:
//!
//! - Legacy (bit-packed info byte) property decoder
//! - Modern (type-name tagged) property decoder
//! - Big/little block decompression and compression

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod block_builder;
pub mod block_decode;
pub mod legacy;
pub mod modern;

// Re-export commonly used types
pub use upk_format::{
    Limits, NameTable, PackageRead, Property, PropertyValue, Result, SliceReader, UpkError,
};

// Re-export our own types
pub use block_builder::BigBlockBuilder;
pub use block_decode::{decompress_big_block, decompress_big_block_into, decompress_block};
pub use legacy::LegacyPropertyDecoder;
pub use modern::ModernPropertyDecoder;

use upk_format::constants::{CODEC_DEFLATE, CODEC_LZO, CODEC_RAW};

/// Compression codec of a little block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Stored without compression
    Raw,
    /// zlib-framed or raw DEFLATE
    Deflate,
    /// LZO1X
    Lzo,
}

impl Codec {
    /// Map a wire codec ID onto a codec.
    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            CODEC_RAW => Ok(Codec::Raw),
            CODEC_DEFLATE => Ok(Codec::Deflate),
            CODEC_LZO => Ok(Codec::Lzo),
            other => Err(UpkError::UnsupportedCompressionCodec(other)),
        }
    }

    /// Get the wire codec ID
    pub fn id(&self) -> u16 {
        match self {
            Codec::Raw => CODEC_RAW,
            Codec::Deflate => CODEC_DEFLATE,
            Codec::Lzo => CODEC_LZO,
        }
    }

    /// Decompress one little block to exactly `decompressed_len` bytes.
    pub fn decompress(&self, compressed: &[u8], decompressed_len: usize) -> Result<Vec<u8>> {
        decompress_block(*self, compressed, decompressed_len)
    }
}
