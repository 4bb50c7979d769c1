//! Big/little block decompression

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use rust_lzo::{LZOContext, LZOError};
use tracing::{debug, trace};
use upk_format::{BigBlockHeader, Limits, PackageRead, Result, UpkError};

use crate::Codec;

/// Whether `bytes` begin with a zlib stream header (RFC 1950).
fn is_zlib_header(bytes: &[u8]) -> bool {
    match bytes {
        [cmf, flg, ..] => {
            let check = (u16::from(*cmf) << 8) | u16::from(*flg);
            cmf & 0x0F == 8 && cmf >> 4 <= 7 && check % 31 == 0
        }
        _ => false,
    }
}

fn inflate<R: Read>(decoder: R, decompressed_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(decompressed_len);
    // One spare byte so an oversized stream shows up as a length mismatch.
    decoder
        .take(decompressed_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| UpkError::DecompressError(format!("DEFLATE decompression failed: {}", e)))?;
    Ok(out)
}

/// Readable text for an LZO status code.
pub(crate) fn lzo_error_message(err: &LZOError) -> &'static str {
    match err {
        LZOError::OK => "ok",
        LZOError::ERROR => "error",
        LZOError::OUT_OF_MEMORY => "out of memory",
        LZOError::NOT_COMPRESSIBLE => "not compressible",
        LZOError::INPUT_OVERRUN => "input overrun",
        LZOError::OUTPUT_OVERRUN => "output overrun",
        LZOError::LOOKBEHIND_OVERRUN => "lookbehind overrun",
        LZOError::EOF_NOT_FOUND => "end of stream not found",
        LZOError::INPUT_NOT_CONSUMED => "input not consumed",
        LZOError::NOT_YET_IMPLEMENTED => "not yet implemented",
        LZOError::INVALID_ARGUMENT => "invalid argument",
    }
}

fn lzo_decompress(compressed: &[u8], decompressed_len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; decompressed_len];
    let (written, err) = {
        let (written, err) = LZOContext::decompress_to_slice(compressed, &mut out);
        (written.len(), err)
    };
    match err {
        LZOError::OK => {}
        ref other => {
            return Err(UpkError::DecompressError(format!(
                "LZO decompression failed: {}",
                lzo_error_message(other)
            )))
        }
    }
    out.truncate(written);
    Ok(out)
}

/// Decompress one little block, which must expand to exactly
/// `decompressed_len` bytes.
pub fn decompress_block(codec: Codec, compressed: &[u8], decompressed_len: usize) -> Result<Vec<u8>> {
    let out = match codec {
        Codec::Raw => compressed.to_vec(),
        Codec::Deflate if is_zlib_header(compressed) => {
            inflate(ZlibDecoder::new(compressed), decompressed_len)?
        }
        Codec::Deflate => inflate(DeflateDecoder::new(compressed), decompressed_len)?,
        Codec::Lzo => lzo_decompress(compressed, decompressed_len)?,
    };

    if out.len() != decompressed_len {
        return Err(UpkError::CorruptBlock(format!(
            "{:?} block produced {} bytes, expected {}",
            codec,
            out.len(),
            decompressed_len
        )));
    }
    Ok(out)
}

/// Decompress the big block at the reader's position into `out`.
///
/// Returns the number of bytes written. The first failing little block
/// aborts the whole big block.
pub fn decompress_big_block_into<R, W>(r: &mut R, out: &mut W, limits: &Limits) -> Result<u64>
where
    R: PackageRead + ?Sized,
    W: Write + ?Sized,
{
    let start = r.position();
    let header = BigBlockHeader::decode(r, limits)?;
    debug!(
        offset = start,
        codec = header.codec,
        little_blocks = header.blocks.len(),
        compressed = header.compressed_len,
        decompressed = header.decompressed_len,
        "decompressing big block"
    );

    for (index, block) in header.blocks.iter().enumerate() {
        r.seek(block.compressed_offset)?;
        let compressed = r.read_bytes(block.compressed_len as usize)?;
        let codec = Codec::from_id(block.codec)?;
        let data = codec.decompress(&compressed, block.decompressed_len as usize)?;
        trace!(index, ?codec, len = data.len(), "little block");
        out.write_all(&data)?;
    }

    if let Some(end) = header.end_offset() {
        r.seek(end)?;
    }
    Ok(header.decompressed_len)
}

/// Decompress the big block at the reader's position into a new buffer.
pub fn decompress_big_block<R: PackageRead + ?Sized>(r: &mut R, limits: &Limits) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decompress_big_block_into(r, &mut out, limits)?;
    Ok(out)
}
