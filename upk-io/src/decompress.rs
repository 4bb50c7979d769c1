//! Archive detection and decompression
//!
//! Two compressed forms exist. A whole-archive package keeps its header
//! uncompressed and lists compressed chunks in it; each chunk is a big
//! block written back at its decompressed offset. A cache archive is a
//! bare run of big blocks from offset 0 to EOF.
//!
//! Decompressed output lands next to the source as `<source>.decompressed`
//! and is reused on later opens without any staleness check.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use upk_codec::block_decode::decompress_big_block_into;
use upk_format::block::validate_big_block_codec;
use upk_format::constants::{BLOCK_MAGIC, CACHE_SUFFIX, MODERN_LAYOUT_MIN_VERSION, PACKAGE_MAGIC};
use upk_format::{Limits, PackageHeader, PackageRead, Result, UpkError};

use crate::stream::ByteStream;

/// How a file on disk is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Uncompressed package
    Plain,
    /// Package whose body is stored as compressed chunks
    WholeArchive,
    /// Consecutive big blocks with no package header
    CacheArchive,
}

/// Path of the decompressed cache file for `source`.
pub fn cache_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(CACHE_SUFFIX);
    PathBuf::from(name)
}

fn is_cache_path(path: &Path) -> bool {
    path.to_string_lossy().ends_with(CACHE_SUFFIX)
}

/// Classify an open stream.
pub fn detect_stream<S: PackageRead + ?Sized>(stream: &mut S, limits: &Limits) -> Result<ArchiveKind> {
    stream.seek(0)?;
    let magic = stream.read_u32()?;
    if magic != PACKAGE_MAGIC && magic != BLOCK_MAGIC {
        return Err(UpkError::InvalidMagic(magic));
    }

    let tag = stream.read_u16()?;
    if validate_big_block_codec(tag).is_ok() {
        return Ok(ArchiveKind::CacheArchive);
    }
    if tag < MODERN_LAYOUT_MIN_VERSION {
        return Ok(ArchiveKind::Plain);
    }

    // A header that does not parse as modern is left to the layout fallback.
    let kind = match PackageHeader::decode_modern(stream, limits) {
        Ok(header) if header.is_compressed() => ArchiveKind::WholeArchive,
        _ => ArchiveKind::Plain,
    };
    stream.seek(0)?;
    Ok(kind)
}

/// Classify a file on disk.
///
/// Files already carrying the cache suffix are always plain: their header
/// still lists the chunks they were expanded from.
pub fn detect_archive(path: &Path, limits: &Limits) -> Result<ArchiveKind> {
    if is_cache_path(path) {
        return Ok(ArchiveKind::Plain);
    }
    let mut stream = ByteStream::new(BufReader::new(File::open(path)?))?;
    detect_stream(&mut stream, limits)
}

/// Expand a whole-archive package into `out`.
///
/// Header bytes before the first chunk are copied verbatim, then every
/// chunk is written at its decompressed offset.
pub fn decompress_whole_archive<S, W>(stream: &mut S, out: &mut W, limits: &Limits) -> Result<u64>
where
    S: PackageRead + ?Sized,
    W: Write + Seek + ?Sized,
{
    let header = PackageHeader::decode_modern(stream, limits)?;
    let first = header
        .chunks
        .iter()
        .map(|chunk| chunk.decompressed_offset)
        .min()
        .ok_or_else(|| UpkError::CorruptBlock("package lists no compressed chunks".to_string()))?;

    let total = header
        .chunks
        .iter()
        .map(|chunk| chunk.decompressed_offset + chunk.decompressed_len)
        .max()
        .unwrap_or(first);
    if total > limits.max_archive_uncompressed_len {
        return Err(UpkError::LimitExceeded(format!(
            "Archive decompressed length {} exceeds limit {}",
            total, limits.max_archive_uncompressed_len
        )));
    }

    stream.seek(0)?;
    let prefix = stream.read_bytes(first as usize)?;
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&prefix)?;

    for (index, chunk) in header.chunks.iter().enumerate() {
        stream.seek(chunk.compressed_offset)?;
        out.seek(SeekFrom::Start(chunk.decompressed_offset))?;
        let written = decompress_big_block_into(stream, out, limits)?;
        if written != chunk.decompressed_len {
            return Err(UpkError::CorruptBlock(format!(
                "chunk {} expanded to {} bytes, directory declares {}",
                index, written, chunk.decompressed_len
            )));
        }
        debug!(index, offset = chunk.decompressed_offset, len = written, "chunk");
    }

    out.flush()?;
    Ok(total)
}

/// Expand a cache archive (big blocks from offset 0 to EOF) into `out`.
pub fn decompress_cache_archive<S, W>(stream: &mut S, out: &mut W, limits: &Limits) -> Result<u64>
where
    S: PackageRead + ?Sized,
    W: Write + ?Sized,
{
    stream.seek(0)?;
    let mut total = 0u64;
    while stream.remaining() > 0 {
        total += decompress_big_block_into(stream, out, limits)?;
        if total > limits.max_archive_uncompressed_len {
            return Err(UpkError::LimitExceeded(format!(
                "Archive decompressed length {} exceeds limit {}",
                total, limits.max_archive_uncompressed_len
            )));
        }
    }
    out.flush()?;
    Ok(total)
}

/// Expand `stream` according to `kind`.
pub fn decompress_stream<S, W>(
    stream: &mut S,
    kind: ArchiveKind,
    out: &mut W,
    limits: &Limits,
) -> Result<u64>
where
    S: PackageRead + ?Sized,
    W: Write + Seek + ?Sized,
{
    match kind {
        ArchiveKind::WholeArchive => decompress_whole_archive(stream, out, limits),
        ArchiveKind::CacheArchive => decompress_cache_archive(stream, out, limits),
        ArchiveKind::Plain => Err(UpkError::CorruptBlock(
            "package is not compressed".to_string(),
        )),
    }
}

/// Return a path to an uncompressed form of `path`.
///
/// Plain packages are returned unchanged. Compressed ones are expanded into
/// the cache file through a temporary file in the same directory that is
/// renamed into place, so readers never see a partial cache. An existing
/// cache file is returned as is.
pub fn decompress_if_needed(path: &Path, limits: &Limits) -> Result<PathBuf> {
    let kind = detect_archive(path, limits)?;
    if kind == ArchiveKind::Plain {
        return Ok(path.to_path_buf());
    }

    let cache = cache_path(path);
    if cache.exists() {
        debug!(cache = %cache.display(), "reusing decompressed cache");
        return Ok(cache);
    }

    let dir = match cache.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut temp = NamedTempFile::new_in(&dir)?;
    let total = {
        let mut stream = ByteStream::new(BufReader::new(File::open(path)?))?;
        let mut out = BufWriter::new(temp.as_file_mut());
        let total = decompress_stream(&mut stream, kind, &mut out, limits)?;
        out.flush()?;
        total
    };
    temp.persist(&cache).map_err(|e| UpkError::Io(e.error))?;

    info!(
        source = %path.display(),
        cache = %cache.display(),
        kind = ?kind,
        bytes = total,
        "decompressed package"
    );
    Ok(cache)
}
