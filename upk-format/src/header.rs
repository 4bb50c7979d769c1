//! Package header structures
//!
//! Both layouts share the first eight bytes (magic, version, licensee).
//! The legacy layout follows them directly with the package flags and the
//! table directory; the modern layout inserts a header size and folder name
//! and appends engine versions and the compressed chunk directory.

use crate::block::CompressedBlockDescriptor;
use crate::constants::{LEGACY_GUID_MIN_VERSION, PACKAGE_MAGIC};
use crate::error::{Result, UpkError};
use crate::limits::Limits;
use crate::stream::PackageRead;
use crate::text::read_fstring;

/// Smallest header size a modern package can declare.
pub const MODERN_MIN_HEADER_LEN: u32 = 8 + 4 + 4 + 4 + 6 * 4;

/// Upper bound on generation records, well above anything shipped.
const MAX_GENERATIONS: usize = 4_096;

/// Package table layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Compact-index tables and integer-coded property tags.
    Legacy,
    /// Fixed-width tables and string-typed property tags.
    Modern,
}

/// Count and absolute offset of one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableLocation {
    /// Number of entries
    pub count: u32,
    /// Absolute offset of the first entry
    pub offset: u32,
}

impl TableLocation {
    fn read<R: PackageRead + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Self {
            count: r.read_u32()?,
            offset: r.read_u32()?,
        })
    }
}

/// Per-generation table sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generation {
    /// Export count at this generation
    pub export_count: u32,
    /// Name count at this generation
    pub name_count: u32,
    /// Net object count (modern layout only)
    pub net_object_count: u32,
}

/// Decoded package header
#[derive(Debug, Clone)]
pub struct PackageHeader {
    /// Table layout this header was decoded with
    pub layout: Layout,
    /// File version
    pub version: u16,
    /// Licensee version
    pub licensee: u16,
    /// Declared header size (modern layout)
    pub header_size: Option<u32>,
    /// Folder name (modern layout)
    pub folder_name: Option<String>,
    /// Package flags
    pub package_flags: u32,
    /// Name table location
    pub names: TableLocation,
    /// Export table location
    pub exports: TableLocation,
    /// Import table location
    pub imports: TableLocation,
    /// Heritage table (legacy packages before version 68)
    pub heritage: Option<TableLocation>,
    /// Package guid
    pub guid: Option<[u8; 16]>,
    /// Generation history
    pub generations: Vec<Generation>,
    /// Depends table offset (modern layout)
    pub depends_offset: Option<u32>,
    /// Engine version (modern layout)
    pub engine_version: Option<u32>,
    /// Cooker version (modern layout)
    pub cooker_version: Option<u32>,
    /// Whole-archive compression flags (modern layout)
    pub compression_flags: u32,
    /// Whole-archive compressed chunks (modern layout)
    pub chunks: Vec<CompressedBlockDescriptor>,
}

/// Read and validate the magic, returning `(version, licensee)`.
pub fn read_preamble<R: PackageRead + ?Sized>(r: &mut R) -> Result<(u16, u16)> {
    let magic = r.read_u32()?;
    if magic != PACKAGE_MAGIC {
        return Err(UpkError::InvalidMagic(magic));
    }
    Ok((r.read_u16()?, r.read_u16()?))
}

fn read_generations<R: PackageRead + ?Sized>(r: &mut R, modern: bool) -> Result<Vec<Generation>> {
    let count = r.read_u32()? as usize;
    if count > MAX_GENERATIONS {
        return Err(UpkError::LimitExceeded(format!(
            "Generation count {} exceeds limit {}",
            count, MAX_GENERATIONS
        )));
    }
    let mut generations = Vec::with_capacity(count);
    for _ in 0..count {
        generations.push(Generation {
            export_count: r.read_u32()?,
            name_count: r.read_u32()?,
            net_object_count: if modern { r.read_u32()? } else { 0 },
        });
    }
    Ok(generations)
}

impl PackageHeader {
    /// Decode a legacy-layout header from the start of the stream.
    pub fn decode_legacy<R: PackageRead + ?Sized>(r: &mut R) -> Result<Self> {
        r.seek(0)?;
        let (version, licensee) = read_preamble(r)?;

        let package_flags = r.read_u32()?;
        let names = TableLocation::read(r)?;
        let exports = TableLocation::read(r)?;
        let imports = TableLocation::read(r)?;

        let (heritage, guid, generations) = if version < LEGACY_GUID_MIN_VERSION {
            (Some(TableLocation::read(r)?), None, Vec::new())
        } else {
            let guid = r.read_guid()?;
            (None, Some(guid), read_generations(r, false)?)
        };

        Ok(Self {
            layout: Layout::Legacy,
            version,
            licensee,
            header_size: None,
            folder_name: None,
            package_flags,
            names,
            exports,
            imports,
            heritage,
            guid,
            generations,
            depends_offset: None,
            engine_version: None,
            cooker_version: None,
            compression_flags: 0,
            chunks: Vec::new(),
        })
    }

    /// Decode a modern-layout header from the start of the stream.
    ///
    /// Fails with `CorruptBlock` when the declared header size cannot hold
    /// the fields that were parsed.
    pub fn decode_modern<R: PackageRead + ?Sized>(r: &mut R, limits: &Limits) -> Result<Self> {
        r.seek(0)?;
        let (version, licensee) = read_preamble(r)?;

        let header_size = r.read_u32()?;
        if header_size < MODERN_MIN_HEADER_LEN || header_size as u64 > r.len() {
            return Err(UpkError::CorruptBlock(format!(
                "modern header size {} outside [{}, {}]",
                header_size,
                MODERN_MIN_HEADER_LEN,
                r.len()
            )));
        }

        let folder_name = read_fstring(r, limits.max_name_len)?;
        let package_flags = r.read_u32()?;
        let names = TableLocation::read(r)?;
        let exports = TableLocation::read(r)?;
        let imports = TableLocation::read(r)?;
        let depends_offset = r.read_u32()?;
        let guid = r.read_guid()?;
        let generations = read_generations(r, true)?;
        let engine_version = r.read_u32()?;
        let cooker_version = r.read_u32()?;
        let compression_flags = r.read_u32()?;

        let chunk_count = r.read_u32()? as usize;
        limits.check_count("Compressed chunk", chunk_count, limits.max_exports)?;
        let mut chunks = Vec::with_capacity(chunk_count.min(1024));
        for _ in 0..chunk_count {
            let decompressed_offset = r.read_u32()? as u64;
            let decompressed_len = r.read_u32()? as u64;
            let compressed_offset = r.read_u32()? as u64;
            let compressed_len = r.read_u32()? as u64;
            chunks.push(CompressedBlockDescriptor {
                decompressed_offset,
                decompressed_len,
                compressed_offset,
                compressed_len,
                codec: compression_flags as u16,
            });
        }

        if r.position() > header_size as u64 {
            return Err(UpkError::CorruptBlock(format!(
                "modern header fields run to offset {} past declared size {}",
                r.position(),
                header_size
            )));
        }

        Ok(Self {
            layout: Layout::Modern,
            version,
            licensee,
            header_size: Some(header_size),
            folder_name: Some(folder_name),
            package_flags,
            names,
            exports,
            imports,
            heritage: None,
            guid: Some(guid),
            generations,
            depends_offset: Some(depends_offset),
            engine_version: Some(engine_version),
            cooker_version: Some(cooker_version),
            compression_flags,
            chunks,
        })
    }

    /// Whether the package body is stored as compressed chunks.
    pub fn is_compressed(&self) -> bool {
        !self.chunks.is_empty()
    }
}
