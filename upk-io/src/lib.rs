//! UPK I/O - Package files and high-level APIs
//!
//! This crate provides the file layer on top of `upk-format` and
//! `upk-codec`:
//!
//! - [`open`] / [`open_with`] to decode a package from disk
//! - Transparent decompression of compressed packages into a cache file
//! - [`PackageReader`] for incremental access over any [`PackageRead`]
//! - Parallel decoding of many packages

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decompress;
pub mod parallel;
pub mod reader;
pub mod stream;

// Re-export commonly used types
pub use decompress::{cache_path, decompress_if_needed, detect_archive, ArchiveKind};
pub use parallel::{open_many, BatchItem, ParallelConfig};
pub use reader::{Package, PackageObject, PackageReader, Warning};
pub use stream::ByteStream;
pub use upk_format::{
    Layout, Limits, PackageHeader, PackageRead, Property, PropertyValue, Result, SliceReader,
    UpkError,
};

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use tracing::debug;

/// Options for opening a package
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Security limits
    pub limits: Limits,
    /// Keep decompressed packages in a `.decompressed` file next to the source
    pub use_cache: bool,
    /// Decode tagged properties of every export
    pub decode_properties: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            use_cache: true,
            decode_properties: true,
        }
    }
}

/// Open and fully decode a package with default options.
pub fn open(path: impl AsRef<Path>) -> Result<Package> {
    open_with(path, &OpenOptions::default())
}

/// Open and fully decode a package.
///
/// Compressed packages are expanded first: into the cache file when
/// `use_cache` is set, otherwise in memory.
pub fn open_with(path: impl AsRef<Path>, opts: &OpenOptions) -> Result<Package> {
    let path = path.as_ref();

    if opts.use_cache {
        let source = decompress_if_needed(path, &opts.limits)?;
        debug!(path = %source.display(), "opening package");
        let stream = ByteStream::new(BufReader::new(File::open(&source)?))?;
        return read_package(stream, opts);
    }

    let kind = detect_archive(path, &opts.limits)?;
    let mut stream = ByteStream::new(BufReader::new(File::open(path)?))?;
    if kind == ArchiveKind::Plain {
        return read_package(stream, opts);
    }

    let mut out = Cursor::new(Vec::new());
    decompress::decompress_stream(&mut stream, kind, &mut out, &opts.limits)?;
    let bytes = out.into_inner();
    read_package(SliceReader::new(&bytes), opts)
}

/// Decode a package held in memory.
pub fn read_bytes(bytes: &[u8], opts: &OpenOptions) -> Result<Package> {
    read_package(SliceReader::new(bytes), opts)
}

fn read_package<S: PackageRead>(stream: S, opts: &OpenOptions) -> Result<Package> {
    let reader = PackageReader::new(stream, opts)?;
    Ok(reader.into_package(opts.decode_properties))
}
