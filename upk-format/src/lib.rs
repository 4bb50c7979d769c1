//! UPK Format - Core primitives for Unreal package decoding
//!
//! This crate holds the wire structures of the package format with no file
//! I/O of its own. It includes:
//!
//! - Magic numbers and constants
//! - Compact index encoding
//! - The [`PackageRead`] byte/bit stream abstraction
//! - Package headers (legacy and modern layouts)
//! - Name, import and export tables
//! - Compressed block directories
//! - The decoded property model
//! - Error types and security limits

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod block;
pub mod compact_index;
pub mod constants;
pub mod error;
pub mod header;
pub mod limits;
pub mod property;
pub mod stream;
pub mod tables;
pub mod text;

// Re-export commonly used types
pub use block::{BigBlockHeader, CompressedBlockDescriptor};
pub use compact_index::{decode_compact_index, encode_compact_index};
pub use error::{Result, UpkError};
pub use header::{Generation, Layout, PackageHeader, TableLocation};
pub use limits::Limits;
pub use property::{LegacyType, ModernType, Property, PropertyValue};
pub use stream::{PackageRead, SliceReader};
pub use tables::{ExportEntry, ImportEntry, NameEntry, NameTable, PackageTables};
