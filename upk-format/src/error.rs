//! Error types for UPK decoding

use thiserror::Error;

/// UPK error types
#[derive(Debug, Error)]
pub enum UpkError {
    /// Input does not start with the package magic bytes.
    #[error("Invalid magic bytes: {0:#010x}")]
    InvalidMagic(u32),
    /// A compact index magnitude does not fit the five byte encoding.
    #[error("Malformed compact index: {0}")]
    MalformedVarint(String),
    /// A name reference points outside the name table.
    #[error("Name index {index} out of range (table has {len} entries)")]
    NameIndexOutOfRange {
        /// Offending index as read from the stream.
        index: i64,
        /// Number of entries in the name table.
        len: usize,
    },
    /// A class/type reference points outside the import or name table.
    #[error("Type reference {reference} out of range")]
    TypeIndexOutOfRange {
        /// Signed class reference as read from the stream.
        reference: i64,
    },
    /// An outer/parent reference points outside the export table.
    #[error("Object reference {reference} out of range")]
    ObjectIndexOutOfRange {
        /// Signed object reference as read from the stream.
        reference: i64,
    },
    /// Encountered end of input before a declared length was satisfied.
    #[error("Truncated stream: needed {needed} bytes at offset {offset}, {available} available")]
    TruncatedStream {
        /// Absolute offset of the failed read.
        offset: u64,
        /// Bytes requested.
        needed: u64,
        /// Bytes remaining in the stream.
        available: u64,
    },
    /// Property type could not be dispatched.
    #[error("Unknown property type: {0}")]
    UnknownPropertyType(String),
    /// A typed reader consumed more bytes than its tag declared.
    #[error("Property '{name}' declared {declared} bytes but its value consumed {consumed}")]
    LengthMismatch {
        /// Property name from the tag.
        name: String,
        /// Declared value length.
        declared: u64,
        /// Bytes actually consumed.
        consumed: u64,
    },
    /// Encountered an unknown or unsupported compression codec.
    #[error("Unsupported compression codec: {0}")]
    UnsupportedCompressionCodec(u16),
    /// Underlying compression codec reported an error.
    #[error("Decompression error: {0}")]
    DecompressError(String),
    /// Compressed block framing is corrupt.
    #[error("Corrupt block: {0}")]
    CorruptBlock(String),
    /// Neither the modern nor the legacy table layout could be parsed.
    #[error("Unsupported package layout (modern: {modern}; legacy: {legacy})")]
    UnsupportedLayout {
        /// Why the modern layout attempt failed.
        modern: String,
        /// Error raised by the legacy layout attempt.
        legacy: Box<UpkError>,
    },
    /// A configured security limit was exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    /// Name or string payload is not valid text.
    #[error("Invalid string: {0}")]
    InvalidString(String),
    /// I/O operation failed while reading data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpkError {
    /// Whether this error leaves the stream at an unknown position.
    ///
    /// Layout fallback and per-object recovery treat every error as
    /// structural except I/O failures of the underlying source.
    pub fn is_structural(&self) -> bool {
        !matches!(self, UpkError::Io(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, UpkError>;
