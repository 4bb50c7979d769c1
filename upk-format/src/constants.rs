//! Constants and magic numbers for Unreal packages

/// Package magic as it appears on disk: `C1 83 2A 9E`.
pub const PACKAGE_MAGIC_BYTES: [u8; 4] = [0xC1, 0x83, 0x2A, 0x9E];

/// Package magic read as a little-endian u32.
pub const PACKAGE_MAGIC: u32 = 0x9E2A_83C1;

/// Compressed big-block magic (shares the package tag).
pub const BLOCK_MAGIC: u32 = PACKAGE_MAGIC;

/// Versions at or above this value try the modern table layout first.
pub const MODERN_LAYOUT_MIN_VERSION: u16 = 300;

/// Legacy packages below this version carry a heritage table instead of a guid.
pub const LEGACY_GUID_MIN_VERSION: u16 = 68;

/// Name that terminates a property list.
pub const NONE_NAME: &str = "None";

/// Type name used when an export's class reference is zero.
pub const CLASS_NAME: &str = "Class";

/// Separator used when joining an export's outer chain.
pub const PATH_SEPARATOR: char = '\\';

/// Suffix appended to a source path for its decompressed cache file.
pub const CACHE_SUFFIX: &str = ".decompressed";

/// Codec ID for stored (uncompressed) blocks.
pub const CODEC_RAW: u16 = 0;
/// Codec ID for zlib/DEFLATE blocks.
pub const CODEC_DEFLATE: u16 = 1;
/// Codec ID for LZO blocks.
pub const CODEC_LZO: u16 = 2;
/// Codec ID reserved by the format; decoders must reject it.
pub const CODEC_RESERVED: u16 = 4;

/// Size of a big-block header: magic + codec + compressed/decompressed totals.
pub const BIG_BLOCK_HEADER_LEN: u64 = 4 + 2 + 4 + 4;

/// Size of one little-block length pair.
pub const LITTLE_BLOCK_PAIR_LEN: u64 = 4 + 4;

/// Legacy info byte: array flag (or boolean value).
pub const INFO_ARRAY_FLAG: u8 = 0x80;
/// Legacy info byte: mask of the 3-bit size code.
pub const INFO_SIZE_MASK: u8 = 0x70;
/// Legacy info byte: shift of the 3-bit size code.
pub const INFO_SIZE_SHIFT: u8 = 4;
/// Legacy info byte: mask of the 4-bit type code.
pub const INFO_TYPE_MASK: u8 = 0x0F;

/// Fixed value sizes for legacy size codes 0..=4.
pub const LEGACY_FIXED_SIZES: [u64; 5] = [1, 2, 4, 12, 16];

/// Size of a modern property tag (name, type, length; eight bytes each).
pub const MODERN_TAG_LEN: u64 = 24;

/// Reserved region following a modern struct's inner type id.
pub const STRUCT_RESERVED_LEN: u64 = 16;
