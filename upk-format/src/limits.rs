//! Security limits and configuration

/// Security limits to keep crafted packages from exhausting memory or stack
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum name table entries (default: 1,000,000)
    pub max_names: usize,
    /// Maximum import table entries (default: 1,000,000)
    pub max_imports: usize,
    /// Maximum export table entries (default: 1,000,000)
    pub max_exports: usize,
    /// Maximum bytes in a single name (default: 1,024)
    pub max_name_len: usize,
    /// Maximum declared property length (default: 64 MiB)
    pub max_property_len: u64,
    /// Maximum elements in one array property (default: 1,000,000)
    pub max_array_elements: usize,
    /// Maximum nesting of struct/array/list frames (default: 64)
    pub max_nesting_depth: usize,
    /// Maximum properties in one list (default: 65,536)
    pub max_properties_per_list: usize,
    /// Maximum decompressed size of a little block (default: 64 MiB)
    pub max_block_uncompressed_len: u64,
    /// Maximum decompressed size of a whole archive (default: 4 GiB)
    pub max_archive_uncompressed_len: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_names: 1_000_000,
            max_imports: 1_000_000,
            max_exports: 1_000_000,
            max_name_len: 1_024,
            max_property_len: 64 * 1024 * 1024,
            max_array_elements: 1_000_000,
            max_nesting_depth: 64,
            max_properties_per_list: 65_536,
            max_block_uncompressed_len: 64 * 1024 * 1024,
            max_archive_uncompressed_len: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Check a table count against its limit.
    pub fn check_count(&self, what: &str, count: usize, max: usize) -> crate::Result<()> {
        if count > max {
            return Err(crate::UpkError::LimitExceeded(format!(
                "{} count {} exceeds limit {}",
                what, count, max
            )));
        }
        Ok(())
    }
}
