//! Name, import and export tables
//!
//! All three tables are read once per package and are immutable afterwards.
//! Every index read from the stream is bounds-checked before it is used.

use crate::constants::CLASS_NAME;
use crate::error::{Result, UpkError};
use crate::header::{Layout, PackageHeader, TableLocation};
use crate::limits::Limits;
use crate::stream::PackageRead;
use crate::text::{read_fstring, read_short_name};

/// One name table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    /// Name text without terminator
    pub name: String,
    /// Object flags stored alongside the name
    pub flags: u64,
}

/// Index-addressed name table
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    entries: Vec<NameEntry>,
}

impl NameTable {
    /// Build a table from already decoded entries.
    pub fn from_entries(entries: Vec<NameEntry>) -> Self {
        Self { entries }
    }

    /// Build a table from bare names with zero flags.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|name| NameEntry {
                    name: name.into(),
                    flags: 0,
                })
                .collect(),
        }
    }

    /// Resolve a name index, failing with `NameIndexOutOfRange`.
    pub fn resolve(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .map(|entry| entry.name.as_str())
            .ok_or(UpkError::NameIndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    /// Index of the first entry equal to `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &NameEntry> {
        self.entries.iter()
    }

    fn decode<R: PackageRead + ?Sized>(
        r: &mut R,
        layout: Layout,
        location: TableLocation,
        limits: &Limits,
    ) -> Result<Self> {
        let count = location.count as usize;
        limits.check_count("Name", count, limits.max_names)?;
        seek_table(r, location, min_name_len(layout))?;

        let mut entries = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let entry = match layout {
                Layout::Legacy => {
                    let name = read_short_name(r)?;
                    let flags = r.read_u32()? as u64;
                    NameEntry { name, flags }
                }
                Layout::Modern => {
                    let name = read_fstring(r, limits.max_name_len)?;
                    let lo = r.read_u32()? as u64;
                    let hi = r.read_u32()? as u64;
                    NameEntry {
                        name,
                        flags: (hi << 32) | lo,
                    }
                }
            };
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}

/// Object referenced from another package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Name index of the package holding the class
    pub class_package: i64,
    /// Name index of the class
    pub class_name: i64,
    /// Outer import reference
    pub outer: i32,
    /// Name index of the object itself
    pub object_name: i64,
}

impl ImportEntry {
    fn decode<R: PackageRead + ?Sized>(r: &mut R, layout: Layout) -> Result<Self> {
        Ok(match layout {
            Layout::Legacy => Self {
                class_package: r.read_compact_index()?,
                class_name: r.read_compact_index()?,
                outer: r.read_i32()?,
                object_name: r.read_compact_index()?,
            },
            Layout::Modern => Self {
                class_package: r.read_i64()?,
                class_name: r.read_i64()?,
                outer: r.read_i32()?,
                object_name: r.read_i64()?,
            },
        })
    }
}

/// Object stored in this package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Signed class reference (see [`PackageTables::type_name`])
    pub class_ref: i64,
    /// Signed super-class reference
    pub super_ref: i64,
    /// Outer object: `0` for the root, `n > 0` for export `n - 1`
    pub outer: i32,
    /// Name index of the object
    pub object_name: i64,
    /// Archetype reference (modern layout)
    pub archetype: i32,
    /// Object flags
    pub object_flags: u64,
    /// Serialized length of the object's data
    pub serial_size: u64,
    /// Absolute offset of the object's data
    pub serial_offset: u64,
    /// Export flags (modern layout)
    pub export_flags: u32,
}

impl ExportEntry {
    fn decode<R: PackageRead + ?Sized>(r: &mut R, layout: Layout, limits: &Limits) -> Result<Self> {
        match layout {
            Layout::Legacy => {
                let class_ref = r.read_compact_index()?;
                let super_ref = r.read_compact_index()?;
                let outer = r.read_i32()?;
                let object_name = r.read_compact_index()?;
                let object_flags = r.read_u32()? as u64;
                let serial_size = r.read_compact_index()?;
                let serial_offset = if serial_size > 0 {
                    r.read_compact_index()?
                } else {
                    0
                };
                if serial_size < 0 || serial_offset < 0 {
                    return Err(UpkError::CorruptBlock(format!(
                        "negative serial extent ({}, {})",
                        serial_size, serial_offset
                    )));
                }
                Ok(Self {
                    class_ref,
                    super_ref,
                    outer,
                    object_name,
                    archetype: 0,
                    object_flags,
                    serial_size: serial_size as u64,
                    serial_offset: serial_offset as u64,
                    export_flags: 0,
                })
            }
            Layout::Modern => {
                let class_ref = r.read_i32()? as i64;
                let super_ref = r.read_i32()? as i64;
                let outer = r.read_i32()?;
                let object_name = r.read_i64()?;
                let archetype = r.read_i32()?;
                let object_flags = r.read_u64()?;
                let serial_size = r.read_u32()? as u64;
                let serial_offset = r.read_u32()? as u64;
                let export_flags = r.read_u32()?;
                let net_objects = r.read_u32()? as usize;
                limits.check_count("Net object", net_objects, limits.max_exports)?;
                r.skip(net_objects as u64 * 4)?;
                let _package_guid = r.read_guid()?;
                let _package_flags = r.read_u32()?;
                Ok(Self {
                    class_ref,
                    super_ref,
                    outer,
                    object_name,
                    archetype,
                    object_flags,
                    serial_size,
                    serial_offset,
                    export_flags,
                })
            }
        }
    }
}

fn min_name_len(layout: Layout) -> u64 {
    match layout {
        Layout::Legacy => 1 + 4,
        Layout::Modern => 4 + 8,
    }
}

fn seek_table<R: PackageRead + ?Sized>(
    r: &mut R,
    location: TableLocation,
    min_entry_len: u64,
) -> Result<()> {
    let offset = location.offset as u64;
    let needed = location.count as u64 * min_entry_len;
    if offset > r.len() || needed > r.len() - offset {
        return Err(UpkError::TruncatedStream {
            offset,
            needed,
            available: r.len().saturating_sub(offset),
        });
    }
    r.seek(offset)
}

/// Name, import and export tables of one package
#[derive(Debug, Clone, Default)]
pub struct PackageTables {
    /// Name table
    pub names: NameTable,
    /// Import table
    pub imports: Vec<ImportEntry>,
    /// Export table
    pub exports: Vec<ExportEntry>,
}

impl PackageTables {
    /// Read all three tables at the locations named by `header`.
    pub fn read<R: PackageRead + ?Sized>(
        r: &mut R,
        header: &PackageHeader,
        limits: &Limits,
    ) -> Result<Self> {
        let layout = header.layout;
        let names = NameTable::decode(r, layout, header.names, limits)?;

        let import_count = header.imports.count as usize;
        limits.check_count("Import", import_count, limits.max_imports)?;
        let min_import = match layout {
            Layout::Legacy => 1 + 1 + 4 + 1,
            Layout::Modern => 8 + 8 + 4 + 8,
        };
        seek_table(r, header.imports, min_import)?;
        let mut imports = Vec::with_capacity(import_count.min(4096));
        for _ in 0..import_count {
            imports.push(ImportEntry::decode(r, layout)?);
        }

        let export_count = header.exports.count as usize;
        limits.check_count("Export", export_count, limits.max_exports)?;
        let min_export = match layout {
            Layout::Legacy => 1 + 1 + 4 + 1 + 4 + 1,
            Layout::Modern => 4 * 3 + 8 + 4 + 8 + 4 * 4 + 16 + 4,
        };
        seek_table(r, header.exports, min_export)?;
        let mut exports = Vec::with_capacity(export_count.min(4096));
        for _ in 0..export_count {
            exports.push(ExportEntry::decode(r, layout, limits)?);
        }

        let tables = Self {
            names,
            imports,
            exports,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Check every name and outer reference held by the tables.
    pub fn validate(&self) -> Result<()> {
        for import in &self.imports {
            self.names.resolve(import.class_package)?;
            self.names.resolve(import.class_name)?;
            self.names.resolve(import.object_name)?;
        }
        for export in &self.exports {
            self.names.resolve(export.object_name)?;
            self.outer_of(export)?;
        }
        Ok(())
    }

    /// Resolve a signed class reference to its type name.
    ///
    /// Positive values index the name table (intrinsic types), zero is the
    /// `Class` sentinel and negative values index the import table as
    /// `-(id) - 1`.
    pub fn type_name(&self, class_ref: i64) -> Result<&str> {
        let out_of_range = || UpkError::TypeIndexOutOfRange {
            reference: class_ref,
        };
        match class_ref {
            0 => Ok(CLASS_NAME),
            r if r > 0 => self.names.resolve(r).map_err(|_| out_of_range()),
            r => {
                let index = usize::try_from(-(r + 1)).map_err(|_| out_of_range())?;
                let import = self.imports.get(index).ok_or_else(out_of_range)?;
                self.names.resolve(import.object_name)
            }
        }
    }

    /// Name of an export.
    pub fn export_name(&self, index: usize) -> Result<&str> {
        let export = self
            .exports
            .get(index)
            .ok_or(UpkError::ObjectIndexOutOfRange {
                reference: index as i64,
            })?;
        self.object_name(export)
    }

    /// Object name of an export entry.
    pub fn object_name(&self, export: &ExportEntry) -> Result<&str> {
        self.names.resolve(export.object_name)
    }

    /// Class name of an import entry.
    pub fn import_type(&self, import: &ImportEntry) -> Result<&str> {
        self.names.resolve(import.class_name)
    }

    /// Index of an export's outer object, or `None` at the root.
    pub fn outer_of(&self, export: &ExportEntry) -> Result<Option<usize>> {
        match export.outer {
            0 => Ok(None),
            outer if outer > 0 && (outer as usize) <= self.exports.len() => {
                Ok(Some(outer as usize - 1))
            }
            outer => Err(UpkError::ObjectIndexOutOfRange {
                reference: outer as i64,
            }),
        }
    }
}
