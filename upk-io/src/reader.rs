//! Package reader: directory parsing, object paths and property decoding

use ahash::AHashMap;
use serde::Serialize;
use tracing::{debug, warn};
use upk_codec::{LegacyPropertyDecoder, ModernPropertyDecoder};
use upk_format::constants::{MODERN_LAYOUT_MIN_VERSION, PATH_SEPARATOR};
use upk_format::header::read_preamble;
use upk_format::{
    Layout, Limits, PackageHeader, PackageRead, PackageTables, Property, Result, UpkError,
};

use crate::OpenOptions;

/// Recovered problem recorded while reading a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// Qualified path of the affected object, if any
    pub object: Option<String>,
    /// Description of the recovered error
    pub message: String,
}

/// One export with its qualified name and decoded properties
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageObject {
    /// Export table index
    pub index: usize,
    /// Outer chain joined with `\`
    pub path: String,
    /// Resolved class name
    pub type_name: String,
    /// Offset of the serialized object data
    pub serial_offset: u64,
    /// Length of the serialized object data
    pub serial_size: u64,
    /// Decoded properties (possibly partial, see the package warnings)
    pub properties: Vec<Property>,
}

impl PackageObject {
    /// Path with the type name appended as an extension, e.g. `Pkg\Tex.Texture2D`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.path, self.type_name)
    }
}

/// Fully decoded package
#[derive(Debug, Clone)]
pub struct Package {
    header: PackageHeader,
    tables: PackageTables,
    objects: Vec<PackageObject>,
    warnings: Vec<Warning>,
}

impl Package {
    /// Decoded package header
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// Name, import and export tables
    pub fn tables(&self) -> &PackageTables {
        &self.tables
    }

    /// Table layout the package was read with
    pub fn layout(&self) -> Layout {
        self.header.layout
    }

    /// Iterate over decoded exports in table order.
    pub fn objects(&self) -> impl Iterator<Item = &PackageObject> {
        self.objects.iter()
    }

    /// Find an export by qualified name or by path.
    pub fn object(&self, name: &str) -> Option<&PackageObject> {
        self.objects
            .iter()
            .find(|object| object.path == name || object.qualified_name() == name)
    }

    /// Number of decoded exports
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the package has no decoded exports
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Problems recovered while reading
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// Reader over one uncompressed package stream
pub struct PackageReader<S: PackageRead> {
    stream: S,
    header: PackageHeader,
    tables: PackageTables,
    limits: Limits,
    paths: AHashMap<usize, String>,
    warnings: Vec<Warning>,
}

impl<S: PackageRead> PackageReader<S> {
    /// Parse the package directory.
    ///
    /// Versions at or above the modern threshold try the modern layout
    /// first; a structural failure rewinds the stream and tries the legacy
    /// layout once. Failing both is `UnsupportedLayout`.
    pub fn new(mut stream: S, opts: &OpenOptions) -> Result<Self> {
        let limits = opts.limits.clone();
        let (version, licensee) = read_preamble(&mut stream)?;
        let mut warnings = Vec::new();

        let (header, tables) = if version >= MODERN_LAYOUT_MIN_VERSION {
            match read_modern(&mut stream, &limits) {
                Ok(directory) => directory,
                Err(modern) if modern.is_structural() => {
                    stream.seek(0)?;
                    match read_legacy(&mut stream, &limits) {
                        Ok(directory) => {
                            warn!(version, error = %modern, "modern layout failed, read as legacy");
                            warnings.push(Warning {
                                object: None,
                                message: format!("modern layout rejected: {}", modern),
                            });
                            directory
                        }
                        Err(legacy) => {
                            return Err(UpkError::UnsupportedLayout {
                                modern: modern.to_string(),
                                legacy: Box::new(legacy),
                            })
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        } else {
            read_legacy(&mut stream, &limits)?
        };

        debug!(
            version,
            licensee,
            layout = ?header.layout,
            names = tables.names.len(),
            imports = tables.imports.len(),
            exports = tables.exports.len(),
            "package directory"
        );

        Ok(Self {
            stream,
            header,
            tables,
            limits,
            paths: AHashMap::new(),
            warnings,
        })
    }

    /// Decoded package header
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// Name, import and export tables
    pub fn tables(&self) -> &PackageTables {
        &self.tables
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Outer chain of an export joined with `\`, memoised per export.
    pub fn object_path(&mut self, index: usize) -> Result<String> {
        if let Some(path) = self.paths.get(&index) {
            return Ok(path.clone());
        }

        // Walk up to the root or the first memoised ancestor.
        let mut chain = Vec::new();
        let mut cursor = Some(index);
        let mut prefix: Option<String> = None;
        while let Some(current) = cursor {
            if let Some(path) = self.paths.get(&current) {
                prefix = Some(path.clone());
                break;
            }
            if chain.len() > self.tables.exports.len() {
                return Err(UpkError::ObjectIndexOutOfRange {
                    reference: index as i64,
                });
            }
            let export = self
                .tables
                .exports
                .get(current)
                .ok_or(UpkError::ObjectIndexOutOfRange {
                    reference: current as i64,
                })?;
            chain.push(current);
            cursor = self.tables.outer_of(export)?;
        }

        for current in chain.into_iter().rev() {
            let name = self.tables.export_name(current)?;
            let path = match prefix {
                Some(parent) => format!("{}{}{}", parent, PATH_SEPARATOR, name),
                None => name.to_string(),
            };
            self.paths.insert(current, path.clone());
            prefix = Some(path);
        }

        prefix.ok_or(UpkError::ObjectIndexOutOfRange {
            reference: index as i64,
        })
    }

    /// Decode the tagged properties of one export.
    ///
    /// Properties that decoded before a failure are returned alongside the
    /// error.
    pub fn read_properties(&mut self, index: usize) -> (Vec<Property>, Option<UpkError>) {
        let mut props = Vec::new();
        let result = self.decode_into(index, &mut props);
        (props, result.err())
    }

    fn decode_into(&mut self, index: usize, props: &mut Vec<Property>) -> Result<()> {
        let export = self
            .tables
            .exports
            .get(index)
            .ok_or(UpkError::ObjectIndexOutOfRange {
                reference: index as i64,
            })?;
        if export.serial_size == 0 {
            return Ok(());
        }

        let end = export.serial_offset.saturating_add(export.serial_size);
        if end > self.stream.len() {
            return Err(UpkError::TruncatedStream {
                offset: export.serial_offset,
                needed: export.serial_size,
                available: self.stream.len().saturating_sub(export.serial_offset),
            });
        }
        self.stream.seek(export.serial_offset)?;

        match self.header.layout {
            Layout::Legacy => LegacyPropertyDecoder::new(&self.tables.names, &self.limits)
                .decode_properties(&mut self.stream, props),
            Layout::Modern => ModernPropertyDecoder::new(&self.tables.names, &self.limits)
                .decode_properties(&mut self.stream, props),
        }
    }

    /// Resolve every export and, when `decode_properties` is set, decode
    /// its properties. Per-object failures become warnings.
    pub fn into_package(mut self, decode_properties: bool) -> Package {
        let mut objects = Vec::with_capacity(self.tables.exports.len());

        for index in 0..self.tables.exports.len() {
            let (path, type_name) = match self.describe(index) {
                Ok(described) => described,
                Err(e) => {
                    warn!(index, error = %e, "skipping export");
                    self.warnings.push(Warning {
                        object: Some(format!("export {}", index)),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let properties = if decode_properties {
                let (properties, error) = self.read_properties(index);
                if let Some(e) = error {
                    warn!(object = %path, error = %e, "property decoding stopped");
                    self.warnings.push(Warning {
                        object: Some(path.clone()),
                        message: e.to_string(),
                    });
                }
                properties
            } else {
                Vec::new()
            };

            let export = &self.tables.exports[index];
            objects.push(PackageObject {
                index,
                path,
                type_name,
                serial_offset: export.serial_offset,
                serial_size: export.serial_size,
                properties,
            });
        }

        Package {
            header: self.header,
            tables: self.tables,
            objects,
            warnings: self.warnings,
        }
    }

    fn describe(&mut self, index: usize) -> Result<(String, String)> {
        let path = self.object_path(index)?;
        let class_ref = self.tables.exports[index].class_ref;
        let type_name = self.tables.type_name(class_ref)?.to_string();
        Ok((path, type_name))
    }
}

fn read_modern<S: PackageRead + ?Sized>(
    stream: &mut S,
    limits: &Limits,
) -> Result<(PackageHeader, PackageTables)> {
    let header = PackageHeader::decode_modern(stream, limits)?;
    let tables = PackageTables::read(stream, &header, limits)?;
    Ok((header, tables))
}

fn read_legacy<S: PackageRead + ?Sized>(
    stream: &mut S,
    limits: &Limits,
) -> Result<(PackageHeader, PackageTables)> {
    let header = PackageHeader::decode_legacy(stream)?;
    let tables = PackageTables::read(stream, &header, limits)?;
    Ok((header, tables))
}
