//! UPK Test Utilities
//!
//! Builders for synthetic packages shared by the integration tests of the
//! workspace crates. Packages are laid out as header, export data, name
//! table, import table, export table so every offset is known before the
//! tables are written.

use upk_codec::{BigBlockBuilder, Codec};
use upk_format::constants::PACKAGE_MAGIC;
use upk_format::encode_compact_index;

/// Table layout to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Compact-index tables, bit-packed property tags
    Legacy,
    /// Fixed-width tables, type-name property tags
    Modern,
}

struct ImportRow {
    class_package: i64,
    class_name: i64,
    object_name: i64,
}

struct ExportRow {
    class_ref: i64,
    outer: i32,
    name: i64,
    data: Vec<u8>,
}

/// Builder for a complete package image
pub struct PackageBuilder {
    scheme: Scheme,
    version: u16,
    folder: String,
    names: Vec<String>,
    imports: Vec<ImportRow>,
    exports: Vec<ExportRow>,
    export_offset_override: Option<u32>,
}

impl PackageBuilder {
    /// Start a legacy-layout package.
    pub fn legacy(version: u16) -> Self {
        Self::new(Scheme::Legacy, version)
    }

    /// Start a modern-layout package.
    pub fn modern(version: u16) -> Self {
        Self::new(Scheme::Modern, version)
    }

    fn new(scheme: Scheme, version: u16) -> Self {
        let mut builder = Self {
            scheme,
            version,
            folder: "None".to_string(),
            names: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            export_offset_override: None,
        };
        builder.name("None");
        builder
    }

    /// Layout this builder emits
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Set the modern header's folder name.
    pub fn folder(&mut self, folder: &str) -> &mut Self {
        self.folder = folder.to_string();
        self
    }

    /// Write `offset` into the header instead of the real export table offset.
    pub fn export_table_offset(&mut self, offset: u32) -> &mut Self {
        self.export_offset_override = Some(offset);
        self
    }

    /// Intern a name and return its index.
    pub fn name(&mut self, name: &str) -> i64 {
        match self.names.iter().position(|n| n == name) {
            Some(index) => index as i64,
            None => {
                self.names.push(name.to_string());
                (self.names.len() - 1) as i64
            }
        }
    }

    /// Add an import and return its class reference (`-(index) - 1`).
    pub fn import(&mut self, class_package: &str, class_name: &str, object_name: &str) -> i64 {
        let row = ImportRow {
            class_package: self.name(class_package),
            class_name: self.name(class_name),
            object_name: self.name(object_name),
        };
        self.imports.push(row);
        -(self.imports.len() as i64)
    }

    /// Add an export and return its outer reference (`index + 1`).
    pub fn export(&mut self, name: &str, class_ref: i64, outer: i32, data: Vec<u8>) -> i32 {
        let name = self.name(name);
        self.exports.push(ExportRow {
            class_ref,
            outer,
            name,
            data,
        });
        self.exports.len() as i32
    }

    /// Start a modern property list that interns names into this builder.
    pub fn modern_props(&mut self) -> ModernProps<'_> {
        ModernProps {
            builder: self,
            out: Vec::new(),
        }
    }

    /// Start a legacy property list that interns names into this builder.
    pub fn legacy_props(&mut self) -> LegacyProps<'_> {
        LegacyProps {
            builder: self,
            out: Vec::new(),
        }
    }

    fn header(&self, counts: [(u32, u32); 3], chunks: &[[u32; 4]], compression: u32) -> Vec<u8> {
        let [names, exports, imports] = counts;
        let mut out = Vec::new();
        out.extend_from_slice(&PACKAGE_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        match self.scheme {
            Scheme::Legacy => {
                out.extend_from_slice(&0u32.to_le_bytes());
                for (count, offset) in [names, exports, imports] {
                    out.extend_from_slice(&count.to_le_bytes());
                    out.extend_from_slice(&offset.to_le_bytes());
                }
                if self.version < 68 {
                    out.extend_from_slice(&[0u8; 8]);
                } else {
                    out.extend_from_slice(&[0x11; 16]);
                    out.extend_from_slice(&1u32.to_le_bytes());
                    out.extend_from_slice(&exports.0.to_le_bytes());
                    out.extend_from_slice(&names.0.to_le_bytes());
                }
            }
            Scheme::Modern => {
                let size_at = out.len();
                out.extend_from_slice(&0u32.to_le_bytes());
                write_fstring(&mut out, &self.folder);
                out.extend_from_slice(&0u32.to_le_bytes());
                for (count, offset) in [names, exports, imports] {
                    out.extend_from_slice(&count.to_le_bytes());
                    out.extend_from_slice(&offset.to_le_bytes());
                }
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&[0x22; 16]);
                out.extend_from_slice(&1u32.to_le_bytes());
                out.extend_from_slice(&exports.0.to_le_bytes());
                out.extend_from_slice(&names.0.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&7_258u32.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&compression.to_le_bytes());
                out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
                for chunk in chunks {
                    for field in chunk {
                        out.extend_from_slice(&field.to_le_bytes());
                    }
                }
                let size = out.len() as u32;
                out[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
            }
        }
        out
    }

    fn name_table(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for name in &self.names {
            match self.scheme {
                Scheme::Legacy => {
                    out.push((name.len() + 1) as u8);
                    out.extend_from_slice(name.as_bytes());
                    out.push(0);
                    out.extend_from_slice(&0x0007_0010u32.to_le_bytes());
                }
                Scheme::Modern => {
                    write_fstring(&mut out, name);
                    out.extend_from_slice(&0u32.to_le_bytes());
                    out.extend_from_slice(&0x0007_0010u32.to_le_bytes());
                }
            }
        }
        out
    }

    fn import_table(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for import in &self.imports {
            match self.scheme {
                Scheme::Legacy => {
                    write_compact(&mut out, import.class_package);
                    write_compact(&mut out, import.class_name);
                    out.extend_from_slice(&0i32.to_le_bytes());
                    write_compact(&mut out, import.object_name);
                }
                Scheme::Modern => {
                    out.extend_from_slice(&import.class_package.to_le_bytes());
                    out.extend_from_slice(&import.class_name.to_le_bytes());
                    out.extend_from_slice(&0i32.to_le_bytes());
                    out.extend_from_slice(&import.object_name.to_le_bytes());
                }
            }
        }
        out
    }

    fn export_table(&self, data_offsets: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        for (export, &offset) in self.exports.iter().zip(data_offsets) {
            let size = export.data.len() as u32;
            match self.scheme {
                Scheme::Legacy => {
                    write_compact(&mut out, export.class_ref);
                    write_compact(&mut out, 0);
                    out.extend_from_slice(&export.outer.to_le_bytes());
                    write_compact(&mut out, export.name);
                    out.extend_from_slice(&0x0004_0000u32.to_le_bytes());
                    write_compact(&mut out, size as i64);
                    if size > 0 {
                        write_compact(&mut out, offset as i64);
                    }
                }
                Scheme::Modern => {
                    out.extend_from_slice(&(export.class_ref as i32).to_le_bytes());
                    out.extend_from_slice(&0i32.to_le_bytes());
                    out.extend_from_slice(&export.outer.to_le_bytes());
                    out.extend_from_slice(&export.name.to_le_bytes());
                    out.extend_from_slice(&0i32.to_le_bytes());
                    out.extend_from_slice(&0x000F_0004u64.to_le_bytes());
                    out.extend_from_slice(&size.to_le_bytes());
                    out.extend_from_slice(&offset.to_le_bytes());
                    out.extend_from_slice(&0u32.to_le_bytes());
                    out.extend_from_slice(&2u32.to_le_bytes());
                    out.extend_from_slice(&[0xAA; 8]);
                    out.extend_from_slice(&[0u8; 16]);
                    out.extend_from_slice(&0u32.to_le_bytes());
                }
            }
        }
        out
    }

    fn assemble(&self, chunks: &[[u32; 4]], compression: u32) -> (Vec<u8>, usize) {
        // Header length does not depend on the offsets it carries.
        let placeholder = [(0, 0); 3];
        let header_len = self.header(placeholder, chunks, compression).len();

        let mut data = Vec::new();
        let mut data_offsets = Vec::new();
        for export in &self.exports {
            data_offsets.push((header_len + data.len()) as u32);
            data.extend_from_slice(&export.data);
        }

        let names = self.name_table();
        let imports = self.import_table();
        let exports = self.export_table(&data_offsets);

        let names_at = header_len + data.len();
        let imports_at = names_at + names.len();
        let exports_at = imports_at + imports.len();
        let counts = [
            (self.names.len() as u32, names_at as u32),
            (
                self.exports.len() as u32,
                self.export_offset_override.unwrap_or(exports_at as u32),
            ),
            (self.imports.len() as u32, imports_at as u32),
        ];

        let mut out = self.header(counts, chunks, compression);
        out.extend_from_slice(&data);
        out.extend_from_slice(&names);
        out.extend_from_slice(&imports);
        out.extend_from_slice(&exports);
        (out, header_len)
    }

    /// Emit the uncompressed package.
    pub fn build(&self) -> Vec<u8> {
        self.assemble(&[], 0).0
    }

    /// Emit a whole-archive compressed package and its expected expansion.
    ///
    /// The body after the header is split into `chunk_count` chunks, each
    /// stored as one big block using `codec`.
    pub fn build_compressed(&mut self, codec: Codec, chunk_count: usize) -> CompressedPackage {
        let chunk_count = chunk_count.max(1);
        let placeholders = vec![[0u32; 4]; chunk_count];
        let (plain, header_len) = self.assemble(&placeholders, codec.id() as u32);
        let body = &plain[header_len..];
        let chunk_len = body.len().div_ceil(chunk_count).max(1);

        let mut blocks = Vec::new();
        let mut chunks = Vec::new();
        let mut compressed_at = header_len;
        for (i, piece) in body.chunks(chunk_len).enumerate() {
            let block = BigBlockBuilder::new(codec)
                .with_little_block_len(64)
                .build(piece)
                .expect("fixture block");
            chunks.push([
                (header_len + i * chunk_len) as u32,
                piece.len() as u32,
                compressed_at as u32,
                block.len() as u32,
            ]);
            compressed_at += block.len();
            blocks.push(block);
        }
        // Keep the header length stable when the body splits into fewer pieces.
        while chunks.len() < chunk_count {
            let empty = BigBlockBuilder::new(codec).build(&[]).expect("fixture block");
            chunks.push([
                (header_len + body.len()) as u32,
                0,
                compressed_at as u32,
                empty.len() as u32,
            ]);
            compressed_at += empty.len();
            blocks.push(empty);
        }

        let (expanded, _) = self.assemble(&chunks, codec.id() as u32);
        let mut compressed = expanded[..header_len].to_vec();
        for block in blocks {
            compressed.extend_from_slice(&block);
        }
        CompressedPackage {
            compressed,
            expanded,
        }
    }
}

/// Whole-archive compressed package with its expected expansion
pub struct CompressedPackage {
    /// Bytes on disk
    pub compressed: Vec<u8>,
    /// Bytes after decompression
    pub expanded: Vec<u8>,
}

/// Split `data` into big blocks of at most `block_len` bytes.
pub fn cache_archive(data: &[u8], block_len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for piece in data.chunks(block_len.max(1)) {
        let block = BigBlockBuilder::new(Codec::Deflate)
            .with_little_block_len(256)
            .build(piece)
            .expect("fixture block");
        out.extend_from_slice(&block);
    }
    out
}

/// Modern property list writer
pub struct ModernProps<'a> {
    builder: &'a mut PackageBuilder,
    out: Vec<u8>,
}

impl ModernProps<'_> {
    fn index(&mut self, name: &str) {
        let index = self.builder.name(name);
        self.out.extend_from_slice(&index.to_le_bytes());
    }

    /// Write a tag header.
    pub fn tag(&mut self, name: &str, ty: &str, len: i64) -> &mut Self {
        self.index(name);
        self.index(ty);
        self.out.extend_from_slice(&len.to_le_bytes());
        self
    }

    /// `IntProperty`
    pub fn int(&mut self, name: &str, value: i32) -> &mut Self {
        self.tag(name, "IntProperty", 4);
        self.out.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// `FloatProperty`
    pub fn float(&mut self, name: &str, value: f32) -> &mut Self {
        self.tag(name, "FloatProperty", 4);
        self.out.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// `BoolProperty`
    pub fn bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.tag(name, "BoolProperty", 1);
        self.out.push(value as u8);
        self
    }

    /// `StrProperty` (ANSI)
    pub fn str(&mut self, name: &str, value: &str) -> &mut Self {
        self.tag(name, "StrProperty", 4 + value.len() as i64 + 1);
        write_fstring(&mut self.out, value);
        self
    }

    /// `NameProperty`
    pub fn name_value(&mut self, name: &str, value: &str) -> &mut Self {
        self.tag(name, "NameProperty", 8);
        self.index(value);
        self
    }

    /// `ArrayProperty` of `StructProperty` wrapping `IntProperty` elements.
    pub fn int_struct_array(&mut self, name: &str, values: &[i32]) -> &mut Self {
        let alignment = if values.len() > 1 { 1 } else { 0 };
        let len = 8 + 4 + 24 + 4 * values.len() as i64 + alignment;
        self.tag(name, "ArrayProperty", len);
        self.index("StructProperty");
        self.out
            .extend_from_slice(&(values.len() as u32).to_le_bytes());
        self.tag(name, "IntProperty", 4 * values.len() as i64);
        for value in values {
            self.out.extend_from_slice(&value.to_le_bytes());
        }
        if alignment == 1 {
            self.out.push(0);
        }
        self
    }

    /// Tag of an unknown type carrying `bytes`.
    pub fn raw(&mut self, name: &str, ty: &str, bytes: &[u8]) -> &mut Self {
        self.tag(name, ty, bytes.len() as i64);
        self.out.extend_from_slice(bytes);
        self
    }

    /// Append raw bytes without a tag.
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Terminate the list and return its bytes.
    pub fn finish(&mut self) -> Vec<u8> {
        self.index("None");
        std::mem::take(&mut self.out)
    }
}

/// Legacy property list writer
pub struct LegacyProps<'a> {
    builder: &'a mut PackageBuilder,
    out: Vec<u8>,
}

impl LegacyProps<'_> {
    fn index(&mut self, name: &str) {
        let index = self.builder.name(name);
        write_compact(&mut self.out, index);
    }

    fn info(&mut self, array: bool, size_code: u8, type_code: u8) {
        self.out
            .push((array as u8) << 7 | (size_code & 0x07) << 4 | (type_code & 0x0F));
    }

    /// Int (type 2)
    pub fn int(&mut self, name: &str, value: i32) -> &mut Self {
        self.index(name);
        self.info(false, 2, 2);
        self.out.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Float (type 4)
    pub fn float(&mut self, name: &str, value: f32) -> &mut Self {
        self.index(name);
        self.info(false, 2, 4);
        self.out.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Bool (type 3), value carried in the array bit
    pub fn bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.index(name);
        self.info(value, 0, 3);
        self
    }

    /// Byte (type 1) at a static array index
    pub fn byte_at(&mut self, name: &str, index: u8, value: u8) -> &mut Self {
        self.index(name);
        self.info(true, 0, 1);
        self.out.push(index & 0x7F);
        self.out.push(value);
        self
    }

    /// Name (type 6)
    pub fn name_value(&mut self, name: &str, value: &str) -> &mut Self {
        self.index(name);
        let mut payload = Vec::new();
        write_compact(&mut payload, self.builder.name(value));
        self.info(false, 5, 6);
        self.out.push(payload.len() as u8);
        self.out.extend_from_slice(&payload);
        self
    }

    /// Str (type 15), UTF-16 with explicit `u8` length
    pub fn str(&mut self, name: &str, value: &str) -> &mut Self {
        self.index(name);
        let units: Vec<u16> = value.encode_utf16().collect();
        let mut payload = Vec::new();
        write_compact(&mut payload, units.len() as i64 + 1);
        for unit in units.iter().chain(std::iter::once(&0)) {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        self.info(false, 5, 15);
        self.out.push(payload.len() as u8);
        self.out.extend_from_slice(&payload);
        self
    }

    /// Vector (type 11), kept as raw bytes by the decoder
    pub fn vector(&mut self, name: &str, xyz: [f32; 3]) -> &mut Self {
        self.index(name);
        self.info(false, 3, 11);
        for component in xyz {
            self.out.extend_from_slice(&component.to_le_bytes());
        }
        self
    }

    /// Append raw bytes without a tag.
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Terminate the list and return its bytes.
    pub fn finish(&mut self) -> Vec<u8> {
        self.index("None");
        std::mem::take(&mut self.out)
    }
}

fn write_compact(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&encode_compact_index(value).expect("fixture index fits"));
}

fn write_fstring(out: &mut Vec<u8>, value: &str) {
    if value.is_empty() {
        out.extend_from_slice(&0i32.to_le_bytes());
        return;
    }
    out.extend_from_slice(&(value.len() as i32 + 1).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}
