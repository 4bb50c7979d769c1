//! Decoded property model shared by the legacy and modern decoders
//!
//! Both tag schemes produce the same closed [`PropertyValue`] tree. Legacy
//! payloads the decoder does not interpret are kept as `Raw` bytes, as are
//! modern values whose type name is not in [`ModernType`].

use serde::Serialize;

/// One decoded property: tag name, array index and value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    /// Property name resolved through the name table
    pub name: String,
    /// Element index for static-array properties (`0` otherwise)
    pub array_index: u32,
    /// Decoded value
    pub value: PropertyValue,
}

/// Decoded property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum PropertyValue {
    /// Legacy `Nothing` type
    None,
    /// Single byte
    Byte(u8),
    /// Signed 32-bit integer
    Int(i32),
    /// Boolean
    Bool(bool),
    /// IEEE-754 single
    Float(f32),
    /// Object reference (signed import/export index)
    Object(i64),
    /// Name reference with its resolved text
    Name {
        /// Name table index
        index: i64,
        /// Resolved text
        value: String,
    },
    /// Text string
    Str(String),
    /// Bytes kept verbatim
    Raw {
        /// Type the bytes were tagged with
        type_name: String,
        /// Payload
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
    },
    /// 16-byte guid
    Guid([u8; 16]),
    /// Integer point
    IntPoint {
        /// X coordinate
        x: i32,
        /// Y coordinate
        y: i32,
    },
    /// Glyph placement inside a font texture
    FontCharacter {
        /// Left texel
        start_u: i32,
        /// Top texel
        start_v: i32,
        /// Width in texels
        u_size: i32,
        /// Height in texels
        v_size: i32,
        /// Texture page
        texture_index: i32,
    },
    /// Texture streaming record
    MaterialTextureInfo {
        /// Sampling scale
        sampling_scale: f32,
        /// UV channel
        uv_channel: i32,
        /// Texture name
        texture_name: String,
    },
    /// Nested tagged property list
    Properties(Vec<Property>),
    /// Array elements in stream order
    Array(Vec<PropertyValue>),
    /// Struct wrapper naming the inner type
    Struct {
        /// Struct type name
        type_name: String,
        /// Inner value
        value: Box<PropertyValue>,
    },
}

impl PropertyValue {
    /// Short name of the variant, used in listings.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::None => "None",
            PropertyValue::Byte(_) => "Byte",
            PropertyValue::Int(_) => "Int",
            PropertyValue::Bool(_) => "Bool",
            PropertyValue::Float(_) => "Float",
            PropertyValue::Object(_) => "Object",
            PropertyValue::Name { .. } => "Name",
            PropertyValue::Str(_) => "Str",
            PropertyValue::Raw { .. } => "Raw",
            PropertyValue::Guid(_) => "Guid",
            PropertyValue::IntPoint { .. } => "IntPoint",
            PropertyValue::FontCharacter { .. } => "FontCharacter",
            PropertyValue::MaterialTextureInfo { .. } => "MaterialTextureInfo",
            PropertyValue::Properties(_) => "Properties",
            PropertyValue::Array(_) => "Array",
            PropertyValue::Struct { .. } => "Struct",
        }
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            out.push_str(&format!("{:02x}", byte));
        }
        serializer.serialize_str(&out)
    }
}

/// Legacy 4-bit property type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LegacyType {
    /// No payload
    Nothing = 0,
    /// Single byte
    Byte = 1,
    /// 32-bit integer
    Int = 2,
    /// Boolean carried in the info byte
    Bool = 3,
    /// 32-bit float
    Float = 4,
    /// Object reference (compact index)
    Object = 5,
    /// Name reference (compact index)
    Name = 6,
    /// Raw string payload
    String = 7,
    /// Class reference
    Class = 8,
    /// Dynamic array
    Array = 9,
    /// Struct
    Struct = 10,
    /// Three floats
    Vector = 11,
    /// Three ints
    Rotator = 12,
    /// Map
    Map = 13,
    /// Fixed array
    FixedArray = 14,
    /// Length-prefixed UTF-16 string
    Str = 15,
}

impl LegacyType {
    /// Map a 4-bit code onto its type.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => LegacyType::Nothing,
            1 => LegacyType::Byte,
            2 => LegacyType::Int,
            3 => LegacyType::Bool,
            4 => LegacyType::Float,
            5 => LegacyType::Object,
            6 => LegacyType::Name,
            7 => LegacyType::String,
            8 => LegacyType::Class,
            9 => LegacyType::Array,
            10 => LegacyType::Struct,
            11 => LegacyType::Vector,
            12 => LegacyType::Rotator,
            13 => LegacyType::Map,
            14 => LegacyType::FixedArray,
            15 => LegacyType::Str,
            _ => return None,
        })
    }

    /// Display name, used as the `Raw` type tag.
    pub fn name(self) -> &'static str {
        match self {
            LegacyType::Nothing => "Nothing",
            LegacyType::Byte => "Byte",
            LegacyType::Int => "Int",
            LegacyType::Bool => "Bool",
            LegacyType::Float => "Float",
            LegacyType::Object => "Object",
            LegacyType::Name => "Name",
            LegacyType::String => "String",
            LegacyType::Class => "Class",
            LegacyType::Array => "Array",
            LegacyType::Struct => "Struct",
            LegacyType::Vector => "Vector",
            LegacyType::Rotator => "Rotator",
            LegacyType::Map => "Map",
            LegacyType::FixedArray => "FixedArray",
            LegacyType::Str => "Str",
        }
    }
}

/// Modern type names the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModernType {
    /// `ArrayProperty`
    Array,
    /// `StructProperty`
    Struct,
    /// `BoolProperty`
    Bool,
    /// `ByteProperty`
    Byte,
    /// `IntProperty`
    Int,
    /// `FloatProperty`
    Float,
    /// `NameProperty`
    Name,
    /// `ObjectProperty`
    Object,
    /// `StrProperty`
    Str,
    /// `Guid`
    Guid,
    /// `IntPoint`
    IntPoint,
    /// `FontCharacter`
    FontCharacter,
    /// `MaterialTextureInfo`
    MaterialTextureInfo,
    /// `ColorMaterialInput`
    ColorMaterialInput,
    /// `ScalarMaterialInput`
    ScalarMaterialInput,
    /// `TextureStreamingData`
    TextureStreamingData,
    /// `FontImportOptionsData`
    FontImportOptionsData,
}

impl ModernType {
    /// Look up a type name; `None` for types decoded as `Raw`.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "ArrayProperty" => ModernType::Array,
            "StructProperty" => ModernType::Struct,
            "BoolProperty" => ModernType::Bool,
            "ByteProperty" => ModernType::Byte,
            "IntProperty" => ModernType::Int,
            "FloatProperty" => ModernType::Float,
            "NameProperty" => ModernType::Name,
            "ObjectProperty" => ModernType::Object,
            "StrProperty" => ModernType::Str,
            "Guid" => ModernType::Guid,
            "IntPoint" => ModernType::IntPoint,
            "FontCharacter" => ModernType::FontCharacter,
            "MaterialTextureInfo" => ModernType::MaterialTextureInfo,
            "ColorMaterialInput" => ModernType::ColorMaterialInput,
            "ScalarMaterialInput" => ModernType::ScalarMaterialInput,
            "TextureStreamingData" => ModernType::TextureStreamingData,
            "FontImportOptionsData" => ModernType::FontImportOptionsData,
            _ => return None,
        })
    }

    /// Whether values of this type are nested tagged property lists.
    pub fn is_tagged_list(self) -> bool {
        matches!(
            self,
            ModernType::ColorMaterialInput
                | ModernType::ScalarMaterialInput
                | ModernType::TextureStreamingData
                | ModernType::FontImportOptionsData
        )
    }
}
