//! Legacy property decoder
//!
//! Each tag is a compact-index name followed by a bit-packed info byte:
//! one array/boolean bit, a 3-bit size code and a 4-bit type code. Sizes
//! 0-4 select a fixed length, 5-7 an explicit `u8`/`u16`/`u32` length that
//! follows the info byte. Array indices come after the length.

use tracing::trace;
use upk_format::constants::{LEGACY_FIXED_SIZES, NONE_NAME};
use upk_format::text::decode_utf16le;
use upk_format::{
    LegacyType, Limits, NameTable, PackageRead, Property, PropertyValue, Result, UpkError,
};

/// Decoded legacy property tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTag {
    /// Property name
    pub name: String,
    /// Value type
    pub ty: LegacyType,
    /// Declared value length in bytes
    pub len: u64,
    /// Array index (`0` when the array bit is clear)
    pub array_index: u32,
    /// Array bit; holds the value itself for `Bool`
    pub array_flag: bool,
}

/// Decoder for the legacy tag scheme
pub struct LegacyPropertyDecoder<'a> {
    names: &'a NameTable,
    limits: &'a Limits,
}

impl<'a> LegacyPropertyDecoder<'a> {
    /// Create a decoder resolving names through `names`.
    pub fn new(names: &'a NameTable, limits: &'a Limits) -> Self {
        Self { names, limits }
    }

    /// Read one tag; `None` at the terminating `None` name.
    ///
    /// The terminator consumes only its compact-index name.
    pub fn read_tag<R: PackageRead + ?Sized>(&self, r: &mut R) -> Result<Option<LegacyTag>> {
        let name = self.names.resolve(r.read_compact_index()?)?;
        if name == NONE_NAME {
            return Ok(None);
        }

        let array_flag = r.read_bits(1)? == 1;
        let size_code = r.read_bits(3)?;
        let type_code = r.read_bits(4)?;
        let ty = LegacyType::from_code(type_code)
            .ok_or_else(|| UpkError::UnknownPropertyType(type_code.to_string()))?;

        if ty == LegacyType::Bool {
            return Ok(Some(LegacyTag {
                name: name.to_string(),
                ty,
                len: 0,
                array_index: 0,
                array_flag,
            }));
        }

        let len = match size_code {
            0..=4 => LEGACY_FIXED_SIZES[size_code as usize],
            5 => r.read_u8()? as u64,
            6 => r.read_u16()? as u64,
            _ => r.read_u32()? as u64,
        };
        if len > self.limits.max_property_len {
            return Err(UpkError::LimitExceeded(format!(
                "Property '{}' length {} exceeds limit {}",
                name, len, self.limits.max_property_len
            )));
        }

        let array_index = if array_flag {
            read_array_index(r)?
        } else {
            0
        };

        Ok(Some(LegacyTag {
            name: name.to_string(),
            ty,
            len,
            array_index,
            array_flag,
        }))
    }

    /// Decode one property; `None` at the end of the list.
    pub fn decode_property<R: PackageRead + ?Sized>(&self, r: &mut R) -> Result<Option<Property>> {
        let tag = match self.read_tag(r)? {
            Some(tag) => tag,
            None => return Ok(None),
        };
        r.ensure_remaining(tag.len)?;

        let start = r.position();
        let value = self.read_value(r, &tag)?;
        let consumed = r.position() - start;
        if consumed > tag.len {
            return Err(UpkError::LengthMismatch {
                name: tag.name,
                declared: tag.len,
                consumed,
            });
        }
        r.skip(tag.len - consumed)?;
        trace!(name = %tag.name, ty = tag.ty.name(), len = tag.len, "legacy property");

        Ok(Some(Property {
            name: tag.name,
            array_index: tag.array_index,
            value,
        }))
    }

    /// Decode properties up to and including the `None` terminator.
    ///
    /// Properties are appended to `out` as they complete, so a failing
    /// property leaves the earlier ones in place.
    pub fn decode_properties<R: PackageRead + ?Sized>(
        &self,
        r: &mut R,
        out: &mut Vec<Property>,
    ) -> Result<()> {
        while let Some(property) = self.decode_property(r)? {
            if out.len() >= self.limits.max_properties_per_list {
                return Err(UpkError::LimitExceeded(format!(
                    "Property list exceeds {} entries",
                    self.limits.max_properties_per_list
                )));
            }
            out.push(property);
        }
        Ok(())
    }

    fn read_value<R: PackageRead + ?Sized>(&self, r: &mut R, tag: &LegacyTag) -> Result<PropertyValue> {
        Ok(match tag.ty {
            LegacyType::Nothing => PropertyValue::None,
            LegacyType::Byte => PropertyValue::Byte(r.read_u8()?),
            LegacyType::Int => PropertyValue::Int(r.read_i32()?),
            LegacyType::Bool => PropertyValue::Bool(tag.array_flag),
            LegacyType::Float => PropertyValue::Float(r.read_f32()?),
            LegacyType::Object => PropertyValue::Object(r.read_compact_index()?),
            LegacyType::Name => {
                let index = r.read_compact_index()?;
                PropertyValue::Name {
                    index,
                    value: self.names.resolve(index)?.to_string(),
                }
            }
            LegacyType::Str => PropertyValue::Str(read_utf16_str(r, self.limits)?),
            other => PropertyValue::Raw {
                type_name: other.name().to_string(),
                bytes: r.read_bytes(tag.len as usize)?,
            },
        })
    }
}

/// Read a 1, 2 or 4 byte array index.
///
/// `0xxxxxxx` is a single byte, `10xxxxxx` two bytes and `11xxxxxx` four
/// bytes; the marker bits are cleared and the bytes read little-endian.
pub fn read_array_index<R: PackageRead + ?Sized>(r: &mut R) -> Result<u32> {
    let first = r.read_u8()?;
    let (width, low) = match first {
        b if b & 0x80 == 0 => return Ok(b as u32),
        b if b & 0x40 == 0 => (2, b & 0x3F),
        b => (4, b & 0x3F),
    };
    let mut value = low as u32;
    for shift in 1..width {
        value |= (r.read_u8()? as u32) << (8 * shift);
    }
    Ok(value)
}

fn read_utf16_str<R: PackageRead + ?Sized>(r: &mut R, limits: &Limits) -> Result<String> {
    let len = r.read_compact_index()?;
    if len <= 0 {
        return Ok(String::new());
    }
    let units = (len - 1) as u64;
    if units * 2 > limits.max_property_len {
        return Err(UpkError::LimitExceeded(format!(
            "String length {} exceeds limit {}",
            units, limits.max_property_len
        )));
    }
    let bytes = r.read_bytes(units as usize * 2)?;
    let text = decode_utf16le(&bytes)?;
    if r.read_u16()? != 0 {
        return Err(UpkError::InvalidString(
            "missing NUL terminator".to_string(),
        ));
    }
    Ok(text)
}
