//! Modern property decoder
//!
//! Tags are three `i64` fields: name, type name and declared value length.
//! Values are dispatched on the type-name string. Arrays, structs and
//! nested tagged lists are decoded with an explicit frame stack so a
//! crafted package cannot exhaust the native stack; depth is bounded by
//! [`Limits::max_nesting_depth`].

use tracing::trace;
use upk_format::constants::{NONE_NAME, STRUCT_RESERVED_LEN};
use upk_format::text::read_fstring;
use upk_format::{
    Limits, ModernType, NameTable, PackageRead, Property, PropertyValue, Result, UpkError,
};

const STRUCT_PROPERTY: &str = "StructProperty";
const BOOL_PROPERTY: &str = "BoolProperty";

/// Decoded modern property tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModernTag {
    /// Property name
    pub name: String,
    /// Type name
    pub type_name: String,
    /// Declared value length
    pub len: u64,
}

struct OpenTag {
    tag: ModernTag,
    value_start: u64,
    budget: u64,
}

impl OpenTag {
    fn end(&self) -> u64 {
        self.value_start + self.budget
    }
}

enum Frame {
    /// Tagged list collecting properties until `None`
    List {
        props: Vec<Property>,
        pending: Option<OpenTag>,
    },
    /// Array collecting `count` elements
    Array {
        element_type: String,
        struct_type: Option<String>,
        count: usize,
        elements: Vec<PropertyValue>,
        end: u64,
    },
    /// Struct waiting for its single inner value
    Struct { type_name: String, end: u64 },
}

enum Begin {
    Value(PropertyValue),
    Frame(Frame),
}

/// Decoder for the modern tag scheme
pub struct ModernPropertyDecoder<'a> {
    names: &'a NameTable,
    limits: &'a Limits,
}

impl<'a> ModernPropertyDecoder<'a> {
    /// Create a decoder resolving names through `names`.
    pub fn new(names: &'a NameTable, limits: &'a Limits) -> Self {
        Self { names, limits }
    }

    fn resolve(&self, index: i64) -> Result<String> {
        self.names.resolve(index).map(str::to_string)
    }

    /// Read one tag; `None` at the terminating `None` name.
    ///
    /// The terminator consumes only its `i64` name.
    pub fn read_tag<R: PackageRead + ?Sized>(&self, r: &mut R) -> Result<Option<ModernTag>> {
        let name = self.resolve(r.read_i64()?)?;
        if name == NONE_NAME {
            return Ok(None);
        }
        let type_name = self.resolve(r.read_i64()?)?;
        let len = r.read_i64()?;
        let len = u64::try_from(len).map_err(|_| UpkError::LengthMismatch {
            name: name.clone(),
            declared: 0,
            consumed: len.unsigned_abs(),
        })?;
        if len > self.limits.max_property_len {
            return Err(UpkError::LimitExceeded(format!(
                "Property '{}' length {} exceeds limit {}",
                name, len, self.limits.max_property_len
            )));
        }
        Ok(Some(ModernTag {
            name,
            type_name,
            len,
        }))
    }

    fn open_tag<R: PackageRead + ?Sized>(&self, r: &mut R, tag: ModernTag) -> Result<OpenTag> {
        // A zero-length bool still carries its value byte.
        let budget = if tag.type_name == BOOL_PROPERTY {
            tag.len.max(1)
        } else {
            tag.len
        };
        r.ensure_remaining(budget)?;
        Ok(OpenTag {
            tag,
            value_start: r.position(),
            budget,
        })
    }

    fn close_tag<R: PackageRead + ?Sized>(
        &self,
        r: &mut R,
        open: OpenTag,
        value: PropertyValue,
    ) -> Result<Property> {
        let consumed = r.position().saturating_sub(open.value_start);
        if consumed > open.budget {
            return Err(UpkError::LengthMismatch {
                name: open.tag.name,
                declared: open.budget,
                consumed,
            });
        }
        r.skip(open.budget - consumed)?;
        trace!(name = %open.tag.name, ty = %open.tag.type_name, len = open.budget, "modern property");
        Ok(Property {
            name: open.tag.name,
            array_index: 0,
            value,
        })
    }

    /// Decode properties up to and including the `None` terminator.
    ///
    /// Top-level properties are appended to `out` as they complete, so a
    /// failing property leaves the earlier ones in place.
    pub fn decode_properties<R: PackageRead + ?Sized>(
        &self,
        r: &mut R,
        out: &mut Vec<Property>,
    ) -> Result<()> {
        let mut stack = vec![Frame::List {
            props: Vec::new(),
            pending: None,
        }];
        match self.run(r, &mut stack) {
            Ok(props) => {
                out.extend(props);
                Ok(())
            }
            Err(e) => {
                if let Some(Frame::List { props, .. }) = stack.first_mut() {
                    out.append(props);
                }
                Err(e)
            }
        }
    }

    fn run<R: PackageRead + ?Sized>(&self, r: &mut R, stack: &mut Vec<Frame>) -> Result<Vec<Property>> {
        loop {
            let depth = stack.len();
            let top = match stack.last_mut() {
                Some(top) => top,
                None => return Err(UpkError::CorruptBlock("property stack underflow".to_string())),
            };

            match top {
                Frame::List { props, pending } => {
                    if pending.is_some() {
                        return Err(UpkError::CorruptBlock(
                            "tag left open on the stack".to_string(),
                        ));
                    }
                    if props.len() >= self.limits.max_properties_per_list {
                        return Err(UpkError::LimitExceeded(format!(
                            "Property list exceeds {} entries",
                            self.limits.max_properties_per_list
                        )));
                    }

                    let tag = match self.read_tag(r)? {
                        Some(tag) => tag,
                        None => {
                            let props = std::mem::take(props);
                            stack.pop();
                            if depth == 1 {
                                return Ok(props);
                            }
                            self.deliver(r, stack, PropertyValue::Properties(props))?;
                            continue;
                        }
                    };

                    let open = self.open_tag(r, tag)?;
                    match self.begin_value(r, &open.tag.type_name, open.end())? {
                        Begin::Value(value) => {
                            let property = self.close_tag(r, open, value)?;
                            props.push(property);
                        }
                        Begin::Frame(frame) => {
                            *pending = Some(open);
                            self.push(stack, frame)?;
                        }
                    }
                }
                Frame::Array {
                    element_type,
                    struct_type,
                    count,
                    elements,
                    end,
                } => {
                    if elements.len() == *count {
                        if struct_type.is_some() && *count > 1 {
                            // alignment byte, struct arrays only
                            r.read_u8()?;
                        }
                        let elements = std::mem::take(elements);
                        stack.pop();
                        self.deliver(r, stack, PropertyValue::Array(elements))?;
                        continue;
                    }

                    let element_type = element_type.clone();
                    match self.begin_value(r, &element_type, *end)? {
                        Begin::Value(value) => {
                            let value = wrap_element(struct_type, value);
                            elements.push(value);
                        }
                        Begin::Frame(frame) => self.push(stack, frame)?,
                    }
                }
                Frame::Struct { type_name, end } => {
                    let type_name = type_name.clone();
                    match self.begin_value(r, &type_name, *end)? {
                        Begin::Value(value) => {
                            stack.pop();
                            let value = PropertyValue::Struct {
                                type_name,
                                value: Box::new(value),
                            };
                            self.deliver(r, stack, value)?;
                        }
                        Begin::Frame(frame) => self.push(stack, frame)?,
                    }
                }
            }
        }
    }

    fn push(&self, stack: &mut Vec<Frame>, frame: Frame) -> Result<()> {
        if stack.len() >= self.limits.max_nesting_depth {
            return Err(UpkError::LimitExceeded(format!(
                "Property nesting exceeds depth {}",
                self.limits.max_nesting_depth
            )));
        }
        stack.push(frame);
        Ok(())
    }

    /// Hand a completed value to the frame now on top of the stack.
    fn deliver<R: PackageRead + ?Sized>(
        &self,
        r: &mut R,
        stack: &mut Vec<Frame>,
        mut value: PropertyValue,
    ) -> Result<()> {
        loop {
            match stack.last_mut() {
                Some(Frame::List { props, pending }) => {
                    let open = pending.take().ok_or_else(|| {
                        UpkError::CorruptBlock("value delivered without an open tag".to_string())
                    })?;
                    let property = self.close_tag(r, open, value)?;
                    props.push(property);
                    return Ok(());
                }
                Some(Frame::Array {
                    struct_type,
                    elements,
                    ..
                }) => {
                    elements.push(wrap_element(struct_type, value));
                    return Ok(());
                }
                Some(Frame::Struct { type_name, .. }) => {
                    let type_name = std::mem::take(type_name);
                    stack.pop();
                    value = PropertyValue::Struct {
                        type_name,
                        value: Box::new(value),
                    };
                }
                None => {
                    return Err(UpkError::CorruptBlock(
                        "value delivered to an empty stack".to_string(),
                    ))
                }
            }
        }
    }

    /// Start decoding a value. Fixed shapes are read immediately; arrays,
    /// structs and tagged lists return a frame to push.
    fn begin_value<R: PackageRead + ?Sized>(&self, r: &mut R, type_name: &str, end: u64) -> Result<Begin> {
        let ty = match ModernType::parse(type_name) {
            Some(ty) => ty,
            None => {
                return Ok(Begin::Value(PropertyValue::Raw {
                    type_name: type_name.to_string(),
                    bytes: capture(r, end)?,
                }))
            }
        };

        let value = match ty {
            ModernType::Bool => PropertyValue::Bool(r.read_u8()? != 0),
            ModernType::Byte => PropertyValue::Byte(r.read_u8()?),
            ModernType::Int => PropertyValue::Int(r.read_i32()?),
            ModernType::Float => PropertyValue::Float(r.read_f32()?),
            ModernType::Name => {
                let index = r.read_i64()?;
                PropertyValue::Name {
                    index,
                    value: self.resolve(index)?,
                }
            }
            ModernType::Object => PropertyValue::Object(r.read_i32()? as i64),
            ModernType::Str => {
                let max = usize::try_from(self.limits.max_property_len).unwrap_or(usize::MAX);
                PropertyValue::Str(read_fstring(r, max)?)
            }
            ModernType::Guid => PropertyValue::Guid(r.read_guid()?),
            ModernType::IntPoint => PropertyValue::IntPoint {
                x: r.read_i32()?,
                y: r.read_i32()?,
            },
            ModernType::FontCharacter => PropertyValue::FontCharacter {
                start_u: r.read_i32()?,
                start_v: r.read_i32()?,
                u_size: r.read_i32()?,
                v_size: r.read_i32()?,
                texture_index: r.read_i32()?,
            },
            ModernType::MaterialTextureInfo => {
                let sampling_scale = r.read_f32()?;
                let uv_channel = r.read_i32()?;
                let texture_name = self.resolve(r.read_i64()?)?;
                PropertyValue::MaterialTextureInfo {
                    sampling_scale,
                    uv_channel,
                    texture_name,
                }
            }
            ModernType::ColorMaterialInput
            | ModernType::ScalarMaterialInput
            | ModernType::TextureStreamingData
            | ModernType::FontImportOptionsData => {
                return Ok(Begin::Frame(Frame::List {
                    props: Vec::new(),
                    pending: None,
                }))
            }
            ModernType::Struct => {
                let type_name = self.resolve(r.read_i64()?)?;
                r.skip(STRUCT_RESERVED_LEN)?;
                return Ok(Begin::Frame(Frame::Struct { type_name, end }));
            }
            ModernType::Array => return self.begin_array(r, end),
        };
        Ok(Begin::Value(value))
    }

    fn begin_array<R: PackageRead + ?Sized>(&self, r: &mut R, end: u64) -> Result<Begin> {
        let mut element_type = self.resolve(r.read_i64()?)?;
        let count = r.read_u32()? as usize;
        if count > self.limits.max_array_elements {
            return Err(UpkError::LimitExceeded(format!(
                "Array element count {} exceeds limit {}",
                count, self.limits.max_array_elements
            )));
        }

        let mut struct_type = None;
        if element_type == STRUCT_PROPERTY {
            let _inner_name = r.read_i64()?;
            let inner_type = self.resolve(r.read_i64()?)?;
            let _inner_len = r.read_i64()?;
            element_type = inner_type.clone();
            struct_type = Some(inner_type);
        }

        if ModernType::parse(&element_type).is_none() {
            return Ok(Begin::Value(PropertyValue::Raw {
                type_name: element_type,
                bytes: capture(r, end)?,
            }));
        }

        Ok(Begin::Frame(Frame::Array {
            element_type,
            struct_type,
            count,
            elements: Vec::with_capacity(count.min(1024)),
            end,
        }))
    }
}

fn wrap_element(struct_type: &Option<String>, value: PropertyValue) -> PropertyValue {
    match struct_type {
        Some(type_name) => PropertyValue::Struct {
            type_name: type_name.clone(),
            value: Box::new(value),
        },
        None => value,
    }
}

/// Read every byte up to `end`.
fn capture<R: PackageRead + ?Sized>(r: &mut R, end: u64) -> Result<Vec<u8>> {
    let position = r.position();
    if position > end {
        return Err(UpkError::CorruptBlock(format!(
            "value at {} starts past its declared end {}",
            position, end
        )));
    }
    r.read_bytes((end - position) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use upk_format::SliceReader;

    const NAMES: [&str; 16] = [
        "None",
        "Points",
        "ArrayProperty",
        "StructProperty",
        "IntProperty",
        "Title",
        "StrProperty",
        "Count",
        "Color",
        "ColorMaterialInput",
        "Connected",
        "BoolProperty",
        "Location",
        "Vector",
        "Owner",
        "ObjectProperty",
    ];

    #[derive(Default)]
    struct Fixture {
        out: Vec<u8>,
    }

    impl Fixture {
        fn name(&mut self, name: &str) -> &mut Self {
            let index = NAMES.iter().position(|n| *n == name).unwrap() as i64;
            self.out.extend_from_slice(&index.to_le_bytes());
            self
        }

        fn tag(&mut self, name: &str, ty: &str, len: i64) -> &mut Self {
            self.name(name).name(ty);
            self.out.extend_from_slice(&len.to_le_bytes());
            self
        }

        fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
            self.out.extend_from_slice(bytes);
            self
        }
    }

    fn decode(data: &[u8], limits: &Limits) -> (Result<()>, Vec<Property>, u64) {
        let names = NameTable::from_names(NAMES);
        let decoder = ModernPropertyDecoder::new(&names, limits);
        let mut reader = SliceReader::new(data);
        let mut props = Vec::new();
        let result = decoder.decode_properties(&mut reader, &mut props);
        (result, props, reader.position())
    }

    fn int_struct(value: i32) -> PropertyValue {
        PropertyValue::Struct {
            type_name: "IntProperty".to_string(),
            value: Box::new(PropertyValue::Int(value)),
        }
    }

    #[test]
    fn test_none_consumes_only_name() {
        let mut fixture = Fixture::default();
        fixture.name("None").bytes(&[0xAB; 16]);
        let (result, props, position) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert!(props.is_empty());
        assert_eq!(position, 8);
    }

    #[test]
    fn test_struct_array_with_alignment_byte() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Points", "ArrayProperty", 8 + 4 + 24 + 12 + 1)
            .name("StructProperty")
            .bytes(&3u32.to_le_bytes())
            .tag("Points", "IntProperty", 12)
            .bytes(&10i32.to_le_bytes())
            .bytes(&20i32.to_le_bytes())
            .bytes(&30i32.to_le_bytes())
            .bytes(&[0])
            .name("None");

        let (result, props, position) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(position, fixture.out.len() as u64);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].name, "Points");
        assert_eq!(
            props[0].value,
            PropertyValue::Array(vec![int_struct(10), int_struct(20), int_struct(30)])
        );
    }

    #[test]
    fn test_single_element_array_has_no_alignment_byte() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Points", "ArrayProperty", 8 + 4 + 24 + 4)
            .name("StructProperty")
            .bytes(&1u32.to_le_bytes())
            .tag("Points", "IntProperty", 4)
            .bytes(&7i32.to_le_bytes())
            .tag("Count", "IntProperty", 4)
            .bytes(&1i32.to_le_bytes())
            .name("None");

        let (result, props, _) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(props[0].value, PropertyValue::Array(vec![int_struct(7)]));
        assert_eq!(props[1].value, PropertyValue::Int(1));
    }

    #[test]
    fn test_plain_array_elements() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Owner", "ArrayProperty", 8 + 4 + 8)
            .name("ObjectProperty")
            .bytes(&2u32.to_le_bytes())
            .bytes(&(-3i32).to_le_bytes())
            .bytes(&5i32.to_le_bytes())
            .name("None");

        let (result, props, _) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(
            props[0].value,
            PropertyValue::Array(vec![PropertyValue::Object(-3), PropertyValue::Object(5)])
        );
    }

    #[test]
    fn test_plain_array_followed_by_property() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Points", "ArrayProperty", 8 + 4 + 8)
            .name("IntProperty")
            .bytes(&2u32.to_le_bytes())
            .bytes(&10i32.to_le_bytes())
            .bytes(&20i32.to_le_bytes())
            .tag("Count", "IntProperty", 4)
            .bytes(&1i32.to_le_bytes())
            .name("None");

        let (result, props, position) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(
            props[0].value,
            PropertyValue::Array(vec![PropertyValue::Int(10), PropertyValue::Int(20)])
        );
        assert_eq!(props[1].name, "Count");
        assert_eq!(props[1].value, PropertyValue::Int(1));
        assert_eq!(position, fixture.out.len() as u64);
    }

    #[test]
    fn test_struct_with_tagged_list() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Color", "StructProperty", 8 + 16 + 24 + 1 + 8)
            .name("ColorMaterialInput")
            .bytes(&[0; 16])
            .tag("Connected", "BoolProperty", 1)
            .bytes(&[1])
            .name("None")
            .name("None");

        let (result, props, position) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(position, fixture.out.len() as u64);
        assert_eq!(
            props[0].value,
            PropertyValue::Struct {
                type_name: "ColorMaterialInput".to_string(),
                value: Box::new(PropertyValue::Properties(vec![Property {
                    name: "Connected".to_string(),
                    array_index: 0,
                    value: PropertyValue::Bool(true),
                }])),
            }
        );
    }

    #[test]
    fn test_unknown_struct_type_is_raw() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Location", "StructProperty", 8 + 16 + 12)
            .name("Vector")
            .bytes(&[0; 16])
            .bytes(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12])
            .name("None");

        let (result, props, _) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(
            props[0].value,
            PropertyValue::Struct {
                type_name: "Vector".to_string(),
                value: Box::new(PropertyValue::Raw {
                    type_name: "Vector".to_string(),
                    bytes: vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
                }),
            }
        );
    }

    #[test]
    fn test_short_value_is_padded() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Count", "IntProperty", 8)
            .bytes(&42i32.to_le_bytes())
            .bytes(&[0xEE; 4])
            .tag("Connected", "BoolProperty", 0)
            .bytes(&[0])
            .name("None");

        let (result, props, position) = decode(&fixture.out, &Limits::default());
        result.unwrap();
        assert_eq!(position, fixture.out.len() as u64);
        assert_eq!(props[0].value, PropertyValue::Int(42));
        assert_eq!(props[1].value, PropertyValue::Bool(false));
    }

    #[test]
    fn test_over_read_keeps_earlier_properties() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Count", "IntProperty", 4)
            .bytes(&5i32.to_le_bytes())
            .tag("Title", "StrProperty", 4)
            .bytes(&4i32.to_le_bytes())
            .bytes(b"abc\0")
            .name("None");

        let (result, props, _) = decode(&fixture.out, &Limits::default());
        match result {
            Err(UpkError::LengthMismatch {
                name,
                declared,
                consumed,
            }) => {
                assert_eq!(name, "Title");
                assert_eq!(declared, 4);
                assert_eq!(consumed, 8);
            }
            other => panic!("expected LengthMismatch, got {other:?}"),
        }
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, PropertyValue::Int(5));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let mut fixture = Fixture::default();
        fixture
            .tag("Color", "StructProperty", 8 + 16 + 8)
            .name("ColorMaterialInput")
            .bytes(&[0; 16])
            .name("None")
            .name("None");

        let limits = Limits {
            max_nesting_depth: 2,
            ..Limits::default()
        };
        let (result, props, _) = decode(&fixture.out, &limits);
        assert!(matches!(result, Err(UpkError::LimitExceeded(_))));
        assert!(props.is_empty());

        let (result, _, _) = decode(&fixture.out, &Limits::default());
        result.unwrap();
    }

    #[test]
    fn test_declared_length_past_end() {
        let mut fixture = Fixture::default();
        fixture.tag("Count", "IntProperty", 400).bytes(&[0; 4]);
        let (result, _, _) = decode(&fixture.out, &Limits::default());
        assert!(matches!(result, Err(UpkError::TruncatedStream { .. })));
    }
}
