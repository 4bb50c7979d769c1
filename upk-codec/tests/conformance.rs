//! Conformance tests for the tag schemes and block framing

use upk_codec::{
    decompress_big_block, decompress_big_block_into, BigBlockBuilder, Codec,
    LegacyPropertyDecoder, Limits, ModernPropertyDecoder, NameTable, PackageRead, PropertyValue,
    SliceReader, UpkError,
};
use upk_format::encode_compact_index;

#[test]
fn none_tag_consumes_only_the_name() {
    let names = NameTable::from_names(["Foo", "None"]);
    let limits = Limits::default();

    // Legacy: compact index 1 is a single byte.
    let legacy = [0x01, 0x7F, 0x7F];
    let mut reader = SliceReader::new(&legacy);
    let mut props = Vec::new();
    LegacyPropertyDecoder::new(&names, &limits)
        .decode_properties(&mut reader, &mut props)
        .unwrap();
    assert_eq!(reader.position(), 1);

    // Modern: eight-byte name only.
    let mut modern = 1i64.to_le_bytes().to_vec();
    modern.extend_from_slice(&[0xFF; 16]);
    let mut reader = SliceReader::new(&modern);
    ModernPropertyDecoder::new(&names, &limits)
        .decode_properties(&mut reader, &mut props)
        .unwrap();
    assert_eq!(reader.position(), 8);
    assert!(props.is_empty());
}

#[test]
fn legacy_str_with_explicit_u16_length() {
    let names = NameTable::from_names(["None", "Caption"]);
    let limits = Limits::default();
    let text = "Unreal";
    let units = text.encode_utf16().count() as i64 + 1;

    let mut value = encode_compact_index(units).unwrap().to_vec();
    for unit in text.encode_utf16().chain(std::iter::once(0)) {
        value.extend_from_slice(&unit.to_le_bytes());
    }

    let mut data = vec![0x01, 0x6F];
    data.extend_from_slice(&(value.len() as u16).to_le_bytes());
    data.extend_from_slice(&value);
    data.push(0x00);

    let mut reader = SliceReader::new(&data);
    let mut props = Vec::new();
    LegacyPropertyDecoder::new(&names, &limits)
        .decode_properties(&mut reader, &mut props)
        .unwrap();
    assert_eq!(props[0].name, "Caption");
    assert_eq!(props[0].value, PropertyValue::Str(text.to_string()));
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn legacy_empty_str_reads_only_length() {
    let names = NameTable::from_names(["None", "Caption"]);
    let limits = Limits::default();
    // Declared 4 bytes, compact length 0, rest is padding.
    let data = [0x01, 0x2F, 0x00, 0xAA, 0xAA, 0xAA, 0x00];
    let mut reader = SliceReader::new(&data);
    let mut props = Vec::new();
    LegacyPropertyDecoder::new(&names, &limits)
        .decode_properties(&mut reader, &mut props)
        .unwrap();
    assert_eq!(props[0].value, PropertyValue::Str(String::new()));
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn big_block_roundtrip_through_writer() {
    let mut data = Vec::new();
    for i in 0..4096u32 {
        data.extend_from_slice(&(i / 16).to_le_bytes());
    }

    let block = BigBlockBuilder::new(Codec::Deflate)
        .with_little_block_len(1024)
        .build(&data)
        .unwrap();

    let mut reader = SliceReader::new(&block);
    let mut out = Vec::new();
    let written = decompress_big_block_into(&mut reader, &mut out, &Limits::default()).unwrap();
    assert_eq!(written, data.len() as u64);
    assert_eq!(out, data);
}

#[test]
fn consecutive_big_blocks() {
    let first = vec![1u8; 500];
    let second: Vec<u8> = (0..300u32).map(|i| (i * 31 % 251) as u8).collect();

    let mut stream = BigBlockBuilder::new(Codec::Deflate).build(&first).unwrap();
    stream.extend(BigBlockBuilder::new(Codec::Deflate).build(&second).unwrap());

    let mut reader = SliceReader::new(&stream);
    let limits = Limits::default();
    assert_eq!(decompress_big_block(&mut reader, &limits).unwrap(), first);
    assert_eq!(decompress_big_block(&mut reader, &limits).unwrap(), second);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn block_limit_enforced() {
    let data = vec![0u8; 4096];
    let block = BigBlockBuilder::new(Codec::Deflate)
        .with_little_block_len(4096)
        .build(&data)
        .unwrap();

    let limits = Limits {
        max_block_uncompressed_len: 1024,
        ..Limits::default()
    };
    let mut reader = SliceReader::new(&block);
    assert!(matches!(
        decompress_big_block(&mut reader, &limits),
        Err(UpkError::LimitExceeded(_))
    ));
}
