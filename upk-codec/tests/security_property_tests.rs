//! Security-focused property tests for UPK decoders
//!
//! Arbitrary input must produce an error, never a panic, an unbounded
//! allocation or a runaway nesting depth.

use proptest::prelude::*;
use upk_codec::{
    decompress_big_block, LegacyPropertyDecoder, Limits, ModernPropertyDecoder, NameTable,
    PackageRead, SliceReader,
};
use upk_format::constants::BLOCK_MAGIC;

fn names() -> NameTable {
    NameTable::from_names([
        "None",
        "ArrayProperty",
        "StructProperty",
        "IntProperty",
        "ColorMaterialInput",
        "StrProperty",
        "Value",
    ])
}

fn small_limits() -> Limits {
    Limits {
        max_property_len: 4096,
        max_array_elements: 256,
        max_nesting_depth: 8,
        max_block_uncompressed_len: 1 << 16,
        max_archive_uncompressed_len: 1 << 20,
        ..Limits::default()
    }
}

proptest! {
    #[test]
    fn modern_decoder_never_panics(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let names = names();
        let limits = small_limits();
        let decoder = ModernPropertyDecoder::new(&names, &limits);
        let mut reader = SliceReader::new(&input);
        let mut props = Vec::new();
        let _ = decoder.decode_properties(&mut reader, &mut props);
        prop_assert!(props.len() <= limits.max_properties_per_list);
    }

    #[test]
    fn modern_decoder_small_indices(
        words in prop::collection::vec(0i64..7, 0..96)
    ) {
        // Every 8-byte word is a valid name index, which drives the
        // decoder deep into arrays, structs and nested lists.
        let input: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let names = names();
        let limits = small_limits();
        let decoder = ModernPropertyDecoder::new(&names, &limits);
        let mut reader = SliceReader::new(&input);
        let mut props = Vec::new();
        let _ = decoder.decode_properties(&mut reader, &mut props);
        prop_assert!(reader.position() <= input.len() as u64);
    }

    #[test]
    fn legacy_decoder_never_panics(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let names = names();
        let limits = small_limits();
        let decoder = LegacyPropertyDecoder::new(&names, &limits);
        let mut reader = SliceReader::new(&input);
        let mut props = Vec::new();
        let _ = decoder.decode_properties(&mut reader, &mut props);
    }

    #[test]
    fn big_block_decoder_never_panics(
        codec in 0u16..6,
        body in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut input = BLOCK_MAGIC.to_le_bytes().to_vec();
        input.extend_from_slice(&codec.to_le_bytes());
        input.extend_from_slice(&body);
        let mut reader = SliceReader::new(&input);
        let _ = decompress_big_block(&mut reader, &small_limits());
    }
}
