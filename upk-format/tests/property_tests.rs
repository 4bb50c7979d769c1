//! Property-based tests for UPK format primitives

use proptest::prelude::*;
use upk_format::compact_index::{encoded_len, MAX_COMPACT_INDEX_MAGNITUDE};
use upk_format::{decode_compact_index, encode_compact_index, PackageRead, SliceReader};

fn compact_value() -> impl Strategy<Value = i64> {
    let max = MAX_COMPACT_INDEX_MAGNITUDE as i64;
    -max..=max
}

proptest! {
    #[test]
    fn compact_index_roundtrip_property(value in compact_value()) {
        let encoded = encode_compact_index(value).expect("value fits five bytes");
        let (decoded, consumed) = decode_compact_index(&encoded).expect("Failed to decode compact index");
        prop_assert_eq!(value, decoded);
        prop_assert_eq!(consumed, encoded.len());
        prop_assert_eq!(consumed, encoded_len(value.unsigned_abs()));
    }

    #[test]
    fn compact_index_stream_property(
        values in prop::collection::vec(compact_value(), 1..200)
    ) {
        let mut bytes = Vec::new();
        for value in &values {
            bytes.extend_from_slice(&encode_compact_index(*value).unwrap());
        }

        let mut reader = SliceReader::new(&bytes);
        for expected in &values {
            prop_assert_eq!(reader.read_compact_index().unwrap(), *expected);
        }
        prop_assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn compact_index_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..8)) {
        if let Ok((_, consumed)) = decode_compact_index(&bytes) {
            prop_assert!(consumed >= 1 && consumed <= 5);
        }
    }

    #[test]
    fn oversized_magnitudes_rejected(excess in 1i64..1_000_000) {
        let value = MAX_COMPACT_INDEX_MAGNITUDE as i64 + excess;
        prop_assert!(encode_compact_index(value).is_err());
        prop_assert!(encode_compact_index(-value).is_err());
    }

    #[test]
    fn bit_reads_match_byte_reads(bytes in prop::collection::vec(any::<u8>(), 1..64)) {
        let mut reader = SliceReader::new(&bytes);
        for &byte in &bytes {
            prop_assert_eq!(reader.read_bits(8).unwrap(), byte);
        }
        prop_assert_eq!(reader.remaining(), 0);
    }
}

#[test]
fn compact_index_boundaries() {
    for value in [
        0i64,
        1,
        63,
        64,
        8_191,
        8_192,
        1_048_575,
        1_048_576,
        134_217_727,
        134_217_728,
        17_179_869_183,
    ] {
        for signed in [value, -value] {
            let encoded = encode_compact_index(signed).unwrap();
            assert_eq!(decode_compact_index(&encoded).unwrap().0, signed);
        }
    }
}
