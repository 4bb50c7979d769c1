//! Compact index: Unreal's variable-length signed integer
//!
//! Byte 0 holds the sign (`0x80`), a continuation flag (`0x40`) and the six
//! least significant magnitude bits. Bytes 1-3 hold a continuation flag
//! (`0x80`) and seven magnitude bits each. Byte 4 contributes eight bits and
//! never continues, so a value is at most five bytes long and carries a
//! 35-bit magnitude.

use smallvec::SmallVec;

use crate::error::{Result, UpkError};

/// Longest encoded form in bytes.
pub const MAX_COMPACT_INDEX_LEN: usize = 5;

/// Largest magnitude representable in five bytes.
pub const MAX_COMPACT_INDEX_MAGNITUDE: u64 = (1 << 35) - 1;

const SIGN_FLAG: u8 = 0x80;
const FIRST_CONTINUE: u8 = 0x40;
const FIRST_MAGNITUDE: u8 = 0x3F;
const NEXT_CONTINUE: u8 = 0x80;
const NEXT_MAGNITUDE: u8 = 0x7F;

/// Whether byte `i` of an encoded value is followed by another byte.
pub fn continues(i: usize, byte: u8) -> bool {
    match i {
        0 => byte & FIRST_CONTINUE != 0,
        1..=3 => byte & NEXT_CONTINUE != 0,
        _ => false,
    }
}

/// Decode a compact index from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_compact_index(bytes: &[u8]) -> Result<(i64, usize)> {
    let first = *bytes.first().ok_or(UpkError::TruncatedStream {
        offset: 0,
        needed: 1,
        available: 0,
    })?;

    let negative = first & SIGN_FLAG != 0;
    let mut magnitude = (first & FIRST_MAGNITUDE) as u64;
    let mut shift = 6;
    let mut i = 0;

    while continues(i, bytes[i]) {
        i += 1;
        let byte = *bytes.get(i).ok_or(UpkError::TruncatedStream {
            offset: i as u64,
            needed: 1,
            available: 0,
        })?;

        if i == MAX_COMPACT_INDEX_LEN - 1 {
            magnitude |= (byte as u64) << shift;
        } else {
            magnitude |= ((byte & NEXT_MAGNITUDE) as u64) << shift;
            shift += 7;
        }
    }

    let value = magnitude as i64;
    Ok((if negative { -value } else { value }, i + 1))
}

/// Number of bytes `encode_compact_index` emits for `magnitude`.
pub fn encoded_len(magnitude: u64) -> usize {
    match magnitude {
        0..=0x3F => 1,
        0x40..=0x1FFF => 2,
        0x2000..=0xF_FFFF => 3,
        0x10_0000..=0x7FF_FFFF => 4,
        _ => 5,
    }
}

/// Encode a compact index.
///
/// The magnitude is taken from `value.unsigned_abs()` and the sign is
/// carried separately in byte 0, so every encoded value decodes back to
/// itself. Magnitudes above 35 bits are rejected.
pub fn encode_compact_index(value: i64) -> Result<SmallVec<[u8; MAX_COMPACT_INDEX_LEN]>> {
    let magnitude = value.unsigned_abs();
    if magnitude > MAX_COMPACT_INDEX_MAGNITUDE {
        return Err(UpkError::MalformedVarint(format!(
            "magnitude {} needs more than {} bytes",
            magnitude, MAX_COMPACT_INDEX_LEN
        )));
    }

    let len = encoded_len(magnitude);
    let mut result = SmallVec::new();

    let mut first = (magnitude & FIRST_MAGNITUDE as u64) as u8;
    if value < 0 {
        first |= SIGN_FLAG;
    }
    if len > 1 {
        first |= FIRST_CONTINUE;
    }
    result.push(first);

    let mut rest = magnitude >> 6;
    for i in 1..len {
        if i == MAX_COMPACT_INDEX_LEN - 1 {
            result.push(rest as u8);
            break;
        }
        let mut byte = (rest & NEXT_MAGNITUDE as u64) as u8;
        if i + 1 < len {
            byte |= NEXT_CONTINUE;
        }
        result.push(byte);
        rest >>= 7;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDARIES: [i64; 11] = [
        0,
        1,
        63,
        64,
        8191,
        8192,
        1048575,
        1048576,
        134217727,
        134217728,
        17179869183,
    ];

    #[test]
    fn test_compact_index_roundtrip_boundaries() {
        for val in BOUNDARIES {
            let encoded = encode_compact_index(val).unwrap();
            let (decoded, consumed) = decode_compact_index(&encoded).unwrap();
            assert_eq!(val, decoded);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_compact_index_boundary_lengths() {
        let expected = [1, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5];
        for (val, len) in BOUNDARIES.iter().zip(expected) {
            assert_eq!(encode_compact_index(*val).unwrap().len(), len, "value {val}");
        }
    }

    #[test]
    fn test_compact_index_known_vector() {
        assert_eq!(encode_compact_index(100).unwrap().as_slice(), &[0x64, 0x01]);
        assert_eq!(decode_compact_index(&[0x64, 0x01]).unwrap(), (100, 2));
    }

    #[test]
    fn test_compact_index_negative_values() {
        assert_eq!(encode_compact_index(-1).unwrap().as_slice(), &[0x81]);
        assert_eq!(decode_compact_index(&[0x81]).unwrap(), (-1, 1));

        // Magnitudes of 64 and above keep the sign in byte 0 only.
        assert_eq!(encode_compact_index(-100).unwrap().as_slice(), &[0xE4, 0x01]);
        assert_eq!(decode_compact_index(&[0xE4, 0x01]).unwrap(), (-100, 2));
    }

    #[test]
    fn test_compact_index_fifth_byte_uses_all_bits() {
        let bytes = [0x7F, 0xFF, 0xFF, 0xFF, 0xFF];
        let (value, consumed) = decode_compact_index(&bytes).unwrap();
        assert_eq!(value, MAX_COMPACT_INDEX_MAGNITUDE as i64);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_compact_index_ignores_trailing_bytes() {
        let (value, consumed) = decode_compact_index(&[0x05, 0xAA, 0xBB]).unwrap();
        assert_eq!(value, 5);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_compact_index_decode_truncated() {
        let encoded = encode_compact_index(1_000_000).unwrap();
        let truncated = &encoded[..encoded.len() - 1];
        assert!(matches!(
            decode_compact_index(truncated),
            Err(UpkError::TruncatedStream { .. })
        ));
        assert!(decode_compact_index(&[]).is_err());
    }

    #[test]
    fn test_compact_index_encode_too_large() {
        let result = encode_compact_index(1 << 35);
        assert!(matches!(result, Err(UpkError::MalformedVarint(_))));
        assert!(encode_compact_index(-(1 << 40)).is_err());
    }

    proptest! {
        #[test]
        fn prop_compact_index_roundtrip(
            value in -(MAX_COMPACT_INDEX_MAGNITUDE as i64)..=(MAX_COMPACT_INDEX_MAGNITUDE as i64)
        ) {
            let encoded = encode_compact_index(value).unwrap();
            let (decoded, consumed) = decode_compact_index(&encoded).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, encoded.len());
            prop_assert!(consumed <= MAX_COMPACT_INDEX_LEN);
        }

        #[test]
        fn prop_compact_index_decode_never_overreads(bytes in prop::collection::vec(any::<u8>(), 0..8)) {
            if let Ok((_, consumed)) = decode_compact_index(&bytes) {
                prop_assert!(consumed <= bytes.len());
                prop_assert!(consumed <= MAX_COMPACT_INDEX_LEN);
            }
        }
    }
}
