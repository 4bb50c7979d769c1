//! Length-prefixed string readers

use crate::error::{Result, UpkError};
use crate::stream::PackageRead;

/// Map single-byte text onto chars one-to-one (Latin-1).
pub fn decode_ansi(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode UTF-16LE code units, rejecting unpaired surrogates.
pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(UpkError::InvalidString(format!(
            "UTF-16 payload has odd length {}",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| UpkError::InvalidString(e.to_string()))
}

fn strip_terminator(mut bytes: Vec<u8>, width: usize) -> Result<Vec<u8>> {
    let len = bytes.len();
    if len < width || bytes[len - width..].iter().any(|&b| b != 0) {
        return Err(UpkError::InvalidString(
            "missing NUL terminator".to_string(),
        ));
    }
    bytes.truncate(len - width);
    Ok(bytes)
}

/// Read a legacy name: `u8` length (including NUL) followed by the bytes.
pub fn read_short_name<R: PackageRead + ?Sized>(r: &mut R) -> Result<String> {
    let len = r.read_u8()? as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = strip_terminator(r.read_bytes(len)?, 1)?;
    Ok(decode_ansi(&bytes))
}

/// Read an `i32`-prefixed string; a negative length means UTF-16LE units.
///
/// The length counts the terminator. `max_len` bounds the unit count.
pub fn read_fstring<R: PackageRead + ?Sized>(r: &mut R, max_len: usize) -> Result<String> {
    let len = r.read_i32()?;
    let units = len.unsigned_abs() as usize;
    if units == 0 {
        return Ok(String::new());
    }
    if units > max_len {
        return Err(UpkError::LimitExceeded(format!(
            "string length {} exceeds limit {}",
            units, max_len
        )));
    }

    if len > 0 {
        let bytes = strip_terminator(r.read_bytes(units)?, 1)?;
        Ok(decode_ansi(&bytes))
    } else {
        let bytes = strip_terminator(r.read_bytes(units * 2)?, 2)?;
        decode_utf16le(&bytes)
    }
}
