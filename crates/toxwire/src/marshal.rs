//! Byte buffers across the engine boundary.
//!
//! Inputs are validated before any engine call. Variable-length outputs are
//! read into a maximum-size buffer and cut to the length the engine reports,
//! never past the buffer.

use crate::error::{ArgumentError, Result};

/// Require exactly `expected` bytes
pub fn exact_len<'a>(field: &'static str, bytes: &'a [u8], expected: usize) -> Result<&'a [u8]> {
    if bytes.len() == expected {
        Ok(bytes)
    } else {
        Err(ArgumentError::WrongLength {
            field,
            expected,
            actual: bytes.len(),
        }
        .into())
    }
}

/// Require at most `max` bytes
pub fn bounded<'a>(field: &'static str, bytes: &'a [u8], max: usize) -> Result<&'a [u8]> {
    if bytes.len() <= max {
        Ok(bytes)
    } else {
        Err(ArgumentError::TooLong {
            field,
            max,
            actual: bytes.len(),
        }
        .into())
    }
}

/// Require at least one byte
pub fn non_empty<'a>(field: &'static str, bytes: &'a [u8]) -> Result<&'a [u8]> {
    if bytes.is_empty() {
        Err(ArgumentError::Empty { field }.into())
    } else {
        Ok(bytes)
    }
}

/// Cut `buf` to the engine-reported length, clamped to the buffer
pub fn truncate_reported(buf: &[u8], reported: usize) -> &[u8] {
    &buf[..reported.min(buf.len())]
}

/// Run `fill` against a `max`-byte buffer and keep the reported prefix.
///
/// `fill` returns the engine's length, or the translated failure.
pub fn read_bounded<F>(max: usize, fill: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut [u8]) -> Result<usize>,
{
    let mut buf = vec![0u8; max];
    let reported = fill(&mut buf)?;
    buf.truncate(reported.min(max));
    Ok(buf)
}

/// Empty payloads cross as null
pub fn nullable(bytes: Option<&[u8]>) -> Option<&[u8]> {
    bytes.filter(|b| !b.is_empty())
}

/// Validate a string bound for a NUL-terminated engine argument
pub fn c_string<'a>(field: &'static str, s: &'a str) -> Result<&'a str> {
    if s.as_bytes().contains(&0) {
        Err(ArgumentError::InteriorNul { field }.into())
    } else {
        Ok(s)
    }
}
