//! Google encoded polyline format at precision 5.
//!
//! Each value is the delta from the previous coordinate, zig-zag encoded and
//! split into 5-bit chunks offset by 63 so that every chunk is printable.

use thiserror::Error;

use super::Coordinate;

const PRECISION: f64 = 1e5;
const CHUNK_OFFSET: u8 = 63;
const CONTINUATION_BIT: i64 = 0x20;
const CHUNK_MASK: i64 = 0x1f;

/// Largest shift still inside a 32-bit value (7 chunks of 5 bits).
const MAX_SHIFT: u32 = 30;

/// Errors returned when a polyline string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid polyline character {ch:?} at byte {index}")]
    InvalidCharacter { ch: char, index: usize },

    #[error("polyline ends in the middle of a value")]
    Truncated,

    #[error("latitude at byte {index} has no matching longitude")]
    UnpairedLatitude { index: usize },

    #[error("value starting at byte {index} overflows")]
    Overflow { index: usize },
}

/// Decode an encoded polyline into coordinates.
///
/// An empty string decodes to an empty path; callers decide whether that is
/// acceptable.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, DecodeError> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::with_capacity(bytes.len() / 4);
    let mut index = 0;
    let mut lat = 0i64;
    let mut lon = 0i64;

    while index < bytes.len() {
        let lat_start = index;
        lat += next_value(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(DecodeError::UnpairedLatitude { index: lat_start });
        }
        lon += next_value(bytes, &mut index)?;

        coordinates.push(Coordinate::new(
            lat as f64 / PRECISION,
            lon as f64 / PRECISION,
        ));
    }

    Ok(coordinates)
}

/// Encode coordinates as a polyline. Inverse of [`decode`] up to precision.
pub fn encode(path: &[Coordinate]) -> String {
    let mut out = String::with_capacity(path.len() * 8);
    let mut prev_lat = 0i64;
    let mut prev_lon = 0i64;

    for coordinate in path {
        let lat = (coordinate.lat * PRECISION).round() as i64;
        let lon = (coordinate.lon * PRECISION).round() as i64;
        push_value(&mut out, lat - prev_lat);
        push_value(&mut out, lon - prev_lon);
        prev_lat = lat;
        prev_lon = lon;
    }

    out
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64, DecodeError> {
    let start = *index;
    let mut result = 0i64;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(DecodeError::Truncated);
        };
        if !(CHUNK_OFFSET..=b'~').contains(&byte) {
            return Err(DecodeError::InvalidCharacter {
                ch: char::from(byte),
                index: *index,
            });
        }
        if shift > MAX_SHIFT {
            return Err(DecodeError::Overflow { index: start });
        }
        *index += 1;

        let chunk = i64::from(byte - CHUNK_OFFSET);
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

fn push_value(out: &mut String, value: i64) {
    let mut v = if value < 0 {
        !(value << 1)
    } else {
        value << 1
    };

    while v >= CONTINUATION_BIT {
        out.push(char::from(
            (CONTINUATION_BIT | (v & CHUNK_MASK)) as u8 + CHUNK_OFFSET,
        ));
        v >>= 5;
    }
    out.push(char::from(v as u8 + CHUNK_OFFSET));
}
