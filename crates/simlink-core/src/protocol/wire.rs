//! Primitive and composite value codec for simlink payloads.
//!
//! Every `write_*` function appends the canonical big-endian encoding of a
//! value to a growable `Vec<u8>`.  Every `read_*` function takes the buffer and
//! a starting offset and returns the decoded value together with the offset of
//! the first byte *after* it, so decoders can be chained:
//!
//! ```rust
//! use simlink_core::protocol::wire::{read_i32, read_string, write_i32, write_string};
//!
//! let mut buf = Vec::new();
//! write_i32(&mut buf, -7);
//! write_string(&mut buf, Some("uav-3"));
//!
//! let (n, off) = read_i32(&buf, 0).unwrap();
//! let (name, off) = read_string(&buf, off).unwrap();
//! assert_eq!(n, -7);
//! assert_eq!(name.as_deref(), Some("uav-3"));
//! assert_eq!(off, buf.len());
//! ```
//!
//! # Composite encodings
//!
//! ```text
//! string : [len:i32][code_unit:u16 BE] * len     len = -1 → null, 0 → ""
//! list   : [len:i32][element] * len               len = -1 → null, 0 → []
//! vec3   : [x:f32][y:f32][z:f32]                   (or three f64 fields)
//! ```
//!
//! Strings are UTF-16 code units, not UTF-8 bytes.  A string of `len` code
//! units occupies `4 + 2 * len` bytes.
//!
//! # Byte order
//!
//! All scalars go through `to_be_bytes` / `from_be_bytes`, which produce the
//! same bytes on little- and big-endian hosts.  The tests at the bottom of
//! this file pin the exact byte layout of known values.

use serde::Serialize;
use thiserror::Error;

/// Length prefix value that marks a null string or null list.
pub const NULL_LENGTH: i32 = -1;

/// Errors produced while reading wire values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ends before the value does.
    #[error("truncated: need {needed} bytes at offset {offset}, buffer has {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A length prefix below `-1`.
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    /// The code units do not form valid UTF-16 (e.g. an unpaired surrogate).
    #[error("invalid UTF-16 string data")]
    InvalidUtf16,

    /// A sequence has more elements than a 32-bit length prefix can describe.
    #[error("sequence of {0} elements exceeds the i32 length prefix")]
    TooLong(usize),

    /// A nested or enum-tagged value could not be interpreted.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Three-component single precision vector, field order x, y, z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Borrows exactly `N` bytes at `offset`, or reports how many were missing.
fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], WireError> {
    let end = offset.checked_add(N).ok_or(WireError::Truncated {
        offset,
        needed: N,
        available: buf.len(),
    })?;
    match buf.get(offset..end) {
        Some(slice) => {
            let mut out = [0u8; N];
            out.copy_from_slice(slice);
            Ok(out)
        }
        None => Err(WireError::Truncated {
            offset,
            needed: N,
            available: buf.len(),
        }),
    }
}

fn length_prefix(len: usize) -> Result<i32, WireError> {
    i32::try_from(len).map_err(|_| WireError::TooLong(len))
}

/// Reads an i32 length prefix.  `Ok(None)` means the null marker.
fn read_length(buf: &[u8], offset: usize) -> Result<(Option<usize>, usize), WireError> {
    let (len, next) = read_i32(buf, offset)?;
    match len {
        NULL_LENGTH => Ok((None, next)),
        n if n < 0 => Err(WireError::NegativeLength(n)),
        n => Ok((Some(n as usize), next)),
    }
}

// ── Scalars ───────────────────────────────────────────────────────────────────

pub fn write_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(u8::from(value));
}

/// Any non-zero byte decodes as `true`.
pub fn read_bool(buf: &[u8], offset: usize) -> Result<(bool, usize), WireError> {
    let [b] = take::<1>(buf, offset)?;
    Ok((b != 0, offset + 1))
}

pub fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<(u8, usize), WireError> {
    let [b] = take::<1>(buf, offset)?;
    Ok((b, offset + 1))
}

/// Generates a big-endian writer/reader pair for a fixed-size numeric type.
macro_rules! scalar_codec {
    ($write:ident, $read:ident, $ty:ty) => {
        pub fn $write(buf: &mut Vec<u8>, value: $ty) {
            buf.extend_from_slice(&value.to_be_bytes());
        }

        pub fn $read(buf: &[u8], offset: usize) -> Result<($ty, usize), WireError> {
            const SIZE: usize = std::mem::size_of::<$ty>();
            let bytes = take::<SIZE>(buf, offset)?;
            Ok((<$ty>::from_be_bytes(bytes), offset + SIZE))
        }
    };
}

scalar_codec!(write_i16, read_i16, i16);
scalar_codec!(write_u16, read_u16, u16);
scalar_codec!(write_i32, read_i32, i32);
scalar_codec!(write_u32, read_u32, u32);
scalar_codec!(write_i64, read_i64, i64);
scalar_codec!(write_u64, read_u64, u64);
scalar_codec!(write_f32, read_f32, f32);
scalar_codec!(write_f64, read_f64, f64);

// ── Strings ───────────────────────────────────────────────────────────────────

/// Writes a length-prefixed UTF-16 string.  `None` is written as length `-1`.
///
/// Strings longer than `i32::MAX` code units cannot occur in practice; they
/// are clamped to keep this function infallible like the other writers.
pub fn write_string(buf: &mut Vec<u8>, value: Option<&str>) {
    let Some(s) = value else {
        write_i32(buf, NULL_LENGTH);
        return;
    };
    // The prefix counts code units, so it cannot be taken from `s.len()`.
    let units: Vec<u16> = s.encode_utf16().take(i32::MAX as usize).collect();
    buf.reserve(4 + units.len() * 2);
    write_i32(buf, units.len() as i32);
    for unit in units {
        write_u16(buf, unit);
    }
}

/// Reads a length-prefixed UTF-16 string.
///
/// Returns `None` for the `-1` null marker and `Some("")` for length `0`.
///
/// # Errors
///
/// [`WireError::Truncated`] if fewer than `2 * len` bytes follow the prefix,
/// [`WireError::NegativeLength`] for prefixes below `-1`, and
/// [`WireError::InvalidUtf16`] for unpaired surrogates.
pub fn read_string(buf: &[u8], offset: usize) -> Result<(Option<String>, usize), WireError> {
    let (len, mut off) = read_length(buf, offset)?;
    let Some(len) = len else {
        return Ok((None, off));
    };

    // Check the whole span up front so a bogus prefix cannot trigger a huge
    // allocation before the truncation is noticed.
    let byte_len = len.checked_mul(2).ok_or(WireError::TooLong(len))?;
    if buf.len().saturating_sub(off) < byte_len {
        return Err(WireError::Truncated {
            offset: off,
            needed: byte_len,
            available: buf.len(),
        });
    }

    let mut units = Vec::with_capacity(len);
    for _ in 0..len {
        let (unit, next) = read_u16(buf, off)?;
        units.push(unit);
        off = next;
    }
    let s = String::from_utf16(&units).map_err(|_| WireError::InvalidUtf16)?;
    Ok((Some(s), off))
}

// ── Lists ─────────────────────────────────────────────────────────────────────

/// Writes a length-prefixed list, encoding each element with `write_elem`.
///
/// `None` is written as the `-1` null marker; `Some(&[])` as length `0`.
///
/// # Errors
///
/// Returns [`WireError::TooLong`] if the list has more than `i32::MAX` elements.
pub fn write_list<T, F>(buf: &mut Vec<u8>, items: Option<&[T]>, mut write_elem: F) -> Result<(), WireError>
where
    F: FnMut(&mut Vec<u8>, &T),
{
    let Some(items) = items else {
        write_i32(buf, NULL_LENGTH);
        return Ok(());
    };
    write_i32(buf, length_prefix(items.len())?);
    for item in items {
        write_elem(buf, item);
    }
    Ok(())
}

/// Reads a length-prefixed list, decoding each element with `read_elem`.
///
/// `read_elem` receives the buffer and the element's offset and returns the
/// element with the offset following it, exactly like the scalar readers.
pub fn read_list<T, F>(buf: &[u8], offset: usize, mut read_elem: F) -> Result<(Option<Vec<T>>, usize), WireError>
where
    F: FnMut(&[u8], usize) -> Result<(T, usize), WireError>,
{
    let (len, mut off) = read_length(buf, offset)?;
    let Some(len) = len else {
        return Ok((None, off));
    };

    // Every element takes at least one byte; cap the reservation accordingly.
    let mut items = Vec::with_capacity(len.min(buf.len().saturating_sub(off)));
    for _ in 0..len {
        let (item, next) = read_elem(buf, off)?;
        items.push(item);
        off = next;
    }
    Ok((Some(items), off))
}

/// Writes a list of strings.  Elements are never written as null.
pub fn write_string_list(buf: &mut Vec<u8>, items: Option<&[String]>) -> Result<(), WireError> {
    write_list(buf, items, |b, s| write_string(b, Some(s)))
}

/// Reads a list of strings.  A null element decodes as an empty string.
pub fn read_string_list(buf: &[u8], offset: usize) -> Result<(Option<Vec<String>>, usize), WireError> {
    read_list(buf, offset, |b, off| {
        let (s, next) = read_string(b, off)?;
        Ok((s.unwrap_or_default(), next))
    })
}

/// Writes a byte block as `[len:i32][bytes]`; used for nested command payloads.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), WireError> {
    write_i32(buf, length_prefix(bytes.len())?);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a `[len:i32][bytes]` block and borrows the bytes from `buf`.
pub fn read_bytes(buf: &[u8], offset: usize) -> Result<(&[u8], usize), WireError> {
    let (len, off) = read_i32(buf, offset)?;
    if len < 0 {
        return Err(WireError::NegativeLength(len));
    }
    let end = off + len as usize;
    match buf.get(off..end) {
        Some(bytes) => Ok((bytes, end)),
        None => Err(WireError::Truncated {
            offset: off,
            needed: len as usize,
            available: buf.len(),
        }),
    }
}

// ── Vectors ───────────────────────────────────────────────────────────────────

pub fn write_vec3(buf: &mut Vec<u8>, v: Vec3) {
    write_f32(buf, v.x);
    write_f32(buf, v.y);
    write_f32(buf, v.z);
}

pub fn read_vec3(buf: &[u8], offset: usize) -> Result<(Vec3, usize), WireError> {
    let (x, off) = read_f32(buf, offset)?;
    let (y, off) = read_f32(buf, off)?;
    let (z, off) = read_f32(buf, off)?;
    Ok((Vec3 { x, y, z }, off))
}

/// Writes a double precision vector as three f64 fields (x, y, z).
pub fn write_vec3_f64(buf: &mut Vec<u8>, [x, y, z]: [f64; 3]) {
    write_f64(buf, x);
    write_f64(buf, y);
    write_f64(buf, z);
}

/// Reads three f64 fields and narrows them to a single precision [`Vec3`].
pub fn read_vec3_f64(buf: &[u8], offset: usize) -> Result<(Vec3, usize), WireError> {
    let (x, off) = read_f64(buf, offset)?;
    let (y, off) = read_f64(buf, off)?;
    let (z, off) = read_f64(buf, off)?;
    Ok((Vec3::new(x as f32, y as f32, z as f32), off))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_is_written_big_endian() {
        // Arrange
        let mut buf = Vec::new();

        // Act
        write_i32(&mut buf, 0x0102_0304);

        // Assert – the most significant byte comes first on every host
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_u16_i64_and_f32_byte_layout() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xABCD);
        write_i64(&mut buf, -2);
        write_f32(&mut buf, 1.0);

        assert_eq!(&buf[0..2], &[0xAB, 0xCD]);
        assert_eq!(&buf[2..10], &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
        // 1.0f32 = 0x3F800000
        assert_eq!(&buf[10..14], &[0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_reading_known_big_endian_bytes() {
        let bytes = [0x00, 0x00, 0x01, 0x00, 0x80, 0x00];
        let (v, off) = read_u32(&bytes, 0).unwrap();
        let (w, end) = read_i16(&bytes, off).unwrap();
        assert_eq!(v, 256);
        assert_eq!(w, i16::MIN);
        assert_eq!(end, 6);
    }

    /// Writes every value, reads them back in order and checks nothing is
    /// left over.
    macro_rules! assert_round_trips {
        ($write:ident, $read:ident, [$($v:expr),+ $(,)?]) => {{
            let values = [$($v),+];
            let mut buf = Vec::new();
            for v in values {
                $write(&mut buf, v);
            }
            let mut off = 0;
            for expected in values {
                let (v, next) = $read(&buf, off).unwrap();
                assert_eq!(v, expected, "{} round trip", stringify!($read));
                off = next;
            }
            assert_eq!(off, buf.len());
        }};
    }

    #[test]
    fn test_integer_round_trips_cover_extremes() {
        assert_round_trips!(write_u8, read_u8, [0u8, 1, 0x7F, u8::MAX]);
        assert_round_trips!(write_i16, read_i16, [0i16, -1, i16::MIN, i16::MAX]);
        assert_round_trips!(write_u16, read_u16, [0u16, 1, 0x8000, u16::MAX]);
        assert_round_trips!(write_i32, read_i32, [0i32, -1, i32::MIN, i32::MAX]);
        assert_round_trips!(write_u32, read_u32, [0u32, 1, 0x8000_0000, u32::MAX]);
        assert_round_trips!(write_i64, read_i64, [0i64, -1, i64::MIN, i64::MAX]);
        assert_round_trips!(write_u64, read_u64, [0u64, 1, u64::MAX]);
    }

    #[test]
    fn test_integer_extremes_are_big_endian() {
        let mut buf = Vec::new();
        write_u16(&mut buf, u16::MAX);
        write_u32(&mut buf, 0x8000_0000);
        write_i64(&mut buf, i64::MIN);

        assert_eq!(&buf[..2], [0xFF, 0xFF]);
        assert_eq!(&buf[2..6], [0x80, 0, 0, 0]);
        assert_eq!(&buf[6..], [0x80, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_float_round_trips_preserve_special_values() {
        let singles = [
            0.0f32,
            -0.0,
            1.5,
            f32::MIN,
            f32::MAX,
            f32::MIN_POSITIVE,
            f32::INFINITY,
            f32::NEG_INFINITY,
        ];
        let doubles = [
            0.0f64,
            -0.0,
            -2.25,
            f64::MIN,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        let mut buf = Vec::new();
        for v in singles {
            write_f32(&mut buf, v);
        }
        for v in doubles {
            write_f64(&mut buf, v);
        }
        write_f32(&mut buf, f32::NAN);
        write_f64(&mut buf, f64::NAN);

        // Compare bit patterns so that -0.0 is told apart from 0.0.
        let mut off = 0;
        for expected in singles {
            let (v, next) = read_f32(&buf, off).unwrap();
            assert_eq!(v.to_bits(), expected.to_bits());
            off = next;
        }
        for expected in doubles {
            let (v, next) = read_f64(&buf, off).unwrap();
            assert_eq!(v.to_bits(), expected.to_bits());
            off = next;
        }
        let (nan32, off) = read_f32(&buf, off).unwrap();
        let (nan64, off) = read_f64(&buf, off).unwrap();
        assert!(nan32.is_nan());
        assert!(nan64.is_nan());
        assert_eq!(off, buf.len());
    }

    #[test]
    fn test_bool_non_zero_byte_reads_as_true() {
        assert_eq!(read_bool(&[0x00], 0).unwrap(), (false, 1));
        assert_eq!(read_bool(&[0x01], 0).unwrap(), (true, 1));
        assert_eq!(read_bool(&[0x7F], 0).unwrap(), (true, 1));
    }

    #[test]
    fn test_null_empty_and_non_empty_strings_are_distinct_on_the_wire() {
        // Arrange
        let mut null = Vec::new();
        let mut empty = Vec::new();
        let mut hello = Vec::new();

        // Act
        write_string(&mut null, None);
        write_string(&mut empty, Some(""));
        write_string(&mut hello, Some("hello"));

        // Assert
        assert_eq!(null, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(empty, [0x00, 0x00, 0x00, 0x00]);
        assert_eq!(hello.len(), 4 + 2 * 5);
        assert_eq!(&hello[4..6], &[0x00, b'h']);

        assert_eq!(read_string(&null, 0).unwrap(), (None, 4));
        assert_eq!(read_string(&empty, 0).unwrap(), (Some(String::new()), 4));
        assert_eq!(read_string(&hello, 0).unwrap(), (Some("hello".to_string()), 14));
    }

    #[test]
    fn test_string_length_counts_utf16_code_units() {
        // "é" is one code unit, "🛩" is a surrogate pair (two code units).
        let mut buf = Vec::new();
        write_string(&mut buf, Some("é🛩"));

        let (len, _) = read_i32(&buf, 0).unwrap();
        assert_eq!(len, 3);
        assert_eq!(buf.len(), 4 + 6);
        assert_eq!(read_string(&buf, 0).unwrap().0.as_deref(), Some("é🛩"));
    }

    #[test]
    fn test_read_string_rejects_unpaired_surrogate() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1);
        write_u16(&mut buf, 0xD800);
        assert_eq!(read_string(&buf, 0), Err(WireError::InvalidUtf16));
    }

    #[test]
    fn test_read_string_rejects_length_below_minus_one() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -2);
        assert_eq!(read_string(&buf, 0), Err(WireError::NegativeLength(-2)));
    }

    #[test]
    fn test_read_string_with_short_buffer_is_truncated() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1_000_000);
        write_u16(&mut buf, u16::from(b'a'));
        assert!(matches!(read_string(&buf, 0), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn test_string_list_preserves_order_and_null_vs_empty() {
        let names = vec!["alpha".to_string(), String::new(), "gamma".to_string()];
        let mut full = Vec::new();
        let mut empty = Vec::new();
        let mut null = Vec::new();
        write_string_list(&mut full, Some(&names)).unwrap();
        write_string_list(&mut empty, Some(&[])).unwrap();
        write_string_list(&mut null, None).unwrap();

        assert_ne!(empty, null);
        assert_eq!(read_string_list(&full, 0).unwrap(), (Some(names), full.len()));
        assert_eq!(read_string_list(&empty, 0).unwrap(), (Some(vec![]), 4));
        assert_eq!(read_string_list(&null, 0).unwrap(), (None, 4));
    }

    #[test]
    fn test_string_list_null_element_reads_as_empty_string() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 2);
        write_string(&mut buf, None);
        write_string(&mut buf, Some("x"));

        let (items, _) = read_string_list(&buf, 0).unwrap();
        assert_eq!(items, Some(vec![String::new(), "x".to_string()]));
    }

    #[test]
    fn test_generic_list_of_vectors() {
        let points = [Vec3::new(1.0, 2.0, 3.0), Vec3::new(-4.5, 0.0, 9.25)];
        let mut buf = Vec::new();
        write_list(&mut buf, Some(&points[..]), |b, v| write_vec3(b, *v)).unwrap();

        let (decoded, off) = read_list(&buf, 0, read_vec3).unwrap();
        assert_eq!(decoded.as_deref(), Some(&points[..]));
        assert_eq!(off, 4 + 2 * 12);
    }

    #[test]
    fn test_vec3_f64_is_narrowed_on_read() {
        let mut buf = Vec::new();
        write_vec3_f64(&mut buf, [1.5, -2.25, 1.0e10]);

        let (v, off) = read_vec3_f64(&buf, 0).unwrap();
        assert_eq!(off, 24);
        assert_eq!(v, Vec3::new(1.5, -2.25, 1.0e10f64 as f32));
    }

    #[test]
    fn test_bytes_block_round_trip_and_truncation() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &[9, 8, 7]).unwrap();
        assert_eq!(read_bytes(&buf, 0).unwrap(), (&[9u8, 8, 7][..], 7));
        assert!(matches!(read_bytes(&buf[..5], 0), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn test_read_past_end_reports_offset() {
        let err = read_u64(&[0u8; 4], 2).unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                offset: 2,
                needed: 8,
                available: 4
            }
        );
    }
}
