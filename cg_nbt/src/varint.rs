//! Variable-length integer encoding.
//!
//! Integers are stored as little-endian septets: the seven low bits of each
//! byte are data, and the byte carrying the most significant septet comes
//! last. The terminator convention is the inverse of protobuf varints: every
//! byte except the last has its high bit *clear*, and the last byte has it
//! *set*. Zero is a single `0x80`. A `u64` never needs more than 10 bytes.
//!
//! Signed integers are zig-zag encoded first, so small negative values stay
//! short on the wire: 0, -1, 1, -2 map to 0, 1, 2, 3.

use crate::{
  cursor::Cursor,
  error::{self, ReadError},
};
use std::io::Read;

/// The terminator bit. A set high bit marks the final byte of a varint or
/// of a VarText key.
pub const MSB: u8 = 0x80;

// (64 bits + 6) / 7 = 10 bytes of septets.
const MAX_LEN: u32 = 10;

/// Encodes the number using zig zag encoding, folding the sign into the low
/// bit: `(n << 1) ^ (n >> 63)`.
#[inline(always)]
pub fn zig(n: i64) -> u64 { ((n << 1) ^ (n >> 63)) as u64 }

/// Decodes a zig zag encoded number: `(n >> 1) ^ -(n & 1)`. `n & 1` is the
/// sign, which negation turns into an all-ones mask for negative values.
#[inline(always)]
pub fn zag(n: u64) -> i64 { (n >> 1) as i64 ^ -((n & 1) as i64) }

/// Reads an unsigned varint, consuming 1 to 10 bytes.
///
/// Errors with [`ReadError::Truncated`] if the stream ends before a byte
/// with the high bit set, and [`ReadError::VarIntTooLong`] if no terminator
/// shows up within 10 bytes.
pub fn read_uvarint<R: Read>(cursor: &mut Cursor<R>) -> Result<u64, ReadError> {
  let mut out = 0;
  for i in 0..MAX_LEN {
    let b = cursor.next()?;
    out |= ((b & !MSB) as u64) << (7 * i);
    if b & MSB != 0 {
      return Ok(out);
    }
  }
  Err(error::record(ReadError::VarIntTooLong { offset: cursor.offset() }))
}

/// Reads a signed varint: an unsigned varint, zig zag decoded.
pub fn read_ivarint<R: Read>(cursor: &mut Cursor<R>) -> Result<i64, ReadError> {
  Ok(zag(read_uvarint(cursor)?))
}

/// Appends `v` as an unsigned varint. Zero is written as a single `0x80`.
pub fn write_uvarint(mut v: u64, out: &mut Vec<u8>) {
  loop {
    let b = (v & 0x7f) as u8;
    v >>= 7;
    if v == 0 {
      out.push(b | MSB);
      return;
    }
    out.push(b);
  }
}

/// Appends `v` as a signed varint (zig zag, then unsigned).
pub fn write_ivarint(v: i64, out: &mut Vec<u8>) { write_uvarint(zig(v), out) }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cursor::MAGIC;
  use pretty_assertions::assert_eq;

  fn uvarint(v: u64) -> Vec<u8> {
    let mut out = vec![];
    write_uvarint(v, &mut out);
    out
  }

  fn ivarint(v: i64) -> Vec<u8> {
    let mut out = vec![];
    write_ivarint(v, &mut out);
    out
  }

  fn read_back(body: &[u8]) -> Result<u64, ReadError> {
    let mut data = MAGIC.to_vec();
    data.extend_from_slice(body);
    read_uvarint(&mut Cursor::from_bytes(&data).unwrap())
  }

  #[test]
  fn zigzag() {
    assert_eq!(zig(0), 0);
    assert_eq!(zig(-1), 1);
    assert_eq!(zig(1), 2);
    assert_eq!(zig(-2), 3);
    assert_eq!(zag(0), 0);
    assert_eq!(zag(1), -1);
    assert_eq!(zag(2), 1);
    assert_eq!(zag(3), -2);
    for i in -1000..1000 {
      assert_eq!(i, zag(zig(i)));
    }
    assert_eq!(zag(zig(i64::MAX)), i64::MAX);
    assert_eq!(zag(zig(i64::MIN)), i64::MIN);
  }

  #[test]
  fn write_unsigned() {
    assert_eq!(uvarint(0), [0x80]);
    assert_eq!(uvarint(1), [0x81]);
    assert_eq!(uvarint(7), [0x87]);
    assert_eq!(uvarint(127), [0xff]);
    assert_eq!(uvarint(128), [0x00, 0x82]);
    assert_eq!(uvarint(20250421), [0x35, 0x7e, 0x53, 0x89]);
    assert_eq!(uvarint(u64::MAX).len(), 10);
  }

  #[test]
  fn write_signed() {
    // zigzag(7) = 14
    assert_eq!(ivarint(7), [0x8e]);
    assert_eq!(ivarint(0), [0x80]);
    assert_eq!(ivarint(-1), [0x81]);
  }

  #[test]
  fn read_unsigned() {
    assert_eq!(read_back(&[0x80]).unwrap(), 0);
    assert_eq!(read_back(&[0xff]).unwrap(), 127);
    assert_eq!(read_back(&[0x00, 0x82]).unwrap(), 128);
    assert_eq!(read_back(&[0x35, 0x7e, 0x53, 0x89]).unwrap(), 20250421);
  }

  #[test]
  fn round_trip() {
    for v in (0..10_000).chain([u32::MAX as u64, u64::MAX / 7, u64::MAX]) {
      assert_eq!(read_back(&uvarint(v)).unwrap(), v);
    }
    for v in [-20250421_i64, -1, 0, 1, i64::MIN, i64::MAX] {
      let mut data = MAGIC.to_vec();
      data.extend_from_slice(&ivarint(v));
      assert_eq!(read_ivarint(&mut Cursor::from_bytes(&data).unwrap()).unwrap(), v);
    }
  }

  #[test]
  fn truncated() {
    assert!(matches!(read_back(&[]), Err(ReadError::Truncated { offset: 0 })));
    assert!(matches!(read_back(&[0x00, 0x01]), Err(ReadError::Truncated { offset: 2 })));
  }

  #[test]
  fn too_long() {
    // Ten data bytes with no terminator in sight.
    assert!(matches!(read_back(&[0x00; 11]), Err(ReadError::VarIntTooLong { .. })));
  }
}
