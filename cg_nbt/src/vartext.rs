//! Length-implicit byte strings, used for object keys.
//!
//! A VarText is one or more bytes; every byte except the last has its high
//! bit clear, and the last has it set. The logical text is the byte sequence
//! with the final high bit cleared, and the empty string is a single `0x80`.
//!
//! This makes VarText cheap for short identifiers but not binary-safe: a
//! payload byte with the high bit set would terminate it early. Arbitrary
//! user data belongs in a `String` tag (length-prefixed) instead, and the
//! writer refuses keys that VarText cannot carry.

use crate::{
  cursor::Cursor,
  error::ReadError,
  varint::MSB,
};
use std::io::Read;

/// Reads a VarText, consuming bytes up to and including the first one with
/// the high bit set. Errors with [`ReadError::Truncated`] if the stream ends
/// before a terminator.
pub fn read_vartext<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<u8>, ReadError> {
  let mut out = Vec::new();
  loop {
    let b = cursor.next()?;
    if b & MSB != 0 {
      // A lone 0x80 is the empty encoding, not a NUL.
      if b != MSB || !out.is_empty() {
        out.push(b & !MSB);
      }
      return Ok(out);
    }
    out.push(b);
  }
}

/// Appends `text` as a VarText: the bytes verbatim, with the high bit of the
/// last byte set. Empty input is written as a single `0x80`.
///
/// The caller is responsible for `text` containing no byte with the high bit
/// already set; such bytes are not representable and the encoder rejects
/// keys containing them before getting here.
pub fn write_vartext(text: &[u8], out: &mut Vec<u8>) {
  match text.split_last() {
    Some((last, rest)) => {
      out.extend_from_slice(rest);
      out.push(last | MSB);
    }
    None => out.push(MSB),
  }
}

/// Returns true if VarText can carry these bytes as a key: non-empty, and no
/// byte has its high bit set.
pub fn encodable(text: &[u8]) -> bool { !text.is_empty() && text.iter().all(|b| b & MSB == 0) }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cursor::MAGIC;
  use pretty_assertions::assert_eq;

  fn written(text: &[u8]) -> Vec<u8> {
    let mut out = vec![];
    write_vartext(text, &mut out);
    out
  }

  fn read_back(body: &[u8]) -> Vec<u8> {
    let mut data = MAGIC.to_vec();
    data.extend_from_slice(body);
    read_vartext(&mut Cursor::from_bytes(&data).unwrap()).unwrap()
  }

  #[test]
  fn write() {
    assert_eq!(written(b""), [0x80]);
    assert_eq!(written(b"A"), [0xc1]);
    assert_eq!(written(b"key"), [b'k', b'e', b'y' | 0x80]);
  }

  #[test]
  fn read() {
    assert_eq!(read_back(&[0x80]), b"");
    assert_eq!(read_back(&[0xc1]), b"A");
    assert_eq!(read_back(&[b'k', b'e', 0xf9]), b"key");
    // A terminator with payload zero mid-text is a legal trailing NUL.
    assert_eq!(read_back(&[b'a', b'b', 0x80]), b"ab\0");
  }

  #[test]
  fn round_trip() {
    for text in [&b""[..], b"x", b"name", b"a key quite a bit longer than sixteen bytes"] {
      assert_eq!(read_back(&written(text)), text);
    }
  }

  #[test]
  fn truncated() {
    let mut data = MAGIC.to_vec();
    data.extend_from_slice(b"no terminator");
    let mut cursor = Cursor::from_bytes(&data).unwrap();
    assert!(matches!(read_vartext(&mut cursor), Err(ReadError::Truncated { offset: 13 })));
  }

  #[test]
  fn key_rules() {
    assert!(encodable(b"p"));
    assert!(encodable(b"position"));
    assert!(!encodable(b""));
    assert!(!encodable(b"caf\xc3\xa9"));
  }
}
