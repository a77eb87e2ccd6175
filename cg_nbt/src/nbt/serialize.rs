use super::{Tag, TagMap, Type};
use crate::{
  cursor::MAGIC,
  error::{self, WriteError},
  varint, vartext,
};
use byteorder::{ByteOrder, LittleEndian};
use std::{fs::File, io::Write, path::Path};

impl Tag {
  /// Returns the type of the tag.
  pub fn ty(&self) -> Type {
    match self {
      Self::Object(_) => Type::Object,
      Self::IVarInt(_) => Type::IVarInt,
      Self::UVarInt(_) => Type::UVarInt,
      Self::Bool(_) => Type::Bool,
      Self::Hex(_) => Type::Hex,
      Self::Float(_) => Type::Float,
      Self::Double(_) => Type::Double,
      Self::Array(_) => Type::Array,
      Self::String(_) => Type::String,
      Self::Raw(_) => Type::Raw,
      Self::ArrayBool(_) => Type::ArrayBool,
      Self::ArrayHex(_) => Type::ArrayHex,
      Self::ArrayFloat(_) => Type::ArrayFloat,
      Self::ArrayDouble(_) => Type::ArrayDouble,
      Self::ArrayRaw(_) => Type::ArrayRaw,
    }
  }
}

/// Serialises a tag map to bytes, optionally prefixed with the magic.
///
/// Fails with [`WriteError::KeyNotEncodable`] if any key, at any depth, is
/// empty or holds a byte with the high bit set.
pub fn encode(data: &TagMap, with_magic: bool) -> Result<Vec<u8>, WriteError> {
  error::clear_errors();
  let mut buf = Vec::new();
  if with_magic {
    buf.extend_from_slice(&MAGIC);
  }
  write_object(data, &mut buf, true)?;
  Ok(buf)
}

/// Serialises a tag map and wraps it in a Zstd frame. The frame holds the
/// bare body with no magic; `level` is clamped to 1..=22.
pub fn encode_compressed(data: &TagMap, level: i32) -> Result<Vec<u8>, WriteError> {
  let body = encode(data, false)?;
  let frame = zstd::bulk::compress(&body, level.clamp(1, 22))
    .map_err(|e| error::record_write(WriteError::Compression(e.to_string())))?;
  debug!("compressed {} body bytes into a {} byte frame", body.len(), frame.len());
  Ok(frame)
}

/// Encodes `data` and writes it to `path` as a plain magic-prefixed file.
/// An existing file is only replaced when `overwrite` is set.
pub fn write(data: &TagMap, path: impl AsRef<Path>, overwrite: bool) -> Result<(), WriteError> {
  let buf = encode(data, true)?;
  write_file(&buf, path.as_ref(), overwrite)
}

/// Like [`write`], but the file holds a Zstd frame of the body.
pub fn write_compressed(
  data: &TagMap,
  path: impl AsRef<Path>,
  overwrite: bool,
  level: i32,
) -> Result<(), WriteError> {
  let buf = encode_compressed(data, level)?;
  write_file(&buf, path.as_ref(), overwrite)
}

fn write_file(buf: &[u8], path: &Path, overwrite: bool) -> Result<(), WriteError> {
  if !overwrite && path.exists() {
    return Err(error::record_write(WriteError::OverwriteDenied(path.to_path_buf())));
  }
  let mut file = File::create(path).map_err(|e| error::record_write(WriteError::IO(e)))?;
  let mut wrote = 0;
  while wrote < buf.len() {
    let n = file.write(&buf[wrote..]).map_err(|e| error::record_write(WriteError::IO(e)))?;
    if n == 0 {
      return Err(error::record_write(WriteError::WriteShort {
        wrote:    wrote as u64,
        expected: buf.len() as u64,
      }));
    }
    wrote += n;
  }
  Ok(())
}

fn write_object(data: &TagMap, out: &mut Vec<u8>, top_level: bool) -> Result<(), WriteError> {
  for (key, tag) in data {
    if !vartext::encodable(key.as_bytes()) {
      return Err(error::record_write(WriteError::KeyNotEncodable(key.clone())));
    }
    out.push(head_byte(tag));
    vartext::write_vartext(key.as_bytes(), out);
    match tag {
      // The whole value sits in the head's low nibble.
      Tag::Bool(_) | Tag::Hex(_) => {}
      _ => write_payload(tag, out)?,
    }
  }
  // The top level is closed by end of file, not by a terminator.
  if !top_level {
    out.push(0);
  }
  Ok(())
}

// The head byte for an object entry: type id in the high nibble, and a
// type-specific low nibble. Arrays put their element type there, which for
// fixed scalars is exactly the typed-array collapse the reader undoes.
fn head_byte(tag: &Tag) -> u8 {
  match tag {
    Tag::Bool(v) => Type::Bool.id() << 4 | *v as u8,
    Tag::Hex(v) => Type::Hex.id() << 4 | (v & 0x0f),
    Tag::Array(v) => Type::Array.id() << 4 | elem_id(v),
    Tag::ArrayBool(_) => Type::Array.id() << 4 | Type::Bool.id(),
    Tag::ArrayHex(_) => Type::Array.id() << 4 | Type::Hex.id(),
    Tag::ArrayFloat(_) => Type::Array.id() << 4 | Type::Float.id(),
    Tag::ArrayDouble(_) => Type::Array.id() << 4 | Type::Double.id(),
    Tag::ArrayRaw(_) => Type::Array.id() << 4 | Type::Raw.id(),
    _ => tag.ty().id() << 4,
  }
}

// The element-type nibble for a generic array. An empty array still needs a
// valid element type on the wire; `Object` is the first one the reader
// accepts.
fn elem_id(elems: &[Tag]) -> u8 {
  match elems.first() {
    None => Type::Object.id(),
    Some(
      Tag::Array(_)
      | Tag::ArrayBool(_)
      | Tag::ArrayHex(_)
      | Tag::ArrayFloat(_)
      | Tag::ArrayDouble(_)
      | Tag::ArrayRaw(_),
    ) => Type::Array.id(),
    Some(t) => t.ty().id(),
  }
}

// The low nibble of a nested array element's own head byte: the element
// type of that inner array.
fn second_id(tag: &Tag) -> u8 {
  match tag {
    Tag::Array(inner) => elem_id(inner),
    Tag::ArrayBool(_) => Type::Bool.id(),
    Tag::ArrayHex(_) => Type::Hex.id(),
    Tag::ArrayFloat(_) => Type::Float.id(),
    Tag::ArrayDouble(_) => Type::Double.id(),
    Tag::ArrayRaw(_) => Type::Raw.id(),
    _ => tag.ty().id(),
  }
}

/// Serialises the data of the tag. Does not add the head byte. `Bool` and
/// `Hex` emit their one-byte array-element form; as object entries their
/// value lives in the head byte and this is never called for them.
fn write_payload(tag: &Tag, out: &mut Vec<u8>) -> Result<(), WriteError> {
  match tag {
    Tag::Object(v) => write_object(v, out, false)?,
    Tag::IVarInt(v) => varint::write_ivarint(*v, out),
    Tag::UVarInt(v) => varint::write_uvarint(*v, out),
    Tag::Bool(v) => out.push(*v as u8),
    Tag::Hex(v) => out.push(v & 0x0f),
    Tag::Float(v) => push_f32(*v, out),
    Tag::Double(v) => push_f64(*v, out),
    Tag::Array(v) => {
      varint::write_uvarint(v.len() as u64, out);
      let nested = elem_id(v) == Type::Array.id();
      for elem in v {
        if nested {
          // Each nested element leads with a fresh head naming its own
          // element type.
          out.push(Type::Array.id() << 4 | second_id(elem));
        }
        write_payload(elem, out)?;
      }
    }
    Tag::String(v) => {
      varint::write_uvarint(v.len() as u64, out);
      out.extend_from_slice(v);
    }
    Tag::Raw(v) => out.push(*v),
    Tag::ArrayBool(v) => {
      varint::write_uvarint(v.len() as u64, out);
      out.extend(v.iter().map(|b| *b as u8));
    }
    Tag::ArrayHex(v) => {
      varint::write_uvarint(v.len() as u64, out);
      out.extend(v.iter().map(|b| b & 0x0f));
    }
    Tag::ArrayFloat(v) => {
      varint::write_uvarint(v.len() as u64, out);
      for f in v {
        push_f32(*f, out);
      }
    }
    Tag::ArrayDouble(v) => {
      varint::write_uvarint(v.len() as u64, out);
      for f in v {
        push_f64(*f, out);
      }
    }
    Tag::ArrayRaw(v) => {
      varint::write_uvarint(v.len() as u64, out);
      out.extend_from_slice(v);
    }
  }
  Ok(())
}

fn push_f32(v: f32, out: &mut Vec<u8>) {
  let mut buf = [0; 4];
  LittleEndian::write_f32(&mut buf, v);
  out.extend_from_slice(&buf);
}

fn push_f64(v: f64, out: &mut Vec<u8>) {
  let mut buf = [0; 8];
  LittleEndian::write_f64(&mut buf, v);
  out.extend_from_slice(&buf);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{cursor::MAGIC, nbt::decode};
  use pretty_assertions::assert_eq;

  fn body(data: &TagMap) -> Vec<u8> { encode(data, false).unwrap() }

  #[test]
  fn single_bool() {
    let map = TagMap::from([("A".into(), Tag::Bool(true))]);
    assert_eq!(body(&map), [0x41, 0xc1]);
    let with_magic = encode(&map, true).unwrap();
    assert_eq!(&with_magic[..MAGIC.len()], MAGIC);
    assert_eq!(&with_magic[MAGIC.len()..], [0x41, 0xc1]);
  }

  #[test]
  fn single_uvarint() {
    let map = TagMap::from([("n".into(), Tag::UVarInt(20250421))]);
    assert_eq!(body(&map), [0x30, 0xee, 0x35, 0x7e, 0x53, 0x89]);
  }

  #[test]
  fn nested_object() {
    let map = TagMap::from([("a".into(), Tag::object(&[("b", Tag::IVarInt(7))]))]);
    assert_eq!(body(&map), [0x10, 0xe1, 0x20, 0xe2, 0x0e, 0x00]);
  }

  #[test]
  fn typed_float_array() {
    let map = TagMap::from([("p".into(), Tag::ArrayFloat(vec![1.0, 2.0, 3.0]))]);
    let mut expected = vec![0x86, 0xf0, 0x83];
    for v in [1.0f32, 2.0, 3.0] {
      expected.extend_from_slice(&v.to_le_bytes());
    }
    assert_eq!(body(&map), expected);
  }

  #[test]
  fn generic_scalar_array_collapses() {
    // A generic array of bools produces the exact typed-array bytes, and
    // comes back as the typed variant.
    let generic = TagMap::from([("b".into(), Tag::Array(vec![Tag::Bool(true), Tag::Bool(false)]))]);
    let typed = TagMap::from([("b".into(), Tag::ArrayBool(vec![true, false]))]);
    assert_eq!(body(&generic), body(&typed));
    assert_eq!(decode(&encode(&generic, true).unwrap()).unwrap(), typed);
  }

  #[test]
  fn empty_array_round_trips() {
    let map = TagMap::from([("e".into(), Tag::Array(vec![]))]);
    assert_eq!(body(&map), [0x81, 0xe5, 0x80]);
    assert_eq!(decode(&encode(&map, true).unwrap()).unwrap(), map);
  }

  #[test]
  fn nested_array_heads() {
    let map = TagMap::from([(
      "A".into(),
      Tag::Array(vec![
        Tag::Array(vec![Tag::UVarInt(1), Tag::UVarInt(2)]),
        Tag::Array(vec![Tag::UVarInt(3)]),
      ]),
    )]);
    assert_eq!(body(&map), [0x88, 0xc1, 0x82, 0x83, 0x82, 0x81, 0x82, 0x83, 0x81, 0x83]);
  }

  #[test]
  fn rejected_keys() {
    let empty = TagMap::from([("".to_string(), Tag::Bool(false))]);
    assert!(matches!(encode(&empty, false), Err(WriteError::KeyNotEncodable(_))));
    let high_bit = TagMap::from([("café".to_string(), Tag::Bool(false))]);
    assert!(matches!(encode(&high_bit, false), Err(WriteError::KeyNotEncodable(_))));
    // Nested keys are validated too.
    let nested = TagMap::from([("ok".to_string(), Tag::object(&[("café", Tag::Bool(true))]))]);
    assert!(matches!(encode(&nested, false), Err(WriteError::KeyNotEncodable(_))));
    assert_eq!(crate::error::get_errors().len(), 1);
  }

  #[test]
  fn level_is_clamped() {
    let map = TagMap::from([("n".into(), Tag::UVarInt(1))]);
    // Out-of-range levels are usable, not errors.
    let frame = encode_compressed(&map, 100).unwrap();
    assert_eq!(decode(&frame).unwrap(), map);
    let frame = encode_compressed(&map, -3).unwrap();
    assert_eq!(decode(&frame).unwrap(), map);
  }

  #[test]
  fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.cgb");
    let map = TagMap::from([
      ("n".into(), Tag::UVarInt(20250421)),
      ("t".into(), Tag::str("written to disk")),
    ]);
    write(&map, &path, false).unwrap();
    assert_eq!(crate::nbt::read(&path).unwrap(), map);
    let info = crate::cursor::file_info(&path).unwrap();
    assert!(!info.compressed);

    // Refused without the overwrite flag, replaced with it.
    assert!(matches!(write(&map, &path, false), Err(WriteError::OverwriteDenied(_))));
    write(&map, &path, true).unwrap();

    let zpath = dir.path().join("out.cgb.zst");
    write_compressed(&map, &zpath, false, 19).unwrap();
    assert_eq!(crate::nbt::read(&zpath).unwrap(), map);
    assert!(crate::cursor::file_info(&zpath).unwrap().compressed);
  }
}
