use super::{Tag, TagMap, Type};
use crate::{
  cursor::Cursor,
  error::{self, ReadError},
  varint, vartext,
};
use byteorder::{ByteOrder, LittleEndian};
use std::{io::Read, path::Path};

// Payload bytes are pulled in chunks of this size, so a hostile count prefix
// can only make us allocate in step with what the stream actually holds.
const CHUNK: usize = 4096;

/// Reads the file at `path` and decodes it into a tag map.
///
/// The preamble decides how the bytes are interpreted: plain after the
/// magic, streamed through Zstd for a compressed frame, or an empty map for
/// an empty file. On failure the error is returned and the one-line
/// diagnostic trail is available from [`get_errors`](crate::get_errors).
pub fn read(path: impl AsRef<Path>) -> Result<TagMap, ReadError> {
  error::clear_errors();
  let cursor = Cursor::open(path)?;
  decode_cursor(cursor)
}

/// Decodes an in-memory buffer, with the same preamble handling as
/// [`read`].
pub fn decode(data: &[u8]) -> Result<TagMap, ReadError> {
  error::clear_errors();
  let cursor = Cursor::from_bytes(data)?;
  decode_cursor(cursor)
}

fn decode_cursor<R: Read>(mut cursor: Cursor<R>) -> Result<TagMap, ReadError> {
  let mut top = TagMap::new();
  read_object(&mut cursor, &mut top, true)?;
  debug!("decoded {} top-level entries from {} payload bytes", top.len(), cursor.offset());
  Ok(top)
}

/// Reads object entries into `out`. The top level runs until end of stream;
/// nested objects run until their `ObjectEnd` byte, which is consumed.
fn read_object<R: Read>(
  cursor: &mut Cursor<R>,
  out: &mut TagMap,
  top_level: bool,
) -> Result<(), ReadError> {
  loop {
    if top_level && cursor.is_eof() {
      return Ok(());
    }
    let head = cursor.next()?;
    let ty = Type::from_head(head);
    if ty == Type::ObjectEnd {
      if top_level {
        return Err(error::record(ReadError::BadType {
          ty:     head >> 4,
          offset: cursor.offset() - 1,
        }));
      }
      return Ok(());
    }
    let key = read_key(cursor)?;
    let tag = read_payload(cursor, ty, head)?;
    // First occurrence of a key wins; later duplicates are dropped.
    out.entry(key).or_insert(tag);
  }
}

fn read_key<R: Read>(cursor: &mut Cursor<R>) -> Result<String, ReadError> {
  // VarText bytes are 7 bit, so the key is always valid UTF-8.
  Ok(vartext::read_vartext(cursor)?.into_iter().map(char::from).collect())
}

fn read_payload<R: Read>(cursor: &mut Cursor<R>, ty: Type, head: u8) -> Result<Tag, ReadError> {
  match ty {
    Type::ObjectEnd => Err(error::record(ReadError::BadType {
      ty:     Type::ObjectEnd.id(),
      offset: cursor.offset(),
    })),
    Type::Object => {
      let mut inner = TagMap::new();
      read_object(cursor, &mut inner, false)?;
      Ok(Tag::Object(inner))
    }
    Type::IVarInt => Ok(Tag::IVarInt(varint::read_ivarint(cursor)?)),
    Type::UVarInt => Ok(Tag::UVarInt(varint::read_uvarint(cursor)?)),
    // Bool and Hex live entirely in the low nibble of the head byte.
    Type::Bool => Ok(Tag::Bool(head & 0x01 != 0)),
    Type::Hex => Ok(Tag::Hex(head & 0x0f)),
    Type::Float => Ok(Tag::Float(read_f32(cursor)?)),
    Type::Double => Ok(Tag::Double(read_f64(cursor)?)),
    Type::Array => Ok(Tag::Array(read_array(cursor, head & 0x0f)?)),
    Type::String => Ok(Tag::String(read_string(cursor)?)),
    Type::Raw => Ok(Tag::Raw(cursor.next()?)),
    Type::ArrayBool => Ok(Tag::ArrayBool(read_array_bool(cursor)?)),
    Type::ArrayHex => Ok(Tag::ArrayHex(read_array_hex(cursor)?)),
    Type::ArrayFloat => Ok(Tag::ArrayFloat(read_array_f32(cursor)?)),
    Type::ArrayDouble => Ok(Tag::ArrayDouble(read_array_f64(cursor)?)),
    Type::ArrayRaw => Ok(Tag::ArrayRaw(read_chunked_count(cursor)?)),
  }
}

/// Reads a generic array payload: a count, then `count` payloads of the
/// element type named by `sec`. Elements carry no per-element header except
/// in nested arrays, where each element leads with a fresh head byte naming
/// its own element type in the low nibble.
fn read_array<R: Read>(cursor: &mut Cursor<R>, sec: u8) -> Result<Vec<Tag>, ReadError> {
  let sec_ty = Type::from_id(sec);
  let count = varint::read_uvarint(cursor)? as usize;
  let mut out = Vec::with_capacity(count.min(CHUNK));
  match sec_ty {
    Type::Object => {
      for _ in 0..count {
        let mut inner = TagMap::new();
        read_object(cursor, &mut inner, false)?;
        out.push(Tag::Object(inner));
      }
    }
    Type::IVarInt => {
      for _ in 0..count {
        out.push(Tag::IVarInt(varint::read_ivarint(cursor)?));
      }
    }
    Type::UVarInt => {
      for _ in 0..count {
        out.push(Tag::UVarInt(varint::read_uvarint(cursor)?));
      }
    }
    Type::String => {
      for _ in 0..count {
        out.push(Tag::String(read_string(cursor)?));
      }
    }
    Type::Array => {
      for _ in 0..count {
        let head = cursor.next()?;
        let inner = head & 0x0f;
        out.push(match Type::from_id(inner) {
          Type::Bool => Tag::ArrayBool(read_array_bool(cursor)?),
          Type::Hex => Tag::ArrayHex(read_array_hex(cursor)?),
          Type::Float => Tag::ArrayFloat(read_array_f32(cursor)?),
          Type::Double => Tag::ArrayDouble(read_array_f64(cursor)?),
          Type::Raw => Tag::ArrayRaw(read_chunked_count(cursor)?),
          Type::Object | Type::IVarInt | Type::UVarInt | Type::Array | Type::String => {
            Tag::Array(read_array(cursor, inner)?)
          }
          _ => {
            return Err(error::record(ReadError::BadSecondType {
              ty:     inner,
              offset: cursor.offset() - 1,
            }))
          }
        });
      }
    }
    // ObjectEnd, fixed scalars (which must come in as typed arrays), and
    // the typed-array ids themselves are all invalid element types here.
    _ => {
      return Err(error::record(ReadError::BadSecondType { ty: sec, offset: cursor.offset() }))
    }
  }
  Ok(out)
}

fn read_f32<R: Read>(cursor: &mut Cursor<R>) -> Result<f32, ReadError> {
  let mut buf = [0; 4];
  read_exact(cursor, &mut buf)?;
  Ok(LittleEndian::read_f32(&buf))
}

fn read_f64<R: Read>(cursor: &mut Cursor<R>) -> Result<f64, ReadError> {
  let mut buf = [0; 8];
  read_exact(cursor, &mut buf)?;
  Ok(LittleEndian::read_f64(&buf))
}

fn read_string<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<u8>, ReadError> {
  let len = varint::read_uvarint(cursor)? as usize;
  read_chunked(cursor, len)
}

fn read_array_bool<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<bool>, ReadError> {
  // Only the low bit of each byte is significant.
  Ok(read_chunked_count(cursor)?.into_iter().map(|b| b & 0x01 != 0).collect())
}

fn read_array_hex<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<u8>, ReadError> {
  Ok(read_chunked_count(cursor)?.into_iter().map(|b| b & 0x0f).collect())
}

fn read_array_f32<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<f32>, ReadError> {
  let count = varint::read_uvarint(cursor)? as usize;
  let len = count
    .checked_mul(4)
    .ok_or_else(|| error::record(ReadError::Truncated { offset: cursor.offset() }))?;
  let bytes = read_chunked(cursor, len)?;
  Ok(bytes.chunks_exact(4).map(LittleEndian::read_f32).collect())
}

fn read_array_f64<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<f64>, ReadError> {
  let count = varint::read_uvarint(cursor)? as usize;
  let len = count
    .checked_mul(8)
    .ok_or_else(|| error::record(ReadError::Truncated { offset: cursor.offset() }))?;
  let bytes = read_chunked(cursor, len)?;
  Ok(bytes.chunks_exact(8).map(LittleEndian::read_f64).collect())
}

// Count prefix, then that many verbatim bytes.
fn read_chunked_count<R: Read>(cursor: &mut Cursor<R>) -> Result<Vec<u8>, ReadError> {
  let count = varint::read_uvarint(cursor)? as usize;
  read_chunked(cursor, count)
}

fn read_chunked<R: Read>(cursor: &mut Cursor<R>, len: usize) -> Result<Vec<u8>, ReadError> {
  let mut out = Vec::with_capacity(len.min(CHUNK));
  let mut buf = [0; CHUNK];
  let mut remaining = len;
  while remaining > 0 {
    let want = remaining.min(CHUNK);
    let n = cursor.read(&mut buf[..want])?;
    out.extend_from_slice(&buf[..n]);
    if n < want {
      return Err(error::record(ReadError::Truncated { offset: cursor.offset() }));
    }
    remaining -= n;
  }
  Ok(out)
}

fn read_exact<R: Read>(cursor: &mut Cursor<R>, dst: &mut [u8]) -> Result<(), ReadError> {
  let n = cursor.read(dst)?;
  if n < dst.len() {
    return Err(error::record(ReadError::Truncated { offset: cursor.offset() }));
  }
  Ok(())
}
