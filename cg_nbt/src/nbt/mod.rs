mod deserialize;
mod serialize;

pub use deserialize::{decode, read};
pub use serialize::{encode, encode_compressed, write, write_compressed};

use std::{collections::HashMap, fmt};

/// A decoded file body: string keys mapped to tags. Key iteration order is
/// unspecified.
pub type TagMap = HashMap<String, Tag>;

/// The wire type ids. The high nibble of every header byte holds one of
/// these; an `Array` high nibble combines with a fixed-scalar low nibble to
/// form the typed-array ids 11 through 15, which never appear as a high
/// nibble themselves when written by this encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  /// Wire-only sentinel closing a nested object. Carries no payload.
  ObjectEnd,
  Object,
  IVarInt,
  UVarInt,
  Bool,
  Hex,
  Float,
  Double,
  Array,
  String,
  Raw,
  ArrayBool,
  ArrayHex,
  ArrayFloat,
  ArrayDouble,
  ArrayRaw,
}

impl Type {
  /// Maps a 4 bit id to its type. Ids above 15 were masked off by the caller.
  pub fn from_id(id: u8) -> Type {
    match id & 0x0f {
      0 => Self::ObjectEnd,
      1 => Self::Object,
      2 => Self::IVarInt,
      3 => Self::UVarInt,
      4 => Self::Bool,
      5 => Self::Hex,
      6 => Self::Float,
      7 => Self::Double,
      8 => Self::Array,
      9 => Self::String,
      10 => Self::Raw,
      11 => Self::ArrayBool,
      12 => Self::ArrayHex,
      13 => Self::ArrayFloat,
      14 => Self::ArrayDouble,
      _ => Self::ArrayRaw,
    }
  }

  /// Returns the 4 bit id for this type.
  pub fn id(&self) -> u8 {
    match self {
      Self::ObjectEnd => 0,
      Self::Object => 1,
      Self::IVarInt => 2,
      Self::UVarInt => 3,
      Self::Bool => 4,
      Self::Hex => 5,
      Self::Float => 6,
      Self::Double => 7,
      Self::Array => 8,
      Self::String => 9,
      Self::Raw => 10,
      Self::ArrayBool => 11,
      Self::ArrayHex => 12,
      Self::ArrayFloat => 13,
      Self::ArrayDouble => 14,
      Self::ArrayRaw => 15,
    }
  }

  /// Resolves a header byte to the type it names. An `Array` high nibble
  /// with a fixed-scalar element nibble collapses to the matching
  /// typed-array id. Doesn't look past the one byte.
  pub fn from_head(head: u8) -> Type {
    if head >> 4 == Type::Array.id() {
      match Type::from_id(head & 0x0f) {
        Type::Bool => Type::ArrayBool,
        Type::Hex => Type::ArrayHex,
        Type::Float => Type::ArrayFloat,
        Type::Double => Type::ArrayDouble,
        Type::Raw => Type::ArrayRaw,
        _ => Type::Array,
      }
    } else {
      Type::from_id(head >> 4)
    }
  }
}

/// This is a single tag: the fundamental unit of the tree. An `Object` maps
/// names to tags, an `Array` holds an ordered run of same-typed tags, and
/// the typed array variants hold fixed-width scalars in flat storage.
///
/// `String` payloads are raw bytes: the wire does not validate UTF-8 and
/// neither does this type. Keys, in contrast, are 7-bit VarText and always
/// valid strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
  Object(TagMap),
  IVarInt(i64),
  UVarInt(u64),
  Bool(bool),
  Hex(u8),
  Float(f32),
  Double(f64),
  Array(Vec<Tag>),
  String(Vec<u8>),
  Raw(u8),
  ArrayBool(Vec<bool>),
  ArrayHex(Vec<u8>),
  ArrayFloat(Vec<f32>),
  ArrayDouble(Vec<f64>),
  ArrayRaw(Vec<u8>),
}

impl Tag {
  /// A simpler way to construct object tags inline.
  pub fn object(value: &[(&str, Tag)]) -> Self {
    let mut inner = HashMap::new();
    for (name, tag) in value {
      inner.insert(name.to_string(), tag.clone());
    }
    Self::Object(inner)
  }

  /// Constructs an array tag. All elements of an array share one wire type.
  ///
  /// An array of fixed-scalar tags (`Bool`, `Hex`, `Float`, `Double`, `Raw`)
  /// serialises to the same bytes as the matching typed-array variant and
  /// will decode back as that variant; prefer the typed variants directly
  /// for those.
  ///
  /// # Panics
  /// This will panic if the values contain multiple types. This is a
  /// limitation of the data format: arrays can only hold one type.
  pub fn array(values: Vec<Tag>) -> Self {
    if let Some(first) = values.first() {
      let ty = first.ty();
      for v in &values {
        if v.ty() != ty {
          panic!("the given array contains multiple types: {values:?}");
        }
      }
    }
    Self::Array(values)
  }

  /// A string tag from UTF-8 text.
  pub fn str(value: &str) -> Self { Self::String(value.as_bytes().to_vec()) }

  #[track_caller]
  pub fn unwrap_object(&self) -> &TagMap {
    match self {
      Self::Object(v) => v,
      _ => panic!("not an object: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_ivarint(&self) -> i64 {
    match self {
      Self::IVarInt(v) => *v,
      _ => panic!("not an ivarint: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_uvarint(&self) -> u64 {
    match self {
      Self::UVarInt(v) => *v,
      _ => panic!("not a uvarint: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_bool(&self) -> bool {
    match self {
      Self::Bool(v) => *v,
      _ => panic!("not a bool: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_hex(&self) -> u8 {
    match self {
      Self::Hex(v) => *v,
      _ => panic!("not a hex: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_float(&self) -> f32 {
    match self {
      Self::Float(v) => *v,
      _ => panic!("not a float: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_double(&self) -> f64 {
    match self {
      Self::Double(v) => *v,
      _ => panic!("not a double: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_array(&self) -> &Vec<Tag> {
    match self {
      Self::Array(v) => v,
      _ => panic!("not an array: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_string(&self) -> &[u8] {
    match self {
      Self::String(v) => v,
      _ => panic!("not a string: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_raw(&self) -> u8 {
    match self {
      Self::Raw(v) => *v,
      _ => panic!("not a raw: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_bool_arr(&self) -> &[bool] {
    match self {
      Self::ArrayBool(v) => v,
      _ => panic!("not a bool array: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_hex_arr(&self) -> &[u8] {
    match self {
      Self::ArrayHex(v) => v,
      _ => panic!("not a hex array: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_float_arr(&self) -> &[f32] {
    match self {
      Self::ArrayFloat(v) => v,
      _ => panic!("not a float array: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_double_arr(&self) -> &[f64] {
    match self {
      Self::ArrayDouble(v) => v,
      _ => panic!("not a double array: {self:?}"),
    }
  }
  #[track_caller]
  pub fn unwrap_raw_arr(&self) -> &[u8] {
    match self {
      Self::ArrayRaw(v) => v,
      _ => panic!("not a raw array: {self:?}"),
    }
  }
}

struct ObjectRef<'a>(&'a TagMap);

impl fmt::Display for ObjectRef<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, tag)) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "\"{key}\": {tag}")?;
    }
    write!(f, "}}")
  }
}

fn fmt_seq<I>(f: &mut fmt::Formatter, items: I) -> fmt::Result
where
  I: IntoIterator,
  I::Item: fmt::Display,
{
  write!(f, "[")?;
  for (i, item) in items.into_iter().enumerate() {
    if i > 0 {
      write!(f, ", ")?;
    }
    write!(f, "{item}")?;
  }
  write!(f, "]")
}

impl fmt::Display for Tag {
  /// Renders the tag in a JSON-like form. Unsigned integers carry a trailing
  /// `u`, `Hex` is one uppercase digit, `Raw` is two, floats use their
  /// shortest round-trip form, and strings are quoted without escaping.
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Object(v) => write!(f, "{}", ObjectRef(v)),
      Self::IVarInt(v) => write!(f, "{v}"),
      Self::UVarInt(v) => write!(f, "{v}u"),
      Self::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
      Self::Hex(v) => write!(f, "{:X}", v & 0x0f),
      Self::Float(v) => write!(f, "{v}"),
      Self::Double(v) => write!(f, "{v}"),
      Self::Array(v) => fmt_seq(f, v),
      Self::String(v) => write!(f, "\"{}\"", String::from_utf8_lossy(v)),
      Self::Raw(v) => write!(f, "{v:02X}"),
      Self::ArrayBool(v) => fmt_seq(f, v.iter().map(|b| if *b { "true" } else { "false" })),
      Self::ArrayHex(v) => fmt_seq(f, v.iter().map(|b| format!("{:X}", b & 0x0f))),
      Self::ArrayFloat(v) => fmt_seq(f, v),
      Self::ArrayDouble(v) => fmt_seq(f, v),
      Self::ArrayRaw(v) => fmt_seq(f, v.iter().map(|b| format!("{b:02X}"))),
    }
  }
}

/// Renders a whole decoded body the same way a `Tag::Object` renders,
/// without wrapping the map in a tag first.
pub fn serialize(data: &TagMap) -> String { ObjectRef(data).to_string() }
