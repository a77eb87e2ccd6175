use std::{cell::RefCell, error::Error, fmt, io, path::PathBuf};

/// An error while decoding a tag tree. Once any of these is returned, the
/// in-progress tree is in a partially-populated state and must be discarded.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReadError {
  /// The byte source could not be initialised. This covers missing files,
  /// sources shorter than a preamble, and preambles that are neither the
  /// plain magic nor a Zstd frame.
  OpenFailed(String),
  /// An io error from the underlying source, outside of the preamble.
  IO(io::Error),
  /// The source ended before a structurally required byte.
  Truncated { offset: u64 },
  /// A header byte named a type that is invalid at its position. The only
  /// type this can happen with is `ObjectEnd`, which is meaningless at the
  /// top level of a file.
  BadType { ty: u8, offset: u64 },
  /// Happens if a varint runs past its 10 byte maximum. This means the data
  /// was corrupted, and we cannot recover.
  VarIntTooLong { offset: u64 },
  /// The element-type nibble of an array header is invalid at its position.
  BadSecondType { ty: u8, offset: u64 },
  /// An error from the Zstd side while reading a compressed source.
  Compression(String),
}

/// An error while encoding or writing a tag tree.
#[derive(Debug)]
#[non_exhaustive]
pub enum WriteError {
  IO(io::Error),
  /// The sink accepted fewer bytes than requested.
  WriteShort { wrote: u64, expected: u64 },
  /// The target path exists and overwriting was not requested.
  OverwriteDenied(PathBuf),
  /// An error from the Zstd side while compressing.
  Compression(String),
  /// Object keys are VarText on the wire, which cannot carry an empty string
  /// or any byte with its high bit set.
  KeyNotEncodable(String),
}

impl fmt::Display for ReadError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::OpenFailed(msg) => write!(f, "file failed to open: {msg}"),
      Self::IO(e) => write!(f, "io error: {e}"),
      Self::Truncated { offset } => write!(f, "unexpected end of data at pos {offset}"),
      Self::BadType { ty, offset } => {
        write!(f, "invalid type ID in object at pos {offset}: {ty}")
      }
      Self::VarIntTooLong { offset } => write!(f, "varint is too long at pos {offset}"),
      Self::BadSecondType { ty, offset } => {
        write!(f, "invalid second type {ty} at pos {offset}")
      }
      Self::Compression(msg) => write!(f, "zstd error: {msg}"),
    }
  }
}

impl fmt::Display for WriteError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::IO(e) => write!(f, "io error: {e}"),
      Self::WriteShort { wrote, expected } => {
        write!(f, "short write: wrote {wrote} of {expected} bytes")
      }
      Self::OverwriteDenied(path) => {
        write!(f, "refusing to overwrite existing file: {}", path.display())
      }
      Self::Compression(msg) => write!(f, "zstd error: {msg}"),
      Self::KeyNotEncodable(key) => {
        write!(f, "key {key:?} is empty or contains a byte with the high bit set")
      }
    }
  }
}

impl Error for ReadError {}
impl Error for WriteError {}

impl From<io::Error> for ReadError {
  fn from(e: io::Error) -> ReadError { ReadError::IO(e) }
}
impl From<io::Error> for WriteError {
  fn from(e: io::Error) -> WriteError { WriteError::IO(e) }
}

thread_local! {
  static ERRORS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Returns a copy of this thread's diagnostic lines, in the order they were
/// recorded. The list survives until the next public decode/encode call.
pub fn get_errors() -> Vec<String> { ERRORS.with(|e| e.borrow().clone()) }

/// Clears this thread's diagnostic lines. Every public decode/encode entry
/// point calls this first.
pub fn clear_errors() { ERRORS.with(|e| e.borrow_mut().clear()) }

pub(crate) fn push_error(error: impl Into<String>) {
  ERRORS.with(|e| e.borrow_mut().push(error.into()));
}

/// Records the error on the thread-local list, then hands it back. Every
/// failure site goes through this so the list stays in detection order.
pub(crate) fn record(e: ReadError) -> ReadError {
  push_error(e.to_string());
  e
}

pub(crate) fn record_write(e: WriteError) -> WriteError {
  push_error(e.to_string());
  e
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_orders_and_clears() {
    clear_errors();
    push_error("first");
    push_error("second");
    assert_eq!(get_errors(), vec!["first".to_string(), "second".to_string()]);
    clear_errors();
    assert!(get_errors().is_empty());
  }

  #[test]
  fn display() {
    let e = ReadError::BadSecondType { ty: 0, offset: 12 };
    assert_eq!(e.to_string(), "invalid second type 0 at pos 12");
    let e = WriteError::WriteShort { wrote: 3, expected: 9 };
    assert_eq!(e.to_string(), "short write: wrote 3 of 9 bytes");
  }
}
