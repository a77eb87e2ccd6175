use crate::error::{self, ReadError};
use std::{
  fs::File,
  io::{self, Read},
  path::Path,
};
use zstd::stream::read::Decoder;

/// The five byte preamble identifying a plain (uncompressed) file.
pub const MAGIC: [u8; 5] = *b"cGnbT";

// Matches the common filesystem block size. Not observable to callers.
const PAGE_SIZE: usize = 4096;

/// Returns true if the given bytes start a standard Zstd frame.
pub fn is_zstd_frame(preamble: &[u8]) -> bool {
  preamble.len() >= 4 && preamble[..4] == [0x28, 0xb5, 0x2f, 0xfd]
}

/// Returns true if the given bytes start a skippable Zstd frame. The low
/// nibble of the first magic byte is a wildcard.
pub fn is_skippable_frame(preamble: &[u8]) -> bool {
  preamble.len() >= 4
    && preamble[0] & 0xf0 == 0x50
    && preamble[1] == 0x2a
    && preamble[2] == 0x4d
    && preamble[3] == 0x18
}

// The preamble bytes already pulled for detection are chained back in front
// of the rest of the source before the decoder sees it.
type ZstdSource<R> = Decoder<'static, io::BufReader<io::Chain<io::Cursor<Vec<u8>>, R>>>;

enum Source<R> {
  Plain(R),
  Zstd(ZstdSource<R>),
  Done,
}

/// A forward, single-pass byte stream over a file-like source.
///
/// The constructor looks at the first bytes of the source and picks a mode:
/// a plain source starts with [`MAGIC`] (which is consumed), a compressed
/// source starts with a Zstd frame (and is decompressed transparently,
/// including a leading magic inside the frame, if any), and a zero-byte
/// source is a valid stream yielding no data. Anything else fails to open.
///
/// A cursor is owned by exactly one caller; it is not shareable across
/// threads. The underlying handle and any decompression context are released
/// when the cursor is dropped.
pub struct Cursor<R> {
  src:        Source<R>,
  page:       Box<[u8; PAGE_SIZE]>,
  page_len:   usize,
  page_pos:   usize,
  offset:     u64,
  file_size:  u64,
  compressed: bool,
}

impl Cursor<File> {
  /// Opens the file at `path` and detects its preamble.
  pub fn open(path: impl AsRef<Path>) -> Result<Cursor<File>, ReadError> {
    let path = path.as_ref();
    let file = File::open(path)
      .map_err(|e| error::record(ReadError::OpenFailed(format!("{}: {e}", path.display()))))?;
    let len = file
      .metadata()
      .map_err(|e| error::record(ReadError::OpenFailed(format!("{}: {e}", path.display()))))?
      .len();
    Cursor::new(file, len)
  }
}

impl<'a> Cursor<&'a [u8]> {
  /// Wraps an in-memory buffer, with the same preamble detection as a file.
  pub fn from_bytes(data: &'a [u8]) -> Result<Cursor<&'a [u8]>, ReadError> {
    Cursor::new(data, data.len() as u64)
  }
}

impl<R: Read> Cursor<R> {
  /// Creates a cursor over any byte source. `file_size` is the raw length of
  /// the underlying source (before decompression), used only for telemetry.
  pub fn new(mut src: R, file_size: u64) -> Result<Cursor<R>, ReadError> {
    let mut preamble = [0; 5];
    let mut got = 0;
    while got < preamble.len() {
      let n = src.read(&mut preamble[got..]).map_err(|e| error::record(ReadError::IO(e)))?;
      if n == 0 {
        break;
      }
      got += n;
    }

    let mut cursor = Cursor {
      src: Source::Done,
      page: Box::new([0; PAGE_SIZE]),
      page_len: 0,
      page_pos: 0,
      offset: 0,
      file_size,
      compressed: false,
    };

    if got == 0 {
      // A zero-byte source is a valid, empty stream.
      return Ok(cursor);
    }
    if got == preamble.len() && preamble == MAGIC {
      debug!("plain preamble, {file_size} bytes");
      cursor.src = Source::Plain(src);
      cursor.ensure()?;
      return Ok(cursor);
    }
    if is_zstd_frame(&preamble[..got]) || is_skippable_frame(&preamble[..got]) {
      debug!("zstd frame, {file_size} compressed bytes");
      let chain = io::Cursor::new(preamble[..got].to_vec()).chain(src);
      let decoder =
        Decoder::new(chain).map_err(|e| error::record(ReadError::Compression(e.to_string())))?;
      cursor.src = Source::Zstd(decoder);
      cursor.compressed = true;
      cursor.ensure()?;
      // The decompressed stream may itself begin with the magic.
      if cursor.page_len - cursor.page_pos >= MAGIC.len() && cursor.page[..MAGIC.len()] == MAGIC {
        cursor.page_pos = MAGIC.len();
        cursor.ensure()?;
      }
      return Ok(cursor);
    }
    Err(error::record(ReadError::OpenFailed(format!(
      "unrecognized preamble {:02x?}",
      &preamble[..got]
    ))))
  }

  // Keeps the invariant that `page_pos < page_len` unless the source is
  // exhausted, so `peek` and `is_eof` never need to touch the source.
  fn ensure(&mut self) -> Result<(), ReadError> {
    while self.page_pos == self.page_len {
      match self.refill()? {
        0 => {
          self.src = Source::Done;
          break;
        }
        n => {
          self.page_pos = 0;
          self.page_len = n;
        }
      }
    }
    Ok(())
  }

  // Refills the page from the source, returning the bytes fetched. For the
  // Zstd side this keeps pulling until the page is full or the frame ends,
  // so short decompressor reads don't look like EOF.
  fn refill(&mut self) -> Result<usize, ReadError> {
    let mut len = 0;
    while len < PAGE_SIZE {
      let n = match &mut self.src {
        Source::Plain(src) => {
          src.read(&mut self.page[len..]).map_err(|e| error::record(ReadError::IO(e)))?
        }
        Source::Zstd(src) => src
          .read(&mut self.page[len..])
          .map_err(|e| error::record(ReadError::Compression(e.to_string())))?,
        Source::Done => 0,
      };
      if n == 0 {
        break;
      }
      len += n;
    }
    Ok(len)
  }

  /// Returns the byte at the current position without advancing, or `None`
  /// at end of stream.
  pub fn peek(&self) -> Option<u8> {
    if self.page_pos < self.page_len {
      Some(self.page[self.page_pos])
    } else {
      None
    }
  }

  /// Advances one byte. A no-op at end of stream.
  pub fn advance(&mut self) -> Result<(), ReadError> {
    if self.page_pos < self.page_len {
      self.page_pos += 1;
      self.offset += 1;
      self.ensure()?;
    }
    Ok(())
  }

  /// Consumes and returns the current byte. Fails with
  /// [`ReadError::Truncated`] at end of stream.
  pub fn next(&mut self) -> Result<u8, ReadError> {
    match self.peek() {
      Some(b) => {
        self.advance()?;
        Ok(b)
      }
      None => Err(error::record(ReadError::Truncated { offset: self.offset })),
    }
  }

  /// Bulk-copies up to `dst.len()` bytes, returning the number of bytes
  /// actually written. A short count means end of stream was reached.
  pub fn read(&mut self, dst: &mut [u8]) -> Result<usize, ReadError> {
    let mut progress = 0;
    while progress < dst.len() {
      if self.page_pos == self.page_len {
        break;
      }
      let available = self.page_len - self.page_pos;
      let delta = available.min(dst.len() - progress);
      dst[progress..progress + delta]
        .copy_from_slice(&self.page[self.page_pos..self.page_pos + delta]);
      self.page_pos += delta;
      self.offset += delta as u64;
      progress += delta;
      self.ensure()?;
    }
    Ok(progress)
  }

  /// The logical position in the decompressed payload stream. This counts
  /// bytes yielded by the cursor, not the position in the underlying file;
  /// neither preamble is included.
  pub fn offset(&self) -> u64 { self.offset }

  pub fn is_eof(&self) -> bool { self.page_pos == self.page_len }

  /// True if the source was a Zstd frame.
  pub fn compressed(&self) -> bool { self.compressed }

  /// The raw length of the underlying source, before decompression.
  pub fn file_size(&self) -> u64 { self.file_size }
}

/// Preamble-level facts about a file, answered without decoding the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
  pub compressed: bool,
  pub file_size:  u64,
}

/// Probes the preamble of the file at `path`.
pub fn file_info(path: impl AsRef<Path>) -> Result<FileInfo, ReadError> {
  error::clear_errors();
  let cursor = Cursor::open(path)?;
  Ok(FileInfo { compressed: cursor.compressed(), file_size: cursor.file_size() })
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn plain(body: &[u8]) -> Vec<u8> {
    let mut data = MAGIC.to_vec();
    data.extend_from_slice(body);
    data
  }

  #[test]
  fn empty_source() {
    let cursor = Cursor::from_bytes(&[]).unwrap();
    assert!(cursor.is_eof());
    assert_eq!(cursor.peek(), None);
    assert!(!cursor.compressed());
  }

  #[test]
  fn magic_only() {
    let cursor = Cursor::from_bytes(&MAGIC).unwrap();
    assert!(cursor.is_eof());
    assert_eq!(cursor.file_size(), 5);
  }

  #[test]
  fn bad_preamble() {
    crate::error::clear_errors();
    assert!(matches!(Cursor::from_bytes(b"nope!"), Err(ReadError::OpenFailed(_))));
    assert!(matches!(Cursor::from_bytes(b"xy"), Err(ReadError::OpenFailed(_))));
    assert_eq!(crate::error::get_errors().len(), 2);
  }

  #[test]
  fn plain_stream() {
    let data = plain(&[1, 2, 3]);
    let mut cursor = Cursor::from_bytes(&data).unwrap();
    assert_eq!(cursor.peek(), Some(1));
    assert_eq!(cursor.offset(), 0);
    assert_eq!(cursor.next().unwrap(), 1);
    assert_eq!(cursor.next().unwrap(), 2);
    assert_eq!(cursor.offset(), 2);
    assert_eq!(cursor.next().unwrap(), 3);
    assert!(cursor.is_eof());
    assert!(matches!(cursor.next(), Err(ReadError::Truncated { offset: 3 })));
    // Advancing at EOF stays a no-op.
    cursor.advance().unwrap();
    assert_eq!(cursor.offset(), 3);
  }

  #[test]
  fn bulk_read_across_pages() {
    let body: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
    let data = plain(&body);
    let mut cursor = Cursor::from_bytes(&data).unwrap();
    let mut dst = vec![0; 10_000];
    assert_eq!(cursor.read(&mut dst).unwrap(), 10_000);
    assert_eq!(dst, body);
    assert_eq!(cursor.offset(), 10_000);
    assert_eq!(cursor.read(&mut dst).unwrap(), 0);
  }

  #[test]
  fn short_bulk_read() {
    let data = plain(&[9, 9]);
    let mut cursor = Cursor::from_bytes(&data).unwrap();
    let mut dst = [0; 8];
    assert_eq!(cursor.read(&mut dst).unwrap(), 2);
    assert!(cursor.is_eof());
  }

  #[test]
  fn zstd_stream() {
    let body: Vec<u8> = (0..9_000u32).map(|i| (i % 251) as u8).collect();
    let frame = zstd::bulk::compress(&body, 3).unwrap();
    let mut cursor = Cursor::from_bytes(&frame).unwrap();
    assert!(cursor.compressed());
    assert_eq!(cursor.file_size(), frame.len() as u64);
    let mut dst = vec![0; body.len()];
    assert_eq!(cursor.read(&mut dst).unwrap(), body.len());
    assert_eq!(dst, body);
    assert!(cursor.is_eof());
  }

  #[test]
  fn zstd_stream_with_inner_magic() {
    let mut body = MAGIC.to_vec();
    body.extend_from_slice(&[0xaa, 0xbb]);
    let frame = zstd::bulk::compress(&body, 3).unwrap();
    let mut cursor = Cursor::from_bytes(&frame).unwrap();
    // The embedded magic is stripped; only the payload remains.
    assert_eq!(cursor.next().unwrap(), 0xaa);
    assert_eq!(cursor.next().unwrap(), 0xbb);
    assert!(cursor.is_eof());
  }

  #[test]
  fn skippable_frame_detection() {
    let mut data = vec![0x50, 0x2a, 0x4d, 0x18];
    data.extend_from_slice(&4u32.to_le_bytes());
    data.extend_from_slice(b"meta");
    assert!(is_skippable_frame(&data));
    assert!(!is_zstd_frame(&data));
    assert!(is_zstd_frame(&[0x28, 0xb5, 0x2f, 0xfd, 0x00]));
  }
}
