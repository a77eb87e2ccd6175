//! A codec for CGNBT, a self-describing hierarchical tagged data format.
//! Files hold a tree of named tags with a compact binary encoding and
//! optional transparent Zstandard compression.
//!
//! # Wire format
//!
//! A file is either the five byte magic `cGnbT` followed by a raw body, a
//! Zstd frame whose decompressed bytes are the body (possibly magic-prefixed
//! themselves), or empty. The body is a run of entries; each entry is one
//! head byte, a VarText key, and a type-dependent payload.
//!
//! The head byte packs the type id into its high nibble. The low nibble is
//! type-specific: `Bool` stores its whole value there, `Hex` stores its
//! nibble, and `Array` stores the element type id. An array of fixed-width
//! scalars (`Bool`, `Hex`, `Float`, `Double`, `Raw`) reads back as one of
//! the typed-array variants, which keep a count prefix and then flat scalar
//! data with no per-element overhead.
//!
//! Integers are varints terminated by a set high bit, with zig-zag encoding
//! for the signed flavor (see [`varint`]). Keys use the same terminator
//! convention for their bytes (see [`vartext`]). Floats are little-endian
//! IEEE-754. Strings are length-prefixed and carry arbitrary bytes; nothing
//! validates them as UTF-8. Nested objects close with a single zero byte;
//! the top level simply runs to end of stream.
//!
//! # Use
//!
//! [`read`]/[`decode`] produce a [`TagMap`] from a path or a byte slice,
//! [`write`]/[`encode`] go the other way, and [`serialize`] renders a tree
//! as JSON-like text. Decode and encode failures return a typed error; the
//! ordered one-line diagnostics behind it are kept per thread and available
//! from [`get_errors`] until the next public call on that thread.

#[macro_use]
extern crate log;

pub mod cursor;
pub mod error;
pub mod nbt;
pub mod varint;
pub mod vartext;

pub use cursor::{file_info, Cursor, FileInfo, MAGIC};
pub use error::{clear_errors, get_errors, ReadError, WriteError};
pub use nbt::{
  decode, encode, encode_compressed, read, serialize, write, write_compressed, Tag, TagMap, Type,
};

use log::LevelFilter;
use std::io;

/// Initializes the logger. Might do more things in the future.
pub fn init(name: &str) { init_with_level(name, LevelFilter::Info) }

pub fn init_with_level(name: &str, level: LevelFilter) {
  init_with_level_writer(name, level, io::stdout());
}

pub fn init_with_level_writer<W: io::Write + Send + Sync + 'static>(
  _name: &str,
  level: LevelFilter,
  writer: W,
) {
  use log::{Level, Metadata, Record};
  use parking_lot::Mutex;

  #[cfg(unix)]
  let isatty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
  #[cfg(not(unix))]
  let isatty = false;

  struct Logger<W> {
    writer: Mutex<W>,
    color:  bool,
  }

  impl<W: io::Write> Logger<W> {
    fn log_inner(&self, record: &Record) -> io::Result<()> {
      #[cfg(not(feature = "utclogs"))]
      let now = chrono::Local::now();
      #[cfg(feature = "utclogs")]
      let now = chrono::Utc::now();

      let mut w = self.writer.lock();
      write!(w, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"))?;
      #[cfg(debug_assertions)]
      {
        if let Some(path) = record.module_path() {
          write!(w, "{path}")?;
        }
        if let Some(line) = record.line() {
          write!(w, ":{line}")?;
        }
        write!(w, " ")?;
      }
      if self.color {
        match record.level() {
          Level::Trace => write!(w, "[\x1b[36mTRACE\x1b[0m]")?,
          Level::Debug => write!(w, "[\x1b[34mDEBUG\x1b[0m]")?,
          Level::Info => write!(w, "[\x1b[32mINFO\x1b[0m]")?,
          Level::Warn => write!(w, "[\x1b[33mWARN\x1b[0m]")?,
          Level::Error => write!(w, "[\x1b[31m\x1b[1mERROR\x1b[0m]")?,
        }
      } else {
        match record.level() {
          Level::Trace => write!(w, "[TRACE]")?,
          Level::Debug => write!(w, "[DEBUG]")?,
          Level::Info => write!(w, "[INFO]")?,
          Level::Warn => write!(w, "[WARN]")?,
          Level::Error => write!(w, "[ERROR]")?,
        }
      }
      writeln!(w, " {}", record.args())?;
      Ok(())
    }
  }

  impl<W: io::Write + Send + Sync> log::Log for Logger<W> {
    fn enabled(&self, _metadata: &Metadata) -> bool { true }

    fn log(&self, record: &Record) {
      let _ = self.log_inner(record);
    }

    fn flush(&self) {}
  }

  log::set_boxed_logger(Box::new(Logger { writer: Mutex::new(writer), color: isatty }))
    .map(|()| log::set_max_level(level))
    .unwrap();
}
