//! Reading anvil-format minecraft worlds: the session lock, region files,
//! chunk decompression and section parsing.
//!
//! The general idea behind chunk reading is that [`ChunkCtx`] keeps the
//! persisting resources (a large decompression buffer and a deflate context)
//! and hands out transient views into chunk data that are only valid until
//! the next call on the same context. If you need 4 chunks loaded at once,
//! make 4 contexts and use them without any special considerations.

#[macro_use]
extern crate log;

pub mod chunk;
pub mod region;
pub mod section;
pub mod world;

pub use chunk::{Chunk, ChunkCtx};
pub use region::Region;
pub use section::{Section, Sections};
pub use world::{parse_region_name, RegionIter, World};

use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum AnvilError {
  /// A byte stream violated its format.
  Malformed,
  /// The path does not exist.
  NotExist,
  /// The disk filled up while writing.
  DiskFull,
  /// A chunk is stored with a compression scheme we can't read. Minecraft's
  /// bespoke LZ4 framing and the CUSTOM escape hatch land here, as does the
  /// sidecar-file bit.
  UnsupportedCompression(u8),
  /// The file layer failed.
  IO(io::Error),
}

pub type Result<T> = std::result::Result<T, AnvilError>;

impl fmt::Display for AnvilError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Malformed => write!(f, "malformed data"),
      Self::NotExist => write!(f, "path does not exist"),
      Self::DiskFull => write!(f, "disk full"),
      Self::UnsupportedCompression(ty) => write!(f, "unsupported chunk compression type {ty}"),
      Self::IO(e) => write!(f, "{e}"),
    }
  }
}

impl Error for AnvilError {}

impl From<io::Error> for AnvilError {
  fn from(e: io::Error) -> Self {
    match e.kind() {
      io::ErrorKind::NotFound => AnvilError::NotExist,
      io::ErrorKind::StorageFull => AnvilError::DiskFull,
      _ => AnvilError::IO(e),
    }
  }
}
