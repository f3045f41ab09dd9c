//! Distant Horizons LOD generation.
//!
//! A LOD covers a 64x64 column footprint: 4x4 chunks at mip 0, pyramidally
//! more as LODs are mipped together. Columns are vertical run-length
//! encodings of [`Datapoint`]s, and every datapoint resolves its id through
//! the LOD's own string mapping.

pub mod compress;
pub mod datapoint;
pub mod flatten;
pub mod from_chunks;
pub mod lod;
pub mod mip;
pub mod store;

pub use compress::Compression;
pub use datapoint::Datapoint;
pub use from_chunks::from_chunks;
pub use lod::Lod;
pub use mip::{from_lods, mip_nxn};

use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum LodError {
  /// Mismatched mip levels, min_y or height across inputs, or an input set
  /// of the wrong shape.
  InvalidArgument,
  /// A byte stream violated its format.
  Malformed,
  /// Unknown compression mode tag.
  UnsupportedCompression,
  /// A compression backend failed.
  Compress(io::Error),
}

pub type Result<T> = std::result::Result<T, LodError>;

impl fmt::Display for LodError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::InvalidArgument => write!(f, "invalid argument"),
      Self::Malformed => write!(f, "malformed data"),
      Self::UnsupportedCompression => write!(f, "unsupported compression mode"),
      Self::Compress(e) => write!(f, "compression failed: {e}"),
    }
  }
}

impl Error for LodError {}

impl From<dh_anvil::AnvilError> for LodError {
  fn from(e: dh_anvil::AnvilError) -> Self {
    match e {
      dh_anvil::AnvilError::UnsupportedCompression(_) => LodError::UnsupportedCompression,
      _ => LodError::Malformed,
    }
  }
}
