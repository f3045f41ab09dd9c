//! The compression facade for LOD payloads.
//!
//! A LOD's column stream is stored in one of four forms. Conversions always
//! pass through the uncompressed intermediate; see [`Lod::convert`].
//!
//! [`Lod::convert`]: crate::Lod::convert

use crate::{LodError, Result};
use std::io::{Read, Write};

pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
pub const LZ4_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

/// How a LOD payload is stored. The numeric tags are what lands in the
/// database's `CompressionMode` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
  #[default]
  Uncompressed,
  Lz4,
  Zstd,
  Lzma2,
}

impl Compression {
  pub fn tag(self) -> i64 {
    match self {
      Self::Uncompressed => 0,
      Self::Lz4 => 1,
      Self::Zstd => 2,
      Self::Lzma2 => 3,
    }
  }

  pub fn from_tag(tag: i64) -> Result<Self> {
    match tag {
      0 => Ok(Self::Uncompressed),
      1 => Ok(Self::Lz4),
      2 => Ok(Self::Zstd),
      3 => Ok(Self::Lzma2),
      _ => Err(LodError::UnsupportedCompression),
    }
  }
}

/// Guesses the compression of a stored payload from its magic. LZMA2 has no
/// reliable magic, so it is the fallback; writers should tag the mode
/// explicitly rather than lean on this.
pub fn detect(data: &[u8]) -> Compression {
  if data.starts_with(&ZSTD_MAGIC) {
    Compression::Zstd
  } else if data.starts_with(&LZ4_MAGIC) {
    Compression::Lz4
  } else {
    Compression::Lzma2
  }
}

/// Compression state kept inside the LOD extension for the LOD's lifetime.
/// The zstd context is the only one the backends let us reuse; lz4 frame and
/// lzma encoders are rebuilt per call.
#[derive(Default)]
pub(crate) struct CompressCtx {
  zstd: Option<(i32, zstd::bulk::Compressor<'static>)>,
}

impl CompressCtx {
  fn zstd(&mut self, level: i32) -> std::io::Result<&mut zstd::bulk::Compressor<'static>> {
    if !matches!(self.zstd, Some((l, _)) if l == level) {
      self.zstd = Some((level, zstd::bulk::Compressor::new(level)?));
    }
    match self.zstd {
      Some((_, ref mut c)) => Ok(c),
      None => unreachable!(),
    }
  }
}

/// Encodes `input` into `out` (cleared first). `level` runs 0..=1 and maps
/// onto whatever range the mode natively has; 0.5 is a reasonable middle
/// everywhere.
pub(crate) fn encode(
  ctx: &mut CompressCtx,
  mode: Compression,
  level: f64,
  input: &[u8],
  out: &mut Vec<u8>,
) -> Result<()> {
  let level = level.clamp(0.0, 1.0);
  out.clear();
  match mode {
    Compression::Uncompressed => {
      out.extend_from_slice(input);
      Ok(())
    }
    Compression::Lz4 => {
      let mut enc = lz4_flex::frame::FrameEncoder::new(std::mem::take(out));
      enc.write_all(input).map_err(LodError::Compress)?;
      *out = enc.finish().map_err(|e| LodError::Compress(std::io::Error::other(e)))?;
      Ok(())
    }
    Compression::Zstd => {
      let level = 1 + (level * 21.0).round() as i32;
      let compressor = ctx.zstd(level).map_err(LodError::Compress)?;
      *out = compressor.compress(input).map_err(LodError::Compress)?;
      Ok(())
    }
    Compression::Lzma2 => {
      let preset = (level * 9.0).round() as u32;
      let mut enc = xz2::read::XzEncoder::new(input, preset);
      enc.read_to_end(out).map_err(LodError::Compress)?;
      Ok(())
    }
  }
}

/// Decodes `input` into `out` (cleared first).
pub(crate) fn decode(mode: Compression, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
  out.clear();
  match mode {
    Compression::Uncompressed => {
      out.extend_from_slice(input);
      Ok(())
    }
    Compression::Lz4 => {
      let mut dec = lz4_flex::frame::FrameDecoder::new(input);
      dec.read_to_end(out).map_err(|_| LodError::Malformed)?;
      Ok(())
    }
    Compression::Zstd => {
      *out = zstd::stream::decode_all(input).map_err(|_| LodError::Malformed)?;
      Ok(())
    }
    Compression::Lzma2 => {
      let mut dec = xz2::read::XzDecoder::new(input);
      dec.read_to_end(out).map_err(|_| LodError::Malformed)?;
      Ok(())
    }
  }
}
