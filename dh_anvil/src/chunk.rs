use crate::{AnvilError, Region, Result};
use flate2::{read::GzDecoder, Decompress, FlushDecompress, Status};
use std::io::Read;

const BUFFER_START: usize = 100 * 1024;
const BUFFER_MAX: usize = 4 * 1024 * 1024;

const COMPRESSION_GZIP: u8 = 1;
const COMPRESSION_ZLIB: u8 = 2;
const COMPRESSION_UNCOMPRESSED: u8 = 3;
// 4 is minecraft's "LZ4" format, a custom framing that does not conform to
// the lz4 frame format, and 127 is the modpack escape hatch. Neither is
// readable here.

/// A decompressed chunk. The data aliases the context's buffer (or, for
/// uncompressed chunks, the region bytes), so it lives until the next
/// `decompress` call on the same context - which the borrow enforces.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
  pub data:    &'a [u8],
  pub chunk_x: i32,
  pub chunk_z: i32,
}

impl Chunk<'_> {
  /// True for chunks that are absent from their region file.
  pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

/// Persistent resources for chunk decompression: a growable output buffer and
/// a lazily created deflate context, both reused across calls.
pub struct ChunkCtx {
  buffer: Vec<u8>,
  zlib:   Option<Decompress>,
}

impl Default for ChunkCtx {
  fn default() -> Self { Self::new() }
}

impl ChunkCtx {
  pub fn new() -> Self { ChunkCtx { buffer: Vec::with_capacity(BUFFER_START), zlib: None } }

  /// Decompresses the chunk at region-local `(chunk_x, chunk_z)`.
  ///
  /// Chunks marked absent in the location table come back as an empty,
  /// non-error view. The returned world coordinates are derived from the
  /// region position.
  pub fn decompress<'a>(
    &'a mut self,
    region: &Region<'a>,
    chunk_x: i32,
    chunk_z: i32,
  ) -> Result<Chunk<'a>> {
    let chunk_x = chunk_x & 31;
    let chunk_z = chunk_z & 31;
    let world_x = region.x * 32 + chunk_x;
    let world_z = region.z * 32 + chunk_z;
    let empty = Chunk { data: &[], chunk_x: world_x, chunk_z: world_z };

    // Keep the soft cap: one huge chunk shouldn't pin a huge buffer on every
    // context for the rest of the run.
    if self.buffer.capacity() > BUFFER_MAX {
      self.buffer = Vec::with_capacity(BUFFER_MAX);
    }

    if region.data.is_empty() {
      return Ok(empty);
    } else if region.data.len() < 8192 {
      return Err(AnvilError::Malformed);
    }

    let (offset, sectors) = region.location(chunk_x, chunk_z).ok_or(AnvilError::Malformed)?;
    if offset < 2 || sectors == 0 {
      return Ok(empty);
    }

    let frame = region.data.get(offset as usize * 4096..).ok_or(AnvilError::Malformed)?;
    if frame.len() < 5 {
      return Err(AnvilError::Malformed);
    }
    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let compression = frame[4];
    // The length includes the compression type byte.
    let payload = frame.get(5..4 + length).ok_or(AnvilError::Malformed)?;

    if compression & 0x80 != 0 {
      // Payload lives in a sidecar chunk file, which this core doesn't read.
      return Err(AnvilError::UnsupportedCompression(compression));
    }

    match compression {
      COMPRESSION_GZIP => {
        self.buffer.clear();
        let mut decoder = GzDecoder::new(payload);
        decoder.read_to_end(&mut self.buffer).map_err(|_| AnvilError::Malformed)?;
        Ok(Chunk { data: &self.buffer, chunk_x: world_x, chunk_z: world_z })
      }
      COMPRESSION_ZLIB => {
        let size = self.inflate_zlib(payload)?;
        Ok(Chunk { data: &self.buffer[..size], chunk_x: world_x, chunk_z: world_z })
      }
      COMPRESSION_UNCOMPRESSED => Ok(Chunk { data: payload, chunk_x: world_x, chunk_z: world_z }),
      ty => Err(AnvilError::UnsupportedCompression(ty)),
    }
  }

  // Inflates into the reused buffer, doubling it while the output doesn't
  // fit, and returns the decompressed size.
  fn inflate_zlib(&mut self, payload: &[u8]) -> Result<usize> {
    let zlib = self.zlib.get_or_insert_with(|| Decompress::new(true));

    if self.buffer.capacity() < BUFFER_START {
      self.buffer.reserve(BUFFER_START);
    }

    loop {
      self.buffer.resize(self.buffer.capacity(), 0);
      zlib.reset(true);
      match zlib.decompress(payload, &mut self.buffer, FlushDecompress::Finish) {
        Ok(Status::StreamEnd) => return Ok(zlib.total_out() as usize),
        Ok(Status::Ok) | Ok(Status::BufError) => {
          let grown = self.buffer.len() * 2;
          self.buffer.resize(grown, 0);
        }
        Err(_) => return Err(AnvilError::Malformed),
      }
    }
  }
}
