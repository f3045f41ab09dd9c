//! Mips S x S LODs (S = 2^k) into one LOD at mip level +k, working on the
//! serialised column form the whole way.
//!
//! Rehydrating columns into a voxel grid and re-encoding would touch every
//! voxel; the altitude-aligned sweep below touches every source datapoint
//! exactly once instead, so the work scales with the data, not the volume.

use crate::{
  compress::Compression,
  lod::LodExt,
  Datapoint, Lod, LodError, Result,
};
use dh_common::util::be;

const NO_RUN: u32 = u32::MAX;

/// Mips a 2x2 group one level coarser. The common case.
pub fn from_lods(sources: &mut [Lod; 4], dst: &mut Lod) -> Result<()> {
  mip_nxn(&mut sources[..], dst)
}

/// Mips `s * s` source LODs (row-major, `s = 2^k`, all sharing `min_y`,
/// `height` and mip level) into `dst` at mip level +k.
///
/// Sources are re-inflated in place if they're stored compressed. Each
/// source LOD covers an `(64/s) x (64/s)` block of the destination grid, and
/// each destination column merges the `s x s` adjacent source columns under
/// its footprint.
pub fn mip_nxn(sources: &mut [Lod], dst: &mut Lod) -> Result<()> {
  let s = match integer_sqrt(sources.len()) {
    Some(s) if s.is_power_of_two() && s >= 2 && s <= 64 => s,
    _ => return Err(LodError::InvalidArgument),
  };

  let min_y = sources[0].min_y;
  let height = sources[0].height;
  let mip_level = sources[0].mip_level;
  for src in sources.iter() {
    if src.min_y != min_y || src.height != height || src.mip_level != mip_level {
      return Err(LodError::InvalidArgument);
    }
  }

  for src in sources.iter_mut() {
    src.convert(Compression::Uncompressed, 0.0)?;
  }

  let mut ext = dst.take_ext();
  let result = merge(sources, dst, &mut ext, s);
  dst.put_ext(ext);
  result
}

fn merge(sources: &[Lod], dst: &mut Lod, ext: &mut LodExt, s: usize) -> Result<()> {
  dst.x = 0;
  dst.z = 0;
  dst.min_y = sources[0].min_y;
  dst.height = sources[0].height;
  dst.mip_level = sources[0].mip_level + s.trailing_zeros() as u8;
  dst.compression_mode = Compression::Uncompressed;
  dst.mapping.clear();
  dst.has_data = false;

  if ext.big_buffer.capacity() > dst.data.capacity() {
    std::mem::swap(&mut dst.data, &mut ext.big_buffer);
  }
  dst.data.clear();

  // Fold every source's mapping into the destination, keeping a per-source
  // id translation to apply whenever a run is flushed.
  let mut remaps: Vec<Vec<u32>> = Vec::with_capacity(sources.len());
  for src in sources.iter() {
    let mut remap = vec![];
    dst.merge_mapping(src, &mut remap);
    remaps.push(remap);
  }

  // Columns are variable length, so index each source's column offsets once
  // up front; the output loop then jumps straight to any column.
  ext.col_offsets.clear();
  ext.col_offsets.resize(sources.len() * 4096, 0);
  for (si, src) in sources.iter().enumerate() {
    let mut at = 0usize;
    for col in 0..4096 {
      ext.col_offsets[si * 4096 + col] = at as u32;
      let count = be::u16(&src.data, at).ok_or(LodError::Malformed)? as usize;
      at += 2 + 8 * count;
      if at > src.data.len() {
        return Err(LodError::Malformed);
      }
    }
    if at != src.data.len() {
      return Err(LodError::Malformed);
    }
  }

  let t = 64 / s;
  let mut cursors: Vec<Cursor> = vec![Cursor::default(); s * s];

  for ox in 0..64 {
    for oz in 0..64 {
      let src_index = (ox / t) * s + oz / t;
      let src_data = &sources[src_index].data;
      let remap = &remaps[src_index];
      let (sx, sz) = ((ox % t) * s, (oz % t) * s);

      let mut total = 0usize;
      for i in 0..s {
        for j in 0..s {
          let col = (sx + i) * 64 + (sz + j);
          let at = ext.col_offsets[src_index * 4096 + col] as usize;
          cursors[i * s + j] = Cursor::init(src_data, at)?;
          total += cursors[i * s + j].remaining as usize;
        }
      }

      dst.ensure(2 + 8 * (2 * total + 2));
      let count_at = dst.data.len();
      dst.data.extend([0, 0]);
      let mut count = 0u16;

      let mut altitude = cursors.iter().map(|c| c.next_y).max().unwrap_or(0);
      // Starts as a no-run marker so the first slab always opens a fresh run
      // with the slab's own averaged lights.
      let mut last = Datapoint::default().with_id(NO_RUN);

      while altitude > 0 || cursors.iter().any(|c| c.inside) {
        for c in cursors.iter_mut() {
          if c.next_y == altitude {
            c.advance(src_data, altitude)?;
          }
        }
        let next_altitude = cursors.iter().map(|c| c.next_y).max().unwrap_or(0);
        let height = altitude - next_altitude;
        if height == 0 {
          break;
        }

        // Plurality vote across the active columns; ties go to the lowest
        // column index holding the winning id.
        let mut winner = None;
        let mut winner_votes = 0u32;
        let mut sky = 0u32;
        let mut block = 0u32;
        for c in cursors.iter().filter(|c| c.inside) {
          let dp = Datapoint::read(src_data, c.at).ok_or(LodError::Malformed)?;
          sky += dp.sky_light() as u32;
          block += dp.block_light() as u32;

          let votes = cursors
            .iter()
            .filter(|o| o.inside)
            .filter(|o| {
              Datapoint::read(src_data, o.at).map(|d| d.id() == dp.id()).unwrap_or(false)
            })
            .count() as u32;
          if votes > winner_votes {
            winner_votes = votes;
            winner = Some(dp.id());
          }
        }

        match winner {
          None => {
            // Every source column is in an air gap here; the gap carries
            // through to the output.
            if last.height() > 0 {
              count += flush(&mut dst.data, last, remap)?;
            }
            last = Datapoint::default().with_id(NO_RUN);
          }
          Some(id) if last.id() == id => {
            last = last.with_height(last.height() + height).with_min_y(next_altitude);
          }
          Some(id) => {
            if last.height() > 0 {
              count += flush(&mut dst.data, last, remap)?;
            }
            last = Datapoint::default()
              .with_sky_light((sky / (s * s) as u32) as u8)
              .with_block_light((block / (s * s) as u32) as u8)
              .with_min_y(next_altitude)
              .with_height(height)
              .with_id(id);
          }
        }

        altitude = next_altitude;
      }

      if last.height() > 0 {
        count += flush(&mut dst.data, last, remap)?;
      }

      if count > 0 {
        dst.has_data = true;
      }
      dst.data[count_at..count_at + 2].copy_from_slice(&count.to_be_bytes());
    }
  }

  Ok(())
}

// Rewrites the run's id into the destination id space and writes it out.
fn flush(out: &mut Vec<u8>, dp: Datapoint, remap: &[u32]) -> Result<u16> {
  let id = *remap.get(dp.id() as usize).ok_or(LodError::Malformed)?;
  dp.with_id(id).write(out);
  Ok(1)
}

fn integer_sqrt(n: usize) -> Option<usize> {
  let s = (n as f64).sqrt().round() as usize;
  (s * s == n).then_some(s)
}

/// Walks one source column top-down. A column is either inside a run (with
/// `next_y` at the run's bottom), in an air gap waiting for the next run
/// (with `next_y` at that run's top), or exhausted (`next_y` 0).
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
  at:        usize,
  remaining: u16,
  next_y:    u16,
  inside:    bool,
}

impl Cursor {
  fn init(data: &[u8], col_at: usize) -> Result<Self> {
    let count = be::u16(data, col_at).ok_or(LodError::Malformed)?;
    let mut cursor = Cursor { at: col_at + 2, remaining: count, next_y: 0, inside: false };
    if count > 0 {
      let dp = Datapoint::read(data, cursor.at).ok_or(LodError::Malformed)?;
      cursor.next_y = dp.min_y() + dp.height();
    }
    Ok(cursor)
  }

  // Runs the transition scheduled at `altitude` (callers check
  // `next_y == altitude` first).
  fn advance(&mut self, data: &[u8], altitude: u16) -> Result<()> {
    if self.inside {
      self.inside = false;
      self.remaining -= 1;
      if self.remaining == 0 {
        self.next_y = 0;
        return Ok(());
      }
      self.at += 8;
      let dp = Datapoint::read(data, self.at).ok_or(LodError::Malformed)?;
      let top = dp.min_y() + dp.height();
      if top > altitude {
        // Runs are ordered top-down; an overlap is corrupt data.
        return Err(LodError::Malformed);
      }
      if top == altitude {
        self.inside = true;
        self.next_y = dp.min_y();
      } else {
        self.next_y = top;
      }
    } else if self.remaining > 0 {
      let dp = Datapoint::read(data, self.at).ok_or(LodError::Malformed)?;
      self.inside = true;
      self.next_y = dp.min_y();
    } else {
      self.next_y = 0;
    }
    Ok(())
  }
}
