use crate::{
  compress::{self, CompressCtx, Compression},
  Result,
};
use dh_anvil::Sections;

// Column buffer growth and shrink policy. Growth reserves well past the
// request so repeated column writes don't thrash the allocator; shrink only
// bothers when at least two thirds of the buffer would be released and the
// payload isn't tiny.
fn grow_cap(cap: usize, n: usize) -> usize {
  if cap == 0 {
    n + 128 * 1024
  } else {
    n + (cap << 1) - (cap >> 1)
  }
}
fn should_shrink(len: usize, cap: usize) -> bool { cap > len * 3 && len > cap >> 4 }

/// One Distant Horizons LOD: a 64x64 grid of run-length encoded columns plus
/// the id mapping those columns refer to.
///
/// A `Lod` owns its buffers. Rebuilding into the same value reuses them, and
/// the scratch carried in the extension block (temp buffers, section bundles,
/// compression contexts) is reset rather than freed between builds. Dropping
/// the LOD releases everything.
#[derive(Default)]
pub struct Lod {
  /// LOD-grid x position, derived from the first chunk's position.
  pub x: i64,
  /// LOD-grid z position, derived from the first chunk's position.
  pub z: i64,
  /// World-space bottom of the LOD. Datapoint min_y values are relative to
  /// this.
  pub min_y: i64,
  /// Vertical extent in voxels.
  pub height: i64,
  /// 0 for chunk-derived LODs; +k per 2^k x 2^k mip fold.
  pub mip_level: u8,
  /// How `data` is currently stored.
  pub compression_mode: Compression,
  /// Canonical biome+blockstate strings; a datapoint id indexes this.
  pub mapping: Vec<String>,
  /// The column stream: 64x64 columns in x-major order, each a 2-byte
  /// big-endian datapoint count followed by the datapoints top-down.
  pub data: Vec<u8>,
  /// True iff any column holds a datapoint with height > 0.
  pub has_data: bool,

  pub(crate) ext: Option<Box<LodExt>>,
}

/// Scratch attached to a LOD, reused for the LOD's lifetime.
pub(crate) struct LodExt {
  /// Key-building scratch for the palette flattener.
  pub temp_string: String,
  /// Property tag offsets, for sorting.
  pub temp_props: Vec<(usize, usize)>,
  /// Serialised-mapping and recompression scratch.
  pub temp_buffer: Vec<u8>,
  /// Retired column buffer; swapped back in on the next build so a shrunken
  /// `data` doesn't force regrowth.
  pub big_buffer: Vec<u8>,
  /// Mipper scratch: per-source column offsets.
  pub col_offsets: Vec<u32>,

  /// One sections bundle per chunk column of the 4x4 group.
  pub sections: [Sections; 4],
  /// One id table set per chunk column of the 4x4 group.
  pub id_lookup: [IdLookup; 4],

  pub compress: CompressCtx,
}

impl Default for LodExt {
  fn default() -> Self {
    LodExt {
      temp_string: String::new(),
      temp_props:  vec![],
      temp_buffer: vec![],
      big_buffer:  vec![],
      col_offsets: vec![],
      sections:    Default::default(),
      id_lookup:   Default::default(),
      compress:    CompressCtx::default(),
    }
  }
}

/// Per-section lookup tables translating `(biome, block_state)` palette
/// indices to LOD mapping ids.
#[derive(Debug, Default)]
pub struct IdLookup {
  pub sections: Vec<IdTable>,
}

#[derive(Debug)]
pub struct IdTable {
  /// Flat table indexed by `biome_index * block_state_count + block_state`.
  pub ids: Vec<u32>,
  /// The palette index of `minecraft:air` in this section, or `NO_AIR`.
  pub air_block_state: u16,
}

/// Marks a section whose palette has no air entry.
pub const NO_AIR: u16 = u16::MAX;

impl Default for IdTable {
  fn default() -> Self { IdTable { ids: vec![], air_block_state: NO_AIR } }
}

/// Memory accounting accumulated over built LODs; mostly interesting for
/// judging how well the buffer reuse is working out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  pub num_lods:     u64,
  /// Bytes of column data in use.
  pub mem_used:     u64,
  /// Slack capacity held by the column buffer.
  pub mem_unused:   u64,
  /// Mapping strings and their table.
  pub mem_metadata: u64,
}

impl Stats {
  pub fn add(&mut self, lod: &Lod) {
    self.num_lods += 1;
    self.mem_used += lod.data.len() as u64;
    self.mem_unused += (lod.data.capacity() - lod.data.len()) as u64;
    self.mem_metadata += lod
      .mapping
      .iter()
      .map(|m| m.capacity() as u64 + std::mem::size_of::<String>() as u64)
      .sum::<u64>();
  }
}

impl Lod {
  pub fn new() -> Self { Lod::default() }

  /// Detaches the extension block for a build. Pair with [`Lod::put_ext`];
  /// builders detach so the scratch and the LOD can be borrowed apart.
  pub(crate) fn take_ext(&mut self) -> Box<LodExt> { self.ext.take().unwrap_or_default() }

  pub(crate) fn put_ext(&mut self, ext: Box<LodExt>) { self.ext = Some(ext); }

  /// Makes room for `n` more bytes in the column buffer, growing by policy.
  pub(crate) fn ensure(&mut self, n: usize) {
    if self.data.capacity() < self.data.len() + n {
      let target = grow_cap(self.data.capacity(), n);
      self.data.reserve_exact(target - self.data.len());
    }
  }

  /// Gives back the slack a build's worst-case reservations left behind.
  pub(crate) fn shrink(&mut self) {
    if should_shrink(self.data.len(), self.data.capacity()) {
      self.data.shrink_to_fit();
    }
  }

  /// Interns a canonical key, returning its stable id. Ids are assigned in
  /// insertion order and never move.
  ///
  /// A linear scan: mappings stay small (typically well under 1024 entries)
  /// and the keys are short, so a hash index doesn't pay for itself.
  pub fn add_mapping(&mut self, key: &str) -> u32 {
    for (id, existing) in self.mapping.iter().enumerate() {
      if existing == key {
        return id as u32;
      }
    }
    self.mapping.push(key.to_string());
    (self.mapping.len() - 1) as u32
  }

  /// Interns every mapping string of `src` into this LOD, filling `remap`
  /// with the src-id to dst-id translation.
  pub fn merge_mapping(&mut self, src: &Lod, remap: &mut Vec<u32>) {
    remap.clear();
    remap.reserve(src.mapping.len());
    for key in &src.mapping {
      // Split reimplementation of add_mapping so src can be borrowed.
      let mut id = None;
      for (i, existing) in self.mapping.iter().enumerate() {
        if existing == key {
          id = Some(i as u32);
          break;
        }
      }
      remap.push(id.unwrap_or_else(|| {
        self.mapping.push(key.clone());
        (self.mapping.len() - 1) as u32
      }));
    }
  }

  /// Returns the mapping in its serialised form: a 2-byte big-endian entry
  /// count, then each entry as a 2-byte big-endian length and its bytes.
  /// The buffer is reused between calls.
  ///
  /// Fails if an entry exceeds 65535 bytes (they're a few dozen in practice).
  pub fn serialise_mapping(&mut self) -> Result<&[u8]> {
    let ext = self.ext.get_or_insert_with(Default::default);
    let out = &mut ext.temp_buffer;
    out.clear();
    out.extend((self.mapping.len() as u16).to_be_bytes());
    for entry in &self.mapping {
      if entry.len() > u16::MAX as usize {
        return Err(crate::LodError::Malformed);
      }
      out.extend((entry.len() as u16).to_be_bytes());
      out.extend(entry.as_bytes());
    }
    Ok(out)
  }

  /// Converts the column stream to the requested compression mode, passing
  /// through the uncompressed intermediate when the current mode is neither
  /// raw nor the target. `level` runs 0..=1.
  pub fn convert(&mut self, mode: Compression, level: f64) -> Result<()> {
    if self.compression_mode == mode {
      return Ok(());
    }

    let mut ext = self.take_ext();
    let result = (|| {
      if self.compression_mode != Compression::Uncompressed {
        compress::decode(self.compression_mode, &self.data, &mut ext.temp_buffer)?;
        std::mem::swap(&mut self.data, &mut ext.temp_buffer);
        self.compression_mode = Compression::Uncompressed;
      }
      if mode != Compression::Uncompressed {
        compress::encode(&mut ext.compress, mode, level, &self.data, &mut ext.temp_buffer)?;
        std::mem::swap(&mut self.data, &mut ext.temp_buffer);
        self.compression_mode = mode;
        // The raw buffer the swap retired is the big one; park it where the
        // next build will pick it up.
        if ext.temp_buffer.capacity() > ext.big_buffer.capacity() {
          std::mem::swap(&mut ext.temp_buffer, &mut ext.big_buffer);
        }
      }
      Ok(())
    })();
    self.put_ext(ext);
    result
  }
}
