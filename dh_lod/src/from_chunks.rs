//! Builds one mip-0 LOD out of a 4x4 group of chunks.

use crate::{
  flatten::add_mappings,
  lod::{LodExt, NO_AIR},
  Datapoint, Lod, LodError, Result,
};
use dh_anvil::{section::palette_len, Chunk};
use dh_common::util::be;

// An id no mapping entry can hold; comparing a voxel id against it always
// starts a fresh run.
const NO_RUN: u32 = u32::MAX;

/// Generates a LOD from a 4x4 array of chunks, row-major by chunk x then
/// chunk z. All non-empty chunks must agree on min_y and section count.
///
/// Cells of chunks whose `Status` isn't `minecraft:full` (and cells of absent
/// chunks) are emitted as empty columns. Voxels holding the section's
/// `minecraft:air` block state never produce datapoints; air is what the
/// reader assumes wherever no run reaches.
pub fn from_chunks(chunks: &[Chunk<'_>; 16], lod: &mut Lod) -> Result<()> {
  let mut ext = lod.take_ext();
  let result = build(chunks, lod, &mut ext);
  lod.put_ext(ext);
  result
}

fn build(chunks: &[Chunk<'_>; 16], lod: &mut Lod, ext: &mut LodExt) -> Result<()> {
  lod.x = (chunks[0].chunk_x / 4) as i64;
  lod.z = (chunks[0].chunk_z / 4) as i64;
  lod.min_y = 0;
  lod.height = 0;
  lod.mip_level = 0;
  lod.compression_mode = Default::default();
  lod.mapping.clear();
  lod.has_data = false;

  // A build that shrank a previous buffer takes the bigger retired one back.
  if ext.big_buffer.capacity() > lod.data.capacity() {
    std::mem::swap(&mut lod.data, &mut ext.big_buffer);
  }
  lod.data.clear();

  // All 16 chunks must describe the same vertical slab.
  let mut expected: Option<(i64, usize)> = None;

  for chunk_x in 0..4 {
    for chunk_z in 0..4 {
      let chunk = &chunks[chunk_x * 4 + chunk_z];
      let sections = &mut ext.sections[chunk_z];
      sections.parse(chunk)?;

      if !sections.is_empty() {
        match expected {
          None => {
            expected = Some((sections.min_y, sections.len()));
            lod.min_y = sections.min_y * 16;
            lod.height = (sections.len() * 16) as i64;
          }
          Some(e) => {
            if e != (sections.min_y, sections.len()) {
              return Err(LodError::Malformed);
            }
          }
        }
      }

      add_mappings(
        lod,
        &mut ext.temp_string,
        &mut ext.temp_props,
        chunk.data,
        sections,
        &mut ext.id_lookup[chunk_z],
      )?;
    }

    for block_x in 0..16 {
      for chunk_z in 0..4 {
        let data = chunks[chunk_x * 4 + chunk_z].data;
        let sections = &ext.sections[chunk_z];
        let lookup = &ext.id_lookup[chunk_z];

        for block_z in 0..16 {
          lod.ensure(2 + 8 * sections.len() * 16);
          let count_at = lod.data.len();
          lod.data.extend([0, 0]);

          if sections.is_empty() {
            continue;
          }
          if sections.status.is_some() && !sections.status_is(data, "minecraft:full") {
            continue;
          }

          // Above the world there is only sky. The sentinel has height 0 and
          // is never written; a run starting at the very top inherits its
          // full sky light.
          let mut last = Datapoint::default()
            .with_sky_light(0xF)
            .with_min_y((sections.len() * 16) as u16);
          let mut next = Datapoint::default().with_height(1);

          let mut count = 0u16;

          for section_index in (0..sections.len()).rev() {
            let section = &sections.sections()[section_index];
            let (biome_palette, block_state_palette) =
              match (section.biome_palette, section.block_state_palette) {
                (Some(b), Some(s)) => (b, s),
                _ => {
                  // A hole in the section stack reads as air; runs don't
                  // continue across it.
                  if last.height() > 0 {
                    last.write(&mut lod.data);
                    count += 1;
                  }
                  last = Datapoint::default().with_id(NO_RUN);
                  continue;
                }
              };

            let table = &lookup.sections[section_index];
            let biome_count = palette_len(data, Some(biome_palette));
            let block_state_count = palette_len(data, Some(block_state_palette));

            for block_y in (0..16).rev() {
              let index = block_y * 256 + block_z * 16 + block_x;

              let biome = if biome_count > 1 {
                section.biome_indices[(block_y / 4) * 16 + (block_z / 4) * 4 + block_x / 4]
              } else {
                0
              };
              let block_state = if block_state_count > 1 {
                section.block_state_indices[index]
              } else {
                0
              };

              let this = next;
              next = next
                .with_sky_light(nibble(data, section.sky_light, index))
                .with_block_light(nibble(data, section.block_light, index));

              if block_state == table.air_block_state && table.air_block_state != NO_AIR {
                if last.height() > 0 {
                  last.write(&mut lod.data);
                  count += 1;
                }
                last = Datapoint::default().with_id(NO_RUN);
                continue;
              }

              let id = table.ids[(biome as u32 * block_state_count + block_state as u32) as usize];
              if last.id() == id {
                last = last.extend_down();
                continue;
              }

              if last.height() > 0 {
                last.write(&mut lod.data);
                count += 1;
              }

              last = this
                .with_min_y((section_index * 16 + block_y) as u16)
                .with_id(id);
            }
          }

          if last.height() > 0 {
            last.write(&mut lod.data);
            count += 1;
          }

          if count > 0 {
            lod.has_data = true;
          }
          lod.data[count_at..count_at + 2].copy_from_slice(&count.to_be_bytes());
        }
      }
    }
  }

  lod.shrink();
  Ok(())
}

// Extracts a 4-bit light value out of a 2048-byte nibble array; absent
// arrays contribute zero.
fn nibble(data: &[u8], array: Option<usize>, index: usize) -> u8 {
  match array {
    Some(at) => (be::u8(data, at + index / 2).unwrap_or(0) >> ((index & 1) * 4)) & 0xF,
    None => 0,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use dh_common::nbt::{Nbt, Tag};
  use pretty_assertions::assert_eq;

  fn block(name: &str) -> Tag { Tag::compound(&[("Name", Tag::String(name.into()))]) }

  fn pack(values: &[u16], bits: u32) -> Tag {
    let per_long = (64 / bits) as usize;
    let mut longs = vec![0i64; values.len().div_ceil(per_long)];
    for (i, v) in values.iter().enumerate() {
      longs[i / per_long] |= (*v as i64) << ((i % per_long) as u32 * bits);
    }
    Tag::LongArray(longs)
  }

  struct SectionSpec {
    y:          i32,
    blocks:     Vec<Tag>,
    indices:    Option<Vec<u16>>,
    sky_light:  Option<Vec<u8>>,
  }

  fn chunk_bytes(min_y: i32, specs: Vec<SectionSpec>) -> Vec<u8> {
    let sections = specs
      .into_iter()
      .map(|spec| {
        let mut block_children = vec![("palette".to_string(), Tag::List(spec.blocks))];
        if let Some(indices) = spec.indices {
          block_children.push(("data".to_string(), pack(&indices, 4)));
        }
        let mut children = vec![
          ("Y".to_string(), Tag::Int(spec.y)),
          (
            "biomes".to_string(),
            Tag::compound(&[("palette", Tag::List(vec![Tag::String("minecraft:plains".into())]))]),
          ),
          ("block_states".to_string(), Tag::Compound(block_children)),
        ];
        if let Some(sky) = spec.sky_light {
          children.push(("SkyLight".to_string(), Tag::ByteArr(sky)));
        }
        Tag::Compound(children)
      })
      .collect();

    Nbt::new(
      "",
      Tag::compound(&[
        ("xPos", Tag::Int(0)),
        ("yPos", Tag::Int(min_y)),
        ("zPos", Tag::Int(0)),
        ("Status", Tag::String("minecraft:full".into())),
        ("sections", Tag::List(sections)),
      ]),
    )
    .serialize()
  }

  // 16 sections of stone below y=64, air above, in a 16-section chunk.
  fn stone_under_air(sky_light: bool) -> Vec<u8> {
    let specs = (0..16)
      .map(|y| SectionSpec {
        y,
        blocks: if y < 4 {
          vec![block("minecraft:stone")]
        } else {
          vec![block("minecraft:air")]
        },
        indices: None,
        sky_light: sky_light.then(|| vec![0xFF; 2048]),
      })
      .collect();
    chunk_bytes(0, specs)
  }

  fn chunks(data: &[Vec<u8>; 16]) -> [Chunk<'_>; 16] {
    std::array::from_fn(|i| Chunk {
      data: &data[i],
      chunk_x: (i / 4) as i32,
      chunk_z: (i % 4) as i32,
    })
  }

  // Walks the column stream, returning each column's datapoints.
  fn columns(lod: &Lod) -> Vec<Vec<Datapoint>> {
    let mut out = vec![];
    let mut at = 0;
    while at < lod.data.len() {
      let count = be::u16(&lod.data, at).unwrap() as usize;
      at += 2;
      let mut col = vec![];
      for _ in 0..count {
        col.push(Datapoint::read(&lod.data, at).unwrap());
        at += 8;
      }
      out.push(col);
    }
    out
  }

  #[test]
  fn empty_chunks_build_empty_lod() {
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| vec![]);
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    assert!(!lod.has_data);
    assert!(lod.mapping.is_empty());
    let cols = columns(&lod);
    assert_eq!(cols.len(), 64 * 64);
    assert!(cols.iter().all(|c| c.is_empty()));
  }

  #[test]
  fn all_air_builds_empty_columns() {
    let chunk = chunk_bytes(0, vec![SectionSpec {
      y:         0,
      blocks:    vec![block("minecraft:air")],
      indices:   None,
      sky_light: None,
    }]);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    assert!(!lod.has_data);
    assert!(columns(&lod).iter().all(|c| c.is_empty()));
    // The mapping still carries the air permutation.
    assert_eq!(lod.mapping, vec!["minecraft:plains_DH-BSW_minecraft:air_STATE_"]);
  }

  #[test]
  fn stone_run_spans_sections() {
    let chunk = stone_under_air(false);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    assert!(lod.has_data);
    assert_eq!(lod.min_y, 0);
    assert_eq!(lod.height, 256);

    let stone_id = lod
      .mapping
      .iter()
      .position(|m| m == "minecraft:plains_DH-BSW_minecraft:stone_STATE_")
      .unwrap() as u32;

    for col in columns(&lod) {
      assert_eq!(col.len(), 1);
      let dp = col[0];
      assert_eq!(dp.min_y(), 0);
      assert_eq!(dp.height(), 64);
      assert_eq!(dp.id(), stone_id);
      assert_eq!(dp.sky_light(), 0);
      assert_eq!(dp.block_light(), 0);
    }
  }

  #[test]
  fn full_sky_light_reaches_runs() {
    let chunk = stone_under_air(true);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    for col in columns(&lod) {
      assert_eq!(col.len(), 1);
      assert_eq!(col[0].sky_light(), 15);
    }
  }

  #[test]
  fn mixed_indices_split_runs() {
    // One section: stone in the bottom half, dirt in the top half of y.
    let mut indices = vec![0u16; 4096];
    for y in 8..16 {
      for zx in 0..256 {
        indices[y * 256 + zx] = 1;
      }
    }
    let chunk = chunk_bytes(0, vec![SectionSpec {
      y:         0,
      blocks:    vec![block("minecraft:stone"), block("minecraft:dirt")],
      indices:   Some(indices),
      sky_light: None,
    }]);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    for col in columns(&lod) {
      assert_eq!(col.len(), 2);
      // Top-down order: dirt first.
      assert_eq!((col[0].min_y(), col[0].height()), (8, 8));
      assert_eq!((col[1].min_y(), col[1].height()), (0, 8));
      assert_ne!(col[0].id(), col[1].id());
    }
  }

  #[test]
  fn air_gaps_break_runs() {
    // stone / air / stone within one section produces two runs with a gap.
    let mut indices = vec![0u16; 4096];
    for zx in 0..256 {
      for y in 4..8 {
        indices[y * 256 + zx] = 1; // air
      }
    }
    let chunk = chunk_bytes(0, vec![SectionSpec {
      y:         0,
      blocks:    vec![block("minecraft:stone"), block("minecraft:air")],
      indices:   Some(indices),
      sky_light: None,
    }]);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    for col in columns(&lod) {
      assert_eq!(col.len(), 2);
      assert_eq!((col[0].min_y(), col[0].height()), (8, 8));
      assert_eq!((col[1].min_y(), col[1].height()), (0, 4));
      assert_eq!(col[0].id(), col[1].id());
    }
  }

  #[test]
  fn ids_index_the_mapping() {
    let chunk = stone_under_air(false);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    for col in columns(&lod) {
      for dp in col {
        assert!((dp.id() as usize) < lod.mapping.len());
      }
    }
  }

  #[test]
  fn unfinished_chunks_emit_empty_columns() {
    let mut unfinished = chunk_bytes(0, vec![SectionSpec {
      y:         0,
      blocks:    vec![block("minecraft:stone")],
      indices:   None,
      sky_light: None,
    }]);
    // Rewrite the status in place.
    let full = b"minecraft:full";
    let pos = unfinished.windows(full.len()).position(|w| w == full).unwrap();
    unfinished[pos..pos + full.len()].copy_from_slice(b"minecraft:barf");

    let data: [Vec<u8>; 16] = std::array::from_fn(|_| unfinished.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();

    assert!(!lod.has_data);
    assert!(columns(&lod).iter().all(|c| c.is_empty()));
  }

  #[test]
  fn mismatched_min_y_fails() {
    let a = chunk_bytes(0, vec![SectionSpec {
      y:         0,
      blocks:    vec![block("minecraft:stone")],
      indices:   None,
      sky_light: None,
    }]);
    let b = chunk_bytes(-4, vec![SectionSpec {
      y:         -4,
      blocks:    vec![block("minecraft:stone")],
      indices:   None,
      sky_light: None,
    }]);

    let data: [Vec<u8>; 16] = std::array::from_fn(|i| if i == 5 { b.clone() } else { a.clone() });
    let mut lod = Lod::new();
    assert!(matches!(from_chunks(&chunks(&data), &mut lod), Err(LodError::Malformed)));
  }

  #[test]
  fn scratch_is_reused_across_builds() {
    let chunk = stone_under_air(false);
    let data: [Vec<u8>; 16] = std::array::from_fn(|_| chunk.clone());
    let mut lod = Lod::new();
    from_chunks(&chunks(&data), &mut lod).unwrap();
    let first = lod.data.clone();
    let first_mapping = lod.mapping.clone();

    from_chunks(&chunks(&data), &mut lod).unwrap();
    assert_eq!(lod.data, first);
    assert_eq!(lod.mapping, first_mapping);
  }
}
