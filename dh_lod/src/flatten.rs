//! Flattens section palettes into the LOD mapping.
//!
//! Every `(biome, block state)` permutation a section can produce gets a
//! canonical string key, the key is interned into the LOD's mapping, and a
//! per-section lookup table translates packed palette indices straight to
//! mapping ids during the column walk.

use crate::{
  lod::{IdLookup, Lod, NO_AIR},
  LodError, Result,
};
use dh_anvil::{section::palette_len, Sections};
use dh_common::nbt::walk::{self, Slot};

const SEPARATOR: &str = "_DH-BSW_";
const STATE: &str = "_STATE_";

/// Accumulates the biome/blockstate permutations of every section in the
/// bundle, interning their keys and rebuilding `lookup`'s id tables.
///
/// This doesn't need to be super optimised; given the complexity of the
/// transformation, readability matters more here.
pub fn add_mappings(
  lod: &mut Lod,
  temp_string: &mut String,
  temp_props: &mut Vec<(usize, usize)>,
  data: &[u8],
  sections: &Sections,
  lookup: &mut IdLookup,
) -> Result<()> {
  if lookup.sections.len() < sections.len() {
    lookup.sections.resize_with(sections.len(), Default::default);
  }

  for (section_index, section) in sections.sections().iter().enumerate() {
    let (biome_palette, block_state_palette) =
      match (section.biome_palette, section.block_state_palette) {
        (Some(b), Some(s)) => (b, s),
        _ => continue,
      };

    let biomes = palette_len(data, Some(biome_palette));
    if biomes > 64 {
      return Err(LodError::Malformed);
    }
    let block_states = palette_len(data, Some(block_state_palette));
    if block_states > 4096 {
      return Err(LodError::Malformed);
    }

    let table = &mut lookup.sections[section_index];
    table.air_block_state = NO_AIR;
    let need = (biomes * block_states) as usize;
    if table.ids.len() < need {
      table.ids.resize(need, 0);
    }

    let mut biome = walk::list_payload(biome_palette);
    for biome_index in 0..biomes {
      let biome_name = walk::string(data, biome).ok_or(LodError::Malformed)?;

      temp_string.clear();
      push_str(temp_string, biome_name)?;
      temp_string.push_str(SEPARATOR);
      let biome_key_len = temp_string.len();

      let mut block_state = walk::list_payload(block_state_palette);
      for block_state_index in 0..block_states {
        let mut name = None;
        let mut properties = None;
        walk::find_named(
          data,
          block_state,
          &mut [
            ("Name", Slot::Payload(walk::STRING, &mut name)),
            ("Properties", Slot::Payload(walk::COMPOUND, &mut properties)),
          ],
        )
        .ok_or(LodError::Malformed)?;

        let name = walk::string(data, name.ok_or(LodError::Malformed)?).ok_or(LodError::Malformed)?;
        if name == b"minecraft:air" {
          table.air_block_state = block_state_index as u16;
        }

        temp_string.truncate(biome_key_len);
        push_str(temp_string, name)?;
        temp_string.push_str(STATE);

        if let Some(properties) = properties {
          collect_properties(temp_props, data, properties)?;
          // Property order in the key is by name, not by NBT child order.
          temp_props.sort_by(|a, b| {
            walk::name(data, a.0).unwrap_or(&[]).cmp(walk::name(data, b.0).unwrap_or(&[]))
          });

          for &(tag, value) in temp_props.iter() {
            temp_string.push('{');
            push_str(temp_string, walk::name(data, tag).ok_or(LodError::Malformed)?)?;
            temp_string.push(':');
            push_str(temp_string, walk::string(data, value).ok_or(LodError::Malformed)?)?;
            temp_string.push('}');
          }
        }

        let id = lod.add_mapping(temp_string);
        table.ids[(biome_index * block_states + block_state_index) as usize] = id;

        block_state = walk::payload_step(data, block_state, walk::COMPOUND)
          .ok_or(LodError::Malformed)?;
      }

      biome = walk::payload_step(data, biome, walk::STRING).ok_or(LodError::Malformed)?;
    }
  }

  Ok(())
}

// Gathers `(tag, value_payload)` offsets for every string-typed property.
// Properties of other types never show up in vanilla data and are ignored.
fn collect_properties(
  out: &mut Vec<(usize, usize)>,
  data: &[u8],
  properties: usize,
) -> Result<()> {
  out.clear();
  let mut tag = properties;
  loop {
    let ty = walk::ty(data, tag).ok_or(LodError::Malformed)?;
    if ty == walk::END {
      return Ok(());
    }
    if ty == walk::STRING {
      let value = walk::payload(data, tag, walk::STRING).ok_or(LodError::Malformed)?;
      out.push((tag, value));
    }
    tag = walk::step(data, tag).ok_or(LodError::Malformed)?;
  }
}

fn push_str(out: &mut String, bytes: &[u8]) -> Result<()> {
  out.push_str(std::str::from_utf8(bytes).map_err(|_| LodError::Malformed)?);
  Ok(())
}
