use criterion::{criterion_group, criterion_main, Criterion};
use dh_anvil::Chunk;
use dh_common::nbt::{Nbt, Tag};
use dh_lod::{from_chunks, from_lods, Lod};

// A 16-section chunk: stone below y=64 with a dirt checkerboard, air above.
// Roughly what generated overworld terrain costs to encode.
fn chunk_bytes() -> Vec<u8> {
  let sections: Vec<Tag> = (0..16)
    .map(|y| {
      let block_states = if y < 4 {
        let mut indices = vec![0i64; 4096 / 16];
        for i in 0..4096 {
          if (i / 16 + i) % 7 == 0 {
            indices[i / 16] |= 1 << ((i % 16) * 4);
          }
        }
        Tag::compound(&[
          (
            "palette",
            Tag::List(vec![
              Tag::compound(&[("Name", Tag::String("minecraft:stone".into()))]),
              Tag::compound(&[("Name", Tag::String("minecraft:dirt".into()))]),
            ]),
          ),
          ("data", Tag::LongArray(indices)),
        ])
      } else {
        Tag::compound(&[(
          "palette",
          Tag::List(vec![Tag::compound(&[("Name", Tag::String("minecraft:air".into()))])]),
        )])
      };
      Tag::compound(&[
        ("Y", Tag::Int(y)),
        (
          "biomes",
          Tag::compound(&[("palette", Tag::List(vec![Tag::String("minecraft:plains".into())]))]),
        ),
        ("block_states", block_states),
        ("SkyLight", Tag::ByteArr(vec![0xFF; 2048])),
      ])
    })
    .collect();

  Nbt::new(
    "",
    Tag::compound(&[
      ("xPos", Tag::Int(0)),
      ("yPos", Tag::Int(0)),
      ("zPos", Tag::Int(0)),
      ("Status", Tag::String("minecraft:full".into())),
      ("sections", Tag::List(sections)),
    ]),
  )
  .serialize()
}

pub fn generate(c: &mut Criterion) {
  let data = chunk_bytes();
  let datas: Vec<Vec<u8>> = (0..16).map(|_| data.clone()).collect();

  c.bench_function("lod from chunks", |b| {
    let chunks: [Chunk; 16] = std::array::from_fn(|i| Chunk {
      data:    &datas[i],
      chunk_x: (i / 4) as i32,
      chunk_z: (i % 4) as i32,
    });
    let mut lod = Lod::new();
    b.iter(|| {
      from_chunks(&chunks, &mut lod).unwrap();
    })
  });

  c.bench_function("mip 2x2", |b| {
    let chunks: [Chunk; 16] = std::array::from_fn(|i| Chunk {
      data:    &datas[i],
      chunk_x: (i / 4) as i32,
      chunk_z: (i % 4) as i32,
    });
    let mut sources: [Lod; 4] = Default::default();
    for lod in sources.iter_mut() {
      from_chunks(&chunks, lod).unwrap();
    }
    let mut dst = Lod::new();
    b.iter(|| {
      from_lods(&mut sources, &mut dst).unwrap();
    })
  });
}

criterion_group!(benches, generate);
criterion_main!(benches);
