//! Converts an anvil world into Distant Horizons LODs and reports how fast
//! that went. Handy for eyeballing worlds and for benchmarking the pipeline
//! on real data.
//!
//! Usage: `dh_cli <world path> [--mip] [--compress lz4|zstd|lzma]`

#[macro_use]
extern crate log;

use anyhow::{bail, Context, Result};
use dh_anvil::{ChunkCtx, World};
use dh_lod::{from_chunks, from_lods, lod::Stats, Compression, Lod};
use std::{env, time::Instant};

fn main() {
  dh_common::init("dh_cli");
  match run() {
    Ok(_) => (),
    Err(e) => {
      error!("error: {e:#}");
      std::process::exit(1);
    }
  }
}

struct Totals {
  chunks:        u64,
  chunk_bytes:   u64,
  lods:          u64,
  lod_bytes:     u64,
  decompressing: std::time::Duration,
  generating:    std::time::Duration,
}

fn run() -> Result<()> {
  let mut args = env::args().skip(1);
  let mut world_path = None;
  let mut mip = false;
  let mut compress = None;
  while let Some(arg) = args.next() {
    match arg.as_str() {
      "--mip" => mip = true,
      "--compress" => {
        compress = Some(match args.next().as_deref() {
          Some("lz4") => Compression::Lz4,
          Some("zstd") => Compression::Zstd,
          Some("lzma") => Compression::Lzma2,
          other => bail!("unknown compression {:?}", other),
        })
      }
      _ if world_path.is_none() => world_path = Some(arg),
      other => bail!("unexpected argument {other}"),
    }
  }
  let world_path = match world_path {
    Some(p) => p,
    None => bail!("usage: dh_cli <world path> [--mip] [--compress lz4|zstd|lzma]"),
  };

  let world = World::open(&world_path).with_context(|| format!("opening {world_path}"))?;
  info!("opened world at {}", world.path().display());

  let start = Instant::now();
  let mut totals = Totals {
    chunks:        0,
    chunk_bytes:   0,
    lods:          0,
    lod_bytes:     0,
    decompressing: Default::default(),
    generating:    Default::default(),
  };

  let mut stats = Stats::default();

  // One context per chunk of the 4x4 group, so all 16 decompressed views can
  // be alive at once.
  let mut contexts: Vec<ChunkCtx> = (0..16).map(|_| ChunkCtx::new()).collect();
  // 8x8 LODs per region, reused across regions.
  let mut lods: Vec<Lod> = (0..64).map(|_| Lod::new()).collect();
  let mut mipped: Vec<Lod> = (0..16).map(|_| Lod::new()).collect();

  let mut iter = world.regions("region").context("listing region files")?;
  while let Some(region) = iter.next()? {
    for group_x in 0..8 {
      for group_z in 0..8 {
        let t = Instant::now();
        let mut chunks = Vec::with_capacity(16);
        for (i, ctx) in contexts.iter_mut().enumerate() {
          let chunk = ctx.decompress(
            &region,
            group_x * 4 + (i / 4) as i32,
            group_z * 4 + (i % 4) as i32,
          )?;
          totals.chunks += 1;
          totals.chunk_bytes += chunk.data.len() as u64;
          chunks.push(chunk);
        }
        let chunks: [dh_anvil::Chunk; 16] = match chunks.try_into() {
          Ok(chunks) => chunks,
          Err(_) => unreachable!(),
        };
        totals.decompressing += t.elapsed();

        let t = Instant::now();
        let lod = &mut lods[(group_x * 8 + group_z) as usize];
        from_chunks(&chunks, lod)
          .with_context(|| format!("building LOD for region ({}, {})", region.x, region.z))?;
        totals.generating += t.elapsed();

        if let Some(mode) = compress {
          lod.convert(mode, 0.5)?;
        }
        stats.add(&lods[(group_x * 8 + group_z) as usize]);
        totals.lods += 1;
        totals.lod_bytes += lods[(group_x * 8 + group_z) as usize].data.len() as u64;
      }
    }

    if mip {
      // Fold the region's 8x8 grid of LODs into 4x4 at mip 1.
      let t = Instant::now();
      for fold_x in 0..4 {
        for fold_z in 0..4 {
          let mut group: [Lod; 4] = Default::default();
          for i in 0..4 {
            let (lx, lz) = (fold_x * 2 + i / 2, fold_z * 2 + i % 2);
            group[i] = std::mem::take(&mut lods[lx * 8 + lz]);
          }
          let dst = &mut mipped[fold_x * 4 + fold_z];
          from_lods(&mut group, dst).context("mipping")?;
          for i in 0..4 {
            let (lx, lz) = (fold_x * 2 + i / 2, fold_z * 2 + i % 2);
            lods[lx * 8 + lz] = std::mem::take(&mut group[i]);
          }
          totals.lods += 1;
          totals.lod_bytes += dst.data.len() as u64;
        }
      }
      totals.generating += t.elapsed();
    }
  }

  let elapsed = start.elapsed();
  let secs = elapsed.as_secs_f64().max(f64::EPSILON);
  info!(
    "ingested {} chunks, {:.1}MB of chunk data in {:.3}ms: {:.3}MB/s, {:.0} chunks/second",
    totals.chunks,
    totals.chunk_bytes as f64 / 1e6,
    elapsed.as_secs_f64() * 1e3,
    totals.chunk_bytes as f64 / 1e6 / secs,
    totals.chunks as f64 / secs,
  );
  info!(
    "built {} LODs ({:.1}MB): {:.3}ms decompressing, {:.3}ms generating, {:.3}ms other",
    totals.lods,
    totals.lod_bytes as f64 / 1e6,
    totals.decompressing.as_secs_f64() * 1e3,
    totals.generating.as_secs_f64() * 1e3,
    (elapsed - totals.decompressing - totals.generating).as_secs_f64() * 1e3,
  );
  if stats.num_lods > 0 {
    info!(
      "LODs averaged {}KiB used, {}KiB unused, {}KiB metadata: {:.0}% memory efficiency",
      stats.mem_used / stats.num_lods >> 10,
      stats.mem_unused / stats.num_lods >> 10,
      stats.mem_metadata / stats.num_lods >> 10,
      stats.mem_used as f64 * 100.0 / (stats.mem_used + stats.mem_unused).max(1) as f64,
    );
  }

  Ok(())
}
