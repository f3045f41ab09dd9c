use crate::{Region, Result};
use std::{
  fs,
  io::{self, Read, Write},
  path::{Path, PathBuf},
};

/// An open anvil world.
///
/// Opening takes the world's `session.lock`: the snowman is written and
/// flushed, then an exclusive advisory lock is held until the world is
/// dropped. Minecraft respects the lock, so a running game won't scribble
/// over region files mid-read.
pub struct World {
  path: PathBuf,
  // Held for the lock; closing the file on drop releases it.
  _session_lock: fs::File,
}

impl World {
  /// Opens the world at `path`. A path to the world's `level.dat` works too;
  /// the final component is trimmed.
  pub fn open(path: impl AsRef<Path>) -> Result<World> {
    let mut path = path.as_ref().to_path_buf();
    if path.file_name().map(|n| n == "level.dat").unwrap_or(false) {
      path.pop();
    }

    let mut lock = fs::File::create(path.join("session.lock"))?;
    lock.write_all("☃".as_bytes())?;
    lock.flush()?;
    if lock.try_lock().is_err() {
      return Err(
        io::Error::new(io::ErrorKind::WouldBlock, "session.lock is held by another process").into(),
      );
    }

    Ok(World { path, _session_lock: lock })
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Iterates the region files under `subdir` (e.g. `region`, `DIM1/region`)
  /// in directory order. Callers needing a deterministic order must collect
  /// and sort.
  pub fn regions(&self, subdir: &str) -> Result<RegionIter> {
    Ok(RegionIter { entries: fs::read_dir(self.path.join(subdir))?, buffer: vec![] })
  }
}

/// Parses `r.<x>.<z>.mca` region file names.
pub fn parse_region_name(name: &str) -> Option<(i32, i32)> {
  let mut sections = name.split('.');
  if sections.next()? != "r" {
    return None;
  }
  let x = sections.next()?.parse().ok()?;
  let z = sections.next()?.parse().ok()?;
  if sections.next()? != "mca" {
    return None;
  }
  if sections.next().is_some() {
    return None;
  }
  Some((x, z))
}

/// Lends region views one at a time. The file buffer is reused, so each view
/// is only valid until the next `next` call.
pub struct RegionIter {
  entries: fs::ReadDir,
  buffer:  Vec<u8>,
}

impl RegionIter {
  #[allow(clippy::should_implement_trait)] // lending; Iterator can't express it
  pub fn next(&mut self) -> Result<Option<Region<'_>>> {
    loop {
      let entry = match self.entries.next() {
        Some(entry) => entry?,
        None => return Ok(None),
      };
      if !entry.metadata()?.is_file() {
        continue;
      }
      let file_name = entry.file_name();
      let name = match file_name.to_str() {
        Some(name) => name,
        None => continue,
      };
      let (x, z) = match parse_region_name(name) {
        Some(pos) => pos,
        None => continue,
      };

      self.buffer.clear();
      fs::File::open(entry.path())?.read_to_end(&mut self.buffer)?;
      if self.buffer.is_empty() {
        // Minecraft leaves zero-byte region files around sometimes.
        debug!("skipping empty region file {name}");
        continue;
      }

      return Ok(Some(Region::new(&self.buffer, x, z)));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn region_names() {
    assert_eq!(parse_region_name("r.0.0.mca"), Some((0, 0)));
    assert_eq!(parse_region_name("r.-3.12.mca"), Some((-3, 12)));
    assert_eq!(parse_region_name("r.1.2.mcc"), None);
    assert_eq!(parse_region_name("r.1.mca"), None);
    assert_eq!(parse_region_name("r.1.2.mca.bak"), None);
    assert_eq!(parse_region_name("level.dat"), None);
  }

  #[test]
  fn opens_and_locks() {
    let dir = std::env::temp_dir().join(format!("dh_anvil_world_{}", std::process::id()));
    fs::create_dir_all(dir.join("region")).unwrap();

    let world = World::open(dir.join("level.dat")).unwrap();
    assert_eq!(world.path(), dir);

    let lock = fs::read(dir.join("session.lock")).unwrap();
    assert_eq!(lock, "☃".as_bytes());

    // An empty region dir iterates to nothing.
    let mut regions = world.regions("region").unwrap();
    assert!(regions.next().unwrap().is_none());

    drop(world);
    fs::remove_dir_all(dir).unwrap();
  }

  #[test]
  fn iterates_region_files() {
    let dir = std::env::temp_dir().join(format!("dh_anvil_regions_{}", std::process::id()));
    fs::create_dir_all(dir.join("region")).unwrap();
    fs::write(dir.join("region/r.0.-1.mca"), vec![0u8; 8192]).unwrap();
    fs::write(dir.join("region/r.2.3.mca"), vec![0u8; 8192]).unwrap();
    fs::write(dir.join("region/notes.txt"), b"not a region").unwrap();
    fs::write(dir.join("region/r.9.9.mca"), b"").unwrap();

    let world = World::open(&dir).unwrap();
    let mut seen = vec![];
    let mut regions = world.regions("region").unwrap();
    while let Some(region) = regions.next().unwrap() {
      assert_eq!(region.data.len(), 8192);
      seen.push((region.x, region.z));
    }
    seen.sort();
    assert_eq!(seen, vec![(0, -1), (2, 3)]);

    drop(world);
    fs::remove_dir_all(dir).unwrap();
  }
}
