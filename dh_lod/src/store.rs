//! The persistence contract.
//!
//! LODs are persisted one row per LOD. This module owns everything about the
//! row's shape - column values, blob layouts, the migration-script log - but
//! executes no SQL itself; concrete backends live behind the [`Store`]
//! capability and are picked by [`Backend`] when a database is opened.

use crate::{compress, Compression, Lod, LodError, Result};

/// The generation-step byte recorded per column: fully generated terrain.
pub const GEN_STEP_COMPLETE: u8 = 8;

/// Format version of the column stream written into `DataFormatVersion`.
pub const DATA_FORMAT_VERSION: i64 = 1;

/// The storage backends a database path can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
  Sqlite,
  Postgres,
}

impl Backend {
  /// Picks the backend for a database location. URL-style locations go to
  /// postgres; plain paths are sqlite files.
  pub fn for_path(path: &str) -> Backend {
    if path.starts_with("postgres://") || path.starts_with("postgresql://") {
      Backend::Postgres
    } else {
      Backend::Sqlite
    }
  }
}

/// What a storage backend must provide. `save` persists one LOD row;
/// `close` flushes and releases the connection.
pub trait Store {
  type Error: std::error::Error;

  fn save(&mut self, lod: &mut Lod) -> std::result::Result<(), Self::Error>;
  fn close(self) -> std::result::Result<(), Self::Error>;
}

/// One `FullData` row, assembled from a LOD. Matches the Distant Horizons
/// schema column for column.
#[derive(Debug, Clone, PartialEq)]
pub struct LodRow {
  pub detail_level: i64,
  pub pos_x: i64,
  pub pos_z: i64,
  pub min_y: i64,
  /// Not computed; always 0.
  pub data_checksum: i64,
  /// The column stream, in whatever compression mode the LOD carries.
  pub data: Vec<u8>,
  /// Per-column generation step bytes, stored like the payload.
  pub column_generation_step: Vec<u8>,
  /// Per-column world compression tags, stored like the payload.
  pub column_world_compression_mode: Vec<u8>,
  /// The serialised id mapping.
  pub mapping: Vec<u8>,
  pub data_format_version: i64,
  pub compression_mode: i64,
  pub apply_to_parent: i64,
  pub apply_to_children: i64,
  pub last_modified_unix: i64,
  pub created_unix: i64,
}

impl LodRow {
  /// Assembles the row for a LOD, serialising the mapping and deriving the
  /// per-column metadata blobs.
  pub fn build(lod: &mut Lod) -> Result<LodRow> {
    let mapping = lod.serialise_mapping()?.to_vec();
    let mode = lod.compression_mode;

    let column_generation_step = column_blob(lod, GEN_STEP_COMPLETE)?;
    let column_world_compression_mode = column_blob(lod, mode.tag() as u8)?;

    Ok(LodRow {
      detail_level: lod.mip_level as i64,
      pos_x: lod.x,
      pos_z: lod.z,
      min_y: lod.min_y,
      data_checksum: 0,
      data: lod.data.clone(),
      column_generation_step,
      column_world_compression_mode,
      mapping,
      data_format_version: DATA_FORMAT_VERSION,
      compression_mode: mode.tag(),
      apply_to_parent: 0,
      apply_to_children: 0,
      last_modified_unix: 0,
      created_unix: 0,
    })
  }
}

// The per-column metadata columns hold one byte per LOD column (64 * 64),
// compressed the same way the payload is.
fn column_blob(lod: &mut Lod, value: u8) -> Result<Vec<u8>> {
  let raw = vec![value; 64 * 64];
  match lod.compression_mode {
    Compression::Uncompressed => Ok(raw),
    mode => {
      let ext = lod.ext.get_or_insert_with(Default::default);
      let mut out = vec![];
      compress::encode(&mut ext.compress, mode, 0.5, &raw, &mut out)?;
      Ok(out)
    }
  }
}

/// The migration scripts a backend applies, in order, each at most once.
/// Applications are journalled in the `Schema` table.
pub const MIGRATIONS: [&str; 9] = [
  "sqlScripts/0010-sqlite-createInitialDataTables.sql",
  "sqlScripts/0020-sqlite-createFullDataSourceV2Tables.sql",
  "sqlScripts/0030-sqlite-changeTableJournaling.sql",
  "sqlScripts/0031-sqlite-useSqliteWalJournaling.sql",
  "sqlScripts/0040-sqlite-removeRenderCache.sql",
  "sqlScripts/0050-sqlite-addApplyToParentIndex.sql",
  "sqlScripts/0060-sqlite-createChunkHashTable.sql",
  "sqlScripts/0070-sqlite-createBeaconBeamTable.sql",
  "sqlScripts/0080-sqlite-addApplyToChildrenColumn.sql",
];

/// The migration journal's own table, created before any script runs.
pub const SCHEMA_TABLE: &str = "CREATE TABLE Schema ( \n\
    SchemaVersionId INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \n\
    ScriptName TEXT NOT NULL UNIQUE, \n\
    AppliedDateTime DATETIME NOT NULL default CURRENT_TIMESTAMP \n\
)";

/// Filters [`MIGRATIONS`] down to the scripts not yet journalled, preserving
/// order. Backends run these, inserting each into `Schema` as it lands, which
/// makes application idempotent.
pub fn pending_migrations(applied: &[String]) -> Vec<&'static str> {
  MIGRATIONS.iter().copied().filter(|name| !applied.iter().any(|a| a == name)).collect()
}
