//! Creation of tile containers.
//!
//! The offline converter (and the test fixtures) write containers through
//! this module; the router only ever reads them via [`TileStore`](crate::TileStore).

use crate::store::StoreError;
use enumset::EnumSet;
use landtile::tiling::BBox;
use landtile::{Access, TileKey};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// The container schema version recorded under the `schema_version`
/// metadata key.
pub const SCHEMA_VERSION: &str = "1";

const CREATE_SCHEMA: &str = r#"
BEGIN;
CREATE TABLE IF NOT EXISTS land_tiles (
  z INTEGER NOT NULL,
  x INTEGER NOT NULL,
  y INTEGER NOT NULL,
  lat_min REAL NOT NULL,
  lon_min REAL NOT NULL,
  lat_max REAL NOT NULL,
  lon_max REAL NOT NULL,
  version INTEGER NOT NULL,
  checksum TEXT NOT NULL,
  profile_mask INTEGER NOT NULL,
  data BLOB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_land_tiles_zxy ON land_tiles(z,x,y);
CREATE TABLE IF NOT EXISTS metadata (
  key TEXT PRIMARY KEY,
  value TEXT
);
COMMIT;
"#;

/// Writes tile blobs and metadata into a container file.
///
/// Every operation is fatal on failure; the writer attempts no recovery.
pub struct ContainerWriter {
    conn: Connection,
}

impl ContainerWriter {
    /// Opens (creating as needed) a container and ensures the schema.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created or the schema DDL fails.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(StoreError::Open)?;
        // Best-effort pragmas; ignore failures.
        // journal_mode returns a row, so it cannot share a batch.
        let _ = conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()));
        let _ = conn.execute_batch("PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;");
        conn.execute_batch(CREATE_SCHEMA)?;
        info!(path = %path.as_ref().display(), "opened tile container for writing");
        Ok(Self { conn })
    }

    /// Upserts a metadata key/value pair.
    pub fn put_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO metadata(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        )?;
        stmt.execute((key, value))?;
        Ok(())
    }

    /// Inserts a tile row.
    ///
    /// The checksum is opaque provenance (empty when the producing
    /// platform has no digest primitive); readers never verify it.
    pub fn put_tile(
        &self,
        key: TileKey,
        bbox: BBox,
        version: u32,
        checksum: &str,
        profile_mask: EnumSet<Access>,
        blob: &[u8],
    ) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO land_tiles(z,x,y,lat_min,lon_min,lat_max,lon_max,version,checksum,profile_mask,data)
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        )?;
        stmt.execute((
            key.z,
            key.x,
            key.y,
            bbox.lat_min,
            bbox.lon_min,
            bbox.lat_max,
            bbox.lon_max,
            version,
            checksum,
            u32::from(profile_mask.as_repr()),
            blob,
        ))?;
        Ok(())
    }
}
