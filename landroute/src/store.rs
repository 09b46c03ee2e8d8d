//! The persistent tile container and its in-memory cache.

use bytes::Bytes;
use landtile::TileKey;
use lru::LruCache;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open tile container: {0}")]
    Open(#[source] rusqlite::Error),
    #[error("Container operation failed: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// A bounded-memory cache over the container's key → blob table.
///
/// Hits promote the entry to most-recently-used; misses fetch from the
/// container. The returned buffer is refcounted, so a blob stays valid
/// for as long as any caller holds it, independent of later evictions.
pub struct TileStore {
    conn: Connection,
    /// `None` when the configured capacity is zero (caching disabled;
    /// misses are still served, nothing is retained).
    cache: Option<Mutex<LruCache<TileKey, Bytes>>>,
}

impl TileStore {
    /// Opens a container read-only.
    ///
    /// # Errors
    ///
    /// Fails when the file does not exist or is not a readable database.
    pub fn open(path: impl AsRef<Path>, cache_capacity: usize) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(StoreError::Open)?;
        // Best-effort pragmas; ignore failures.
        // journal_mode returns a row, so it cannot share a batch.
        let _ = conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()));
        let _ = conn.execute_batch("PRAGMA synchronous=NORMAL; PRAGMA temp_store=MEMORY;");
        Ok(Self {
            conn,
            cache: NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        })
    }

    /// Loads the blob for the given key, or `None` if it is absent.
    ///
    /// Backend read errors are reported as not-found; the router does not
    /// need to distinguish transport failures from missing keys.
    pub fn load(&self, key: TileKey) -> Option<Bytes> {
        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
            && let Some(blob) = cache.get(&key)
        {
            debug!(%key, "tile cache hit");
            return Some(blob.clone());
        }

        let blob = match self.fetch(key) {
            Ok(blob) => blob?,
            Err(error) => {
                warn!(%key, %error, "tile fetch failed; treating as missing");
                return None;
            }
        };
        debug!(%key, bytes = blob.len(), "tile cache miss");

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
        {
            // At capacity, the least-recently-used entry is dropped first.
            cache.put(key, blob.clone());
        }
        Some(blob)
    }

    fn fetch(&self, key: TileKey) -> Result<Option<Bytes>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data FROM land_tiles WHERE z = ?1 AND x = ?2 AND y = ?3 LIMIT 1")?;
        let row: Option<Vec<u8>> = stmt
            .query_row((key.z, key.x, key.y), |row| row.get(0))
            .optional()?;
        Ok(row.map(Bytes::from))
    }

    /// Reads a value from the container's metadata table.
    pub fn metadata(&self, meta_key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM metadata WHERE key = ?1")?;
        Ok(stmt.query_row((meta_key,), |row| row.get(0)).optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ContainerWriter, SCHEMA_VERSION};
    use landtile::land_tile::{EdgeSpec, TileBuilder};
    use landtile::{ALL_ACCESS, TILE_FORMAT_VERSION};

    fn fixture(path: &std::path::Path, keys: &[TileKey]) {
        let writer = ContainerWriter::create(path).unwrap();
        writer.put_metadata("schema_version", SCHEMA_VERSION).unwrap();
        writer.put_metadata("source", "fixture").unwrap();
        for &key in keys {
            let mut builder = TileBuilder::new(key);
            let bounds = key.bounds();
            let a = builder.add_node(bounds.lat_min, bounds.lon_min);
            let b = builder.add_node(bounds.lat_max, bounds.lon_max);
            builder.add_edge(a, b, EdgeSpec::default()).unwrap();
            let blob = builder.build().unwrap();
            writer
                .put_tile(key, bounds, TILE_FORMAT_VERSION, "", ALL_ACCESS, &blob)
                .unwrap();
        }
    }

    #[test]
    fn test_open_missing_container_fails() {
        assert!(matches!(
            TileStore::open("/nonexistent/routing.db", 4),
            Err(StoreError::Open(_))
        ));
    }

    #[test]
    fn test_load_hit_returns_cached_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.db");
        let key = TileKey::new(14, 100, 200);
        fixture(&path, &[key]);

        let store = TileStore::open(&path, 4).unwrap();
        let first = store.load(key).unwrap();
        let second = store.load(key).unwrap();
        // A hit hands back the same allocation, not a re-read.
        assert_eq!(first.as_ptr(), second.as_ptr());

        assert!(store.load(TileKey::new(14, 1, 1)).is_none());
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.db");
        let key = TileKey::new(14, 100, 200);
        fixture(&path, &[key]);

        let store = TileStore::open(&path, 0).unwrap();
        let first = store.load(key).unwrap();
        let second = store.load(key).unwrap();
        assert_eq!(first, second);
        assert_ne!(first.as_ptr(), second.as_ptr());
    }

    #[test]
    fn test_lru_eviction_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.db");
        let k1 = TileKey::new(14, 1, 0);
        let k2 = TileKey::new(14, 2, 0);
        let k3 = TileKey::new(14, 3, 0);
        fixture(&path, &[k1, k2, k3]);

        let store = TileStore::open(&path, 2).unwrap();
        let b1 = store.load(k1).unwrap();
        store.load(k2).unwrap();
        // Touch k1 so k2 becomes least recently used, then overflow.
        let b1_again = store.load(k1).unwrap();
        assert_eq!(b1.as_ptr(), b1_again.as_ptr());
        store.load(k3).unwrap();

        // k1 survived the eviction, k2 did not.
        assert_eq!(store.load(k1).unwrap().as_ptr(), b1.as_ptr());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.db");
        fixture(&path, &[]);

        let store = TileStore::open(&path, 4).unwrap();
        assert_eq!(
            store.metadata("schema_version").unwrap().as_deref(),
            Some(SCHEMA_VERSION)
        );
        assert_eq!(store.metadata("missing").unwrap(), None);
    }
}
