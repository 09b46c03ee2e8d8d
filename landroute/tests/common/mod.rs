//! Shared fixtures for the routing scenarios.

use landroute::{ContainerWriter, Profile, RouteResult, RouteStatus, Router, RouterOptions, SCHEMA_VERSION, TileStore};
use landtile::land_tile::TileBuilder;
use landtile::{LandTile, TILE_FORMAT_VERSION};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TILE_ZOOM: u8 = 14;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Writes the given tiles into a fresh container and returns its location.
pub fn write_container(builders: Vec<TileBuilder>) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("scratch dir");
    let path = dir.path().join("routing.db");
    let writer = ContainerWriter::create(&path).expect("create container");
    writer
        .put_metadata("schema_version", SCHEMA_VERSION)
        .expect("metadata");
    writer.put_metadata("source", "fixture").expect("metadata");
    for builder in builders {
        let key = builder.key();
        let mask = builder.profile_mask();
        let blob = builder.build().expect("build tile");
        writer
            .put_tile(key, key.bounds(), TILE_FORMAT_VERSION, "", mask, &blob)
            .expect("insert tile");
    }
    (dir, path)
}

pub fn open_router(path: &Path) -> Router {
    Router::open(path, RouterOptions::default()).expect("open router")
}

/// Asserts the invariants every successful result must satisfy.
pub fn assert_ok(result: &RouteResult) {
    assert_eq!(
        result.status,
        RouteStatus::Ok,
        "unexpected failure: {}",
        result.error_message
    );
    assert!(result.error_message.is_empty());
    assert!(!result.polyline.is_empty());
    assert!(!result.edge_ids.is_empty());
    assert!(result.distance_m >= 0.0);
    assert!(result.duration_s >= 0.0);
    for pair in result.polyline.windows(2) {
        assert!(
            !(pair[0].lat == pair[1].lat && pair[0].lon == pair[1].lon),
            "bit-identical successive vertices at {:?}",
            pair[0]
        );
    }
}

/// Decodes every reported edge id against the container and checks the
/// referenced edge exists and passes the profile's access rules.
pub fn assert_edge_ids_resolve(path: &Path, result: &RouteResult, profile: Profile) {
    let store = TileStore::open(path, 4).expect("open store");
    for id in &result.edge_ids {
        let key = id.tile();
        let blob = store.load(key).unwrap_or_else(|| panic!("tile {key} missing"));
        let tile = LandTile::try_from(blob).expect("decode tile");
        assert!(
            u32::from(id.index()) < tile.edge_count(),
            "edge {id} out of range"
        );
        let edge = tile.edge(u32::from(id.index()));
        assert!(edge.allows(profile), "edge {id} fails access check");
        assert!(edge.speed_for(profile) > 0.0, "edge {id} impassable");
    }
}
