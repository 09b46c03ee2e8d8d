#![doc = include_str!("../README.md")]

mod graph;
mod router;
mod snap;
mod store;
mod writer;

pub use landtile::{Access, EdgeId, Profile, RoadClass, TileKey};
pub use router::{LatLon, RouteResult, RouteStatus, Router, RouterOptions};
pub use store::{StoreError, TileStore};
pub use writer::{ContainerWriter, SCHEMA_VERSION};
