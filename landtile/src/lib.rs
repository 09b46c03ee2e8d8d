#![doc = include_str!("../README.md")]

mod edge_id;
pub mod land_tile;
mod le_bytes;
mod macros;
pub mod shape_codec;
pub mod tiling;

use enumset::{EnumSet, EnumSetType, enum_set};
use zerocopy_derive::{Immutable, IntoBytes, TryFromBytes, Unaligned};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Flatten the most commonly used definitions for better ergonomics.
pub use edge_id::{EdgeId, InvalidEdgeIdError};
pub use land_tile::{LandTile, TileDecodeError};
pub use tiling::{BBox, TileKey};

/// The current tile blob format version.
///
/// Decoders reject blobs with any other version rather than guessing.
pub const TILE_FORMAT_VERSION: u32 = 1;

/// Broad road hierarchy, from most to least significant.
///
/// The class determines the default car speed when the source data
/// carries no better estimate, and marks the pedestrian-only classes
/// (footways, paths, and steps have no car speed at all).
#[repr(u8)]
#[derive(TryFromBytes, IntoBytes, Immutable, Unaligned, Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum RoadClass {
    Motorway,
    Primary,
    Secondary,
    Residential,
    Footway,
    Path,
    Steps,
}

impl RoadClass {
    /// Default car travel speed for the class, in meters per second.
    ///
    /// Zero marks classes cars cannot use.
    pub const fn default_car_speed(self) -> f32 {
        match self {
            RoadClass::Motorway => 27.78,
            RoadClass::Primary => 22.22,
            RoadClass::Secondary => 16.67,
            RoadClass::Residential => 13.89,
            RoadClass::Footway | RoadClass::Path | RoadClass::Steps => 0.0,
        }
    }
}

/// Default pedestrian speed (m/s) for foot-accessible edges.
pub const DEFAULT_FOOT_SPEED: f32 = 1.4;

/// Access permission by travel mode.
///
/// Stored as a bit field: bit 0 is car access, bit 1 is foot access.
/// The same representation is used for per-edge `access_mask` values
/// and for a whole tile's `profile_mask` (the union over its edges).
#[derive(Debug, EnumSetType)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[enumset(repr = "u16")]
pub enum Access {
    Car,
    Foot,
}

/// Every mode a tile can serve.
pub const ALL_ACCESS: EnumSet<Access> = enum_set!(Access::Car | Access::Foot);

/// The traveler model for a query.
///
/// The profile selects which edges are traversable, which per-edge speed
/// field weights them, and the reference speed of the search heuristic.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum Profile {
    Car,
    Foot,
}

impl Profile {
    /// The access bit this profile requires on an edge.
    pub const fn access(self) -> Access {
        match self {
            Profile::Car => Access::Car,
            Profile::Foot => Access::Foot,
        }
    }
}
