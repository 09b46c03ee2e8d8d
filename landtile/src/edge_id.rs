use crate::tiling::TileKey;
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use zerocopy::{LE, U64};
use zerocopy_derive::{Immutable, IntoBytes, Unaligned};

/// The max valid tile column/row.
///
/// There are 20 bits each for x and y.
const MAX_TILE_COORD: u32 = (1 << 20) - 1;

/// The max valid edge index within a tile.
///
/// There are 16 bits for the index.
const MAX_EDGE_INDEX: u32 = (1 << 16) - 1;

#[derive(Debug, Error, PartialEq)]
pub enum InvalidEdgeIdError {
    #[error("Tile coordinate is larger than the maximum allowed value.")]
    TileCoord,
    #[error("Edge index is larger than the maximum allowed value.")]
    EdgeIndex,
}

/// A stable identifier of a directed edge anywhere in the dataset.
///
/// It packs the tile key and the edge's index within the tile
/// into a 64-bit integer, so route results can reference edges
/// without holding any tile buffer alive.
///
/// # Bit field layout
///
/// ```text
///        MSb                                      LSb
///        ▼                                        ▼
/// bit   64        56        36        16          0
/// pos    ┌─────────┬─────────┬─────────┬──────────┐
///        │ z       │ x       │ y       │ index    │
///        └─────────┴─────────┴─────────┴──────────┘
/// size      8         20        20         16
/// ```
///
/// The widths cap tile coordinates at 2^20 and per-tile edge counts at
/// 2^16; datasets beyond that need a wider packing.
#[repr(C)]
#[derive(IntoBytes, Immutable, Unaligned, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EdgeId(U64<LE>);

impl EdgeId {
    /// Tries to construct an edge ID from the given components.
    ///
    /// # Errors
    ///
    /// This will fail if `x`, `y`, or `index` contains a value greater than
    /// the allowed number of field bits (20, 20, and 16 respectively).
    #[inline]
    pub const fn try_from_components(
        z: u8,
        x: u32,
        y: u32,
        index: u32,
    ) -> Result<Self, InvalidEdgeIdError> {
        if x > MAX_TILE_COORD || y > MAX_TILE_COORD {
            Err(InvalidEdgeIdError::TileCoord)
        } else if index > MAX_EDGE_INDEX {
            Err(InvalidEdgeIdError::EdgeIndex)
        } else {
            Ok(Self(U64::<LE>::new(
                ((z as u64) << 56) | ((x as u64) << 36) | ((y as u64) << 16) | index as u64,
            )))
        }
    }

    /// Creates an edge ID from a raw packed value.
    ///
    /// Every bit pattern decodes to some component tuple, so this is total.
    #[inline]
    pub const fn from_value(id: u64) -> Self {
        Self(U64::<LE>::new(id))
    }

    /// Extracts the raw (packed) value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0.get()
    }

    /// The tile zoom level.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn zoom(&self) -> u8 {
        (self.value() >> 56) as u8
    }

    /// The tile column.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn x(&self) -> u32 {
        ((self.value() >> 36) as u32) & MAX_TILE_COORD
    }

    /// The tile row.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn y(&self) -> u32 {
        ((self.value() >> 16) as u32) & MAX_TILE_COORD
    }

    /// The edge's index within its tile.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(&self) -> u16 {
        self.value() as u16
    }

    /// The key of the tile owning the edge.
    #[inline]
    pub const fn tile(&self) -> TileKey {
        TileKey {
            z: self.zoom(),
            x: self.x(),
            y: self.y(),
        }
    }
}

impl Display for EdgeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}/{}/{}/{}",
            self.zoom(),
            self.x(),
            self.y(),
            self.index()
        ))
    }
}

#[cfg(feature = "serde")]
impl Serialize for EdgeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_tile_coord() {
        assert_eq!(
            EdgeId::try_from_components(0, MAX_TILE_COORD + 1, 0, 0),
            Err(InvalidEdgeIdError::TileCoord)
        );
        assert_eq!(
            EdgeId::try_from_components(0, 0, MAX_TILE_COORD + 1, 0),
            Err(InvalidEdgeIdError::TileCoord)
        );
    }

    #[test]
    fn test_invalid_edge_index() {
        assert_eq!(
            EdgeId::try_from_components(0, 0, 0, MAX_EDGE_INDEX + 1),
            Err(InvalidEdgeIdError::EdgeIndex)
        );
    }

    #[test]
    fn test_component_roundtrip() {
        let Ok(id) = EdgeId::try_from_components(14, 8718, 5685, 42) else {
            panic!("Expected a valid edge ID.")
        };
        assert_eq!(id.zoom(), 14);
        assert_eq!(id.x(), 8718);
        assert_eq!(id.y(), 5685);
        assert_eq!(id.index(), 42);
        assert_eq!(id.tile(), TileKey::new(14, 8718, 5685));
        assert_eq!(EdgeId::from_value(id.value()), id);
    }

    #[test]
    fn test_max_components() {
        let Ok(id) = EdgeId::try_from_components(
            u8::MAX,
            MAX_TILE_COORD,
            MAX_TILE_COORD,
            MAX_EDGE_INDEX,
        ) else {
            panic!("Expected a valid edge ID.")
        };
        assert_eq!(id.zoom(), u8::MAX);
        assert_eq!(id.x(), MAX_TILE_COORD);
        assert_eq!(id.y(), MAX_TILE_COORD);
        assert_eq!(u32::from(id.index()), MAX_EDGE_INDEX);
        assert_eq!(id.value(), u64::MAX);
    }

    #[test]
    fn test_known_packing() {
        let id = EdgeId::try_from_components(14, 0, 0, 5).unwrap();
        assert_eq!(id.value(), (14u64 << 56) | 5);
    }

    #[test]
    fn test_display() {
        let id = EdgeId::try_from_components(14, 8718, 5685, 7).unwrap();
        assert_eq!(id.to_string(), "14/8718/5685/7");
    }
}
