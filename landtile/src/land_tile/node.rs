use geo::{Coord, coord};
use zerocopy::{I32, LE, U16, U32};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

/// Factor between quantized integer coordinates and decimal degrees.
pub(crate) const QUANT_SCALE: f64 = 1e6;

/// A junction within a tile.
///
/// The graph uses a forward star structure: each node points at a
/// contiguous run of outbound edges in the tile's edge array.
/// The quantized coordinate doubles as the node's cross-tile identity.
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct NodeRecord {
    id: U32<LE>,
    lat_q: I32<LE>,
    lon_q: I32<LE>,
    first_edge: U32<LE>,
    edge_count: U16<LE>,
}

impl NodeRecord {
    pub(crate) fn new(id: u32, lat_q: i32, lon_q: i32, first_edge: u32, edge_count: u16) -> Self {
        Self {
            id: U32::new(id),
            lat_q: I32::new(lat_q),
            lon_q: I32::new(lon_q),
            first_edge: U32::new(first_edge),
            edge_count: U16::new(edge_count),
        }
    }

    /// The node's tile-local identifier.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id.get()
    }

    /// Quantized latitude (1e-6 degrees).
    #[inline]
    pub fn lat_q(&self) -> i32 {
        self.lat_q.get()
    }

    /// Quantized longitude (1e-6 degrees).
    #[inline]
    pub fn lon_q(&self) -> i32 {
        self.lon_q.get()
    }

    /// The quantized coordinate pair, the node's cross-tile identity key.
    #[inline]
    pub fn quantized(&self) -> (i32, i32) {
        (self.lat_q.get(), self.lon_q.get())
    }

    /// The floating coordinate (x = lon, y = lat).
    #[inline]
    pub fn coordinate(&self) -> Coord<f64> {
        coord! {
            x: f64::from(self.lon_q.get()) / QUANT_SCALE,
            y: f64::from(self.lat_q.get()) / QUANT_SCALE,
        }
    }

    /// Index of the node's first outbound edge.
    #[inline]
    pub fn first_edge(&self) -> u32 {
        self.first_edge.get()
    }

    /// Number of outbound edges.
    #[inline]
    pub fn edge_count(&self) -> u16 {
        self.edge_count.get()
    }
}

/// Quantizes a decimal-degree value to the 1e-6 grid.
#[allow(clippy::cast_possible_truncation)]
pub fn quantize(degrees: f64) -> i32 {
    (degrees * QUANT_SCALE).round() as i32
}
