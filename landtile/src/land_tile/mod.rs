//! Decoded tile views.
//!
//! A [`LandTile`] is a structural view over an immutable tile blob:
//! the record arrays are materialized once at decode time, the shared
//! buffer stays alive for the lifetime of the view, and the reverse
//! adjacency is derived lazily on first request.

use bytes::Bytes;
use geo::{Coord, coord};
use std::cell::OnceCell;
use thiserror::Error;
use zerocopy::{I32, LE, transmute, try_transmute};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

mod builder;
mod edge;
mod header;
mod node;

use crate::shape_codec::decode_polyline;
use crate::{TILE_FORMAT_VERSION, transmute_records, try_transmute_records};
pub use builder::{EdgeShape, EdgeSpec, TileBuildError, TileBuilder};
pub use edge::EdgeRecord;
pub use header::TileHeader;
pub use node::{NodeRecord, quantize};

#[derive(Debug, Error)]
pub enum TileDecodeError {
    #[error("The tile buffer is shorter than its declared contents.")]
    Truncated,
    #[error("Unable to extract a slice of the correct length; the tile data is malformed.")]
    SliceArrayConversion(#[from] std::array::TryFromSliceError),
    #[error("The byte sequence is not valid for this type.")]
    ValidityError,
    #[error("Unsupported tile format version {0}.")]
    UnsupportedVersion(u32),
    #[error("Dangling record reference: {0}.")]
    InvalidReference(&'static str),
}

/// A decoded road-network tile.
///
/// The view holds a shared reference to the underlying buffer; dropping
/// the cache entry that produced it does not invalidate the view.
pub struct LandTile {
    memory: Bytes,
    header: TileHeader,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    shapes: Vec<ShapeRecord>,
    polyline_pool: Bytes,
    checksum: Bytes,
    /// Incoming edge indices per node, built on first request.
    ///
    /// Single-initialization: views are per-query in the typical path,
    /// so the cell is never contended. Long-lived shared views must call
    /// [`LandTile::in_edges_of`] once before sharing.
    in_adjacency: OnceCell<Vec<Vec<u32>>>,
}

/// A polyline vertex in a tile's shape pool.
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct ShapeRecord {
    lat_q: I32<LE>,
    lon_q: I32<LE>,
}

impl ShapeRecord {
    pub(crate) fn new(lat_q: i32, lon_q: i32) -> Self {
        Self {
            lat_q: I32::new(lat_q),
            lon_q: I32::new(lon_q),
        }
    }

    /// The floating coordinate (x = lon, y = lat).
    #[inline]
    pub fn coordinate(&self) -> Coord<f64> {
        coord! {
            x: f64::from(self.lon_q.get()) / node::QUANT_SCALE,
            y: f64::from(self.lat_q.get()) / node::QUANT_SCALE,
        }
    }
}

impl TryFrom<Bytes> for LandTile {
    type Error = TileDecodeError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let value = bytes.as_ref();
        const HEADER_SIZE: usize = size_of::<TileHeader>();
        if value.len() < HEADER_SIZE {
            return Err(TileDecodeError::Truncated);
        }

        let header_slice: [u8; HEADER_SIZE] = value[0..HEADER_SIZE].try_into()?;
        let header: TileHeader = transmute!(header_slice);

        if header.version() != TILE_FORMAT_VERSION {
            return Err(TileDecodeError::UnsupportedVersion(header.version()));
        }
        if header.zoom() > u16::from(u8::MAX) {
            return Err(TileDecodeError::InvalidReference("zoom out of range"));
        }

        let node_count = header.node_count() as usize;
        let edge_count = header.edge_count() as usize;
        let shape_count = header.shape_count() as usize;
        let pool_len = header.polyline_pool_len() as usize;
        let checksum_len = header.checksum_len() as usize;

        let total = HEADER_SIZE
            + node_count * size_of::<NodeRecord>()
            + edge_count * size_of::<EdgeRecord>()
            + shape_count * size_of::<ShapeRecord>()
            + pool_len
            + checksum_len;
        if value.len() < total {
            return Err(TileDecodeError::Truncated);
        }

        let offset = HEADER_SIZE;
        let (nodes, offset): (Vec<NodeRecord>, _) =
            transmute_records!(NodeRecord, value, offset, node_count)?;
        let (edges, offset): (Vec<EdgeRecord>, _) =
            try_transmute_records!(EdgeRecord, value, offset, edge_count)?;
        let (shapes, offset): (Vec<ShapeRecord>, _) =
            transmute_records!(ShapeRecord, value, offset, shape_count)?;

        let polyline_pool = bytes.slice(offset..offset + pool_len);
        let checksum = bytes.slice(offset + pool_len..offset + pool_len + checksum_len);

        if !polyline_pool.is_ascii() {
            return Err(TileDecodeError::ValidityError);
        }

        for node in &nodes {
            let last = node.first_edge() as usize + node.edge_count() as usize;
            if last > edge_count {
                return Err(TileDecodeError::InvalidReference("node adjacency"));
            }
        }
        for edge in &edges {
            if edge.from_node() as usize >= node_count || edge.to_node() as usize >= node_count {
                return Err(TileDecodeError::InvalidReference("edge endpoint"));
            }
            let shape = edge.shape_range();
            if shape.end > shape_count {
                return Err(TileDecodeError::InvalidReference("shape slice"));
            }
            if shape.len() == 1 {
                return Err(TileDecodeError::InvalidReference("degenerate shape"));
            }
            if let Some(range) = edge.polyline_range()
                && range.end > pool_len
            {
                return Err(TileDecodeError::InvalidReference("polyline slice"));
            }
        }

        Ok(Self {
            memory: bytes,
            header,
            nodes,
            edges,
            shapes,
            polyline_pool,
            checksum,
            in_adjacency: OnceCell::new(),
        })
    }
}

impl LandTile {
    #[inline]
    pub fn header(&self) -> &TileHeader {
        &self.header
    }

    #[inline]
    pub fn node_count(&self) -> u32 {
        self.header.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> u32 {
        self.header.edge_count()
    }

    /// The opaque checksum bytes recorded by the writer (never verified).
    #[inline]
    pub fn checksum(&self) -> &[u8] {
        &self.checksum
    }

    /// The raw blob backing this view.
    #[inline]
    pub fn memory(&self) -> &Bytes {
        &self.memory
    }

    /// The node at the given index.
    ///
    /// Indices come from this tile's own edge and adjacency data,
    /// which decode-time validation guarantees to be in range.
    #[inline]
    pub fn node(&self, index: u32) -> &NodeRecord {
        &self.nodes[index as usize]
    }

    /// The edge at the given index (see [`LandTile::node`] on bounds).
    #[inline]
    pub fn edge(&self, index: u32) -> &EdgeRecord {
        &self.edges[index as usize]
    }

    /// Index of the first outbound edge of a node.
    #[inline]
    pub fn first_edge(&self, node_index: u32) -> u32 {
        self.node(node_index).first_edge()
    }

    /// Number of outbound edges of a node.
    #[inline]
    pub fn edge_count_from(&self, node_index: u32) -> u16 {
        self.node(node_index).edge_count()
    }

    /// The indices of edges pointing *into* the given node.
    ///
    /// The reverse adjacency is derived on first call and cached for the
    /// lifetime of the view; it is never stored in the blob.
    pub fn in_edges_of(&self, node_index: u32) -> &[u32] {
        let adjacency = self.in_adjacency.get_or_init(|| {
            let mut incoming = vec![Vec::new(); self.nodes.len()];
            for (index, edge) in self.edges.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                incoming[edge.to_node() as usize].push(index as u32);
            }
            incoming
        });
        &adjacency[node_index as usize]
    }

    /// The edge's polyline5 string, if the compact encoding is present.
    pub fn encoded_polyline(&self, edge: &EdgeRecord) -> Option<&str> {
        let range = edge.polyline_range()?;
        // Pool was validated as ASCII at decode time.
        std::str::from_utf8(&self.polyline_pool[range]).ok()
    }

    /// Appends the edge's polyline (x = lon, y = lat) to `out`.
    ///
    /// Resolution order: explicit shape slice, then the encoded polyline,
    /// then the straight segment between the endpoint nodes.
    /// With `skip_first` set, the first point is omitted when `out` is
    /// non-empty, so consecutive edges concatenate without duplicate
    /// vertices.
    pub fn append_edge_shape(&self, edge_index: u32, out: &mut Vec<Coord<f64>>, skip_first: bool) {
        let edge = self.edge(edge_index);

        let shape = &self.shapes[edge.shape_range()];
        if !shape.is_empty() {
            for (k, point) in shape.iter().enumerate() {
                if skip_first && k == 0 && !out.is_empty() {
                    continue;
                }
                out.push(point.coordinate());
            }
            return;
        }

        if let Some(encoded) = self.encoded_polyline(edge) {
            for (k, point) in decode_polyline(encoded).into_iter().enumerate() {
                if skip_first && k == 0 && !out.is_empty() {
                    continue;
                }
                out.push(point);
            }
            return;
        }

        if !skip_first || out.is_empty() {
            out.push(self.node(edge.from_node()).coordinate());
        }
        out.push(self.node(edge.to_node()).coordinate());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape_codec::encode_polyline;
    use crate::tiling::TileKey;
    use crate::{ALL_ACCESS, Access, Profile};
    use enumset::enum_set;
    use geo::coord;

    const KEY: TileKey = TileKey::new(14, 8718, 5685);

    fn two_node_tile(shape: EdgeShape) -> LandTile {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder
            .add_edge(a, b, EdgeSpec { shape, ..EdgeSpec::default() })
            .unwrap();
        let blob = builder.build().unwrap();
        LandTile::try_from(Bytes::from(blob)).unwrap()
    }

    #[test]
    fn test_decode_counts_and_adjacency() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        let c = builder.add_node(48.1390, 11.5790);
        builder.add_edge(a, b, EdgeSpec::default()).unwrap();
        builder.add_edge(b, c, EdgeSpec::default()).unwrap();
        builder.add_edge(a, c, EdgeSpec::default()).unwrap();
        let tile = LandTile::try_from(Bytes::from(builder.build().unwrap())).unwrap();

        assert_eq!(tile.node_count(), 3);
        assert_eq!(tile.edge_count(), 3);
        assert_eq!(tile.header().key(), KEY);
        assert_eq!(tile.header().profile_mask(), ALL_ACCESS);

        // Outbound edges of `a` are contiguous after the builder groups them.
        assert_eq!(tile.edge_count_from(0), 2);
        let first = tile.first_edge(0);
        for k in 0..2 {
            assert_eq!(tile.edge(first + k).from_node(), 0);
        }
        assert_eq!(tile.edge_count_from(2), 0);

        // Reverse adjacency groups by head node.
        assert_eq!(tile.in_edges_of(0), &[] as &[u32]);
        assert_eq!(tile.in_edges_of(1).len(), 1);
        assert_eq!(tile.in_edges_of(2).len(), 2);
    }

    #[test]
    fn test_explicit_shape() {
        let shape = vec![
            coord! {x: 11.5700, y: 48.1300},
            coord! {x: 11.5710, y: 48.1350},
            coord! {x: 11.5700, y: 48.1390},
        ];
        let tile = two_node_tile(EdgeShape::Points(shape));

        let mut out = Vec::new();
        tile.append_edge_shape(0, &mut out, false);
        assert_eq!(out.len(), 3);
        assert!((out[1].x - 11.5710).abs() < 5e-7);

        // skip_first only suppresses the first vertex of a continuation.
        tile.append_edge_shape(0, &mut out, true);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_encoded_polyline_fallback() {
        let encoded = encode_polyline(&[
            coord! {x: 11.5700, y: 48.1300},
            coord! {x: 11.5700, y: 48.1390},
        ]);
        let tile = two_node_tile(EdgeShape::Encoded(encoded));
        assert!(tile.encoded_polyline(tile.edge(0)).is_some());

        let mut out = Vec::new();
        tile.append_edge_shape(0, &mut out, false);
        assert_eq!(out.len(), 2);
        assert!((out[0].y - 48.1300).abs() < 1e-5);
        assert!((out[1].y - 48.1390).abs() < 1e-5);
    }

    #[test]
    fn test_endpoint_fallback() {
        let tile = two_node_tile(EdgeShape::Endpoints);
        assert!(tile.encoded_polyline(tile.edge(0)).is_none());

        let mut out = Vec::new();
        tile.append_edge_shape(0, &mut out, false);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], tile.node(0).coordinate());
        assert_eq!(out[1], tile.node(1).coordinate());
    }

    #[test]
    fn test_edge_attributes_roundtrip() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder
            .add_edge(
                a,
                b,
                EdgeSpec {
                    oneway: true,
                    access: enum_set!(Access::Car),
                    speed_mps: Some(10.0),
                    ..EdgeSpec::default()
                },
            )
            .unwrap();
        let tile = LandTile::try_from(Bytes::from(builder.build().unwrap())).unwrap();

        let e = tile.edge(0);
        assert!(e.oneway());
        assert!(e.allows(Profile::Car));
        assert!(!e.allows(Profile::Foot));
        assert_eq!(e.speed_mps(), 10.0);
        // Length is roughly 0.009 degrees of latitude.
        assert!((f64::from(e.length_m()) - 1000.8).abs() < 2.0);
        assert_eq!(tile.header().profile_mask(), enum_set!(Access::Car));
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder.add_edge(a, b, EdgeSpec::default()).unwrap();
        let blob = builder.build().unwrap();

        let cut = Bytes::from(blob[..blob.len() - 4].to_vec());
        assert!(matches!(
            LandTile::try_from(cut),
            Err(TileDecodeError::Truncated)
        ));

        assert!(matches!(
            LandTile::try_from(Bytes::from_static(&[0u8; 8])),
            Err(TileDecodeError::Truncated)
        ));
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder.add_edge(a, b, EdgeSpec::default()).unwrap();
        let mut blob = builder.build().unwrap();
        blob[0] = 99;

        assert!(matches!(
            LandTile::try_from(Bytes::from(blob)),
            Err(TileDecodeError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_dangling_edge_endpoint_is_rejected() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder.add_edge(a, b, EdgeSpec::default()).unwrap();
        let mut blob = builder.build().unwrap();

        // Corrupt the first edge's to_node to point past the node array.
        let edge_offset = size_of::<TileHeader>() + 2 * size_of::<NodeRecord>();
        blob[edge_offset + 4..edge_offset + 8].copy_from_slice(&7u32.to_le_bytes());

        assert!(matches!(
            LandTile::try_from(Bytes::from(blob)),
            Err(TileDecodeError::InvalidReference("edge endpoint"))
        ));
    }
}
