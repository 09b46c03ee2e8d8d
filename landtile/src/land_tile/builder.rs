//! Construction of tile blobs.
//!
//! Used by the offline container writer and by test fixtures. The builder
//! accepts a logical description of the tile (nodes, edges, geometry) and
//! produces a version-1 blob the decoder accepts.

use super::ShapeRecord;
use super::edge::EdgeRecord;
use super::header::TileHeader;
use super::node::{NodeRecord, quantize};
use crate::shape_codec::decode_polyline;
use crate::tiling::TileKey;
use crate::{Access, DEFAULT_FOOT_SPEED, RoadClass};
use enumset::EnumSet;
use geo::{Coord, Distance, Haversine, coord};
use thiserror::Error;
use zerocopy::IntoBytes;

/// The largest edge count addressable by an `EdgeId` (a 16-bit index).
const MAX_EDGES_PER_TILE: usize = 1 << 16;

#[derive(Debug, Error, PartialEq)]
pub enum TileBuildError {
    #[error("Edge references a node index that does not exist.")]
    InvalidNodeIndex,
    #[error("Explicit edge shapes need at least two points.")]
    DegenerateShape,
    #[error("Encoded polylines must be ASCII and shorter than 64 KiB.")]
    InvalidPolyline,
    #[error("The tile exceeds a format limit: {0}.")]
    CapacityExceeded(&'static str),
}

/// How an edge's geometry is stored.
pub enum EdgeShape {
    /// No stored geometry; readers fall back to the endpoint nodes.
    Endpoints,
    /// Explicit polyline (x = lon, y = lat), written to the shape pool.
    /// Endpoints should coincide with the edge's nodes after quantization.
    Points(Vec<Coord<f64>>),
    /// Compact polyline5 string, written to the polyline pool.
    Encoded(String),
}

/// Logical attributes of an edge under construction.
pub struct EdgeSpec {
    pub road_class: RoadClass,
    pub oneway: bool,
    pub access: EnumSet<Access>,
    /// Car speed override; defaults to the class speed.
    pub speed_mps: Option<f32>,
    /// Foot speed override; defaults to [`DEFAULT_FOOT_SPEED`].
    pub foot_speed_mps: Option<f32>,
    /// Length override; defaults to the great-circle length of the
    /// resolved geometry.
    pub length_m: Option<f32>,
    pub shape: EdgeShape,
}

impl Default for EdgeSpec {
    fn default() -> Self {
        Self {
            road_class: RoadClass::Residential,
            oneway: false,
            access: EnumSet::all(),
            speed_mps: None,
            foot_speed_mps: None,
            length_m: None,
            shape: EdgeShape::Endpoints,
        }
    }
}

struct PendingEdge {
    from: u32,
    to: u32,
    spec: EdgeSpec,
}

/// Builds a tile blob from logical nodes and edges.
///
/// Edges are grouped by tail node at build time, so insertion order does
/// not matter; node adjacency pointers are derived from the grouping.
pub struct TileBuilder {
    key: TileKey,
    nodes: Vec<(i32, i32)>,
    edges: Vec<PendingEdge>,
    checksum: String,
}

impl TileBuilder {
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            nodes: Vec::new(),
            edges: Vec::new(),
            checksum: String::new(),
        }
    }

    /// The key this tile will be stored under.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Adds a node and returns its tile-local index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_node(&mut self, lat: f64, lon: f64) -> u32 {
        self.nodes.push((quantize(lat), quantize(lon)));
        (self.nodes.len() - 1) as u32
    }

    /// Adds a directed edge between two previously added nodes.
    ///
    /// # Errors
    ///
    /// Fails when a node index is out of range or an explicit shape has
    /// fewer than two points.
    pub fn add_edge(&mut self, from: u32, to: u32, spec: EdgeSpec) -> Result<(), TileBuildError> {
        if from as usize >= self.nodes.len() || to as usize >= self.nodes.len() {
            return Err(TileBuildError::InvalidNodeIndex);
        }
        if let EdgeShape::Points(points) = &spec.shape
            && points.len() < 2
        {
            return Err(TileBuildError::DegenerateShape);
        }
        self.edges.push(PendingEdge { from, to, spec });
        Ok(())
    }

    /// Sets the opaque checksum string stored alongside the records.
    pub fn set_checksum(&mut self, checksum: impl Into<String>) {
        self.checksum = checksum.into();
    }

    /// The union of the edges' access masks.
    pub fn profile_mask(&self) -> EnumSet<Access> {
        self.edges
            .iter()
            .fold(EnumSet::empty(), |acc, e| acc | e.spec.access)
    }

    fn node_coord(&self, index: u32) -> Coord<f64> {
        let (lat_q, lon_q) = self.nodes[index as usize];
        coord! {x: f64::from(lon_q) / 1e6, y: f64::from(lat_q) / 1e6}
    }

    /// Serializes the tile.
    ///
    /// # Errors
    ///
    /// Fails when a count exceeds its field width or an encoded polyline
    /// cannot be stored.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(self) -> Result<Vec<u8>, TileBuildError> {
        if self.nodes.len() >= 1 << 21 {
            return Err(TileBuildError::CapacityExceeded("node count"));
        }
        if self.edges.len() > MAX_EDGES_PER_TILE {
            return Err(TileBuildError::CapacityExceeded("edge count"));
        }

        let profile_mask = self.profile_mask();

        // Group edges by tail node; stable so intra-node order is preserved.
        let mut order: Vec<usize> = (0..self.edges.len()).collect();
        order.sort_by_key(|&i| self.edges[i].from);

        let mut edge_records: Vec<EdgeRecord> = Vec::with_capacity(self.edges.len());
        let mut shape_pool: Vec<ShapeRecord> = Vec::new();
        let mut polyline_pool: Vec<u8> = Vec::new();

        for &i in &order {
            let PendingEdge { from, to, spec } = &self.edges[i];

            let mut shape_start = 0u32;
            let mut shape_count = 0u16;
            let mut polyline_start = 0u32;
            let mut polyline_len = 0u16;

            let resolved: Vec<Coord<f64>> = match &spec.shape {
                EdgeShape::Endpoints => vec![self.node_coord(*from), self.node_coord(*to)],
                EdgeShape::Points(points) => {
                    if shape_pool.len() + points.len() >= 1 << 21 {
                        return Err(TileBuildError::CapacityExceeded("shape pool"));
                    }
                    shape_start = shape_pool.len() as u32;
                    shape_count = u16::try_from(points.len())
                        .map_err(|_| TileBuildError::CapacityExceeded("shape count"))?;
                    shape_pool.extend(
                        points
                            .iter()
                            .map(|p| ShapeRecord::new(quantize(p.y), quantize(p.x))),
                    );
                    points.clone()
                }
                EdgeShape::Encoded(encoded) => {
                    if !encoded.is_ascii() {
                        return Err(TileBuildError::InvalidPolyline);
                    }
                    polyline_start = u32::try_from(polyline_pool.len())
                        .map_err(|_| TileBuildError::CapacityExceeded("polyline pool"))?;
                    polyline_len = u16::try_from(encoded.len())
                        .map_err(|_| TileBuildError::InvalidPolyline)?;
                    polyline_pool.extend_from_slice(encoded.as_bytes());
                    decode_polyline(encoded)
                }
            };

            let length_m = spec.length_m.unwrap_or_else(|| {
                resolved
                    .windows(2)
                    .map(|w| Haversine.distance(w[0].into(), w[1].into()))
                    .sum::<f64>() as f32
            });
            let speed_mps = if spec.access.contains(Access::Car) {
                spec.speed_mps
                    .unwrap_or_else(|| spec.road_class.default_car_speed())
            } else {
                0.0
            };
            let foot_speed_mps = if spec.access.contains(Access::Foot) {
                spec.foot_speed_mps.unwrap_or(DEFAULT_FOOT_SPEED)
            } else {
                0.0
            };

            edge_records.push(EdgeRecord::new(
                *from,
                *to,
                length_m,
                speed_mps,
                foot_speed_mps,
                spec.oneway,
                spec.road_class,
                spec.access,
                shape_start,
                shape_count,
                polyline_start,
                polyline_len,
            ));
        }

        // Adjacency pointers over the grouped edge array.
        let mut node_records: Vec<NodeRecord> = Vec::with_capacity(self.nodes.len());
        for (index, (lat_q, lon_q)) in self.nodes.iter().enumerate() {
            let index = index as u32;
            let first = edge_records
                .partition_point(|e| e.from_node() < index) as u32;
            let count = edge_records[first as usize..]
                .iter()
                .take_while(|e| e.from_node() == index)
                .count();
            let count = u16::try_from(count)
                .map_err(|_| TileBuildError::CapacityExceeded("node degree"))?;
            node_records.push(NodeRecord::new(index, *lat_q, *lon_q, first, count));
        }

        let polyline_pool_len = u32::try_from(polyline_pool.len())
            .map_err(|_| TileBuildError::CapacityExceeded("polyline pool"))?;
        let checksum_len = u16::try_from(self.checksum.len())
            .map_err(|_| TileBuildError::CapacityExceeded("checksum"))?;

        let header = TileHeader::new(
            self.key,
            profile_mask,
            node_records.len() as u32,
            edge_records.len() as u32,
            shape_pool.len() as u32,
            polyline_pool_len,
            checksum_len,
        );

        let mut out = Vec::with_capacity(
            size_of::<TileHeader>()
                + node_records.len() * size_of::<NodeRecord>()
                + edge_records.len() * size_of::<EdgeRecord>()
                + shape_pool.len() * size_of::<ShapeRecord>()
                + polyline_pool.len()
                + self.checksum.len(),
        );
        out.extend_from_slice(header.as_bytes());
        for record in &node_records {
            out.extend_from_slice(record.as_bytes());
        }
        for record in &edge_records {
            out.extend_from_slice(record.as_bytes());
        }
        for record in &shape_pool {
            out.extend_from_slice(record.as_bytes());
        }
        out.extend_from_slice(&polyline_pool);
        out.extend_from_slice(self.checksum.as_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LandTile;
    use bytes::Bytes;
    use enumset::enum_set;

    const KEY: TileKey = TileKey::new(14, 8718, 5685);

    #[test]
    fn test_invalid_node_index() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.0, 11.0);
        assert_eq!(
            builder.add_edge(a, 7, EdgeSpec::default()),
            Err(TileBuildError::InvalidNodeIndex)
        );
    }

    #[test]
    fn test_degenerate_shape() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.0, 11.0);
        let b = builder.add_node(48.1, 11.0);
        assert_eq!(
            builder.add_edge(
                a,
                b,
                EdgeSpec {
                    shape: EdgeShape::Points(vec![coord! {x: 11.0, y: 48.0}]),
                    ..EdgeSpec::default()
                }
            ),
            Err(TileBuildError::DegenerateShape)
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        // Interleave edges of two tail nodes; grouping must still produce
        // contiguous runs with correct adjacency pointers.
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        let c = builder.add_node(48.1390, 11.5790);
        builder.add_edge(b, a, EdgeSpec::default()).unwrap();
        builder.add_edge(a, b, EdgeSpec::default()).unwrap();
        builder.add_edge(b, c, EdgeSpec::default()).unwrap();
        let tile = LandTile::try_from(Bytes::from(builder.build().unwrap())).unwrap();

        assert_eq!(tile.edge_count_from(0), 1);
        assert_eq!(tile.edge_count_from(1), 2);
        assert_eq!(tile.first_edge(1), 1);
        assert_eq!(tile.edge(0).from_node(), 0);
        assert_eq!(tile.edge(1).from_node(), 1);
        assert_eq!(tile.edge(2).from_node(), 1);
    }

    #[test]
    fn test_foot_only_edge_speeds() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder
            .add_edge(
                a,
                b,
                EdgeSpec {
                    road_class: RoadClass::Footway,
                    access: enum_set!(Access::Foot),
                    ..EdgeSpec::default()
                },
            )
            .unwrap();
        let mask = builder.profile_mask();
        assert_eq!(mask, enum_set!(Access::Foot));

        let tile = LandTile::try_from(Bytes::from(builder.build().unwrap())).unwrap();
        assert_eq!(tile.edge(0).speed_mps(), 0.0);
        assert_eq!(tile.edge(0).foot_speed_mps(), DEFAULT_FOOT_SPEED);
    }

    #[test]
    fn test_checksum_roundtrip() {
        let mut builder = TileBuilder::new(KEY);
        let a = builder.add_node(48.1300, 11.5700);
        let b = builder.add_node(48.1390, 11.5700);
        builder.add_edge(a, b, EdgeSpec::default()).unwrap();
        builder.set_checksum("cafebabe");
        let tile = LandTile::try_from(Bytes::from(builder.build().unwrap())).unwrap();
        assert_eq!(tile.checksum(), b"cafebabe");
    }
}
