//! Fusion of loaded tiles into a single per-query search graph.
//!
//! Nodes are merged across tiles by their quantized coordinates, so a
//! junction on a shared tile border becomes one graph node regardless of
//! how many tiles carry it. The graph is weighted by traversal time under
//! the query's profile and discarded when the query completes.

use crate::snap::EdgeSnap;
use geo::Coord;
use landtile::{LandTile, Profile, TileKey};
use std::collections::HashMap;

/// A tile participating in the current query.
pub(crate) struct LoadedTile {
    pub key: TileKey,
    pub tile: LandTile,
}

/// Identifies the tile edge a graph edge was derived from.
#[derive(Copy, Clone, Debug)]
pub(crate) struct HostRef {
    /// Index into the query's loaded tile set.
    pub tile: usize,
    /// Edge index within that tile.
    pub edge: u32,
}

/// Geometry anchor for a fractional half-edge.
#[derive(Clone, Debug)]
pub(crate) struct SnapGeom {
    /// Segment of the host polyline holding the projection.
    pub segment: usize,
    /// The projection point (x = lon, y = lat).
    pub projected: Coord<f64>,
}

/// Which part of the host edge's geometry a graph edge covers.
///
/// The "head" of a host edge is the polyline up to the projection,
/// the "tail" the rest. Forward/backward is relative to the host's
/// stored orientation.
#[derive(Clone, Debug)]
pub(crate) enum Piece {
    /// The full host edge; `reversed` when traversed against the stored
    /// orientation (the reverse direction of a non-oneway edge).
    Whole { reversed: bool },
    /// Head, traversed from the `from` endpoint to the projection.
    HeadForward(SnapGeom),
    /// Head, traversed from the projection back to the `from` endpoint.
    HeadBackward(SnapGeom),
    /// Tail, traversed from the projection to the `to` endpoint.
    TailForward(SnapGeom),
    /// Tail, traversed from the `to` endpoint back to the projection.
    TailBackward(SnapGeom),
    /// Mid-edge span between two projections, along stored orientation.
    SpanForward { from: SnapGeom, to: SnapGeom },
    /// Mid-edge span traversed against stored orientation.
    SpanBackward { from: SnapGeom, to: SnapGeom },
}

/// A directed, time-weighted edge of the search graph.
pub(crate) struct GraphEdge {
    pub to: u32,
    /// Traversal time in seconds.
    pub weight: f64,
    pub host: HostRef,
    pub piece: Piece,
}

/// Back-pointer to a slot in some node's forward adjacency.
#[derive(Copy, Clone, Debug)]
pub(crate) struct EdgeRef {
    pub node: u32,
    pub pos: u32,
}

/// The fused multi-tile graph plus its derived reverse adjacency.
pub(crate) struct SearchGraph {
    coords: Vec<Coord<f64>>,
    adj: Vec<Vec<GraphEdge>>,
    radj: Vec<Vec<EdgeRef>>,
    /// Per loaded tile: local node index → global node id.
    tile_nodes: Vec<Vec<u32>>,
}

impl SearchGraph {
    /// Fuses the loaded tiles under the given profile.
    ///
    /// An edge contributes a forward graph edge when the profile may
    /// traverse it from its `from` node, and the opposite edge as well
    /// when it is not oneway.
    pub fn build(tiles: &[LoadedTile], profile: Profile) -> Self {
        let mut graph = Self {
            coords: Vec::new(),
            adj: Vec::new(),
            radj: Vec::new(),
            tile_nodes: Vec::with_capacity(tiles.len()),
        };
        let mut fusion: HashMap<(i32, i32), u32> = HashMap::new();

        for loaded in tiles {
            let tile = &loaded.tile;
            let mut local_to_global = Vec::with_capacity(tile.node_count() as usize);
            for index in 0..tile.node_count() {
                let node = tile.node(index);
                let global = *fusion
                    .entry(node.quantized())
                    .or_insert_with(|| graph.push_node(node.coordinate()));
                local_to_global.push(global);
            }

            let tile_index = graph.tile_nodes.len();
            for edge_index in 0..tile.edge_count() {
                let edge = tile.edge(edge_index);
                if !edge.allows(profile) {
                    continue;
                }
                let Some(weight) = edge.traversal_secs(profile) else {
                    continue;
                };
                let host = HostRef {
                    tile: tile_index,
                    edge: edge_index,
                };
                let from = local_to_global[edge.from_node() as usize];
                let to = local_to_global[edge.to_node() as usize];
                graph.add_edge(from, to, weight, host, Piece::Whole { reversed: false });
                if !edge.oneway() {
                    graph.add_edge(to, from, weight, host, Piece::Whole { reversed: true });
                }
            }
            graph.tile_nodes.push(local_to_global);
        }
        graph
    }

    /// Attaches a virtual source node at the snap projection.
    ///
    /// Half-edges respect the host's direction: the backward frontier may
    /// still terminate at the source through the entering half-edge, and
    /// a non-oneway host also allows departing toward its `from` node.
    ///
    /// Returns `None` when the host edge is impassable for the profile,
    /// which a snap produced under the same profile rules out.
    pub fn attach_start(
        &mut self,
        snap: &EdgeSnap,
        tiles: &[LoadedTile],
        profile: Profile,
    ) -> Option<u32> {
        let edge = tiles[snap.tile].tile.edge(snap.edge);
        let weight = edge.traversal_secs(profile)?;
        let host = HostRef {
            tile: snap.tile,
            edge: snap.edge,
        };
        let from = self.tile_nodes[snap.tile][snap.from_node as usize];
        let to = self.tile_nodes[snap.tile][snap.to_node as usize];
        let t = snap.edge_fraction;
        let geom = SnapGeom {
            segment: snap.segment,
            projected: snap.projected,
        };

        let v = self.push_node(snap.projected);
        self.add_edge(from, v, t * weight, host, Piece::HeadForward(geom.clone()));
        self.add_edge(
            v,
            to,
            (1.0 - t) * weight,
            host,
            Piece::TailForward(geom.clone()),
        );
        if !edge.oneway() {
            self.add_edge(v, from, t * weight, host, Piece::HeadBackward(geom));
        }
        Some(v)
    }

    /// Attaches a virtual target node at the snap projection.
    ///
    /// Both endpoints may enter the target for a non-oneway host; a
    /// oneway host is only enterable through its `from` side.
    pub fn attach_end(
        &mut self,
        snap: &EdgeSnap,
        tiles: &[LoadedTile],
        profile: Profile,
    ) -> Option<u32> {
        let edge = tiles[snap.tile].tile.edge(snap.edge);
        let weight = edge.traversal_secs(profile)?;
        let host = HostRef {
            tile: snap.tile,
            edge: snap.edge,
        };
        let from = self.tile_nodes[snap.tile][snap.from_node as usize];
        let to = self.tile_nodes[snap.tile][snap.to_node as usize];
        let t = snap.edge_fraction;
        let geom = SnapGeom {
            segment: snap.segment,
            projected: snap.projected,
        };

        let v = self.push_node(snap.projected);
        self.add_edge(from, v, t * weight, host, Piece::HeadForward(geom.clone()));
        if !edge.oneway() {
            self.add_edge(
                to,
                v,
                (1.0 - t) * weight,
                host,
                Piece::TailBackward(geom),
            );
        }
        Some(v)
    }

    /// Connects the virtual source directly to the virtual target when
    /// both snapped onto the same host edge.
    ///
    /// The endpoint half-edges alone cannot express this case: on a
    /// oneway host the only entrance to the target is its `from` node,
    /// which the source cannot reach without leaving the edge.
    pub fn attach_span(
        &mut self,
        source: u32,
        target: u32,
        start: &EdgeSnap,
        end: &EdgeSnap,
        tiles: &[LoadedTile],
        profile: Profile,
    ) {
        if start.tile != end.tile || start.edge != end.edge {
            return;
        }
        let edge = tiles[start.tile].tile.edge(start.edge);
        let Some(weight) = edge.traversal_secs(profile) else {
            return;
        };
        let host = HostRef {
            tile: start.tile,
            edge: start.edge,
        };
        let from = SnapGeom {
            segment: start.segment,
            projected: start.projected,
        };
        let to = SnapGeom {
            segment: end.segment,
            projected: end.projected,
        };
        if start.edge_fraction <= end.edge_fraction {
            self.add_edge(
                source,
                target,
                (end.edge_fraction - start.edge_fraction) * weight,
                host,
                Piece::SpanForward { from, to },
            );
        } else if !edge.oneway() {
            self.add_edge(
                source,
                target,
                (start.edge_fraction - end.edge_fraction) * weight,
                host,
                Piece::SpanBackward { from, to },
            );
        }
    }

    fn push_node(&mut self, coordinate: Coord<f64>) -> u32 {
        let id = u32::try_from(self.coords.len()).expect("graph node count exceeds u32");
        self.coords.push(coordinate);
        self.adj.push(Vec::new());
        self.radj.push(Vec::new());
        id
    }

    fn add_edge(&mut self, from: u32, to: u32, weight: f64, host: HostRef, piece: Piece) {
        let pos = u32::try_from(self.adj[from as usize].len()).expect("node degree exceeds u32");
        self.adj[from as usize].push(GraphEdge {
            to,
            weight,
            host,
            piece,
        });
        self.radj[to as usize].push(EdgeRef { node: from, pos });
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.coords.len()
    }

    #[inline]
    pub fn coordinate(&self, node: u32) -> Coord<f64> {
        self.coords[node as usize]
    }

    #[inline]
    pub fn out_edges(&self, node: u32) -> &[GraphEdge] {
        &self.adj[node as usize]
    }

    #[inline]
    pub fn in_refs(&self, node: u32) -> &[EdgeRef] {
        &self.radj[node as usize]
    }

    /// Resolves a reverse-adjacency reference to its forward edge.
    #[inline]
    pub fn edge(&self, node: u32, pos: u32) -> &GraphEdge {
        &self.adj[node as usize][pos as usize]
    }
}
