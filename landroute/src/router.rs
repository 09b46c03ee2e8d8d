//! The routing engine: tile-set selection, bidirectional A*, and result
//! assembly.

use crate::graph::{LoadedTile, Piece, SearchGraph};
use crate::snap::snap_point;
use crate::store::{StoreError, TileStore};
use geo::{Coord, Distance, Haversine, coord};
use landtile::land_tile::TileDecodeError;
use landtile::{EdgeId, LandTile, Profile, TileKey};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reference speed of the A* heuristic, in m/s.
///
/// Admissible for foot and for typical urban car data; may slightly
/// over-estimate on motorways, accepted as an operational trade-off.
const fn heuristic_speed(profile: Profile) -> f64 {
    match profile {
        Profile::Car => 13.9,
        Profile::Foot => 1.4,
    }
}

/// Tile-rectangle expansion per started 4 km of crow-flight distance.
const FRAME_STEP_KM: f64 = 4.0;
const MIN_FRAME: i64 = 1;
const MAX_FRAME: i64 = 8;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn to_coord(self) -> Coord<f64> {
        coord! {x: self.lon, y: self.lat}
    }
}

impl From<Coord<f64>> for LatLon {
    fn from(c: Coord<f64>) -> Self {
        Self { lat: c.y, lon: c.x }
    }
}

/// Outcome classification of a routing request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum RouteStatus {
    Ok,
    /// Required tiles are absent from the container.
    NoTile,
    /// Tiles were found, but no connected path exists (including snap
    /// failures).
    NoRoute,
    /// A loaded blob is structurally invalid.
    DataError,
    /// Caller contract violation or unanticipated condition.
    InternalError,
}

/// The result of a routing request.
///
/// Failures carry a diagnostic status and message in the same structure;
/// no error escapes [`Router::route`] any other way.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RouteResult {
    pub status: RouteStatus,
    pub polyline: Vec<LatLon>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub edge_ids: Vec<EdgeId>,
    /// Human-readable diagnostics; empty on success.
    pub error_message: String,
}

impl RouteResult {
    fn empty_ok() -> Self {
        Self {
            status: RouteStatus::Ok,
            polyline: Vec::new(),
            distance_m: 0.0,
            duration_s: 0.0,
            edge_ids: Vec::new(),
            error_message: String::new(),
        }
    }

    fn failure(status: RouteStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            polyline: Vec::new(),
            distance_m: 0.0,
            duration_s: 0.0,
            edge_ids: Vec::new(),
            error_message: message.into(),
        }
    }
}

/// Router configuration.
#[derive(Debug, Copy, Clone)]
pub struct RouterOptions {
    /// Zoom level of the container's tiles; must match the converter.
    pub tile_zoom: u8,
    /// LRU capacity of the tile cache; zero disables caching.
    pub tile_cache_capacity: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            tile_zoom: 14,
            tile_cache_capacity: 128,
        }
    }
}

#[derive(Debug, Error)]
enum SegmentError {
    #[error("no tiles cover the requested region")]
    NoTile,
    #[error("could not snap the {0} waypoint to a traversable edge")]
    Snap(&'static str),
    #[error("no path between the snapped endpoints")]
    NoPath,
    #[error("invalid tile data: {0}")]
    Data(#[from] TileDecodeError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SegmentError {
    fn status(&self) -> RouteStatus {
        match self {
            SegmentError::NoTile => RouteStatus::NoTile,
            SegmentError::Snap(_) | SegmentError::NoPath => RouteStatus::NoRoute,
            SegmentError::Data(_) => RouteStatus::DataError,
            SegmentError::Internal(_) => RouteStatus::InternalError,
        }
    }
}

/// One routed leg between two consecutive waypoints.
struct Segment {
    polyline: Vec<Coord<f64>>,
    distance_m: f64,
    duration_s: f64,
    edge_ids: Vec<EdgeId>,
}

/// An offline router over a tile container.
///
/// Queries are synchronous; concurrent queries against one instance
/// require external serialization.
pub struct Router {
    store: TileStore,
    tile_zoom: u8,
}

impl Router {
    /// Opens the container at `path`.
    ///
    /// # Errors
    ///
    /// Container-open failures are fatal and surface here; everything
    /// later is reported through [`RouteResult`].
    pub fn open(path: impl AsRef<Path>, options: RouterOptions) -> Result<Self, StoreError> {
        Ok(Self {
            store: TileStore::open(path, options.tile_cache_capacity)?,
            tile_zoom: options.tile_zoom,
        })
    }

    /// Computes the shortest-time route through the waypoints.
    ///
    /// Waypoints are routed pairwise and the legs concatenated; at least
    /// two are required.
    pub fn route(&self, profile: Profile, waypoints: &[LatLon]) -> RouteResult {
        if waypoints.len() < 2 {
            return RouteResult::failure(
                RouteStatus::InternalError,
                "need at least 2 waypoints",
            );
        }

        let mut total = RouteResult::empty_ok();
        for pair in waypoints.windows(2) {
            match self.route_segment(profile, pair[0].to_coord(), pair[1].to_coord()) {
                Ok(segment) => append_segment(&mut total, segment),
                Err(error) => {
                    debug!(%error, "segment routing failed");
                    return RouteResult::failure(error.status(), error.to_string());
                }
            }
        }
        total
    }

    fn route_segment(
        &self,
        profile: Profile,
        start: Coord<f64>,
        end: Coord<f64>,
    ) -> Result<Segment, SegmentError> {
        let tiles = self.load_tile_set(start, end)?;
        debug!(tiles = tiles.len(), "assembled tile set");

        let start_snap =
            snap_point(&tiles, start, profile).ok_or(SegmentError::Snap("start"))?;
        let end_snap = snap_point(&tiles, end, profile).ok_or(SegmentError::Snap("end"))?;
        trace!(
            start_m = start_snap.distance_m,
            end_m = end_snap.distance_m,
            "snapped endpoints"
        );

        // Coincident projections need no search at all.
        if start_snap.projected == end_snap.projected {
            let key = tiles[start_snap.tile].key;
            let id = EdgeId::try_from_components(key.z, key.x, key.y, start_snap.edge)
                .map_err(|e| SegmentError::Internal(e.to_string()))?;
            return Ok(Segment {
                polyline: vec![start_snap.projected],
                distance_m: 0.0,
                duration_s: 0.0,
                edge_ids: vec![id],
            });
        }

        let mut graph = SearchGraph::build(&tiles, profile);
        let source = graph
            .attach_start(&start_snap, &tiles, profile)
            .ok_or_else(|| SegmentError::Internal("snapped to impassable edge".into()))?;
        let target = graph
            .attach_end(&end_snap, &tiles, profile)
            .ok_or_else(|| SegmentError::Internal("snapped to impassable edge".into()))?;
        graph.attach_span(source, target, &start_snap, &end_snap, &tiles, profile);

        let path = bidirectional_search(&graph, source, target, profile)
            .ok_or(SegmentError::NoPath)?;
        assemble(&graph, &tiles, &path)
    }

    /// Loads every tile in the expanded rectangle spanning the endpoints.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn load_tile_set(
        &self,
        start: Coord<f64>,
        end: Coord<f64>,
    ) -> Result<Vec<LoadedTile>, SegmentError> {
        let crow_km = Haversine.distance(start.into(), end.into()) / 1000.0;
        let frame = ((crow_km / FRAME_STEP_KM).ceil() as i64 + 1).clamp(MIN_FRAME, MAX_FRAME);

        let a = TileKey::containing(start.y, start.x, self.tile_zoom);
        let b = TileKey::containing(end.y, end.x, self.tile_zoom);
        let n = 1i64 << self.tile_zoom;
        let x0 = (i64::from(a.x.min(b.x)) - frame).max(0);
        let x1 = (i64::from(a.x.max(b.x)) + frame).min(n - 1);
        let y0 = (i64::from(a.y.min(b.y)) - frame).max(0);
        let y1 = (i64::from(a.y.max(b.y)) + frame).min(n - 1);

        let mut tiles = Vec::new();
        for x in x0..=x1 {
            for y in y0..=y1 {
                let key = TileKey::new(self.tile_zoom, x as u32, y as u32);
                let Some(blob) = self.store.load(key) else {
                    continue;
                };
                let tile = LandTile::try_from(blob)?;
                if tile.node_count() < 2 || tile.edge_count() == 0 {
                    debug!(%key, "skipping under-sized tile");
                    continue;
                }
                tiles.push(LoadedTile { key, tile });
            }
        }
        if tiles.is_empty() {
            Err(SegmentError::NoTile)
        } else {
            Ok(tiles)
        }
    }
}

fn append_segment(total: &mut RouteResult, segment: Segment) {
    for point in segment.polyline {
        let point = LatLon::from(point);
        // Consecutive legs share their junction vertex once.
        if total.polyline.last() == Some(&point) {
            continue;
        }
        total.polyline.push(point);
    }
    total.distance_m += segment.distance_m;
    total.duration_s += segment.duration_s;
    for id in segment.edge_ids {
        if total.edge_ids.last() != Some(&id) {
            total.edge_ids.push(id);
        }
    }
}

const UNSET: u32 = u32::MAX;

#[derive(Copy, Clone)]
struct Label {
    g: f64,
    prev_node: u32,
    prev_pos: u32,
}

impl Label {
    const fn unreached() -> Self {
        Self {
            g: f64::INFINITY,
            prev_node: UNSET,
            prev_pos: UNSET,
        }
    }
}

struct QueueItem {
    node: u32,
    f: f64,
    g: f64,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f
    }
}
impl Eq for QueueItem {}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert for smallest-f-first.
        other.f.total_cmp(&self.f)
    }
}

/// Bidirectional A* between two graph nodes.
///
/// Returns the path as `(node, adjacency position)` references to forward
/// edges, in traversal order, or `None` when the frontiers never meet.
fn bidirectional_search(
    graph: &SearchGraph,
    source: u32,
    target: u32,
    profile: Profile,
) -> Option<Vec<(u32, u32)>> {
    if source == target {
        return Some(Vec::new());
    }

    let h_speed = heuristic_speed(profile);
    let source_coord = graph.coordinate(source);
    let target_coord = graph.coordinate(target);
    let h = |node: u32, toward: Coord<f64>| {
        Haversine.distance(graph.coordinate(node).into(), toward.into()) / h_speed
    };

    let mut forward = vec![Label::unreached(); graph.node_count()];
    let mut backward = vec![Label::unreached(); graph.node_count()];
    let mut queue_f: BinaryHeap<QueueItem> = BinaryHeap::new();
    let mut queue_b: BinaryHeap<QueueItem> = BinaryHeap::new();

    forward[source as usize].g = 0.0;
    queue_f.push(QueueItem {
        node: source,
        f: h(source, target_coord),
        g: 0.0,
    });
    backward[target as usize].g = 0.0;
    queue_b.push(QueueItem {
        node: target,
        f: h(target, source_coord),
        g: 0.0,
    });

    let mut best_mu = f64::INFINITY;
    let mut meet: Option<u32> = None;
    let mut settled: u64 = 0;

    loop {
        let f_min = queue_f.peek().map(|q| q.f);
        let b_min = queue_b.peek().map(|q| q.f);
        if f_min.is_none() && b_min.is_none() {
            break;
        }
        // Once neither frontier can beat the best meeting cost, stop.
        if meet.is_some()
            && f_min.unwrap_or(f64::INFINITY) >= best_mu
            && b_min.unwrap_or(f64::INFINITY) >= best_mu
        {
            break;
        }

        if let Some(item) = queue_f.pop()
            && item.g <= forward[item.node as usize].g
        {
            settled += 1;
            for (pos, edge) in graph.out_edges(item.node).iter().enumerate() {
                let cand = item.g + edge.weight;
                let to = edge.to as usize;
                if cand < forward[to].g {
                    #[allow(clippy::cast_possible_truncation)]
                    let pos = pos as u32;
                    forward[to] = Label {
                        g: cand,
                        prev_node: item.node,
                        prev_pos: pos,
                    };
                    queue_f.push(QueueItem {
                        node: edge.to,
                        f: cand + h(edge.to, target_coord),
                        g: cand,
                    });
                    if backward[to].g.is_finite() {
                        let mu = cand + backward[to].g;
                        if mu < best_mu {
                            best_mu = mu;
                            meet = Some(edge.to);
                        }
                    }
                }
            }
        }

        if let Some(item) = queue_b.pop()
            && item.g <= backward[item.node as usize].g
        {
            settled += 1;
            for reference in graph.in_refs(item.node) {
                let edge = graph.edge(reference.node, reference.pos);
                let cand = item.g + edge.weight;
                let from = reference.node as usize;
                if cand < backward[from].g {
                    backward[from] = Label {
                        g: cand,
                        prev_node: item.node,
                        prev_pos: reference.pos,
                    };
                    queue_b.push(QueueItem {
                        node: reference.node,
                        f: cand + h(reference.node, source_coord),
                        g: cand,
                    });
                    if forward[from].g.is_finite() {
                        let mu = cand + forward[from].g;
                        if mu < best_mu {
                            best_mu = mu;
                            meet = Some(reference.node);
                        }
                    }
                }
            }
        }
    }

    let meet = meet?;
    trace!(settled, best_mu, "search met");

    let mut refs: Vec<(u32, u32)> = Vec::new();
    let mut node = meet;
    while node != source {
        let label = forward[node as usize];
        if label.prev_node == UNSET {
            break;
        }
        refs.push((label.prev_node, label.prev_pos));
        node = label.prev_node;
    }
    refs.reverse();

    // Backward labels store each edge in its forward orientation, pointing
    // from the labelled node toward the target.
    let mut node = meet;
    while node != target {
        let label = backward[node as usize];
        if label.prev_node == UNSET {
            break;
        }
        refs.push((node, label.prev_pos));
        node = label.prev_node;
    }
    Some(refs)
}

/// Concatenates the path's edge geometry and totals.
fn assemble(
    graph: &SearchGraph,
    tiles: &[LoadedTile],
    path: &[(u32, u32)],
) -> Result<Segment, SegmentError> {
    let mut polyline: Vec<Coord<f64>> = Vec::new();
    let mut edge_ids: Vec<EdgeId> = Vec::new();
    let mut distance_m = 0.0;
    let mut duration_s = 0.0;
    let mut scratch: Vec<Coord<f64>> = Vec::with_capacity(64);
    let mut piece_points: Vec<Coord<f64>> = Vec::with_capacity(64);

    for &(node, pos) in path {
        let edge = graph.edge(node, pos);
        let loaded = &tiles[edge.host.tile];

        piece_points.clear();
        match &edge.piece {
            Piece::Whole { reversed: false } => {
                loaded
                    .tile
                    .append_edge_shape(edge.host.edge, &mut piece_points, false);
            }
            oriented => {
                scratch.clear();
                loaded
                    .tile
                    .append_edge_shape(edge.host.edge, &mut scratch, false);
                match oriented {
                    Piece::Whole { .. } => {
                        piece_points.extend(scratch.iter().rev());
                    }
                    Piece::HeadForward(geom) => {
                        piece_points.extend_from_slice(&scratch[..=geom.segment]);
                        piece_points.push(geom.projected);
                    }
                    Piece::HeadBackward(geom) => {
                        piece_points.push(geom.projected);
                        piece_points.extend(scratch[..=geom.segment].iter().rev());
                    }
                    Piece::TailForward(geom) => {
                        piece_points.push(geom.projected);
                        piece_points.extend_from_slice(&scratch[geom.segment + 1..]);
                    }
                    Piece::TailBackward(geom) => {
                        piece_points.extend(scratch[geom.segment + 1..].iter().rev());
                        piece_points.push(geom.projected);
                    }
                    Piece::SpanForward { from, to } => {
                        piece_points.push(from.projected);
                        piece_points.extend_from_slice(&scratch[from.segment + 1..=to.segment]);
                        piece_points.push(to.projected);
                    }
                    Piece::SpanBackward { from, to } => {
                        piece_points.push(from.projected);
                        piece_points.extend(scratch[to.segment + 1..=from.segment].iter().rev());
                        piece_points.push(to.projected);
                    }
                }
            }
        }

        for &point in &piece_points {
            // Bit-identical repeats would create zero-length vertices.
            if polyline.last() == Some(&point) {
                continue;
            }
            if let Some(last) = polyline.last() {
                distance_m += Haversine.distance((*last).into(), point.into());
            }
            polyline.push(point);
        }
        duration_s += edge.weight;

        let key = loaded.key;
        let id = EdgeId::try_from_components(key.z, key.x, key.y, edge.host.edge)
            .map_err(|e| SegmentError::Internal(e.to_string()))?;
        // Virtual/real pairs over one host edge collapse to a single id.
        if edge_ids.last() != Some(&id) {
            edge_ids.push(id);
        }
    }

    Ok(Segment {
        polyline,
        distance_m,
        duration_s,
        edge_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use landtile::land_tile::{EdgeSpec, TileBuilder};

    /// Plain Dijkstra over the same graph, as an optimality oracle.
    fn dijkstra(graph: &SearchGraph, source: u32, target: u32) -> Option<f64> {
        let mut dist = vec![f64::INFINITY; graph.node_count()];
        let mut queue: BinaryHeap<QueueItem> = BinaryHeap::new();
        dist[source as usize] = 0.0;
        queue.push(QueueItem {
            node: source,
            f: 0.0,
            g: 0.0,
        });
        while let Some(item) = queue.pop() {
            if item.g > dist[item.node as usize] {
                continue;
            }
            for edge in graph.out_edges(item.node) {
                let cand = item.g + edge.weight;
                if cand < dist[edge.to as usize] {
                    dist[edge.to as usize] = cand;
                    queue.push(QueueItem {
                        node: edge.to,
                        f: cand,
                        g: cand,
                    });
                }
            }
        }
        dist[target as usize].is_finite().then(|| dist[target as usize])
    }

    fn grid_graph() -> SearchGraph {
        const SIZE: u32 = 4;
        let key = TileKey::new(14, 8718, 5685);
        let mut builder = TileBuilder::new(key);
        let unit = 0.001;
        let mut ids = Vec::new();
        for r in 0..SIZE {
            for c in 0..SIZE {
                ids.push(builder.add_node(
                    48.13 + f64::from(r) * unit,
                    11.57 + f64::from(c) * unit,
                ));
            }
        }
        let at = |r: u32, c: u32| ids[(r * SIZE + c) as usize];
        let mut speed = 5.0f32;
        for r in 0..SIZE {
            for c in 0..SIZE {
                // Vary speeds so optimal paths are not degenerate.
                speed = if speed >= 10.0 { 5.0 } else { speed + 1.7 };
                if c + 1 < SIZE {
                    builder
                        .add_edge(
                            at(r, c),
                            at(r, c + 1),
                            EdgeSpec {
                                speed_mps: Some(speed),
                                ..EdgeSpec::default()
                            },
                        )
                        .unwrap();
                }
                if r + 1 < SIZE {
                    builder
                        .add_edge(
                            at(r, c),
                            at(r + 1, c),
                            EdgeSpec {
                                speed_mps: Some(speed),
                                ..EdgeSpec::default()
                            },
                        )
                        .unwrap();
                }
            }
        }
        let tile = LandTile::try_from(Bytes::from(builder.build().unwrap())).unwrap();
        SearchGraph::build(&[LoadedTile { key, tile }], Profile::Car)
    }

    #[test]
    fn test_bidirectional_matches_dijkstra() {
        let graph = grid_graph();
        let n = u32::try_from(graph.node_count()).unwrap();
        for source in 0..n {
            for target in 0..n {
                let oracle = dijkstra(&graph, source, target);
                let found = bidirectional_search(&graph, source, target, Profile::Car)
                    .map(|path| {
                        path.iter()
                            .map(|&(u, pos)| graph.edge(u, pos).weight)
                            .sum::<f64>()
                    });
                match (oracle, found) {
                    (Some(expected), Some(actual)) => {
                        assert!(
                            (expected - actual).abs() < 1e-9,
                            "{source}->{target}: {expected} vs {actual}"
                        );
                    }
                    (None, found) => assert!(found.is_none()),
                    (Some(expected), None) => {
                        panic!("{source}->{target}: missed path of cost {expected}")
                    }
                }
            }
        }
    }

    #[test]
    fn test_path_edges_are_contiguous() {
        let graph = grid_graph();
        let path = bidirectional_search(&graph, 0, 15, Profile::Car).unwrap();
        assert!(!path.is_empty());
        let mut at = 0u32;
        for &(node, pos) in &path {
            assert_eq!(node, at);
            at = graph.edge(node, pos).to;
        }
        assert_eq!(at, 15);
    }
}
