//! Map matching: projecting a free coordinate onto the nearest
//! traversable edge polyline.

use crate::graph::LoadedTile;
use geo::{Coord, Distance, Haversine, coord};
use landtile::Profile;

/// The result of snapping a coordinate to an edge.
#[derive(Debug, Clone)]
pub(crate) struct EdgeSnap {
    /// Index of the owning tile in the query's loaded set.
    pub tile: usize,
    /// Edge index within the tile.
    pub edge: u32,
    pub from_node: u32,
    pub to_node: u32,
    /// Index of the matched segment within the edge polyline.
    pub segment: usize,
    /// Projection parameter within the segment, in [0, 1].
    pub t_segment: f64,
    /// Arc-length fraction of the projection along the whole edge.
    pub edge_fraction: f64,
    /// The projected point (x = lon, y = lat).
    pub projected: Coord<f64>,
    /// Great-circle distance from the query point to the projection.
    pub distance_m: f64,
}

/// Finds the nearest traversable point across all loaded tiles.
///
/// Edges the profile cannot use (access bit clear or non-positive speed)
/// are skipped entirely. Ties keep the first candidate encountered.
pub(crate) fn snap_point(
    tiles: &[LoadedTile],
    point: Coord<f64>,
    profile: Profile,
) -> Option<EdgeSnap> {
    let mut best: Option<EdgeSnap> = None;
    let mut scratch: Vec<Coord<f64>> = Vec::with_capacity(64);
    let mut cumulative: Vec<f64> = Vec::with_capacity(64);

    for (tile_index, loaded) in tiles.iter().enumerate() {
        for edge_index in 0..loaded.tile.edge_count() {
            let edge = loaded.tile.edge(edge_index);
            if !edge.allows(profile) || edge.speed_for(profile) <= 0.0 {
                continue;
            }

            scratch.clear();
            loaded.tile.append_edge_shape(edge_index, &mut scratch, false);
            if scratch.len() < 2 {
                continue;
            }

            cumulative.clear();
            cumulative.push(0.0);
            for pair in scratch.windows(2) {
                let prior = *cumulative.last().unwrap_or(&0.0);
                cumulative.push(prior + Haversine.distance(pair[0].into(), pair[1].into()));
            }
            let total = *cumulative.last().unwrap_or(&0.0);

            for segment in 0..scratch.len() - 1 {
                let (projected, t_segment) =
                    project_to_segment(scratch[segment], scratch[segment + 1], point);
                let distance_m = Haversine.distance(point.into(), projected.into());
                if best.as_ref().is_none_or(|b| distance_m < b.distance_m) {
                    let along =
                        cumulative[segment] + t_segment * (cumulative[segment + 1] - cumulative[segment]);
                    best = Some(EdgeSnap {
                        tile: tile_index,
                        edge: edge_index,
                        from_node: edge.from_node(),
                        to_node: edge.to_node(),
                        segment,
                        t_segment,
                        edge_fraction: if total > 0.0 { along / total } else { 0.0 },
                        projected,
                        distance_m,
                    });
                }
            }
        }
    }
    best
}

/// Planar projection of `p` onto segment `a`→`b`, treating longitude as x
/// and latitude as y. Adequate for the short segments road shapes carry;
/// biased at high latitudes.
fn project_to_segment(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> (Coord<f64>, f64) {
    let vx = b.x - a.x;
    let vy = b.y - a.y;
    let wx = p.x - a.x;
    let wy = p.y - a.y;
    let c1 = vx * wx + vy * wy;
    let c2 = vx * vx + vy * vy;
    let t = if c2 <= 1e-12 {
        0.0
    } else {
        (c1 / c2).clamp(0.0, 1.0)
    };
    (coord! {x: a.x + t * vx, y: a.y + t * vy}, t)
}
