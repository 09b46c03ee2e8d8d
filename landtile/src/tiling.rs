//! Web Mercator tiling math.

use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Key of a tile in the Web Mercator tiling scheme.
///
/// `z` is the zoom level; `x` and `y` are the column and row,
/// both in `[0, 2^z)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Geographic extent of a tile, in decimal degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct BBox {
    pub lat_min: f64,
    pub lon_min: f64,
    pub lat_max: f64,
    pub lon_max: f64,
}

impl TileKey {
    #[inline]
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// The tile containing the given coordinate at zoom `z`.
    ///
    /// Out-of-range coordinates clamp to the edge tiles.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn containing(lat_deg: f64, lon_deg: f64, z: u8) -> Self {
        let lat_rad = lat_deg.to_radians();
        let n = 1i64 << z;
        let x = ((lon_deg + 180.0) / 360.0 * n as f64).floor() as i64;
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n as f64).floor()
            as i64;
        Self {
            z,
            x: x.clamp(0, n - 1) as u32,
            y: y.clamp(0, n - 1) as u32,
        }
    }

    /// The tile's geographic bounds.
    pub fn bounds(&self) -> BBox {
        let n = 1i64 << self.z;
        let unit = 1.0 / n as f64;
        let lon_min = f64::from(self.x) * unit * 360.0 - 180.0;
        let lon_max = f64::from(self.x + 1) * unit * 360.0 - 180.0;
        let y0 = f64::from(self.y) * unit;
        let y1 = f64::from(self.y + 1) * unit;
        let lat_max = (PI * (1.0 - 2.0 * y0)).sinh().atan().to_degrees();
        let lat_min = (PI * (1.0 - 2.0 * y1)).sinh().atan().to_degrees();
        BBox {
            lat_min,
            lon_min,
            lat_max,
            lon_max,
        }
    }
}

impl Display for TileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}/{}/{}", self.z, self.x, self.y))
    }
}

impl BBox {
    /// Whether the coordinate falls inside the box (inclusive edges).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}
