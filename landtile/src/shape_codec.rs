//! # Shape encoding/decoding
//!
//! Compact edge geometry is stored as a polyline5 string: each coordinate
//! is a ZigZag-encoded delta in 1e-5 degrees from the previous point,
//! split into 5-bit chunks biased by 63, with the 0x20 bit marking
//! continuation. Decoding accumulates from (0, 0).

use geo::{Coord, coord};

const PRECISION: f64 = 1e-5;

/// Decodes a polyline5 string into coordinates (x = lon, y = lat).
///
/// The decoder is total: it consumes chunks until the input runs out,
/// so a malformed tail yields at most one garbage trailing point rather
/// than an error.
pub fn decode_polyline(encoded: &str) -> Vec<Coord<f64>> {
    let bytes = encoded.as_bytes();
    // Each point costs at least four chars in practice thanks to delta encoding.
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(bytes.len() / 4);
    let mut idx = 0;
    let mut lat: i32 = 0;
    let mut lon: i32 = 0;
    while idx < bytes.len() {
        lat = lat.wrapping_add(next_value(bytes, &mut idx));
        lon = lon.wrapping_add(next_value(bytes, &mut idx));
        coords.push(coord! {
            x: f64::from(lon) * PRECISION,
            y: f64::from(lat) * PRECISION,
        });
    }
    coords
}

fn next_value(bytes: &[u8], idx: &mut usize) -> i32 {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        if *idx >= bytes.len() {
            break;
        }
        let b = bytes[*idx].wrapping_sub(63);
        *idx += 1;
        if shift < 32 {
            result |= u32::from(b & 0x1f) << shift;
        }
        shift += 5;
        if b < 0x20 {
            break;
        }
    }
    // ZigZag: the low bit carries the sign.
    if result & 1 != 0 {
        !(result >> 1) as i32
    } else {
        (result >> 1) as i32
    }
}

/// Encodes coordinates (x = lon, y = lat) as a polyline5 string.
///
/// Exact inverse of [`decode_polyline`] up to the 1e-5 degree grid.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_polyline(coords: &[Coord<f64>]) -> String {
    let mut out = String::with_capacity(coords.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;
    for c in coords {
        let lat = (c.y / PRECISION).round() as i64;
        let lon = (c.x / PRECISION).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lon - prev_lon, &mut out);
        prev_lat = lat;
        prev_lon = lon;
    }
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_value(delta: i64, out: &mut String) {
    let mut v = ((delta << 1) ^ (delta >> 63)) as u64;
    loop {
        let mut chunk = (v & 0x1f) as u8;
        v >>= 5;
        if v != 0 {
            chunk |= 0x20;
        }
        out.push(char::from(chunk + 63));
        if v == 0 {
            break;
        }
    }
}
