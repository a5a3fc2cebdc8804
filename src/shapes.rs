//!
//! The two gridder shapes: thin assemblers that materialize the array of
//! output pixel coordinates and hand it to the core engine.
//!
//! Neither shape touches HEALPix or the hash tables directly — they only
//! decide what `(P, lon, lat)` triples exist, filtering out pixels whose
//! projection is undefined (signaled by a non-finite coordinate).
//!
use log::warn;

use crate::gridder::{pack_pixel, MAX_Y};

/// Materialize the valid output pixels of a rectangular projection grid.
///
/// `pixel_to_world` maps 1-indexed integer pixel coordinates `(x+1, y+1)` to
/// `(lon_deg, lat_deg)`; a non-finite result marks a pixel outside the
/// projection's legal domain, which is silently dropped (a `warn!` is
/// emitted if more than half the pixels are dropped, since that usually
/// indicates a misconfigured projection rather than a normal sky cutout).
pub fn projection_pixels<F>(
    ny: usize,
    nx: usize,
    pixel_to_world: F,
) -> Vec<(u64, f64, f64)>
where
    F: Fn(&[f64], &[f64]) -> (Vec<f64>, Vec<f64>),
{
    assert!((nx as u64) < MAX_Y, "grid x-extent must satisfy x < 2^30");

    let mut xs = Vec::with_capacity(nx * ny);
    let mut ys = Vec::with_capacity(nx * ny);
    for y in 0..ny {
        for x in 0..nx {
            xs.push((x + 1) as f64);
            ys.push((y + 1) as f64);
        }
    }
    let (lons_deg, lats_deg) = pixel_to_world(&xs, &ys);

    let mut pixels = Vec::with_capacity(nx * ny);
    let mut dropped = 0usize;
    for y in 0..ny {
        for x in 0..nx {
            let idx = y * nx + x;
            let lon_deg = lons_deg[idx];
            let lat_deg = lats_deg[idx];
            if lon_deg.is_finite() && lat_deg.is_finite() {
                let p = pack_pixel(x, y);
                pixels.push((p, lon_deg.to_radians(), lat_deg.to_radians()));
            } else {
                dropped += 1;
            }
        }
    }

    if dropped * 2 > nx * ny && nx * ny > 0 {
        warn!(
            "projection callback returned non-finite coordinates for {dropped}/{} target pixels",
            nx * ny
        );
    }

    pixels
}

/// Materialize the output pixels of a sight-line list: shape `(C, 1, N)`,
/// `MAX_Y` packing still applies (`y` is always 0).
pub fn sightline_pixels(lons_deg: &[f64], lats_deg: &[f64]) -> Vec<(u64, f64, f64)> {
    lons_deg
        .iter()
        .zip(lats_deg.iter())
        .enumerate()
        .filter_map(|(x, (&lon_deg, &lat_deg))| {
            if lon_deg.is_finite() && lat_deg.is_finite() {
                Some((pack_pixel(x, 0), lon_deg.to_radians(), lat_deg.to_radians()))
            } else {
                None
            }
        })
        .collect()
}
