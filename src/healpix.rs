//!
//! HEALPIX algorithm transcribed from C
//!
//! The original C code is available at:
//! https://healpix.sourceforge.io/
//!
//! The original C code is licensed under the GNU General Public License v2.0
//!
//! This module implements the RING-ordering subset of HEALPix needed to use
//! the pixelization purely as an equal-area spatial hash: `pix2ang_ring` and
//! `ang2pix_ring` convert between a pixel id and a colatitude/azimuth pair,
//! and `query_disc` returns every pixel whose center falls within a given
//! angular radius of a point (with a small conservative halo).
//!
//! Polar angle (theta) is the angle from the z-axis ("North"), and azimuthal
//! angle (phi) is the angle from the x-axis ("East"). Theta is in `[0, pi]`
//! and phi is in `[0, 2*pi)`.
//!
use std::collections::HashSet;
use std::f64::consts::PI;

use num::integer::Roots;

use crate::sphgeom::wrap_2pi;

fn pix2ang_ring_z_phi(nside: u32, pix: u32) -> (f64, f64) {
    let pix = pix as i32;
    let nside = nside as i32;
    let ncap = nside * (nside - 1) * 2;
    let npix = 12 * nside * nside;
    let fact2 = 4.0 / npix as f64;
    if pix < ncap {
        // North polar cap
        let iring: i32 = (1 + (1 + 2 * pix).sqrt()) >> 1;
        let iphi = pix + 1 - 2 * iring * (iring - 1);
        let z = 1.0 - (iring * iring) as f64 * fact2;
        let phi = (iphi as f64 - 0.5) * PI / (2.0 * iring as f64);
        (z, phi)
    } else if pix < (npix - ncap) {
        // Equatorial region
        let fact1 = (nside << 1) as f64 * fact2;
        let ip = pix - ncap;
        let iring = ip / (4 * nside) + nside;
        let iphi = ip % (4 * nside) + 1;
        let fodd = match (iring + nside) & 1 {
            0 => 0.5,
            _ => 1.0,
        };
        let nl2 = 2 * nside;
        let z = (nl2 - iring) as f64 * fact1;
        let phi = (iphi as f64 - fodd) * PI / nl2 as f64;
        (z, phi)
    } else {
        // South polar cap
        let ip = npix - pix;
        let iring = (1 + (2 * ip - 1).sqrt()) >> 1;
        let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
        let z = -1.0 + (iring * iring) as f64 * fact2;
        let phi = (iphi as f64 - 0.5) * std::f64::consts::PI / (2.0 * iring as f64);
        (z, phi)
    }
}

fn ang2pix_ring_z_phi(nside: u32, z: f64, phi: f64) -> u32 {
    let nside = nside as i32;
    let za = z.abs();
    let tt = (phi % (2.0 * PI)) * 2.0 / PI;
    if za < (2.0 / 3.0) {
        // Equatorial region
        let temp1 = nside as f64 * (0.5 + tt);
        let temp2 = nside as f64 * z * 0.75;
        let jp = (temp1 - temp2) as i32;
        let jm = (temp1 + temp2) as i32;
        let ir = nside + 1 + jp - jm;
        let kshift = 1 - (ir & 1);
        let mut ip = (jp + jm - nside + kshift + 1) / 2;
        ip = ip % (4 * nside);
        (nside * (nside - 1) * 2 + (ir - 1) * 4 * nside + ip) as u32
    } else {
        // North and South polar caps
        let tp = tt.fract();
        let tmp = nside as f64 * (3.0 * (1.0 - za)).sqrt();
        let jp = (tp * tmp) as i32;
        let jm = ((1.0 - tp) * tmp) as i32;
        let ir = jp + jm + 1;
        let mut ip = (tt * ir as f64) as i32;
        ip = ip % (4 * ir);
        if z >= 0.0 {
            (2 * ir * (ir - 1) + ip) as u32
        } else {
            (12 * nside * nside - 2 * ir * (ir + 1) + ip) as u32
        }
    }
}

///
/// Convert a pixel number to a pair of angles (theta, phi) in radians
/// where theta is the polar angle and phi is the azimuthal angle.
/// The pixel number is in the range [0, 12 * nside^2).
/// The angles are in the range [0, pi] and [0, 2 * pi) respectively.
///
/// For details see: https://healpix.sourceforge.io/
///
/// # Arguments
///
///    * `nside` - The resolution parameter.
///    * `pix` - The pixel number.
///
/// # Returns
///
///    * `theta` - The polar angle in radians.
///    * `phi` - The azimuthal angle in radians.
///
pub fn pix2ang_ring(nside: u32, pix: u32) -> (f64, f64) {
    let (z, phi) = pix2ang_ring_z_phi(nside, pix);
    let theta = z.acos();
    (theta, phi)
}

pub fn ang2pix_ring(nside: u32, theta: f64, phi: f64) -> u32 {
    ang2pix_ring_z_phi(nside, theta.cos(), phi)
}

/// Total number of pixels at a given `nside`.
#[inline]
pub fn npix(nside: u32) -> u64 {
    12 * (nside as u64) * (nside as u64)
}

/// Approximate angular resolution of a pixel at `nside`, in radians.
///
/// `sqrt(pi/3) / nside`, the square root of the mean solid angle per pixel.
#[inline]
pub fn resolution(nside: u32) -> f64 {
    (PI / 3.0).sqrt() / nside as f64
}

/// Smallest power-of-two `nside` whose pixel resolution is `<= max_res_rad`.
pub fn nside_for_resolution(max_res_rad: f64) -> u32 {
    debug_assert!(max_res_rad > 0.0);
    let min_nside = (PI / 3.0).sqrt() / max_res_rad;
    let mut nside: u32 = 1;
    while (nside as f64) < min_nside {
        nside <<= 1;
    }
    nside
}

/// Convert a (longitude, latitude) pair in radians to the HEALPix id at the
/// given `nside`, in RING order.
pub fn ang2pix(nside: u32, lon_rad: f64, lat_rad: f64) -> u32 {
    let theta = PI / 2.0 - lat_rad;
    let phi = wrap_2pi(lon_rad);
    ang2pix_ring(nside, theta, phi)
}

/// Center of a HEALPix pixel as (longitude, latitude) in radians.
pub fn pix2ang(nside: u32, pix: u32) -> (f64, f64) {
    let (theta, phi) = pix2ang_ring(nside, pix);
    let lat = PI / 2.0 - theta;
    (phi, lat)
}

/// Colatitude (z = cos(theta)) corresponding to ring index `iring` in
/// `1..=4*nside-1`, along with the pixel id of the first (phi=shift) pixel of
/// the ring, the number of pixels on the ring, and the azimuthal phase shift
/// (0 or 0.5 pixel widths) applied to that ring's pixel centers.
fn ring_info(nside: u32, iring: i64) -> (f64, u64, u64, f64) {
    let nside_i = nside as i64;
    let npix_i = npix(nside) as i64;
    let fact2 = 4.0 / npix_i as f64;

    if iring < nside_i {
        // North polar cap, i = iring in [1, nside-1]
        let i = iring;
        let ring_pix_count = (4 * i) as u64;
        let start_pix = (2 * i * (i - 1)) as u64;
        let z = 1.0 - (i * i) as f64 * fact2;
        (z, start_pix, ring_pix_count, 0.5)
    } else if iring <= 3 * nside_i {
        // Equatorial belt, iring in [nside, 3*nside]
        let ncap = (nside_i * (nside_i - 1) * 2) as u64;
        let ring_pix_count = (4 * nside_i) as u64;
        let start_pix = ncap + ((iring - nside_i) * 4 * nside_i) as u64;
        let fact1 = (nside_i << 1) as f64 * fact2;
        let nl2 = 2 * nside_i;
        let z = (nl2 - iring) as f64 * fact1;
        let shift = if (iring + nside_i) & 1 == 0 { 0.5 } else { 0.0 };
        (z, start_pix, ring_pix_count, shift)
    } else {
        // South polar cap, i = 4*nside - iring in [1, nside-1]
        let i = 4 * nside_i - iring;
        let ring_pix_count = (4 * i) as u64;
        let start_pix = (npix_i - 2 * i * (i + 1)) as u64;
        let z = -(1.0 - (i * i) as f64 * fact2);
        (z, start_pix, ring_pix_count, 0.5)
    }
}

/// Ring index (1-indexed from the north pole) containing colatitude `z =
/// cos(theta)`, clipped to `[1, 4*nside-1]`.
///
/// Standard HEALPix `ring_num` derivation: inverted from the north-cap,
/// equatorial, and south-cap `z` formulas used by `ring_info`.
fn ring_num(nside: u32, z: f64) -> i64 {
    let nside_f = nside as f64;
    let mut iring = (nside_f * (2.0 - 1.5 * z) + 0.5) as i64;
    if z > 2.0 / 3.0 {
        iring = (nside_f * (3.0 * (1.0 - z)).max(0.0).sqrt() + 0.5) as i64;
        if iring == 0 {
            iring = 1;
        }
    } else if z < -2.0 / 3.0 {
        iring = (nside_f * (3.0 * (1.0 + z)).max(0.0).sqrt() + 0.5) as i64;
        if iring == 0 {
            iring = 1;
        }
        iring = 4 * nside as i64 - iring;
    }
    iring.clamp(1, 4 * nside as i64 - 1)
}

/// All HEALPix pixel ids whose centers lie within `radius_rad` of
/// `(lon_rad, lat_rad)`, plus a small conservative halo at the boundary.
///
/// Walks the rings whose colatitude band overlaps the disc and, for each
/// ring, solves the spherical triangle to find the azimuthal half-width
/// covered by the disc at that ring's colatitude.
pub fn query_disc(nside: u32, lon_rad: f64, lat_rad: f64, radius_rad: f64) -> HashSet<u32> {
    let mut result = HashSet::new();
    if radius_rad <= 0.0 {
        result.insert(ang2pix(nside, lon_rad, lat_rad));
        return result;
    }

    let theta0 = PI / 2.0 - lat_rad;
    let phi0 = wrap_2pi(lon_rad);
    let radius = radius_rad.min(PI);

    let theta_min = (theta0 - radius).max(0.0);
    let theta_max = (theta0 + radius).min(PI);

    // ring_num decreases as z decreases, i.e. as theta increases, so the
    // smaller colatitude bound gives the larger z and the smaller ring index.
    let iring_lo = ring_num(nside, theta_min.cos());
    let iring_hi = ring_num(nside, theta_max.cos());

    let cos_radius = radius.cos();
    let (sin_theta0, cos_theta0) = theta0.sin_cos();

    for iring in iring_lo..=iring_hi {
        let (z, start_pix, ring_pix_count, shift) = ring_info(nside, iring);
        let theta_ring = z.clamp(-1.0, 1.0).acos();
        let (sin_theta_ring, cos_theta_ring) = theta_ring.sin_cos();
        let denom = sin_theta0 * sin_theta_ring;

        let (phi_lo, phi_hi) = if denom.abs() < 1e-14 {
            // Degenerate ring (pole-adjacent): every pixel on it is
            // equidistant from the disc center along colatitude alone.
            if (theta0 - theta_ring).abs() <= radius {
                (phi0 - PI, phi0 + PI)
            } else {
                continue;
            }
        } else {
            let cos_dphi_bound = (cos_radius - cos_theta0 * cos_theta_ring) / denom;
            if cos_dphi_bound <= -1.0 {
                (phi0 - PI, phi0 + PI)
            } else if cos_dphi_bound >= 1.0 {
                continue;
            } else {
                let dphi = cos_dphi_bound.acos();
                (phi0 - dphi, phi0 + dphi)
            }
        };

        let dphi_unit = 2.0 * PI / ring_pix_count as f64;
        let j_lo = ((phi_lo / dphi_unit) - shift).floor() as i64 - 1;
        let j_hi = ((phi_hi / dphi_unit) - shift).ceil() as i64 + 1;
        for j in j_lo..=j_hi {
            let wrapped = j.rem_euclid(ring_pix_count as i64) as u64;
            result.insert((start_pix + wrapped) as u32);
        }
    }

    result
}
