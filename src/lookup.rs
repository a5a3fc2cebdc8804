//!
//! The rendezvous structures linking output pixels to the input samples that
//! contribute to them, keyed on HEALPix cell ids.
//!
//! `target_pixels_by_hpx` groups the (fixed) output pixel set by the
//! HEALPix cell their centers fall in; `output_to_inputs` is rebuilt on every
//! `grid()` call by walking each sample's `disc_cache`-memoized neighborhood.
//!
use std::collections::HashMap;

use crate::healpix;

/// HEALPix cell id -> output-pixel indices `P` whose centers fall in that
/// cell. Stable across `grid()` calls as long as the target geometry and
/// `nside` are fixed.
pub type TargetPixelsByHpx = HashMap<u32, Vec<u64>>;

/// Output-pixel index `P` -> input-sample indices that fall within
/// `disc_size` of that pixel's center. Rebuilt on every `grid()` call.
pub type OutputToInputs = HashMap<u64, Vec<usize>>;

/// Memoizes `query_disc(nside, ..., disc_size)` centered on a HEALPix cell's
/// own center, keyed by cell id. Invalidated whenever `disc_size` changes
/// (the kernel geometry tolerance check in the gridder clears it).
#[derive(Debug, Default)]
pub struct DiscCache {
    cells: HashMap<u32, Vec<u32>>,
    hits: u64,
    misses: u64,
}

impl DiscCache {
    pub fn new() -> Self {
        DiscCache::default()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// The neighbor cells of `hpx_cell` within `disc_size_rad`, computing and
    /// caching them on first access.
    pub fn neighbors(&mut self, nside: u32, hpx_cell: u32, disc_size_rad: f64) -> &[u32] {
        if self.cells.contains_key(&hpx_cell) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let (lon, lat) = healpix::pix2ang(nside, hpx_cell);
            let neighbors: Vec<u32> = healpix::query_disc(nside, lon, lat, disc_size_rad)
                .into_iter()
                .collect();
            self.cells.insert(hpx_cell, neighbors);
        }
        &self.cells[&hpx_cell]
    }
}

/// Build `target_pixels_by_hpx` for a fixed set of output pixels, each given
/// as `(p, lon_rad, lat_rad)`.
pub fn build_target_pixels_by_hpx(nside: u32, pixels: &[(u64, f64, f64)]) -> TargetPixelsByHpx {
    let mut map: TargetPixelsByHpx = HashMap::new();
    for &(p, lon, lat) in pixels {
        let h = healpix::ang2pix(nside, lon, lat);
        map.entry(h).or_default().push(p);
    }
    map
}

/// Build `output_to_inputs` for one `grid()` call: for each input sample,
/// walk the (cached) HEALPix-cell neighborhood of its own cell and register
/// it against every output pixel living in a neighbor cell.
pub fn build_output_to_inputs(
    nside: u32,
    disc_size_rad: f64,
    target_pixels_by_hpx: &TargetPixelsByHpx,
    disc_cache: &mut DiscCache,
    lons_rad: &[f64],
    lats_rad: &[f64],
) -> OutputToInputs {
    let mut map: OutputToInputs = HashMap::new();
    for i in 0..lons_rad.len() {
        let h_i = healpix::ang2pix(nside, lons_rad[i], lats_rad[i]);
        let neighbors = disc_cache.neighbors(nside, h_i, disc_size_rad).to_vec();
        for h_prime in neighbors {
            if let Some(pixels) = target_pixels_by_hpx.get(&h_prime) {
                for &p in pixels {
                    map.entry(p).or_default().push(i);
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn target_pixels_group_by_cell() {
        let nside = 8;
        let (lon0, lat0) = healpix::pix2ang(nside, 5);
        let pixels = vec![(100u64, lon0, lat0), (101u64, lon0, lat0)];
        let map = build_target_pixels_by_hpx(nside, &pixels);
        let h = healpix::ang2pix(nside, lon0, lat0);
        assert_eq!(map[&h].len(), 2);
    }

    #[test]
    fn disc_cache_memoizes() {
        let nside = 16;
        let mut cache = DiscCache::new();
        let _ = cache.neighbors(nside, 10, 0.1);
        let _ = cache.neighbors(nside, 10, 0.1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn output_to_inputs_finds_coincident_sample() {
        let nside = 32;
        let (lon, lat) = healpix::pix2ang(nside, 42);
        let pixels = vec![(7u64, lon, lat)];
        let target_map = build_target_pixels_by_hpx(nside, &pixels);
        let mut cache = DiscCache::new();
        let disc = healpix::resolution(nside) * 2.0;
        let out = build_output_to_inputs(nside, disc, &target_map, &mut cache, &[lon], &[lat]);
        assert_eq!(out[&7u64], vec![0usize]);
    }
}
