//!
//! The gridder core: constructs the rendezvous maps once per target
//! geometry, then runs the parallel accumulation loop on every `grid()`
//! call.
//!
//! Output pixels are addressed by a packed integer `P = x * MAX_Y + y`
//! (see [`MAX_Y`]) so the hash tables can use a plain integer key instead of
//! a custom hasher over a `(usize, usize)` pair.
//!
use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::cube::{Cube, GridFloat};
use crate::error::{GridError, GridResult};
use crate::healpix;
use crate::kernel::KernelParams;
use crate::lookup::{self, DiscCache, TargetPixelsByHpx};
use crate::shapes;
use crate::sphgeom::{great_circle_bearing, true_angular_distance};

/// Upper bound on the `y` coordinate packed into an output-pixel index: `P =
/// x * MAX_Y + y` requires `y < MAX_Y`.
pub const MAX_Y: u64 = 1 << 30;

/// Pack a 2D pixel coordinate into the integer key used by the rendezvous
/// maps.
#[inline]
pub fn pack_pixel(x: usize, y: usize) -> u64 {
    debug_assert!((y as u64) < MAX_Y, "y must satisfy y < 2^30");
    (x as u64) * MAX_Y + (y as u64)
}

/// Inverse of [`pack_pixel`].
#[inline]
pub fn unpack_pixel(p: u64) -> (usize, usize) {
    ((p / MAX_Y) as usize, (p % MAX_Y) as usize)
}

/// HEALPix rebuilds are skipped when the requested support radius and
/// resolution haven't moved by more than this, in radians (~0.1 arcsecond).
const GEOMETRY_REBUILD_TOLERANCE_RAD: f64 = 3e-5;

struct KernelState {
    params: KernelParams,
    support_radius_deg: f64,
    support_radius_rad: f64,
    hpx_max_resolution_rad: f64,
}

/// The convolutional resampling engine.
///
/// Constructed once per target geometry via [`Gridder::from_projection`] or
/// [`Gridder::from_sightline`]; `set_kernel` is called before each gridding
/// campaign, and `grid` may be called repeatedly to accumulate further
/// samples into the same cubes.
pub struct Gridder<T: GridFloat> {
    shape: (usize, usize, usize),
    /// Valid output pixels, as `(P, lon_rad, lat_rad)`. Pixels with
    /// non-finite projected coordinates were already dropped by the shape
    /// assembler.
    pixels: Vec<(u64, f64, f64)>,
    kernel: Option<KernelState>,
    nside: u32,
    disc_size_rad: f64,
    target_pixels_by_hpx: TargetPixelsByHpx,
    disc_cache: DiscCache,
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
    datacube: Cube<T>,
    weightscube: Cube<T>,
}

impl<T: GridFloat> Gridder<T> {
    fn new_internal(
        shape: (usize, usize, usize),
        pixels: Vec<(u64, f64, f64)>,
        datacube: Option<Vec<T>>,
        weightscube: Option<Vec<T>>,
    ) -> GridResult<Self> {
        let datacube = match datacube {
            Some(v) => Cube::from_vec(v, shape)
                .ok_or_else(|| GridError::GeometryError("datacube shape mismatch".into()))?,
            None => Cube::zeros(shape),
        };
        let weightscube = match weightscube {
            Some(v) => Cube::from_vec(v, shape)
                .ok_or_else(|| GridError::GeometryError("weightscube shape mismatch".into()))?,
            None => Cube::zeros(shape),
        };

        Ok(Gridder {
            shape,
            pixels,
            kernel: None,
            nside: 1,
            disc_size_rad: 0.0,
            target_pixels_by_hpx: HashMap::new(),
            disc_cache: DiscCache::new(),
            num_threads: rayon::current_num_threads(),
            pool: None,
            datacube,
            weightscube,
        })
    }

    /// Construct a gridder over a rectangular `(C, Ny, Nx)` projection grid,
    /// where `pixel_to_world` maps 1-indexed `(x, y)` arrays to `(lon_deg,
    /// lat_deg)` arrays (`NaN`/`inf` marks "outside the projection").
    pub fn from_projection(
        shape: (usize, usize, usize),
        pixel_to_world: impl Fn(&[f64], &[f64]) -> (Vec<f64>, Vec<f64>),
        datacube: Option<Vec<T>>,
        weightscube: Option<Vec<T>>,
    ) -> GridResult<Self> {
        let (_, ny, nx) = shape;
        let pixels = shapes::projection_pixels(ny, nx, pixel_to_world);
        Self::new_internal(shape, pixels, datacube, weightscube)
    }

    /// Construct a gridder over a flat sight-line list, treated as shape
    /// `(C, 1, N)`.
    pub fn from_sightline(
        lons_deg: &[f64],
        lats_deg: &[f64],
        spectral_length: usize,
        datacube: Option<Vec<T>>,
        weightscube: Option<Vec<T>>,
    ) -> GridResult<Self> {
        if lons_deg.len() != lats_deg.len() {
            return Err(GridError::ShapeMismatch(format!(
                "lons has length {} but lats has length {}",
                lons_deg.len(),
                lats_deg.len()
            )));
        }
        let shape = (spectral_length, 1, lons_deg.len());
        let pixels = shapes::sightline_pixels(lons_deg, lats_deg);
        Self::new_internal(shape, pixels, datacube, weightscube)
    }

    /// Select the kernel by registry name, validating parameter arity. For
    /// the table-based kernels (`vector1d`, `matrix2d`), build a
    /// [`KernelParams`] directly and call [`Gridder::set_kernel_params`].
    pub fn set_kernel(
        &mut self,
        kind: &str,
        params: &[f64],
        support_radius_deg: f64,
        hpx_max_resolution_deg: f64,
    ) -> GridResult<()> {
        let kernel_params = KernelParams::from_name(kind, params)?;
        self.set_kernel_params(kernel_params, support_radius_deg, hpx_max_resolution_deg)
    }

    /// Install an already-validated kernel. Rebuilds the HEALPix state (and
    /// invalidates the disc cache) only if the resolution or support radius
    /// moved by more than [`GEOMETRY_REBUILD_TOLERANCE_RAD`].
    pub fn set_kernel_params(
        &mut self,
        params: KernelParams,
        support_radius_deg: f64,
        hpx_max_resolution_deg: f64,
    ) -> GridResult<()> {
        let support_radius_rad = support_radius_deg.to_radians();
        let hpx_max_resolution_rad = hpx_max_resolution_deg.to_radians();

        let needs_rebuild = match &self.kernel {
            None => true,
            Some(state) => {
                (state.support_radius_rad - support_radius_rad).abs()
                    > GEOMETRY_REBUILD_TOLERANCE_RAD
                    || (state.hpx_max_resolution_rad - hpx_max_resolution_rad).abs()
                        > GEOMETRY_REBUILD_TOLERANCE_RAD
            }
        };

        if needs_rebuild {
            let nside = healpix::nside_for_resolution(hpx_max_resolution_rad);
            let hpx_resolution_rad = healpix::resolution(nside);
            let disc_size_rad = support_radius_rad + hpx_resolution_rad;
            debug!(
                "rebuilding HEALPix state: nside {} -> {nside}, resolution {:.3e} rad, disc_size {:.3e} rad",
                self.nside, hpx_resolution_rad, disc_size_rad
            );
            self.nside = nside;
            self.disc_size_rad = disc_size_rad;
            self.target_pixels_by_hpx = lookup::build_target_pixels_by_hpx(nside, &self.pixels);
            self.disc_cache.clear();
        }

        self.kernel = Some(KernelState {
            params,
            support_radius_deg,
            support_radius_rad,
            hpx_max_resolution_rad,
        });
        Ok(())
    }

    /// Configure the size of the per-gridder `rayon` thread pool used by
    /// `grid`'s accumulation loop.
    pub fn set_num_threads(&mut self, n: usize) {
        self.num_threads = n.max(1);
        self.pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .ok();
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Accumulate one batch of samples into `datacube`/`weightscube`.
    /// `weights = None` defaults to all-ones.
    pub fn grid(
        &mut self,
        lons_deg: &[f64],
        lats_deg: &[f64],
        data: &[Vec<T>],
        weights: Option<&[Vec<T>]>,
    ) -> GridResult<()> {
        let kernel = self.kernel.as_ref().ok_or(GridError::KernelNotSet)?;

        let n = lons_deg.len();
        if lats_deg.len() != n {
            return Err(GridError::ShapeMismatch(format!(
                "lons has length {n} but lats has length {}",
                lats_deg.len()
            )));
        }
        if data.len() != n {
            return Err(GridError::ShapeMismatch(format!(
                "lons has length {n} but data has {} rows",
                data.len()
            )));
        }
        let c = self.shape.0;
        for (i, row) in data.iter().enumerate() {
            if row.len() != c {
                return Err(GridError::ShapeMismatch(format!(
                    "data row {i} has length {} but spectral length is {c}",
                    row.len()
                )));
            }
        }

        let owned_weights;
        let weights: &[Vec<T>] = match weights {
            Some(w) => {
                if w.len() != n {
                    return Err(GridError::ShapeMismatch(format!(
                        "lons has length {n} but weights has {} rows",
                        w.len()
                    )));
                }
                for (i, row) in w.iter().enumerate() {
                    if row.len() != c {
                        return Err(GridError::ShapeMismatch(format!(
                            "weights row {i} has length {} but spectral length is {c}",
                            row.len()
                        )));
                    }
                }
                w
            }
            None => {
                owned_weights = vec![vec![T::one(); c]; n];
                &owned_weights
            }
        };

        let start = Instant::now();

        let lons_rad: Vec<f64> = lons_deg.iter().map(|d| d.to_radians()).collect();
        let lats_rad: Vec<f64> = lats_deg.iter().map(|d| d.to_radians()).collect();

        let output_to_inputs = lookup::build_output_to_inputs(
            self.nside,
            self.disc_size_rad,
            &self.target_pixels_by_hpx,
            &mut self.disc_cache,
            &lons_rad,
            &lats_rad,
        );

        let touched: Vec<&(u64, f64, f64)> = self
            .pixels
            .iter()
            .filter(|(p, _, _)| output_to_inputs.contains_key(p))
            .collect();

        let support_radius_deg = kernel.support_radius_deg;
        let bearing_needed = kernel.params.bearing_needed();
        let params = &kernel.params;

        let compute_pixel = |&&(p, lon_p, lat_p): &&(u64, f64, f64)| -> (u64, Vec<T>, Vec<T>) {
            let mut dcontrib = vec![T::zero(); c];
            let mut wcontrib = vec![T::zero(); c];
            if let Some(samples) = output_to_inputs.get(&p) {
                for &i in samples {
                    let d_deg =
                        true_angular_distance(lon_p, lat_p, lons_rad[i], lats_rad[i]).to_degrees();
                    if d_deg >= support_radius_deg {
                        continue;
                    }
                    let bearing = if bearing_needed {
                        great_circle_bearing(lon_p, lat_p, lons_rad[i], lats_rad[i])
                    } else {
                        0.0
                    };
                    let w_s = T::from_f64(params.evaluate(d_deg, bearing));
                    for z in 0..c {
                        let wi = weights[i][z];
                        dcontrib[z] = dcontrib[z] + data[i][z] * wi * w_s;
                        wcontrib[z] = wcontrib[z] + wi * w_s;
                    }
                }
            }
            (p, dcontrib, wcontrib)
        };

        // Each output pixel's contribution is computed independently (the
        // hot part of the loop); workers never write into a shared
        // accumulator, so there is nothing to lock. The per-pixel results
        // are scattered into `datacube`/`weightscube` in a cheap serial pass
        // below, since arbitrary-index concurrent writes into one `Vec`
        // aren't expressible without `unsafe`.
        let run = |iter: &[&(u64, f64, f64)]| -> Vec<(u64, Vec<T>, Vec<T>)> {
            iter.par_iter().with_min_len(100).map(compute_pixel).collect()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(|| run(&touched)),
            None => run(&touched),
        };

        for (p, dcontrib, wcontrib) in results {
            let (x, y) = unpack_pixel(p);
            for z in 0..c {
                self.datacube.add(z, y, x, dcontrib[z]);
                self.weightscube.add(z, y, x, wcontrib[z]);
            }
        }

        info!(
            "grid(): {n} samples, {} touched pixels, {} threads, {:.3}s",
            touched.len(),
            self.num_threads,
            start.elapsed().as_secs_f64()
        );
        debug!(
            "disc cache: {} hits, {} misses",
            self.disc_cache.hits(),
            self.disc_cache.misses()
        );

        Ok(())
    }

    /// `datacube / weightscube`, element-wise; zero-weight pixels stay zero.
    pub fn get_datacube(&self) -> Cube<T> {
        self.datacube.divided_by(&self.weightscube)
    }

    pub fn get_weights(&self) -> &Cube<T> {
        &self.weightscube
    }

    pub fn get_unweighted_datacube(&self) -> &Cube<T> {
        &self.datacube
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn grid_3x3(center_lon: f64, center_lat: f64) -> Gridder<f64> {
        // A 3x3 plate-carree-ish patch centered on (center_lon, center_lat),
        // one degree per pixel, column-major x = lon offset, row-major y =
        // lat offset (both -1, 0, +1 degrees).
        Gridder::from_projection(
            (1, 3, 3),
            move |xs, ys| {
                let lons = xs.iter().map(|&x| center_lon + (x - 2.0)).collect();
                let lats = ys.iter().map(|&y| center_lat + (y - 2.0)).collect();
                (lons, lats)
            },
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let p = pack_pixel(123, 456);
        assert_eq!(unpack_pixel(p), (123, 456));
    }

    #[test]
    fn single_point_gauss1d_center_pixel() {
        let mut g = grid_3x3(0.0, 0.0);
        g.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g.grid(&[0.0], &[0.0], &[vec![2.0]], Some(&[vec![1.0]]))
            .unwrap();
        let out = g.get_datacube();
        // Center pixel is (x=1, y=1) in the 3x3 grid.
        assert!((out.get(0, 1, 1) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn corner_pixel_weighted_by_kernel_at_sqrt2_degrees() {
        let mut g = grid_3x3(0.0, 0.0);
        g.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g.grid(&[0.0], &[0.0], &[vec![2.0]], Some(&[vec![1.0]]))
            .unwrap();
        let out = g.get_datacube();
        // Every pixel that received any contribution normalizes back to the
        // sample's own value (single contributing sample).
        assert!((out.get(0, 0, 0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sample_outside_support_leaves_cubes_untouched() {
        let mut g = grid_3x3(0.0, 0.0);
        g.set_kernel("gauss1d", &[0.1], 0.3, 0.1).unwrap();
        // 10 degrees away: well outside support radius and disc padding.
        g.grid(&[10.0], &[10.0], &[vec![5.0]], Some(&[vec![1.0]]))
            .unwrap();
        let weights = g.get_weights();
        for z in 0..1 {
            for y in 0..3 {
                for x in 0..3 {
                    assert_eq!(weights.get(z, y, x), 0.0);
                }
            }
        }
    }

    #[test]
    fn grid_requires_kernel_first() {
        let mut g = grid_3x3(0.0, 0.0);
        let err = g.grid(&[0.0], &[0.0], &[vec![1.0]], None).unwrap_err();
        assert!(matches!(err, GridError::KernelNotSet));
    }

    #[test]
    fn repeated_grid_calls_accumulate() {
        let mut g1 = grid_3x3(0.0, 0.0);
        g1.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g1.grid(&[0.0], &[0.0], &[vec![1.0]], Some(&[vec![1.0]]))
            .unwrap();
        g1.grid(&[0.2], &[0.0], &[vec![3.0]], Some(&[vec![1.0]]))
            .unwrap();

        let mut g2 = grid_3x3(0.0, 0.0);
        g2.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g2.grid(
            &[0.0, 0.2],
            &[0.0, 0.0],
            &[vec![1.0], vec![3.0]],
            Some(&[vec![1.0], vec![1.0]]),
        )
        .unwrap();

        let out1 = g1.get_datacube();
        let out2 = g2.get_datacube();
        for z in 0..1 {
            for y in 0..3 {
                for x in 0..3 {
                    assert!((out1.get(z, y, x) - out2.get(z, y, x)).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn sightline_single_point_identity() {
        let mut g = Gridder::from_sightline(&[45.0], &[30.0], 3, None, None).unwrap();
        g.set_kernel("gauss1d", &[0.1], 0.5, 0.05).unwrap();
        g.grid(
            &[45.0],
            &[30.0],
            &[vec![1.0, 2.0, 3.0]],
            Some(&[vec![1.0, 1.0, 1.0]]),
        )
        .unwrap();
        let out = g.get_datacube();
        assert!((out.get(0, 0, 0) - 1.0).abs() < 1e-9);
        assert!((out.get(1, 0, 0) - 2.0).abs() < 1e-9);
        assert!((out.get(2, 0, 0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn set_kernel_is_idempotent_for_identical_args() {
        let mut g = grid_3x3(0.0, 0.0);
        g.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g.grid(&[0.0], &[0.0], &[vec![1.0]], None).unwrap();
        let hits_before = g.disc_cache.hits();
        let misses_before = g.disc_cache.misses();
        g.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g.grid(&[0.0], &[0.0], &[vec![1.0]], None).unwrap();
        // No rebuild means the disc cache keeps accumulating hits rather
        // than being cleared back to zero misses.
        assert!(g.disc_cache.hits() + g.disc_cache.misses() >= hits_before + misses_before);
    }

    #[test]
    fn thread_count_does_not_change_result_materially() {
        let mut g1 = grid_3x3(0.0, 0.0);
        g1.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g1.set_num_threads(1);
        g1.grid(&[0.0], &[0.0], &[vec![2.0]], Some(&[vec![1.0]]))
            .unwrap();

        let mut g2 = grid_3x3(0.0, 0.0);
        g2.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
        g2.set_num_threads(4);
        g2.grid(&[0.0], &[0.0], &[vec![2.0]], Some(&[vec![1.0]]))
            .unwrap();

        let out1 = g1.get_datacube();
        let out2 = g2.get_datacube();
        for y in 0..3 {
            for x in 0..3 {
                assert!((out1.get(0, y, x) - out2.get(0, y, x)).abs() < 1e-9);
            }
        }
    }
}
