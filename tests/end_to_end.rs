//! End-to-end gridding scenarios exercised through the public API only.
//!
//! Coverage targets:
//! - Single-point and flux-conservation accumulation (gauss1d)
//! - Sight-line identity for spectral data
//! - Determinism under varying thread counts
//! - Elliptical kernel (gauss2d) orientation sensitivity
//! - Accumulation equivalence of split vs. combined `grid()` calls

use skygridder::{Cube, Gridder};

/// 3x3 plate-carree patch centered on `(center_lon, center_lat)`, one degree
/// per pixel along both axes.
fn patch_3x3(center_lon: f64, center_lat: f64) -> Gridder<f64> {
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

/// A regular `n x n` plate-carree patch spanning `side_deg` degrees on a
/// side, one pixel per `side_deg / n` degrees.
fn patch_square(n: usize, side_deg: f64) -> Gridder<f64> {
    let step = side_deg / n as f64;
    Gridder::from_projection(
        (1, n, n),
        move |xs, ys| {
            let lons = xs
                .iter()
                .map(|&x| (x - (n as f64 + 1.0) / 2.0) * step)
                .collect();
            let lats = ys
                .iter()
                .map(|&y| (y - (n as f64 + 1.0) / 2.0) * step)
                .collect();
            (lons, lats)
        },
        None,
        None,
    )
    .unwrap()
}

#[test]
fn single_point_single_channel_gauss1d() {
    let mut g = patch_3x3(0.0, 0.0);
    g.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
    g.grid(&[0.0], &[0.0], &[vec![2.0]], Some(&[vec![1.0]]))
        .unwrap();

    let out = g.get_datacube();
    assert!((out.get(0, 1, 1) - 2.0).abs() < 1e-9, "center pixel");

    // Every pixel that received a contribution normalizes back to the one
    // sample's own value; the corner pixel at d = sqrt(2) degrees is still
    // within the 1.5 degree support radius.
    assert!((out.get(0, 0, 0) - 2.0).abs() < 1e-6, "corner pixel");

    let weights = g.get_weights();
    let expected_corner_weight = (-2.0_f64 / 0.25).exp(); // exp(-0.5 * 2 / 0.5^2)
    assert!((weights.get(0, 0, 0) - expected_corner_weight).abs() < 1e-9);
}

#[test]
fn flux_conservation_over_dense_patch() {
    const N: usize = 25;
    const SIDE_DEG: f64 = 10.0;
    let mut g = patch_square(N, SIDE_DEG);
    g.set_kernel("gauss1d", &[0.3], 1.0, 0.1).unwrap();

    // 1000 samples laid out on a near-uniform grid across the patch.
    let per_axis = 32usize;
    let mut lons = Vec::new();
    let mut lats = Vec::new();
    for i in 0..per_axis {
        for j in 0..per_axis {
            lons.push(-SIDE_DEG / 2.0 + SIDE_DEG * (i as f64 + 0.5) / per_axis as f64);
            lats.push(-SIDE_DEG / 2.0 + SIDE_DEG * (j as f64 + 0.5) / per_axis as f64);
        }
    }
    let n = lons.len();
    let data: Vec<Vec<f64>> = vec![vec![1.0]; n];
    let weights: Vec<Vec<f64>> = vec![vec![1.0]; n];
    g.grid(&lons, &lats, &data, Some(&weights)).unwrap();

    let out = g.get_datacube();
    // Interior pixels (well away from the patch edge, where kernel support
    // is truncated) should recover flux 1.0 to high precision.
    let margin = 5;
    for y in margin..(N - margin) {
        for x in margin..(N - margin) {
            assert!(
                (out.get(0, y, x) - 1.0).abs() < 1e-6,
                "pixel ({x},{y}) = {}",
                out.get(0, y, x)
            );
        }
    }
}

#[test]
fn sightline_identity_for_spectral_vector() {
    let mut g = Gridder::<f64>::from_sightline(&[45.0], &[30.0], 3, None, None).unwrap();
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
fn determinism_under_thread_count() {
    let lons: Vec<f64> = (0..50).map(|i| (i as f64 - 25.0) * 0.05).collect();
    let lats: Vec<f64> = (0..50).map(|i| ((i * 7) % 50) as f64 * 0.05 - 1.25).collect();
    let data: Vec<Vec<f64>> = (0..50).map(|i| vec![1.0 + i as f64 * 0.01]).collect();

    let run = |threads: usize| -> Cube<f64> {
        let mut g = patch_square(20, 4.0);
        g.set_kernel("gauss1d", &[0.3], 1.0, 0.1).unwrap();
        g.set_num_threads(threads);
        g.grid(&lons, &lats, &data, None).unwrap();
        g.get_datacube()
    };

    let single = run(1);
    let multi = run(8);
    for i in 0..single.as_slice().len() {
        let a = single.as_slice()[i];
        let b = multi.as_slice()[i];
        assert!((a - b).abs() < 1e-12, "index {i}: {a} vs {b}");
    }
}

#[test]
fn elliptical_kernel_favors_its_own_position_angle() {
    // Central output pixel at the origin; two sets of samples at the same
    // distance but different bearings from it.
    let mut g_major = patch_3x3(0.0, 0.0);
    g_major
        .set_kernel("gauss2d", &[0.5, 0.1, 45.0], 2.0, 0.3)
        .unwrap();
    // A sample northeast of center (bearing ~45 deg, along the major axis).
    g_major
        .grid(&[0.3], &[0.3], &[vec![1.0]], None)
        .unwrap();
    let along_major = g_major.get_weights().get(0, 1, 1);

    let mut g_minor = patch_3x3(0.0, 0.0);
    g_minor
        .set_kernel("gauss2d", &[0.5, 0.1, 45.0], 2.0, 0.3)
        .unwrap();
    // A sample northwest of center (bearing ~135 deg, along the minor axis),
    // same angular distance from the center pixel.
    g_minor
        .grid(&[-0.3], &[0.3], &[vec![1.0]], None)
        .unwrap();
    let along_minor = g_minor.get_weights().get(0, 1, 1);

    assert!(
        along_major > along_minor,
        "major-axis weight {along_major} should exceed minor-axis weight {along_minor}"
    );
}

#[test]
fn repeated_grid_calls_equal_one_combined_call() {
    let mut split = patch_3x3(0.0, 0.0);
    split.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
    split
        .grid(&[0.0], &[0.0], &[vec![1.0]], Some(&[vec![1.0]]))
        .unwrap();
    split
        .grid(&[0.2], &[-0.1], &[vec![3.0]], Some(&[vec![2.0]]))
        .unwrap();

    let mut combined = patch_3x3(0.0, 0.0);
    combined.set_kernel("gauss1d", &[0.5], 1.5, 0.3).unwrap();
    combined
        .grid(
            &[0.0, 0.2],
            &[0.0, -0.1],
            &[vec![1.0], vec![3.0]],
            Some(&[vec![1.0], vec![2.0]]),
        )
        .unwrap();

    let out_split = split.get_datacube();
    let out_combined = combined.get_datacube();
    for y in 0..3 {
        for x in 0..3 {
            assert!(
                (out_split.get(0, y, x) - out_combined.get(0, y, x)).abs() < 1e-9,
                "pixel ({x},{y})"
            );
        }
    }
}

#[test]
fn gauss1d_weights_are_never_negative() {
    let mut g = patch_square(10, 6.0);
    g.set_kernel("gauss1d", &[0.4], 2.0, 0.2).unwrap();
    let lons: Vec<f64> = (0..30).map(|i| (i as f64 - 15.0) * 0.2).collect();
    let lats: Vec<f64> = (0..30).map(|i| ((i * 3) % 30) as f64 * 0.2 - 3.0).collect();
    let data: Vec<Vec<f64>> = vec![vec![1.0]; 30];
    g.grid(&lons, &lats, &data, None).unwrap();

    let weights = g.get_weights();
    for v in weights.as_slice() {
        assert!(*v >= 0.0, "gauss1d kernel produced a negative weight");
    }
}
