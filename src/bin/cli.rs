use clap::Parser;
use log::{debug, info};

use skygridder::Gridder;

/// Grid a synthetic set of sky samples onto a small plate-carree patch and
/// print summary statistics, mainly useful for smoke-testing a build.
#[derive(Parser, Debug)]
#[command(name = "cli", version, about)]
struct Args {
    /// Output grid rows.
    #[arg(long, default_value_t = 64)]
    ny: usize,

    /// Output grid columns.
    #[arg(long, default_value_t = 64)]
    nx: usize,

    /// Number of synthetic input samples.
    #[arg(long, default_value_t = 2000)]
    n_samples: usize,

    /// Kernel registry name: gauss1d, gauss2d, or tapered_sinc.
    #[arg(long, default_value = "gauss1d")]
    kernel: String,

    /// Gaussian sigma (or tapered_sinc sigma), in degrees.
    #[arg(long, default_value_t = 0.25)]
    sigma_deg: f64,

    /// Kernel support radius, in degrees.
    #[arg(long, default_value_t = 1.5)]
    support_radius_deg: f64,

    /// Maximum HEALPix cell size to use for the spatial hash, in degrees.
    #[arg(long, default_value_t = 0.5)]
    hpx_max_resolution_deg: f64,

    /// Worker thread count for the accumulation loop.
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

/// A low-discrepancy sequence (no external RNG dependency) covering a patch
/// of sky roughly `half_width_deg` around `(center_lon_deg, center_lat_deg)`.
fn golden_angle_samples(
    n: usize,
    center_lon_deg: f64,
    center_lat_deg: f64,
    half_width_deg: f64,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    const GOLDEN_ANGLE: f64 = 2.399963229728653;
    let mut lons = Vec::with_capacity(n);
    let mut lats = Vec::with_capacity(n);
    let mut flux = Vec::with_capacity(n);
    for i in 0..n {
        let frac = (i as f64 + 0.5) / n as f64;
        let r = half_width_deg * frac.sqrt();
        let theta = i as f64 * GOLDEN_ANGLE;
        lons.push(center_lon_deg + r * theta.cos());
        lats.push(center_lat_deg + r * theta.sin());
        flux.push(1.0 + 0.2 * (i as f64 * 0.37).sin());
    }
    (lons, lats, flux)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let center_lon_deg = 180.0;
    let center_lat_deg = 0.0;
    let half_width_deg = args.support_radius_deg * 3.0;
    let pixel_deg = 2.0 * half_width_deg / args.nx.max(args.ny) as f64;

    let ny = args.ny;
    let nx = args.nx;
    let mut gridder = Gridder::<f64>::from_projection(
        (1, ny, nx),
        move |xs, ys| {
            let lons = xs
                .iter()
                .map(|&x| center_lon_deg + (x - (nx as f64 + 1.0) / 2.0) * pixel_deg)
                .collect();
            let lats = ys
                .iter()
                .map(|&y| center_lat_deg + (y - (ny as f64 + 1.0) / 2.0) * pixel_deg)
                .collect();
            (lons, lats)
        },
        None,
        None,
    )?;

    let kernel_params: Vec<f64> = match args.kernel.as_str() {
        "gauss2d" => vec![args.sigma_deg, args.sigma_deg * 0.5, 0.0],
        "tapered_sinc" => vec![args.sigma_deg, 1.0, 2.0],
        _ => vec![args.sigma_deg],
    };
    gridder.set_kernel(
        &args.kernel,
        &kernel_params,
        args.support_radius_deg,
        args.hpx_max_resolution_deg,
    )?;
    if args.threads > 0 {
        gridder.set_num_threads(args.threads);
    }

    let (lons, lats, flux) = golden_angle_samples(
        args.n_samples,
        center_lon_deg,
        center_lat_deg,
        half_width_deg,
    );
    let data: Vec<Vec<f64>> = flux.iter().map(|&f| vec![f]).collect();
    let total_input_flux: f64 = flux.iter().sum();

    info!(
        "gridding {} samples onto a {ny}x{nx} patch (kernel={})",
        args.n_samples, args.kernel
    );
    // Integer (floor) division: on an even axis this is the pixel just past
    // true center, not a rounded or ceiling index.
    let (center_y, center_x) = (ny / 2, nx / 2);
    debug!("center pixel (row-major): y={center_y}, x={center_x}");
    gridder.grid(&lons, &lats, &data, None)?;

    let weights = gridder.get_weights();
    let unweighted = gridder.get_unweighted_datacube();
    let mut nonzero = 0usize;
    let mut total_weighted_flux = 0.0;
    for y in 0..ny {
        for x in 0..nx {
            if weights.get(0, y, x) > 0.0 {
                nonzero += 1;
            }
            total_weighted_flux += unweighted.get(0, y, x);
        }
    }

    println!("input samples:      {}", args.n_samples);
    println!("total input flux:   {total_input_flux:.4}");
    println!("nonzero output px:  {nonzero} / {}", ny * nx);
    println!("total weighted flux on grid: {total_weighted_flux:.4}");

    Ok(())
}
