//!
//! The kernel registry: a closed set of radial/elliptical weighting
//! functions consumed by the accumulation loop.
//!
//! Dispatch is a tagged variant rather than a trait object — the set of
//! kernels is fixed at compile time (see the spec's registry table), so a
//! `match` on [`KernelParams`] is all the indirection the hot loop needs.
//!
use crate::error::GridError;

/// Validated, typed parameters for one of the closed set of kernel kinds.
///
/// Distances passed to [`KernelParams::evaluate`] are in *degrees*, matching
/// the historical convention of the kernel parameter tables; bearings are in
/// radians, east of north.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelParams {
    /// Radial Gaussian: `exp(-0.5 * d^2 / sigma^2)`.
    Gauss1D { sigma_deg: f64 },
    /// Elliptical Gaussian evaluated in the frame rotated by `pa_deg`
    /// (position angle, east of north).
    Gauss2D {
        sigma_maj_deg: f64,
        sigma_min_deg: f64,
        pa_deg: f64,
    },
    /// Tapered sinc: `sinc(d / (a*sigma)) * exp(-(d / (b*sigma))^2)`.
    TaperedSinc { sigma_deg: f64, a: f64, b: f64 },
    /// Linear-interpolated 1D lookup table, indexed by distance.
    Vector1D {
        table: Vec<f64>,
        refpix: f64,
        dx: f64,
    },
    /// Bilinear-interpolated 2D lookup table, indexed by
    /// `(d*cos(bearing), d*sin(bearing))`.
    Matrix2D {
        table: Vec<Vec<f64>>,
        refpix: (f64, f64),
        d: (f64, f64),
    },
}

impl KernelParams {
    /// Construct a kernel from its registry name and a flat `f64` parameter
    /// list, validating arity. Covers the scalar-parameter kernels; the
    /// table-based kernels (`vector1d`, `matrix2d`) are constructed directly
    /// via their own variants since their parameters aren't scalar lists.
    pub fn from_name(kind: &str, params: &[f64]) -> Result<Self, GridError> {
        match kind {
            "gauss1d" => {
                expect_arity(kind, params, 1)?;
                Ok(KernelParams::Gauss1D {
                    sigma_deg: params[0],
                })
            }
            "gauss2d" => {
                expect_arity(kind, params, 3)?;
                Ok(KernelParams::Gauss2D {
                    sigma_maj_deg: params[0],
                    sigma_min_deg: params[1],
                    // Resolved open question: PA lives at index 2 (the third
                    // element of the 3-tuple), not index 3.
                    pa_deg: params[2],
                })
            }
            "tapered_sinc" => {
                expect_arity(kind, params, 3)?;
                Ok(KernelParams::TaperedSinc {
                    sigma_deg: params[0],
                    a: params[1],
                    b: params[2],
                })
            }
            other => Err(GridError::UnknownKernel(other.to_string())),
        }
    }

    /// Whether this kernel needs the great-circle bearing computed, i.e. is
    /// direction-dependent.
    pub fn bearing_needed(&self) -> bool {
        matches!(self, KernelParams::Gauss2D { .. } | KernelParams::Matrix2D { .. })
    }

    /// Evaluate the kernel weight for a sample at angular distance `d_deg`
    /// (degrees) and bearing `bearing_rad` (radians, east of north; ignored
    /// unless [`KernelParams::bearing_needed`]).
    pub fn evaluate(&self, d_deg: f64, bearing_rad: f64) -> f64 {
        match self {
            KernelParams::Gauss1D { sigma_deg } => {
                (-0.5 * d_deg * d_deg / (sigma_deg * sigma_deg)).exp()
            }
            KernelParams::Gauss2D {
                sigma_maj_deg,
                sigma_min_deg,
                pa_deg,
            } => {
                let pa_rad = pa_deg.to_radians();
                // Rotate into the frame aligned with the ellipse axes.
                let dtheta = bearing_rad - pa_rad;
                let along_maj = d_deg * dtheta.cos();
                let along_min = d_deg * dtheta.sin();
                let u = along_maj / sigma_maj_deg;
                let v = along_min / sigma_min_deg;
                (-0.5 * (u * u + v * v)).exp()
            }
            KernelParams::TaperedSinc { sigma_deg, a, b } => {
                let x = d_deg / (a * sigma_deg);
                let sinc = if x.abs() < 1e-12 {
                    1.0
                } else {
                    (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
                };
                let taper = -(d_deg / (b * sigma_deg)).powi(2);
                sinc * taper.exp()
            }
            KernelParams::Vector1D { table, refpix, dx } => {
                lerp_1d(table, *refpix, *dx, d_deg)
            }
            KernelParams::Matrix2D { table, refpix, d } => {
                let x = d_deg * bearing_rad.cos();
                let y = d_deg * bearing_rad.sin();
                lerp_2d(table, *refpix, *d, x, y)
            }
        }
    }
}

fn expect_arity(kind: &str, params: &[f64], expected: usize) -> Result<(), GridError> {
    if params.len() != expected {
        return Err(GridError::ArityMismatch {
            kind: kind.to_string(),
            expected,
            got: params.len(),
        });
    }
    Ok(())
}

/// Linear interpolation of a 1D table at position `x`, where the table's
/// index `refpix` corresponds to `x == 0` and successive samples are spaced
/// `dx` apart. Returns 0 outside the table's range.
fn lerp_1d(table: &[f64], refpix: f64, dx: f64, x: f64) -> f64 {
    if table.is_empty() || dx == 0.0 {
        return 0.0;
    }
    let pos = refpix + x / dx;
    if pos < 0.0 || pos > (table.len() - 1) as f64 {
        return 0.0;
    }
    let i0 = pos.floor() as usize;
    let frac = pos - i0 as f64;
    if i0 + 1 >= table.len() {
        table[i0]
    } else {
        table[i0] * (1.0 - frac) + table[i0 + 1] * frac
    }
}

/// Bilinear interpolation of a 2D table at `(x, y)`, where `refpix = (rx,
/// ry)` is the index of the `(x,y) == (0,0)` sample and `d = (dx, dy)` is the
/// sample spacing along each axis. Returns 0 outside the table's range.
fn lerp_2d(table: &[Vec<f64>], refpix: (f64, f64), d: (f64, f64), x: f64, y: f64) -> f64 {
    if table.is_empty() || d.0 == 0.0 || d.1 == 0.0 {
        return 0.0;
    }
    let nrows = table.len();
    let ncols = table[0].len();
    let row_pos = refpix.1 + y / d.1;
    let col_pos = refpix.0 + x / d.0;
    if row_pos < 0.0 || row_pos > (nrows - 1) as f64 || col_pos < 0.0 || col_pos > (ncols - 1) as f64
    {
        return 0.0;
    }
    let r0 = row_pos.floor() as usize;
    let c0 = col_pos.floor() as usize;
    let fr = row_pos - r0 as f64;
    let fc = col_pos - c0 as f64;
    let r1 = (r0 + 1).min(nrows - 1);
    let c1 = (c0 + 1).min(ncols - 1);

    let v00 = table[r0][c0];
    let v01 = table[r0][c1];
    let v10 = table[r1][c0];
    let v11 = table[r1][c1];
    v00 * (1.0 - fr) * (1.0 - fc)
        + v01 * (1.0 - fr) * fc
        + v10 * fr * (1.0 - fc)
        + v11 * fr * fc
}
