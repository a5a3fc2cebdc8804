//!
//! The output data cubes: caller-owned `(C, Ny, Nx)` accumulators.
//!
use num::Float;

/// Element types the gridder can accumulate into: `f32` or `f64`.
///
/// The core is generic over this trait rather than hard-coding `f64`
/// everywhere, mirroring the way the camera-frame types are generic over
/// their pixel storage type.
pub trait GridFloat: Float + Send + Sync + std::iter::Sum + std::fmt::Debug + 'static {
    fn from_f64(v: f64) -> Self;
}

impl GridFloat for f32 {
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl GridFloat for f64 {
    fn from_f64(v: f64) -> Self {
        v
    }
}

/// A dense `(channels, rows, cols)` accumulator, row-major within each
/// channel plane. Not zeroed on construction — additive gridding relies on
/// the caller controlling when (and whether) the buffer is cleared.
#[derive(Debug, Clone)]
pub struct Cube<T: GridFloat> {
    data: Vec<T>,
    shape: (usize, usize, usize),
}

impl<T: GridFloat> Cube<T> {
    pub fn zeros(shape: (usize, usize, usize)) -> Self {
        let (c, ny, nx) = shape;
        Cube {
            data: vec![T::zero(); c * ny * nx],
            shape,
        }
    }

    /// Wrap a caller-supplied buffer, failing the shape check at the call
    /// site rather than here (see `GridError::GeometryError`).
    pub fn from_vec(data: Vec<T>, shape: (usize, usize, usize)) -> Option<Self> {
        let (c, ny, nx) = shape;
        if data.len() != c * ny * nx {
            return None;
        }
        Some(Cube { data, shape })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    #[inline]
    fn index(&self, z: usize, y: usize, x: usize) -> usize {
        let (_, ny, nx) = self.shape;
        (z * ny + y) * nx + x
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> T {
        self.data[self.index(z, y, x)]
    }

    #[inline]
    pub fn add(&mut self, z: usize, y: usize, x: usize, value: T) {
        let idx = self.index(z, y, x);
        self.data[idx] = self.data[idx] + value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Element-wise division of `self` by `other`, used to turn the
    /// unnormalized accumulator into the flux-conserving output cube.
    /// Pixels where `other` is zero are left as zero rather than `NaN`/`inf`.
    pub fn divided_by(&self, other: &Cube<T>) -> Cube<T> {
        debug_assert_eq!(self.shape, other.shape);
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&num, &den)| if den == T::zero() { T::zero() } else { num / den })
            .collect();
        Cube {
            data,
            shape: self.shape,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zeros_then_add_then_get() {
        let mut cube = Cube::<f64>::zeros((2, 3, 3));
        cube.add(1, 2, 0, 5.0);
        cube.add(1, 2, 0, 1.5);
        assert_eq!(cube.get(1, 2, 0), 6.5);
        assert_eq!(cube.get(0, 0, 0), 0.0);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Cube::<f32>::from_vec(vec![0.0; 5], (1, 2, 3)).is_none());
        assert!(Cube::<f32>::from_vec(vec![0.0; 6], (1, 2, 3)).is_some());
    }

    #[test]
    fn divide_zero_weight_stays_zero() {
        let mut data = Cube::<f64>::zeros((1, 1, 2));
        data.add(0, 0, 0, 4.0);
        let mut weights = Cube::<f64>::zeros((1, 1, 2));
        weights.add(0, 0, 0, 2.0);
        let out = data.divided_by(&weights);
        assert_eq!(out.get(0, 0, 0), 2.0);
        assert_eq!(out.get(0, 0, 1), 0.0);
    }
}
