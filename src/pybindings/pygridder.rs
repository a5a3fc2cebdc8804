use numpy as np;
use numpy::{PyArray1, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyTypeError};
use pyo3::prelude::*;

use crate::cube::{Cube, GridFloat};
use crate::error::GridError;
use crate::gridder::Gridder;

fn to_py_err(e: GridError) -> PyErr {
    PyErr::new::<PyRuntimeError, _>(e.to_string())
}

/// Dispatches the two element types the core engine is monomorphized over;
/// Python arrays carry their dtype at runtime, Rust generics don't.
enum GridderDyn {
    F32(Gridder<f32>),
    F64(Gridder<f64>),
}

#[pyclass(name = "Gridder")]
pub struct PyGridder {
    inner: GridderDyn,
}

fn cube_to_numpy<T: GridFloat + np::Element>(
    py: Python<'_>,
    cube: &Cube<T>,
) -> PyResult<PyObject> {
    let (c, ny, nx) = cube.shape();
    Ok(PyArray1::from_slice_bound(py, cube.as_slice())
        .as_gil_ref()
        .reshape([c, ny, nx])?
        .to_object(py))
}

fn grid_dispatch<T: GridFloat + np::Element>(
    g: &mut Gridder<T>,
    lons_deg: PyReadonlyArray1<f64>,
    lats_deg: PyReadonlyArray1<f64>,
    data: PyReadonlyArray2<T>,
    weights: Option<PyReadonlyArray2<T>>,
) -> PyResult<()> {
    let lons_deg = lons_deg.as_slice()?;
    let lats_deg = lats_deg.as_slice()?;
    let data: Vec<Vec<T>> = data.as_array().rows().into_iter().map(|r| r.to_vec()).collect();
    let weights: Option<Vec<Vec<T>>> = weights
        .map(|w| w.as_array().rows().into_iter().map(|r| r.to_vec()).collect());
    g.grid(lons_deg, lats_deg, &data, weights.as_deref())
        .map_err(to_py_err)
}

#[pymethods]
impl PyGridder {
    /// Build a gridder over a rectangular projection, given the already
    /// world-projected `(ny, nx)` coordinate grids (`NaN` marks pixels
    /// outside the projection's domain).
    #[staticmethod]
    #[pyo3(signature = (channels, lons_deg, lats_deg, dtype="float64"))]
    fn from_projection(
        channels: usize,
        lons_deg: PyReadonlyArray2<f64>,
        lats_deg: PyReadonlyArray2<f64>,
        dtype: &str,
    ) -> PyResult<Self> {
        let dims = lons_deg.shape().to_vec();
        let (ny, nx) = (dims[0], dims[1]);
        let lons: Vec<f64> = lons_deg.as_array().iter().copied().collect();
        let lats: Vec<f64> = lats_deg.as_array().iter().copied().collect();
        let callback = move |_xs: &[f64], _ys: &[f64]| (lons.clone(), lats.clone());

        let inner = match dtype {
            "float32" => GridderDyn::F32(
                Gridder::from_projection((channels, ny, nx), callback, None, None)
                    .map_err(to_py_err)?,
            ),
            "float64" => GridderDyn::F64(
                Gridder::from_projection((channels, ny, nx), callback, None, None)
                    .map_err(to_py_err)?,
            ),
            other => {
                return Err(to_py_err(GridError::InvalidDtype(format!(
                    "unsupported gridder dtype {other:?}, expected \"float32\" or \"float64\""
                ))))
            }
        };
        Ok(PyGridder { inner })
    }

    /// Build a gridder over a flat sight-line list, shape `(channels, 1, N)`.
    #[staticmethod]
    #[pyo3(signature = (lons_deg, lats_deg, spectral_length, dtype="float64"))]
    fn from_sightline(
        lons_deg: PyReadonlyArray1<f64>,
        lats_deg: PyReadonlyArray1<f64>,
        spectral_length: usize,
        dtype: &str,
    ) -> PyResult<Self> {
        let lons_deg = lons_deg.as_slice()?;
        let lats_deg = lats_deg.as_slice()?;
        let inner = match dtype {
            "float32" => GridderDyn::F32(
                Gridder::from_sightline(lons_deg, lats_deg, spectral_length, None, None)
                    .map_err(to_py_err)?,
            ),
            "float64" => GridderDyn::F64(
                Gridder::from_sightline(lons_deg, lats_deg, spectral_length, None, None)
                    .map_err(to_py_err)?,
            ),
            other => {
                return Err(to_py_err(GridError::InvalidDtype(format!(
                    "unsupported gridder dtype {other:?}, expected \"float32\" or \"float64\""
                ))))
            }
        };
        Ok(PyGridder { inner })
    }

    #[pyo3(signature = (kind, params, support_radius_deg, hpx_max_resolution_deg))]
    fn set_kernel(
        &mut self,
        kind: &str,
        params: Vec<f64>,
        support_radius_deg: f64,
        hpx_max_resolution_deg: f64,
    ) -> PyResult<()> {
        match &mut self.inner {
            GridderDyn::F32(g) => g
                .set_kernel(kind, &params, support_radius_deg, hpx_max_resolution_deg)
                .map_err(to_py_err),
            GridderDyn::F64(g) => g
                .set_kernel(kind, &params, support_radius_deg, hpx_max_resolution_deg)
                .map_err(to_py_err),
        }
    }

    fn set_num_threads(&mut self, n: usize) {
        match &mut self.inner {
            GridderDyn::F32(g) => g.set_num_threads(n),
            GridderDyn::F64(g) => g.set_num_threads(n),
        }
    }

    #[getter]
    fn shape(&self) -> (usize, usize, usize) {
        match &self.inner {
            GridderDyn::F32(g) => g.shape(),
            GridderDyn::F64(g) => g.shape(),
        }
    }

    #[pyo3(signature = (lons_deg, lats_deg, data, weights=None))]
    fn grid(
        &mut self,
        lons_deg: PyReadonlyArray1<f64>,
        lats_deg: PyReadonlyArray1<f64>,
        data: &Bound<'_, PyAny>,
        weights: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<()> {
        match &mut self.inner {
            GridderDyn::F32(g) => {
                let data: PyReadonlyArray2<f32> = data.extract().map_err(|_| {
                    PyTypeError::new_err("data must be a 2D float32 array for this gridder")
                })?;
                let weights: Option<PyReadonlyArray2<f32>> = weights
                    .map(|w| {
                        w.extract().map_err(|_| {
                            PyTypeError::new_err(
                                "weights must be a 2D float32 array for this gridder",
                            )
                        })
                    })
                    .transpose()?;
                grid_dispatch(g, lons_deg, lats_deg, data, weights)
            }
            GridderDyn::F64(g) => {
                let data: PyReadonlyArray2<f64> = data.extract().map_err(|_| {
                    PyTypeError::new_err("data must be a 2D float64 array for this gridder")
                })?;
                let weights: Option<PyReadonlyArray2<f64>> = weights
                    .map(|w| {
                        w.extract().map_err(|_| {
                            PyTypeError::new_err(
                                "weights must be a 2D float64 array for this gridder",
                            )
                        })
                    })
                    .transpose()?;
                grid_dispatch(g, lons_deg, lats_deg, data, weights)
            }
        }
    }

    fn get_datacube(&self, py: Python<'_>) -> PyResult<PyObject> {
        match &self.inner {
            GridderDyn::F32(g) => cube_to_numpy(py, &g.get_datacube()),
            GridderDyn::F64(g) => cube_to_numpy(py, &g.get_datacube()),
        }
    }

    fn get_weights(&self, py: Python<'_>) -> PyResult<PyObject> {
        match &self.inner {
            GridderDyn::F32(g) => cube_to_numpy(py, g.get_weights()),
            GridderDyn::F64(g) => cube_to_numpy(py, g.get_weights()),
        }
    }

    fn get_unweighted_datacube(&self, py: Python<'_>) -> PyResult<PyObject> {
        match &self.inner {
            GridderDyn::F32(g) => cube_to_numpy(py, g.get_unweighted_datacube()),
            GridderDyn::F64(g) => cube_to_numpy(py, g.get_unweighted_datacube()),
        }
    }

    fn __str__(&self) -> String {
        let (c, ny, nx) = self.shape();
        format!("Gridder(channels={c}, ny={ny}, nx={nx})")
    }
}
