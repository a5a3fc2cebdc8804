use pyo3::prelude::*;

mod pygridder;

use pygridder::*;

#[pymodule]
fn skygridder(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGridder>()?;
    Ok(())
}
