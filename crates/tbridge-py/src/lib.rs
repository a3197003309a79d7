#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

mod backend;
mod engine;
mod errors;
mod logging;

#[pymodule]
fn _native(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<engine::PyEngine>()?;
    m.add("EngineException", m.py().get_type_bound::<errors::EngineException>())?;

    // Backend discovery
    m.add_function(wrap_pyfunction!(backend::list_backends, m)?)?;
    m.add_function(wrap_pyfunction!(backend::default_backend, m)?)?;
    m.add_function(wrap_pyfunction!(backend::code_table, m)?)?;

    m.add_function(wrap_pyfunction!(logging::init_logging, m)?)?;

    m.add("DTYPE_UNSPECIFIED", tbridge::codes::DTYPE_UNSPECIFIED)?;
    Ok(())
}
