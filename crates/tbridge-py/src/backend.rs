use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use tbridge::backend::registry;
use tbridge::{BridgeConfig, CreationOps};

/// Initialize the backend system and ensure backends are registered
pub(crate) fn ensure_backends_registered() {
    tbridge_backend_ref_cpu::register_cpu_backend();

    #[cfg(feature = "torch")]
    tbridge_backend_torch::register_torch_backend();
}

/// Build an engine for `name`, or for the configured default backend.
pub(crate) fn create_engine(
    name: Option<&str>,
    config: &BridgeConfig,
) -> PyResult<Box<dyn CreationOps>> {
    ensure_backends_registered();

    let name = name.unwrap_or_else(|| config.backend_name());
    if !registry::has_backend(name) {
        let available = registry::list_backends();
        return Err(PyValueError::new_err(format!(
            "unknown backend: '{}'. Available backends: {}",
            name,
            available.join(", ")
        )));
    }
    registry::create_engine(name, config)
        .ok_or_else(|| PyValueError::new_err(format!("backend '{}' not available", name)))
}

/// List all available backends
#[pyfunction]
pub fn list_backends() -> PyResult<Vec<String>> {
    ensure_backends_registered();
    Ok(registry::list_backends())
}

/// Backend an `Engine()` built without arguments uses (`TBRIDGE_BACKEND`, else `cpu`).
#[pyfunction]
pub fn default_backend() -> String {
    BridgeConfig::from_env().backend_name().to_string()
}

/// JSON description of the dtype, layout and device-kind codes.
#[pyfunction]
pub fn code_table() -> PyResult<String> {
    tbridge::codes::code_table_json()
        .map_err(|e| PyRuntimeError::new_err(format!("failed to encode code table: {}", e)))
}
