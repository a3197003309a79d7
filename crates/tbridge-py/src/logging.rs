use pyo3::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to stderr.
///
/// The filter comes from `directive`, then `TBRIDGE_LOG`, then `RUST_LOG`, then `warn`.
/// Returns `False` when a subscriber was already installed.
#[pyfunction]
#[pyo3(signature = (directive=None))]
pub fn init_logging(directive: Option<&str>) -> PyResult<bool> {
    let directive = directive
        .map(str::to_string)
        .or_else(tbridge::env::log_directive)
        .unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_new(&directive).map_err(|err| {
        pyo3::exceptions::PyValueError::new_err(format!(
            "invalid log directive '{directive}': {err}"
        ))
    })?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok())
}
