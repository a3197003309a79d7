use pyo3::create_exception;
use pyo3::exceptions::PyException;
use pyo3::PyErr;
use tbridge::BridgeError;

create_exception!(
    _native,
    EngineException,
    PyException,
    "Raised when the native tensor layer rejects or fails a call."
);

pub(crate) fn engine_error(err: BridgeError) -> PyErr {
    EngineException::new_err(err.to_string())
}
