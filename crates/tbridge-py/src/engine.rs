//! `Engine`: one backend plus the handle registry owning every tensor it created for Python.
//!
//! Handles cross into Python as plain `int`s. Every failure surfaces as `EngineException`
//! carrying the native diagnostic; no method ever returns a null handle.

use half::{bf16, f16};
use numpy::{PyArray, PyArrayMethods};
use pyo3::buffer::PyBuffer;
use pyo3::prelude::*;
use pyo3::types::{PyByteArray, PyBytes, PyDict};
use tbridge::codes;
use tbridge::{BridgeConfig, BridgeError, CreationOps, DType, Handle, HostTensor};

use crate::errors::engine_error;

const UNSPECIFIED: i32 = codes::DTYPE_UNSPECIFIED;

#[pyclass(name = "Engine", module = "tbridge._native", frozen)]
pub struct PyEngine {
    ops: Box<dyn CreationOps>,
}

#[pymethods]
impl PyEngine {
    /// Creates an engine on `backend`, or on `TBRIDGE_BACKEND` / `cpu` when omitted.
    #[new]
    #[pyo3(signature = (backend=None, *, max_handles=None))]
    fn new(backend: Option<&str>, max_handles: Option<usize>) -> PyResult<Self> {
        let mut config = BridgeConfig::from_env().clone();
        if let Some(limit) = max_handles {
            config = config.with_max_handles(limit);
        }
        let ops = crate::backend::create_engine(backend, &config)?;
        Ok(PyEngine { ops })
    }

    #[getter]
    fn backend(&self) -> String {
        self.ops.backend_name().to_string()
    }

    #[getter]
    fn live_handles(&self) -> usize {
        self.ops.live_handles()
    }

    /// Deep-copies a bytes-like object into a new tensor.
    #[pyo3(signature = (data, shape, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    #[allow(clippy::too_many_arguments)]
    fn torch_from_blob(
        &self,
        py: Python<'_>,
        data: &Bound<'_, PyAny>,
        shape: Vec<i64>,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        let bytes = read_buffer(py, data).map_err(engine_error)?;
        py.allow_threads(|| {
            self.ops
                .create_from_buffer(&bytes, &shape, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (shape, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    fn torch_empty(
        &self,
        py: Python<'_>,
        shape: Vec<i64>,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_empty(&shape, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (shape, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    fn torch_zeros(
        &self,
        py: Python<'_>,
        shape: Vec<i64>,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_zeros(&shape, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (shape, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    fn torch_ones(
        &self,
        py: Python<'_>,
        shape: Vec<i64>,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_ones(&shape, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (shape, fill_value, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    #[allow(clippy::too_many_arguments)]
    fn torch_full(
        &self,
        py: Python<'_>,
        shape: Vec<i64>,
        fill_value: f64,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_full(&shape, fill_value, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (handle, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    fn torch_zeros_like(
        &self,
        py: Python<'_>,
        handle: Handle,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_zeros_like(handle, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (handle, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    fn torch_ones_like(
        &self,
        py: Python<'_>,
        handle: Handle,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_ones_like(handle, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (start, end, step=1.0, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    #[allow(clippy::too_many_arguments)]
    fn torch_arange(
        &self,
        py: Python<'_>,
        start: f32,
        end: f32,
        step: f32,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_arange(start, end, step, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (start, end, steps, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    #[allow(clippy::too_many_arguments)]
    fn torch_linspace(
        &self,
        py: Python<'_>,
        start: f32,
        end: f32,
        steps: i32,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        py.allow_threads(|| {
            self.ops
                .create_linspace(start, end, steps, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    #[pyo3(signature = (n, m=None, dtype=UNSPECIFIED, layout=0, device=vec![0, -1], requires_grad=false))]
    #[allow(clippy::too_many_arguments)]
    fn torch_eye(
        &self,
        py: Python<'_>,
        n: i32,
        m: Option<i32>,
        dtype: i32,
        layout: i32,
        device: Vec<i32>,
        requires_grad: bool,
    ) -> PyResult<Handle> {
        let m = m.unwrap_or(n);
        py.allow_threads(|| {
            self.ops
                .create_eye(n, m, dtype, layout, &device, requires_grad)
        })
        .map_err(engine_error)
    }

    /// Releases the tensor behind `handle`; the handle is rejected afterwards.
    fn torch_delete(&self, handle: Handle) -> PyResult<()> {
        self.ops.release(handle).map_err(engine_error)
    }

    /// Shape, dtype code, layout code, `[kind, ordinal]` device and gradient flag.
    fn describe<'py>(&self, py: Python<'py>, handle: Handle) -> PyResult<Bound<'py, PyDict>> {
        let meta = self.ops.describe(handle).map_err(engine_error)?;
        let dict = PyDict::new_bound(py);
        dict.set_item("shape", meta.shape)?;
        dict.set_item("dtype", codes::encode_dtype(meta.dtype))?;
        dict.set_item("layout", codes::encode_layout(meta.layout))?;
        dict.set_item("device", tbridge::marshal::device_to_codes(meta.device).to_vec())?;
        dict.set_item("requires_grad", meta.requires_grad)?;
        Ok(dict)
    }

    /// Dense NumPy copy of the tensor behind `handle`.
    fn to_numpy<'py>(&self, py: Python<'py>, handle: Handle) -> PyResult<Bound<'py, PyAny>> {
        let host = py
            .allow_threads(|| self.ops.to_host(handle))
            .map_err(engine_error)?;
        host_to_numpy(py, &host)
    }

    fn __repr__(&self) -> String {
        format!(
            "Engine(backend='{}', live_handles={})",
            self.ops.backend_name(),
            self.ops.live_handles()
        )
    }
}

fn read_buffer(py: Python<'_>, data: &Bound<'_, PyAny>) -> Result<Vec<u8>, BridgeError> {
    if let Ok(bytes) = data.downcast::<PyBytes>() {
        return Ok(bytes.as_bytes().to_vec());
    }
    if let Ok(array) = data.downcast::<PyByteArray>() {
        return Ok(array.to_vec());
    }
    let buffer = PyBuffer::<u8>::get_bound(data).map_err(|err| {
        BridgeError::marshaling(format!("expected a bytes-like object of unsigned bytes: {err}"))
    })?;
    buffer
        .to_vec(py)
        .map_err(|err| BridgeError::marshaling(format!("could not copy buffer: {err}")))
}

fn decode<T, const N: usize>(bytes: &[u8], read: impl Fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            read(raw)
        })
        .collect()
}

// NumPy has no bfloat16, so both half types widen to float32.
fn host_to_numpy<'py>(py: Python<'py>, host: &HostTensor) -> PyResult<Bound<'py, PyAny>> {
    let shape = host.shape();
    let bytes = host.bytes();
    Ok(match host.dtype() {
        DType::F32 => PyArray::from_vec_bound(py, decode(bytes, f32::from_le_bytes))
            .reshape(shape)?
            .into_any(),
        DType::F64 => PyArray::from_vec_bound(py, decode(bytes, f64::from_le_bytes))
            .reshape(shape)?
            .into_any(),
        DType::F16 => {
            let data = decode(bytes, |raw| f16::from_le_bytes(raw).to_f32());
            PyArray::from_vec_bound(py, data).reshape(shape)?.into_any()
        }
        DType::BF16 => {
            let data = decode(bytes, |raw| bf16::from_le_bytes(raw).to_f32());
            PyArray::from_vec_bound(py, data).reshape(shape)?.into_any()
        }
        DType::U8 => PyArray::from_vec_bound(py, bytes.to_vec())
            .reshape(shape)?
            .into_any(),
        DType::I8 => PyArray::from_vec_bound(py, decode(bytes, i8::from_le_bytes))
            .reshape(shape)?
            .into_any(),
        DType::I32 => PyArray::from_vec_bound(py, decode(bytes, i32::from_le_bytes))
            .reshape(shape)?
            .into_any(),
        DType::I64 => PyArray::from_vec_bound(py, decode(bytes, i64::from_le_bytes))
            .reshape(shape)?
            .into_any(),
        DType::Bool => {
            let data: Vec<bool> = bytes.iter().map(|&b| b != 0).collect();
            PyArray::from_vec_bound(py, data).reshape(shape)?.into_any()
        }
    })
}
