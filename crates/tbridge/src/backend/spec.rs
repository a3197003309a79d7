//! Contract between the bridge and a native tensor library.
//!
//! A [`TensorBackend`] provides the factory functions the bridge dispatches to, the layout and
//! device conversions applied after construction, and read-back for callers that need to see
//! tensor contents. Backends own all math; the bridge only resolves options and manages handles.

use thiserror::Error;

use crate::marshal::TensorView;
use crate::tensor::{DType, Device, HostTensor, Shape, TensorMeta};

/// Failure reported by a native backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Shape/option combination the factory rejects (negative extent, bad range, ...).
    #[error("{message}")]
    InvalidArgument { message: String },
    /// Layout conversion the backend cannot represent for this tensor.
    #[error("{message}")]
    UnsupportedLayout { message: String },
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("device {device} is not available on backend {backend}")]
    DeviceUnavailable { backend: String, device: Device },
    /// Any other native failure (allocation, device error, ...).
    #[error("{message}")]
    Execution { message: String },
}

impl BackendError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        BackendError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn unsupported_layout(message: impl Into<String>) -> Self {
        BackendError::UnsupportedLayout {
            message: message.into(),
        }
    }

    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn device_unavailable(backend: impl Into<String>, device: Device) -> Self {
        BackendError::DeviceUnavailable {
            backend: backend.into(),
            device,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// Construction options for exactly one factory call.
///
/// Mirrors a native "tensor options" aggregate: it can express dtype, device and gradient
/// tracking but not layout, which is applied as a post-construction conversion instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TensorOptions {
    dtype: Option<DType>,
    device: Option<Device>,
    requires_grad: bool,
}

impl TensorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn requires_grad(mut self, flag: bool) -> Self {
        self.requires_grad = flag;
        self
    }

    /// Requested dtype; `None` lets the factory pick its own default.
    pub fn dtype_opt(&self) -> Option<DType> {
        self.dtype
    }

    /// Requested device; `None` keeps the factory default (host, or the source tensor's device
    /// for `*_like` factories).
    pub fn device_opt(&self) -> Option<Device> {
        self.device
    }

    pub fn requires_grad_flag(&self) -> bool {
        self.requires_grad
    }
}

/// Native tensor library consumed by the bridge.
///
/// Every factory returns an owned tensor that shares no storage with its inputs.
pub trait TensorBackend: Send + Sync {
    type Tensor: Send + Sync + 'static;

    /// Returns a human-readable backend identifier (e.g. `"cpu-ref"`, `"torch"`).
    fn backend_name(&self) -> &str;

    /// Dtype used when a from-buffer request leaves the dtype unspecified.
    fn default_dtype(&self) -> DType {
        DType::F32
    }

    /// Deep-copies a borrowed caller buffer into backend-owned storage.
    ///
    /// `options` never carries a device here; from-buffer transfers after construction.
    fn from_view(
        &self,
        view: &TensorView<'_>,
        options: &TensorOptions,
    ) -> BackendResult<Self::Tensor>;

    /// Allocates a tensor whose contents are unspecified.
    fn empty(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<Self::Tensor>;

    fn zeros(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<Self::Tensor>;

    fn ones(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<Self::Tensor>;

    fn full(
        &self,
        shape: &Shape,
        value: f64,
        options: &TensorOptions,
    ) -> BackendResult<Self::Tensor>;

    /// Zero tensor with the source's shape; dtype and device default to the source's.
    fn zeros_like(
        &self,
        source: &Self::Tensor,
        options: &TensorOptions,
    ) -> BackendResult<Self::Tensor>;

    fn ones_like(
        &self,
        source: &Self::Tensor,
        options: &TensorOptions,
    ) -> BackendResult<Self::Tensor>;

    /// 1-D half-open range `[start, end)` stepped by `step`.
    fn arange(
        &self,
        start: f64,
        end: f64,
        step: f64,
        options: &TensorOptions,
    ) -> BackendResult<Self::Tensor>;

    /// 1-D tensor of `steps` evenly spaced points including both `start` and `end`.
    fn linspace(
        &self,
        start: f64,
        end: f64,
        steps: i64,
        options: &TensorOptions,
    ) -> BackendResult<Self::Tensor>;

    /// `n x m` matrix with ones on the main diagonal.
    fn eye(&self, n: i64, m: i64, options: &TensorOptions) -> BackendResult<Self::Tensor>;

    fn to_sparse(&self, tensor: Self::Tensor) -> BackendResult<Self::Tensor>;

    /// Converts into the backend's opaque optimized memory format.
    fn to_opaque(&self, tensor: Self::Tensor) -> BackendResult<Self::Tensor>;

    fn to_device(&self, tensor: Self::Tensor, device: Device) -> BackendResult<Self::Tensor>;

    fn describe(&self, tensor: &Self::Tensor) -> TensorMeta;

    /// Reads a dense row-major host copy of the tensor.
    fn to_host(&self, tensor: &Self::Tensor) -> BackendResult<HostTensor>;
}
