use tch::{Device as TchDevice, Kind, TchError, Tensor};

use tbridge::backend::spec::{BackendError, BackendResult, TensorBackend, TensorOptions};
use tbridge::marshal::TensorView;
use tbridge::tensor::{DType, Device, DeviceKind, HostTensor, Layout, Shape, TensorMeta};

pub const BACKEND_NAME: &str = "torch";

/// A libtorch tensor owned by the bridge.
pub struct TorchTensor {
    inner: Tensor,
    layout: Layout,
}

// SAFETY: the bridge only hands out shared references to registered tensors, and every
// operation it performs through one (size, dtype, layout queries and copies into fresh
// tensors) is a read that libtorch allows from several threads at once.
unsafe impl Sync for TorchTensor {}

impl TorchTensor {
    pub fn new(inner: Tensor) -> Self {
        TorchTensor {
            inner,
            layout: Layout::Strided,
        }
    }

    fn with_layout(inner: Tensor, layout: Layout) -> Self {
        TorchTensor { inner, layout }
    }

    pub fn inner(&self) -> &Tensor {
        &self.inner
    }

    pub fn into_inner(self) -> Tensor {
        self.inner
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// Dispatches every creation factory to libtorch through `tch`.
#[derive(Clone, Debug, Default)]
pub struct TorchBackend;

impl TorchBackend {
    pub fn new() -> Self {
        TorchBackend
    }

    fn options(&self, options: &TensorOptions, default: Kind) -> BackendResult<(Kind, TchDevice)> {
        let kind = options.dtype_opt().map(kind_for).unwrap_or(default);
        let device = match options.device_opt() {
            Some(device) => tch_device(device)?,
            None => TchDevice::Cpu,
        };
        Ok((kind, device))
    }

    fn finish(&self, tensor: Tensor, options: &TensorOptions) -> BackendResult<TorchTensor> {
        if options.requires_grad_flag() {
            let dtype = dtype_for(tensor.kind())?;
            if !dtype.is_floating() {
                return Err(BackendError::invalid_argument(format!(
                    "Only Tensors of floating point and complex dtype can require gradients, got {dtype}"
                )));
            }
            return Ok(TorchTensor::new(tensor.set_requires_grad(true)));
        }
        Ok(TorchTensor::new(tensor))
    }

    fn filled_like(
        &self,
        source: &TorchTensor,
        value: f64,
        options: &TensorOptions,
    ) -> BackendResult<TorchTensor> {
        let (kind, device) = self.options(options, source.inner.kind())?;
        let device = match options.device_opt() {
            Some(_) => device,
            None => source.inner.device(),
        };
        let tensor = Tensor::f_full(source.inner.size().as_slice(), value, (kind, device))
            .map_err(native)?;
        self.finish(tensor, options)
    }
}

impl TensorBackend for TorchBackend {
    type Tensor = TorchTensor;

    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn from_view(
        &self,
        view: &TensorView<'_>,
        options: &TensorOptions,
    ) -> BackendResult<TorchTensor> {
        let dims = checked_dims(view.shape())?;
        let tensor =
            Tensor::f_from_data_size(view.bytes(), &dims, kind_for(view.dtype())).map_err(native)?;
        self.finish(tensor, options)
    }

    fn empty(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<TorchTensor> {
        let dims = checked_dims(shape)?;
        let tensor = Tensor::f_empty(dims.as_slice(), self.options(options, Kind::Float)?)
            .map_err(native)?;
        self.finish(tensor, options)
    }

    fn zeros(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<TorchTensor> {
        let dims = checked_dims(shape)?;
        let tensor = Tensor::f_zeros(dims.as_slice(), self.options(options, Kind::Float)?)
            .map_err(native)?;
        self.finish(tensor, options)
    }

    fn ones(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<TorchTensor> {
        let dims = checked_dims(shape)?;
        let tensor = Tensor::f_ones(dims.as_slice(), self.options(options, Kind::Float)?)
            .map_err(native)?;
        self.finish(tensor, options)
    }

    fn full(&self, shape: &Shape, value: f64, options: &TensorOptions) -> BackendResult<TorchTensor> {
        let dims = checked_dims(shape)?;
        let tensor = Tensor::f_full(dims.as_slice(), value, self.options(options, Kind::Float)?)
            .map_err(native)?;
        self.finish(tensor, options)
    }

    fn zeros_like(&self, source: &TorchTensor, options: &TensorOptions) -> BackendResult<TorchTensor> {
        self.filled_like(source, 0.0, options)
    }

    fn ones_like(&self, source: &TorchTensor, options: &TensorOptions) -> BackendResult<TorchTensor> {
        self.filled_like(source, 1.0, options)
    }

    fn arange(
        &self,
        start: f64,
        end: f64,
        step: f64,
        options: &TensorOptions,
    ) -> BackendResult<TorchTensor> {
        // libtorch accumulates integer ranges in i64, truncating the bounds and step.
        let floating = options.dtype_opt().map_or(true, |dtype| dtype.is_floating());
        let (first, last, stride) = if floating {
            (start, end, step)
        } else {
            (start.trunc(), end.trunc(), step.trunc())
        };
        if stride == 0.0 {
            return Err(BackendError::invalid_argument("step must be nonzero"));
        }
        if (stride > 0.0 && first > last) || (stride < 0.0 && first < last) {
            return Err(BackendError::invalid_argument(
                "upper bound and larger bound inconsistent with step sign",
            ));
        }
        let tensor =
            Tensor::f_arange_start_step(start, end, step, self.options(options, Kind::Float)?)
                .map_err(native)?;
        self.finish(tensor, options)
    }

    fn linspace(
        &self,
        start: f64,
        end: f64,
        steps: i64,
        options: &TensorOptions,
    ) -> BackendResult<TorchTensor> {
        if steps < 0 {
            return Err(BackendError::invalid_argument(
                "number of steps must be non-negative",
            ));
        }
        let tensor = Tensor::f_linspace(start, end, steps, self.options(options, Kind::Float)?)
            .map_err(native)?;
        self.finish(tensor, options)
    }

    fn eye(&self, n: i64, m: i64, options: &TensorOptions) -> BackendResult<TorchTensor> {
        if n < 0 {
            return Err(BackendError::invalid_argument(format!(
                "n must be greater or equal to 0, got {n}"
            )));
        }
        if m < 0 {
            return Err(BackendError::invalid_argument(format!(
                "m must be greater or equal to 0, got {m}"
            )));
        }
        let tensor =
            Tensor::f_eye_m(n, m, self.options(options, Kind::Float)?).map_err(native)?;
        self.finish(tensor, options)
    }

    fn to_sparse(&self, tensor: TorchTensor) -> BackendResult<TorchTensor> {
        if tensor.layout() == Layout::Sparse {
            return Ok(tensor);
        }
        let sparse_dim = tensor.inner.dim() as i64;
        tensor
            .inner
            .f_to_sparse_sparse_dim(sparse_dim)
            .map(|inner| TorchTensor::with_layout(inner, Layout::Sparse))
            .map_err(unsupported_layout)
    }

    fn to_opaque(&self, tensor: TorchTensor) -> BackendResult<TorchTensor> {
        if tensor.layout() == Layout::Opaque {
            return Ok(tensor);
        }
        if !matches!(tensor.inner.kind(), Kind::Float | Kind::BFloat16) {
            return Err(BackendError::unsupported_layout(format!(
                "opaque layout only supports float32 and bfloat16 tensors, got {:?}",
                tensor.inner.kind()
            )));
        }
        tensor
            .inner
            .f_to_mkldnn(None::<Kind>)
            .map(|inner| TorchTensor::with_layout(inner, Layout::Opaque))
            .map_err(unsupported_layout)
    }

    fn to_device(&self, tensor: TorchTensor, device: Device) -> BackendResult<TorchTensor> {
        let target = tch_device(device)?;
        let kind = tensor.inner.kind();
        tensor
            .inner
            .f_to_device_(target, kind, false, false)
            .map(|inner| TorchTensor::with_layout(inner, tensor.layout))
            .map_err(native)
    }

    fn describe(&self, tensor: &TorchTensor) -> TensorMeta {
        TensorMeta {
            shape: tensor.inner.size(),
            dtype: dtype_for(tensor.inner.kind()).unwrap_or(DType::F32),
            device: bridge_device(tensor.inner.device()),
            layout: tensor.layout(),
            requires_grad: tensor.inner.requires_grad(),
        }
    }

    fn to_host(&self, tensor: &TorchTensor) -> BackendResult<HostTensor> {
        let dtype = dtype_for(tensor.inner.kind())?;
        let dense = match tensor.layout() {
            Layout::Strided => tensor.inner.shallow_clone(),
            Layout::Sparse | Layout::Opaque => tensor
                .inner
                .f_to_dense(None::<Kind>, false)
                .map_err(native)?,
        };
        let host = dense
            .f_to_device_(TchDevice::Cpu, dense.kind(), false, false)
            .map_err(native)?
            .contiguous();
        let shape: Vec<usize> = host.size().iter().map(|&d| d as usize).collect();
        let numel: usize = shape.iter().product();
        let mut bytes = vec![0u8; numel * dtype.size_in_bytes()];
        host.f_copy_data_u8(&mut bytes, numel).map_err(native)?;
        Ok(HostTensor::new(shape, dtype, bytes))
    }
}

pub fn kind_for(dtype: DType) -> Kind {
    match dtype {
        DType::F32 => Kind::Float,
        DType::F64 => Kind::Double,
        DType::F16 => Kind::Half,
        DType::BF16 => Kind::BFloat16,
        DType::U8 => Kind::Uint8,
        DType::I8 => Kind::Int8,
        DType::I32 => Kind::Int,
        DType::I64 => Kind::Int64,
        DType::Bool => Kind::Bool,
    }
}

pub fn dtype_for(kind: Kind) -> BackendResult<DType> {
    Ok(match kind {
        Kind::Float => DType::F32,
        Kind::Double => DType::F64,
        Kind::Half => DType::F16,
        Kind::BFloat16 => DType::BF16,
        Kind::Uint8 => DType::U8,
        Kind::Int8 => DType::I8,
        Kind::Int => DType::I32,
        Kind::Int64 => DType::I64,
        Kind::Bool => DType::Bool,
        other => {
            return Err(BackendError::execution(format!(
                "torch dtype {other:?} has no bridge equivalent"
            )))
        }
    })
}

fn tch_device(device: Device) -> BackendResult<TchDevice> {
    match device.kind() {
        DeviceKind::Cpu => Ok(TchDevice::Cpu),
        DeviceKind::Cuda => {
            let index = usize::try_from(device.index()).unwrap_or(0);
            if index >= tch::Cuda::device_count() as usize {
                return Err(BackendError::device_unavailable(BACKEND_NAME, device));
            }
            Ok(TchDevice::Cuda(index))
        }
        DeviceKind::Mps => Ok(TchDevice::Mps),
    }
}

fn bridge_device(device: TchDevice) -> Device {
    match device {
        TchDevice::Cuda(index) => Device::cuda(index as i32),
        TchDevice::Mps => Device::new(DeviceKind::Mps, -1),
        _ => Device::cpu(),
    }
}

fn checked_dims(shape: &Shape) -> BackendResult<Vec<i64>> {
    if let Some(dim) = shape.first_negative() {
        return Err(BackendError::invalid_argument(format!(
            "Trying to create tensor with negative dimension {dim}: {shape}"
        )));
    }
    Ok(shape.dims().to_vec())
}

/// First line of a libtorch error; the rest is a C++ backtrace.
fn message(err: &TchError) -> String {
    let text = err.to_string();
    text.lines().next().unwrap_or_default().trim().to_string()
}

fn native(err: TchError) -> BackendError {
    BackendError::execution(message(&err))
}

fn unsupported_layout(err: TchError) -> BackendError {
    BackendError::unsupported_layout(message(&err))
}
