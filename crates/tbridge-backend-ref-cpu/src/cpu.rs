use std::sync::Arc;

use tbridge::backend::spec::{BackendError, BackendResult, TensorBackend, TensorOptions};
use tbridge::marshal::TensorView;
use tbridge::tensor::{DType, Device, HostTensor, Layout, Shape, TensorMeta};

pub const BACKEND_NAME: &str = "cpu-ref";

/// Elements per block in the opaque layout; storage is padded up to a whole block.
pub const OPAQUE_BLOCK: usize = 8;

#[derive(Clone, Debug)]
pub struct CpuTensor {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub requires_grad: bool,
    pub data: TensorData,
}

#[derive(Clone, Debug)]
pub enum TensorData {
    /// Dense row-major little-endian bytes.
    Strided(Arc<[u8]>),
    /// Coordinate format: `indices` holds `rank` coordinates per stored value, in row-major
    /// order of the stored values.
    Sparse {
        indices: Arc<[usize]>,
        values: Arc<[u8]>,
    },
    /// Dense bytes padded to a multiple of [`OPAQUE_BLOCK`] elements.
    Blocked(Arc<[u8]>),
}

impl CpuTensor {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn layout(&self) -> Layout {
        match self.data {
            TensorData::Strided(_) => Layout::Strided,
            TensorData::Sparse { .. } => Layout::Sparse,
            TensorData::Blocked(_) => Layout::Opaque,
        }
    }

    /// Number of explicitly stored values (only meaningful for sparse tensors).
    pub fn nnz(&self) -> usize {
        match &self.data {
            TensorData::Sparse { values, .. } => values.len() / self.dtype.size_in_bytes(),
            _ => self.numel(),
        }
    }

    fn dense_bytes(&self) -> Vec<u8> {
        let itemsize = self.dtype.size_in_bytes();
        let len = self.numel() * itemsize;
        match &self.data {
            TensorData::Strided(bytes) => bytes.to_vec(),
            TensorData::Blocked(bytes) => bytes[..len].to_vec(),
            TensorData::Sparse { indices, values } => {
                let mut dense = vec![0u8; len];
                let strides = compute_strides(&self.shape);
                let rank = self.shape.len();
                for (entry, value) in values.chunks_exact(itemsize).enumerate() {
                    let coords = &indices[entry * rank..(entry + 1) * rank];
                    let offset: usize = coords.iter().zip(&strides).map(|(c, s)| c * s).sum();
                    dense[offset * itemsize..(offset + 1) * itemsize].copy_from_slice(value);
                }
                dense
            }
        }
    }
}

/// Host-only reference implementation of every creation factory.
///
/// Fills and ranges are computed in `f64` and rounded into the requested dtype element by
/// element. `empty` zero-fills.
#[derive(Clone, Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }

    fn check_device(&self, device: Option<Device>) -> BackendResult<()> {
        match device {
            Some(device) if !device.is_cpu() => {
                Err(BackendError::device_unavailable(BACKEND_NAME, device))
            }
            _ => Ok(()),
        }
    }

    fn build(
        &self,
        dims: Vec<usize>,
        dtype: DType,
        options: &TensorOptions,
        value_at: impl Fn(usize) -> f64,
    ) -> BackendResult<CpuTensor> {
        self.check_device(options.device_opt())?;
        check_requires_grad(dtype, options.requires_grad_flag())?;
        let numel: usize = dims.iter().product();
        let itemsize = dtype.size_in_bytes();
        let mut bytes = allocate(&dims, numel, itemsize)?;
        for (index, chunk) in bytes.chunks_exact_mut(itemsize).enumerate() {
            dtype.write_f64(value_at(index), chunk);
        }
        Ok(CpuTensor {
            shape: dims,
            dtype,
            requires_grad: options.requires_grad_flag(),
            data: TensorData::Strided(Arc::from(bytes)),
        })
    }

    fn filled(&self, shape: &Shape, value: f64, options: &TensorOptions) -> BackendResult<CpuTensor> {
        let dims = checked_dims(shape)?;
        let dtype = options.dtype_opt().unwrap_or(self.default_dtype());
        self.build(dims, dtype, options, |_| value)
    }

    fn filled_like(
        &self,
        source: &CpuTensor,
        value: f64,
        options: &TensorOptions,
    ) -> BackendResult<CpuTensor> {
        let dtype = options.dtype_opt().unwrap_or(source.dtype);
        self.build(source.shape.clone(), dtype, options, |_| value)
    }
}

impl TensorBackend for CpuBackend {
    type Tensor = CpuTensor;

    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn from_view(
        &self,
        view: &TensorView<'_>,
        options: &TensorOptions,
    ) -> BackendResult<CpuTensor> {
        self.check_device(options.device_opt())?;
        check_requires_grad(view.dtype(), options.requires_grad_flag())?;
        Ok(CpuTensor {
            shape: checked_dims(view.shape())?,
            dtype: view.dtype(),
            requires_grad: options.requires_grad_flag(),
            data: TensorData::Strided(Arc::from(view.bytes())),
        })
    }

    fn empty(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<CpuTensor> {
        self.filled(shape, 0.0, options)
    }

    fn zeros(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<CpuTensor> {
        self.filled(shape, 0.0, options)
    }

    fn ones(&self, shape: &Shape, options: &TensorOptions) -> BackendResult<CpuTensor> {
        self.filled(shape, 1.0, options)
    }

    fn full(&self, shape: &Shape, value: f64, options: &TensorOptions) -> BackendResult<CpuTensor> {
        self.filled(shape, value, options)
    }

    fn zeros_like(&self, source: &CpuTensor, options: &TensorOptions) -> BackendResult<CpuTensor> {
        self.filled_like(source, 0.0, options)
    }

    fn ones_like(&self, source: &CpuTensor, options: &TensorOptions) -> BackendResult<CpuTensor> {
        self.filled_like(source, 1.0, options)
    }

    fn arange(
        &self,
        start: f64,
        end: f64,
        step: f64,
        options: &TensorOptions,
    ) -> BackendResult<CpuTensor> {
        if !(start.is_finite() && end.is_finite()) {
            return Err(BackendError::invalid_argument(format!(
                "unsupported range: {start} -> {end}"
            )));
        }
        let dtype = options.dtype_opt().unwrap_or(self.default_dtype());
        // Integer dtypes accumulate in i64, so the bounds and step are truncated first.
        let (first, last, stride) = if dtype.is_floating() {
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
        let len = if dtype == DType::I64 {
            ((last - first) / stride).ceil()
        } else {
            ((end - start) / step).ceil()
        };
        if !len.is_finite() || len > isize::MAX as f64 {
            return Err(BackendError::invalid_argument(format!(
                "invalid size, possible overflow? arange({start}, {end}, {step})"
            )));
        }
        self.build(vec![len.max(0.0) as usize], dtype, options, |i| {
            first + i as f64 * stride
        })
    }

    fn linspace(
        &self,
        start: f64,
        end: f64,
        steps: i64,
        options: &TensorOptions,
    ) -> BackendResult<CpuTensor> {
        if steps < 0 {
            return Err(BackendError::invalid_argument(
                "number of steps must be non-negative",
            ));
        }
        let steps = steps as usize;
        let dtype = options.dtype_opt().unwrap_or(self.default_dtype());
        let step = if steps > 1 {
            (end - start) / (steps - 1) as f64
        } else {
            0.0
        };
        // Fill from both ends so the last point lands exactly on `end`. A single step is `start`.
        let halfway = if steps == 1 { 1 } else { steps / 2 };
        self.build(vec![steps], dtype, options, |i| {
            if i < halfway {
                start + step * i as f64
            } else {
                end - step * (steps - 1 - i) as f64
            }
        })
    }

    fn eye(&self, n: i64, m: i64, options: &TensorOptions) -> BackendResult<CpuTensor> {
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
        let (n, m) = (n as usize, m as usize);
        let dtype = options.dtype_opt().unwrap_or(self.default_dtype());
        self.build(vec![n, m], dtype, options, |i| {
            if i / m == i % m {
                1.0
            } else {
                0.0
            }
        })
    }

    fn to_sparse(&self, tensor: CpuTensor) -> BackendResult<CpuTensor> {
        match tensor.layout() {
            Layout::Sparse => return Ok(tensor),
            Layout::Opaque => {
                return Err(BackendError::unsupported_layout(
                    "to_sparse does not support opaque tensors",
                ))
            }
            Layout::Strided => {}
        }
        let itemsize = tensor.dtype.size_in_bytes();
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (offset, value) in tensor.dense_bytes().chunks_exact(itemsize).enumerate() {
            if tensor.dtype.read_f64(value) != 0.0 {
                indices.extend(unravel_index(offset, &tensor.shape));
                values.extend_from_slice(value);
            }
        }
        Ok(CpuTensor {
            data: TensorData::Sparse {
                indices: Arc::from(indices),
                values: Arc::from(values),
            },
            ..tensor
        })
    }

    fn to_opaque(&self, tensor: CpuTensor) -> BackendResult<CpuTensor> {
        if !matches!(tensor.dtype, DType::F32 | DType::BF16) {
            return Err(BackendError::unsupported_layout(format!(
                "opaque layout only supports float32 and bfloat16 tensors, got {}",
                tensor.dtype
            )));
        }
        match tensor.layout() {
            Layout::Opaque => return Ok(tensor),
            Layout::Sparse => {
                return Err(BackendError::unsupported_layout(
                    "opaque layout requires a dense input tensor, got sparse",
                ))
            }
            Layout::Strided => {}
        }
        let mut bytes = tensor.dense_bytes();
        let padded = tensor.numel().div_ceil(OPAQUE_BLOCK) * OPAQUE_BLOCK;
        bytes.resize(padded * tensor.dtype.size_in_bytes(), 0);
        Ok(CpuTensor {
            data: TensorData::Blocked(Arc::from(bytes)),
            ..tensor
        })
    }

    fn to_device(&self, tensor: CpuTensor, device: Device) -> BackendResult<CpuTensor> {
        self.check_device(Some(device))?;
        Ok(tensor)
    }

    fn describe(&self, tensor: &CpuTensor) -> TensorMeta {
        TensorMeta {
            shape: tensor.shape.iter().map(|&d| d as i64).collect(),
            dtype: tensor.dtype,
            device: Device::cpu(),
            layout: tensor.layout(),
            requires_grad: tensor.requires_grad,
        }
    }

    fn to_host(&self, tensor: &CpuTensor) -> BackendResult<HostTensor> {
        Ok(HostTensor::new(
            tensor.shape.clone(),
            tensor.dtype,
            tensor.dense_bytes(),
        ))
    }
}

/// Zeroed storage for `numel` elements, failing instead of aborting when it cannot be had.
fn allocate(dims: &[usize], numel: usize, itemsize: usize) -> BackendResult<Vec<u8>> {
    let too_large =
        || BackendError::execution(format!("tensor of shape {dims:?} is too large to allocate"));
    let len = numel.checked_mul(itemsize).ok_or_else(too_large)?;
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len).map_err(|_| too_large())?;
    bytes.resize(len, 0);
    Ok(bytes)
}

fn check_requires_grad(dtype: DType, requires_grad: bool) -> BackendResult<()> {
    if requires_grad && !dtype.is_floating() {
        return Err(BackendError::invalid_argument(format!(
            "Only Tensors of floating point and complex dtype can require gradients, got {dtype}"
        )));
    }
    Ok(())
}

fn checked_dims(shape: &Shape) -> BackendResult<Vec<usize>> {
    if let Some(dim) = shape.first_negative() {
        return Err(BackendError::invalid_argument(format!(
            "Trying to create tensor with negative dimension {dim}: {shape}"
        )));
    }
    shape.num_elements().ok_or_else(|| {
        BackendError::execution(format!("tensor of shape {shape} is too large to allocate"))
    })?;
    shape
        .to_usize()
        .ok_or_else(|| BackendError::invalid_argument(format!("invalid shape {shape}")))
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1usize;
    for (i, dim) in dims.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}

fn unravel_index(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        coords[i] = index % *dim;
        index /= *dim;
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(tensor: &CpuTensor) -> Vec<f64> {
        CpuBackend.to_host(tensor).unwrap().to_f64_vec()
    }

    #[test]
    fn linspace_hits_both_endpoints() {
        let t = CpuBackend
            .linspace(-1.0, 1.0, 7, &TensorOptions::new().dtype(DType::F64))
            .unwrap();
        let v = values(&t);
        assert_eq!(v.first(), Some(&-1.0));
        assert_eq!(v.last(), Some(&1.0));
        assert_eq!(v.len(), 7);
    }

    #[test]
    fn sparse_roundtrip_keeps_nonzeros_only() {
        let t = CpuBackend
            .eye(3, 4, &TensorOptions::new().dtype(DType::I64))
            .unwrap();
        let dense = values(&t);
        let sparse = CpuBackend.to_sparse(t).unwrap();
        assert_eq!(sparse.layout(), Layout::Sparse);
        assert_eq!(sparse.nnz(), 3);
        assert_eq!(values(&sparse), dense);
    }

    #[test]
    fn opaque_storage_is_padded_to_blocks() {
        let t = CpuBackend
            .ones(&Shape::new([3]), &TensorOptions::new())
            .unwrap();
        let opaque = CpuBackend.to_opaque(t).unwrap();
        match &opaque.data {
            TensorData::Blocked(bytes) => assert_eq!(bytes.len(), OPAQUE_BLOCK * 4),
            other => panic!("expected blocked storage, got {other:?}"),
        }
        assert_eq!(values(&opaque), vec![1.0; 3]);
    }

    #[test]
    fn integer_arange_truncates_bounds_and_step() {
        let t = CpuBackend
            .arange(0.0, 5.0, 1.5, &TensorOptions::new().dtype(DType::I32))
            .unwrap();
        assert_eq!(values(&t), vec![0.0, 1.0, 2.0, 3.0]);
        let t = CpuBackend
            .arange(0.5, 7.9, 2.5, &TensorOptions::new().dtype(DType::I64))
            .unwrap();
        assert_eq!(values(&t), vec![0.0, 2.0, 4.0, 6.0]);
        let err = CpuBackend
            .arange(0.0, 5.0, 0.5, &TensorOptions::new().dtype(DType::I32))
            .unwrap_err();
        assert!(err.to_string().contains("step must be nonzero"), "{err}");
    }

    #[test]
    fn single_step_linspace_is_start() {
        let t = CpuBackend
            .linspace(3.0, 9.0, 1, &TensorOptions::new().dtype(DType::F64))
            .unwrap();
        assert_eq!(values(&t), vec![3.0]);
        let t = CpuBackend
            .linspace(3.0, 9.0, 2, &TensorOptions::new().dtype(DType::F64))
            .unwrap();
        assert_eq!(values(&t), vec![3.0, 9.0]);
    }

    #[test]
    fn oversized_shapes_fail_without_aborting() {
        let err = CpuBackend
            .zeros(&Shape::new([1i64 << 60]), &TensorOptions::new().dtype(DType::U8))
            .unwrap_err();
        assert!(err.to_string().contains("too large to allocate"), "{err}");
        let err = CpuBackend
            .zeros(&Shape::new([1i64 << 62]), &TensorOptions::new().dtype(DType::F64))
            .unwrap_err();
        assert!(err.to_string().contains("too large to allocate"), "{err}");
    }

    #[test]
    fn negative_zero_is_not_stored_in_sparse_form() {
        let t = CpuBackend
            .full(&Shape::new([2, 2]), -0.0, &TensorOptions::new().dtype(DType::F32))
            .unwrap();
        assert_eq!(CpuBackend.to_sparse(t).unwrap().nnz(), 0);
    }

    #[test]
    fn zero_extent_eye_has_no_elements() {
        let t = CpuBackend.eye(0, 3, &TensorOptions::new()).unwrap();
        assert_eq!(t.shape, vec![0, 3]);
        assert!(values(&t).is_empty());
    }
}
