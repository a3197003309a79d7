//! Host read-back of a registered tensor.

use super::{DType, Device, Layout};

/// Metadata describing a native tensor without touching its storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorMeta {
    pub shape: Vec<i64>,
    pub dtype: DType,
    pub device: Device,
    pub layout: Layout,
    pub requires_grad: bool,
}

/// Dense row-major copy of a tensor's contents in host memory.
///
/// Backends densify sparse and opaque layouts when producing one, so the bytes are always
/// `numel * dtype.size_in_bytes()` long.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    shape: Vec<usize>,
    dtype: DType,
    bytes: Vec<u8>,
}

impl HostTensor {
    /// Wraps dense bytes, panicking if the byte length disagrees with the shape.
    pub fn new(shape: Vec<usize>, dtype: DType, bytes: Vec<u8>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            bytes.len(),
            numel * dtype.size_in_bytes(),
            "host tensor byte length does not match shape {shape:?} of dtype {dtype}"
        );
        HostTensor {
            shape,
            dtype,
            bytes,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes every element as `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.bytes
            .chunks_exact(self.dtype.size_in_bytes())
            .map(|chunk| self.dtype.read_f64(chunk))
            .collect()
    }
}
