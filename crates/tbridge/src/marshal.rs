//! Conversion of caller-supplied primitive arrays into native values.

use crate::codes;
use crate::error::{BridgeError, BridgeResult};
use crate::tensor::{DType, Device, Shape};

/// Copies a caller integer array into a native shape, preserving every 64-bit extent.
///
/// Negative extents pass through untouched; the native factory rejects them.
pub fn shape_from_i64s(dims: &[i64]) -> Shape {
    Shape::new(dims.to_vec())
}

/// Decodes the 2-element `{kind, ordinal}` device array.
pub fn device_from_codes(codes: &[i32]) -> BridgeResult<Device> {
    let [kind, ordinal] = codes else {
        return Err(BridgeError::marshaling(format!(
            "device array must hold exactly 2 elements (kind, ordinal), got {}",
            codes.len()
        )));
    };
    let kind = codes::decode_device_kind(*kind)?;
    Ok(Device::new(kind, *ordinal))
}

pub fn device_to_codes(device: Device) -> [i32; 2] {
    [codes::encode_device_kind(device.kind()), device.index()]
}

/// Borrowed view over caller memory, interpreted as a dense row-major tensor.
///
/// The view lives only as long as the caller buffer; backends turn it into an owned tensor by
/// deep copy, so nothing native ever aliases caller memory after the call returns.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    bytes: &'a [u8],
    shape: &'a Shape,
    dtype: DType,
}

impl<'a> TensorView<'a> {
    /// Validates that `bytes` covers `shape` elements of `dtype`.
    ///
    /// Extra trailing bytes are ignored; a short buffer is a marshaling fault.
    pub fn new(bytes: &'a [u8], shape: &'a Shape, dtype: DType) -> BridgeResult<Self> {
        if let Some(dim) = shape.first_negative() {
            return Err(BridgeError::invalid_argument(format!(
                "Trying to create tensor with negative dimension {dim}: {shape}"
            )));
        }
        let required = shape
            .num_elements()
            .and_then(|numel| numel.checked_mul(dtype.size_in_bytes()))
            .ok_or_else(|| {
                BridgeError::invalid_argument(format!("shape {shape} is too large"))
            })?;
        if bytes.len() < required {
            return Err(BridgeError::marshaling(format!(
                "buffer holds {} bytes but shape {shape} of {dtype} needs {required}",
                bytes.len()
            )));
        }
        Ok(TensorView {
            bytes: &bytes[..required],
            shape,
            dtype,
        })
    }

    /// Exactly `numel * itemsize` bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn num_elements(&self) -> usize {
        self.bytes.len() / self.dtype.size_in_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tensor::DeviceKind;

    #[test]
    fn shapes_keep_64_bit_extents() {
        let dims = [1i64 << 40, 3];
        assert_eq!(shape_from_i64s(&dims).dims(), &dims);
        assert_eq!(shape_from_i64s(&[]).rank(), 0);
    }

    #[test]
    fn device_array_needs_two_elements() {
        assert_eq!(device_from_codes(&[0]).unwrap_err().kind(), ErrorKind::Marshaling);
        assert_eq!(
            device_from_codes(&[1, 0, 0]).unwrap_err().kind(),
            ErrorKind::Marshaling
        );
        let device = device_from_codes(&[1, 2]).unwrap();
        assert_eq!(device.kind(), DeviceKind::Cuda);
        assert_eq!(device.index(), 2);
        assert_eq!(device_to_codes(device), [1, 2]);
        assert!(device_from_codes(&[0, 5]).unwrap().is_cpu());
    }

    #[test]
    fn view_trims_to_element_count() {
        let shape = Shape::new([2]);
        let bytes = [0u8; 12];
        let view = TensorView::new(&bytes, &shape, DType::F32).unwrap();
        assert_eq!(view.bytes().len(), 8);
        assert_eq!(view.num_elements(), 2);
    }

    #[test]
    fn short_buffers_are_marshaling_faults() {
        let shape = Shape::new([2, 2]);
        let bytes = [0u8; 15];
        let err = TensorView::new(&bytes, &shape, DType::F32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Marshaling);
    }

    #[test]
    fn negative_extents_are_invalid_arguments() {
        let shape = Shape::new([-1]);
        let err = TensorView::new(&[], &shape, DType::U8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
