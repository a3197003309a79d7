//! Enumerates the scalar element types a native backend can allocate.

use std::fmt;

use half::{bf16, f16};

/// Native scalar type of a tensor.
///
/// This is the backend-facing view; the integer codes exchanged with managed callers live in
/// [`crate::codes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit IEEE-754 float, the default dtype of every factory.
    F32,
    /// 64-bit IEEE-754 float.
    F64,
    /// 16-bit IEEE-754 half precision.
    F16,
    /// 16-bit brain float.
    BF16,
    U8,
    I8,
    I32,
    I64,
    /// One byte per element, `0` or `1`.
    Bool,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::U8 | DType::I8 | DType::Bool => 1,
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// Returns `true` for dtypes that may carry gradients.
    pub fn is_floating(self) -> bool {
        matches!(self, DType::F32 | DType::F64 | DType::F16 | DType::BF16)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::Bool => "bool",
        }
    }

    /// Encodes `value` into `out` (little endian), rounding/truncating into the dtype.
    ///
    /// Panics if `out` is not exactly [`DType::size_in_bytes`] long.
    pub fn write_f64(self, value: f64, out: &mut [u8]) {
        match self {
            DType::F32 => out.copy_from_slice(&(value as f32).to_le_bytes()),
            DType::F64 => out.copy_from_slice(&value.to_le_bytes()),
            DType::F16 => out.copy_from_slice(&f16::from_f64(value).to_le_bytes()),
            DType::BF16 => out.copy_from_slice(&bf16::from_f64(value).to_le_bytes()),
            DType::U8 => out[0] = value as u8,
            DType::I8 => out[0] = (value as i8) as u8,
            DType::I32 => out.copy_from_slice(&(value as i32).to_le_bytes()),
            DType::I64 => out.copy_from_slice(&(value as i64).to_le_bytes()),
            DType::Bool => out[0] = u8::from(value != 0.0),
        }
    }

    /// Decodes one little-endian element from `bytes` as `f64`.
    ///
    /// Panics if `bytes` is shorter than [`DType::size_in_bytes`].
    pub fn read_f64(self, bytes: &[u8]) -> f64 {
        match self {
            DType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            DType::F64 => f64::from_le_bytes(first_n(bytes)),
            DType::F16 => f16::from_le_bytes([bytes[0], bytes[1]]).to_f64(),
            DType::BF16 => bf16::from_le_bytes([bytes[0], bytes[1]]).to_f64(),
            DType::U8 => bytes[0] as f64,
            DType::I8 => bytes[0] as i8 as f64,
            DType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            DType::I64 => i64::from_le_bytes(first_n(bytes)) as f64,
            DType::Bool => f64::from(u8::from(bytes[0] != 0)),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn first_n<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_codec_rounds_into_dtype() {
        let mut buf = [0u8; 8];
        DType::I32.write_f64(3.9, &mut buf[..4]);
        assert_eq!(DType::I32.read_f64(&buf[..4]), 3.0);

        DType::F16.write_f64(0.1, &mut buf[..2]);
        let back = DType::F16.read_f64(&buf[..2]);
        assert!((back - 0.1).abs() < 1e-3);

        DType::Bool.write_f64(-2.0, &mut buf[..1]);
        assert_eq!(buf[0], 1);

        DType::I8.write_f64(-5.0, &mut buf[..1]);
        assert_eq!(DType::I8.read_f64(&buf[..1]), -5.0);
    }

    #[test]
    fn only_float_dtypes_are_floating() {
        assert!(DType::BF16.is_floating());
        assert!(!DType::I64.is_floating());
        assert!(!DType::Bool.is_floating());
    }
}
