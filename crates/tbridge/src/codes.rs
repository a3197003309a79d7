//! Integer code table shared with managed callers.
//!
//! Managed callers pass dtype, layout and device selectors as small integers mirrored in their
//! own enumerations. This module is the only place those numbers appear; [`code_table_json`]
//! exports the table so the other side can check it agrees.

use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};
use crate::tensor::{DType, DeviceKind, Layout};

/// Dtype code meaning "unspecified, let the factory pick its default".
pub const DTYPE_UNSPECIFIED: i32 = 8;

/// Dtype code for string tensors, which no native factory can allocate.
pub const DTYPE_STRING: i32 = 9;

const DTYPE_CODES: &[(i32, DType)] = &[
    (0, DType::F32),
    (1, DType::F64),
    (2, DType::F16),
    (3, DType::U8),
    (4, DType::I32),
    (5, DType::I8),
    (6, DType::I64),
    (7, DType::Bool),
    (10, DType::BF16),
];

const LAYOUT_CODES: &[(i32, Layout)] = &[
    (0, Layout::Strided),
    (1, Layout::Sparse),
    (2, Layout::Opaque),
];

const DEVICE_KIND_CODES: &[(i32, DeviceKind)] = &[
    (0, DeviceKind::Cpu),
    (1, DeviceKind::Cuda),
    (13, DeviceKind::Mps),
];

/// Decodes a dtype selector; `Ok(None)` for [`DTYPE_UNSPECIFIED`].
pub fn decode_dtype(code: i32) -> BridgeResult<Option<DType>> {
    if code == DTYPE_UNSPECIFIED {
        return Ok(None);
    }
    if code == DTYPE_STRING {
        return Err(BridgeError::invalid_argument(
            "string dtype cannot be used to create a tensor",
        ));
    }
    DTYPE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, dtype)| Some(*dtype))
        .ok_or_else(|| BridgeError::invalid_argument(format!("unknown dtype code {code}")))
}

pub fn encode_dtype(dtype: DType) -> i32 {
    DTYPE_CODES
        .iter()
        .find(|(_, d)| *d == dtype)
        .map(|(code, _)| *code)
        .unwrap_or(DTYPE_UNSPECIFIED)
}

pub fn decode_layout(code: i32) -> BridgeResult<Layout> {
    LAYOUT_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, layout)| *layout)
        .ok_or_else(|| BridgeError::invalid_argument(format!("unknown layout code {code}")))
}

pub fn encode_layout(layout: Layout) -> i32 {
    match layout {
        Layout::Strided => 0,
        Layout::Sparse => 1,
        Layout::Opaque => 2,
    }
}

pub fn decode_device_kind(code: i32) -> BridgeResult<DeviceKind> {
    DEVICE_KIND_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| BridgeError::invalid_argument(format!("unknown device type code {code}")))
}

pub fn encode_device_kind(kind: DeviceKind) -> i32 {
    match kind {
        DeviceKind::Cpu => 0,
        DeviceKind::Cuda => 1,
        DeviceKind::Mps => 13,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeEntry {
    pub code: i32,
    pub name: &'static str,
}

/// Serializable snapshot of every code this bridge understands.
#[derive(Debug, Clone, Serialize)]
pub struct CodeTable {
    pub dtype_unspecified: i32,
    pub dtypes: Vec<CodeEntry>,
    pub layouts: Vec<CodeEntry>,
    pub device_kinds: Vec<CodeEntry>,
}

pub fn code_table() -> CodeTable {
    CodeTable {
        dtype_unspecified: DTYPE_UNSPECIFIED,
        dtypes: DTYPE_CODES
            .iter()
            .map(|(code, dtype)| CodeEntry {
                code: *code,
                name: dtype.name(),
            })
            .chain(std::iter::once(CodeEntry {
                code: DTYPE_STRING,
                name: "string",
            }))
            .collect(),
        layouts: LAYOUT_CODES
            .iter()
            .map(|(code, layout)| CodeEntry {
                code: *code,
                name: layout.name(),
            })
            .collect(),
        device_kinds: DEVICE_KIND_CODES
            .iter()
            .map(|(code, kind)| CodeEntry {
                code: *code,
                name: kind.name(),
            })
            .collect(),
    }
}

pub fn code_table_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&code_table())
}
