//! Opaque-handle bridge between managed runtimes and a native tensor library.
//!
//! A managed caller sends primitive arrays and integer codes; the bridge turns them into native
//! shapes and options, runs one backend factory, and hands back a `u64` handle owned by a
//! per-engine [`HandleRegistry`]. Every failure crosses back as a [`BridgeError`].

pub mod backend;
pub mod bridge;
pub mod codes;
pub mod env;
pub mod error;
pub mod marshal;
pub mod options;
pub mod registry;
pub mod tensor;

pub use backend::spec::{BackendError, BackendResult, TensorBackend, TensorOptions};
pub use bridge::{CreationOps, TensorBridge};
pub use env::BridgeConfig;
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use registry::{Handle, HandleRegistry};
pub use tensor::{DType, Device, DeviceKind, HostTensor, Layout, Shape, TensorMeta};
