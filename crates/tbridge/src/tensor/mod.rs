//! Native tensor vocabulary shared by the bridge and every backend.
//!
//! These types describe what a factory call asks for (dtype, shape, device, layout) and what
//! comes back on read-back. They carry no storage of their own; tensors themselves are the
//! backend's associated type.

pub mod device;
pub mod dtype;
mod host;
pub mod layout;
pub mod shape;

pub use device::{Device, DeviceKind};
pub use dtype::DType;
pub use host::{HostTensor, TensorMeta};
pub use layout::Layout;
pub use shape::Shape;
