//! Integer selectors to native options, plus the post-construction plan.
//!
//! Device and layout handling follows one table for every factory:
//!
//! | factory      | device                        | layout                      |
//! |--------------|-------------------------------|-----------------------------|
//! | from-buffer  | host build, then transfer if the target is not host | converted after the copy |
//! | all others   | inside [`TensorOptions`]      | converted after construction |

use crate::backend::spec::{BackendResult, TensorBackend, TensorOptions};
use crate::codes;
use crate::error::BridgeResult;
use crate::tensor::{DType, Device, Layout};

/// Conversion applied once a factory has produced its strided tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutConversion {
    #[default]
    None,
    Sparse,
    Opaque,
}

impl LayoutConversion {
    pub fn for_layout(layout: Layout) -> Self {
        match layout {
            Layout::Strided => LayoutConversion::None,
            Layout::Sparse => LayoutConversion::Sparse,
            Layout::Opaque => LayoutConversion::Opaque,
        }
    }

    pub fn apply<B: TensorBackend + ?Sized>(
        self,
        backend: &B,
        tensor: B::Tensor,
    ) -> BackendResult<B::Tensor> {
        match self {
            LayoutConversion::None => Ok(tensor),
            LayoutConversion::Sparse => backend.to_sparse(tensor),
            LayoutConversion::Opaque => backend.to_opaque(tensor),
        }
    }
}

/// Options for one creation call, decoded from caller selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    dtype: Option<DType>,
    layout: Layout,
    device: Device,
    requires_grad: bool,
}

/// Decodes the dtype and layout codes and pairs them with an already-decoded device.
pub fn resolve_options(
    dtype: i32,
    layout: i32,
    device: Device,
    requires_grad: bool,
) -> BridgeResult<ResolvedOptions> {
    Ok(ResolvedOptions {
        dtype: codes::decode_dtype(dtype)?,
        layout: codes::decode_layout(layout)?,
        device,
        requires_grad,
    })
}

impl ResolvedOptions {
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    fn base(&self) -> TensorOptions {
        let options = TensorOptions::new().requires_grad(self.requires_grad);
        match self.dtype {
            Some(dtype) => options.dtype(dtype),
            None => options,
        }
    }

    /// Options for every factory that allocates directly on the target device.
    pub fn factory_options(&self) -> TensorOptions {
        self.base().device(self.device)
    }

    /// Options for from-buffer construction, which always happens on host.
    pub fn buffer_options(&self) -> TensorOptions {
        self.base()
    }

    /// Device a from-buffer tensor moves to after construction, if any.
    pub fn buffer_transfer(&self) -> Option<Device> {
        (!self.device.is_cpu()).then_some(self.device)
    }

    pub fn conversion(&self) -> LayoutConversion {
        LayoutConversion::for_layout(self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::DTYPE_UNSPECIFIED;
    use crate::error::ErrorKind;

    #[test]
    fn sentinel_dtype_stays_unset() {
        let resolved = resolve_options(DTYPE_UNSPECIFIED, 0, Device::cpu(), false).unwrap();
        assert_eq!(resolved.factory_options().dtype_opt(), None);
        assert_eq!(resolved.conversion(), LayoutConversion::None);
    }

    #[test]
    fn gradient_flag_is_copied() {
        let resolved = resolve_options(0, 0, Device::cpu(), true).unwrap();
        assert!(resolved.factory_options().requires_grad_flag());
        assert!(resolved.buffer_options().requires_grad_flag());
        assert_eq!(resolved.factory_options().dtype_opt(), Some(DType::F32));
    }

    #[test]
    fn device_goes_into_factory_options_only() {
        let resolved = resolve_options(1, 2, Device::cuda(0), false).unwrap();
        assert_eq!(resolved.factory_options().device_opt(), Some(Device::cuda(0)));
        assert_eq!(resolved.buffer_options().device_opt(), None);
        assert_eq!(resolved.buffer_transfer(), Some(Device::cuda(0)));
        assert_eq!(resolved.conversion(), LayoutConversion::Opaque);
    }

    #[test]
    fn host_targets_skip_the_transfer() {
        let resolved = resolve_options(0, 1, Device::cpu(), false).unwrap();
        assert_eq!(resolved.buffer_transfer(), None);
        assert_eq!(resolved.conversion(), LayoutConversion::Sparse);
    }

    #[test]
    fn unknown_layout_is_rejected() {
        let err = resolve_options(0, 5, Device::cpu(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
