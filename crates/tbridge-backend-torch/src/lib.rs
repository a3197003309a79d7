//! libtorch backend for the tensor bridge.
//!
//! Everything here requires the `torch` feature, which links libtorch through `tch`. Without it
//! the crate is empty so that workspace builds do not need a libtorch install.

#[cfg(feature = "torch")]
pub mod torch;

#[cfg(feature = "torch")]
pub use torch::{TorchBackend, TorchTensor, BACKEND_NAME};

/// Register the libtorch backend with the global backend registry under "torch".
#[cfg(feature = "torch")]
pub fn register_torch_backend() {
    tracing::debug!(cuda_devices = tch::Cuda::device_count(), "registering libtorch backend");
    tbridge::backend::registry::register_tensor_backend(BACKEND_NAME, TorchBackend::new);
}
