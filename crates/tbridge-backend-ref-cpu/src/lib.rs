pub mod cpu;

pub use cpu::{CpuBackend, CpuTensor, TensorData, BACKEND_NAME, OPAQUE_BLOCK};

/// Register the reference backend with the global backend registry.
///
/// This function is called automatically via a static initializer on Linux, but can also be
/// called manually to ensure the backend is registered.
/// The backend is registered under both "cpu" and "cpu-ref" names.
pub fn register_cpu_backend() {
    tbridge::backend::registry::register_tensor_backend("cpu", CpuBackend::new);
    tbridge::backend::registry::register_tensor_backend(BACKEND_NAME, CpuBackend::new);
}

// Auto-register on library load
#[cfg(target_os = "linux")]
#[used]
#[link_section = ".init_array"]
static REGISTER_CPU_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_cpu_backend();
    }
    register
};
