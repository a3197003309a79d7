use tbridge::backend::registry::{create_engine, has_backend, list_backends};
use tbridge::codes::DTYPE_UNSPECIFIED;
use tbridge::{BridgeConfig, CreationOps, ErrorKind, Layout, TensorBridge};
use tbridge_backend_ref_cpu::{register_cpu_backend, CpuBackend};

const HOST: [i32; 2] = [0, -1];
const CUDA0: [i32; 2] = [1, 0];

#[test]
fn registered_under_both_names() {
    register_cpu_backend();
    assert!(has_backend("cpu"));
    assert!(has_backend("cpu-ref"));
    assert!(list_backends().contains(&"cpu".to_string()));

    let engine = create_engine("cpu", &BridgeConfig::default()).unwrap();
    assert_eq!(engine.backend_name(), "cpu-ref");
    assert!(create_engine("no-such-backend", &BridgeConfig::default()).is_none());
}

#[test]
fn engines_do_not_share_handles() {
    register_cpu_backend();
    let a = create_engine("cpu", &BridgeConfig::default()).unwrap();
    let b = create_engine("cpu", &BridgeConfig::default()).unwrap();
    let handle = a.create_ones(&[2], 0, 0, &HOST, false).unwrap();
    assert_eq!(b.describe(handle).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(b.live_handles(), 0);
}

#[test]
fn non_host_devices_are_native_faults() {
    let ops = TensorBridge::new(CpuBackend::new());
    let err = ops.create_zeros(&[2], 0, 0, &CUDA0, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);
    assert!(err.to_string().contains("cuda:0"), "{err}");

    let bytes = [0u8; 8];
    let err = ops
        .create_from_buffer(&bytes, &[2], 0, 0, &CUDA0, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);
    assert_eq!(ops.live_handles(), 0);
}

#[test]
fn host_ordinals_are_ignored() {
    let ops = TensorBridge::new(CpuBackend::new());
    let handle = ops.create_zeros(&[2], 0, 0, &[0, 3], false).unwrap();
    assert!(ops.describe(handle).unwrap().device.is_cpu());
}

#[test]
fn opaque_layout_rejects_integer_dtypes() {
    let ops = TensorBridge::new(CpuBackend::new());
    let err = ops.create_ones(&[4], 4, 2, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedLayout);

    let handle = ops.create_ones(&[4], 10, 2, &HOST, false).unwrap();
    assert_eq!(ops.describe(handle).unwrap().layout, Layout::Opaque);
    assert_eq!(ops.live_handles(), 1);
}

#[test]
fn integer_tensors_cannot_require_grad() {
    let ops = TensorBridge::new(CpuBackend::new());
    let err = ops.create_zeros(&[2], 6, 0, &HOST, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("floating point"));

    let source = ops.create_ones(&[2], 6, 0, &HOST, false).unwrap();
    let like = ops
        .create_zeros_like(source, DTYPE_UNSPECIFIED, 0, &HOST, true)
        .unwrap_err();
    assert_eq!(like.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn sparse_conversion_keeps_requires_grad() {
    let ops = TensorBridge::new(CpuBackend::new());
    let handle = ops.create_eye(2, 2, 1, 1, &HOST, true).unwrap();
    let meta = ops.describe(handle).unwrap();
    assert_eq!(meta.layout, Layout::Sparse);
    assert!(meta.requires_grad);
}

#[test]
fn handle_limit_comes_from_config() {
    let config = BridgeConfig::default().with_max_handles(2);
    let ops = TensorBridge::with_config(CpuBackend::new(), &config);
    let first = ops.create_zeros(&[1], 0, 0, &HOST, false).unwrap();
    ops.create_zeros(&[1], 0, 0, &HOST, false).unwrap();
    let err = ops.create_zeros(&[1], 0, 0, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);

    ops.release(first).unwrap();
    ops.create_zeros(&[1], 0, 0, &HOST, false).unwrap();
}

#[test]
fn bool_fill_is_zero_or_one() {
    let ops = TensorBridge::new(CpuBackend::new());
    let handle = ops.create_full(&[3], -2.5, 7, 0, &HOST, false).unwrap();
    assert_eq!(ops.to_host(handle).unwrap().bytes(), &[1, 1, 1]);
}
