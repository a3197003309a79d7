//! Creation conformance checks every backend must pass through the bridge.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tbridge::codes::DTYPE_UNSPECIFIED;
use tbridge::{
    BridgeConfig, CreationOps, DType, ErrorKind, Handle, Layout, TensorBackend, TensorBridge,
};

pub const HOST: [i32; 2] = [0, -1];

pub const F32: i32 = 0;
pub const F64: i32 = 1;
pub const I32: i32 = 4;
pub const I64: i32 = 6;

pub const STRIDED: i32 = 0;
pub const SPARSE: i32 = 1;
pub const OPAQUE: i32 = 2;

pub fn bridge<B: TensorBackend + 'static>(backend: &Arc<B>) -> TensorBridge<B> {
    TensorBridge::from_arc(Arc::clone(backend), &BridgeConfig::default())
}

pub fn values(ops: &dyn CreationOps, handle: Handle) -> Vec<f64> {
    ops.to_host(handle).unwrap().to_f64_vec()
}

fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {actual:?} vs {expected:?}");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tol,
            "element {i}: {a} vs {e} (actual {actual:?})"
        );
    }
}

pub fn zeros_ones_full_fill_every_element<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let shape = [2, 3];
    let zeros = ops.create_zeros(&shape, F32, STRIDED, &HOST, false).unwrap();
    let ones = ops.create_ones(&shape, F32, STRIDED, &HOST, false).unwrap();
    let full = ops.create_full(&shape, 2.5, F64, STRIDED, &HOST, false).unwrap();

    assert_eq!(values(&ops, zeros), vec![0.0; 6]);
    assert_eq!(values(&ops, ones), vec![1.0; 6]);
    assert_eq!(values(&ops, full), vec![2.5; 6]);

    let meta = ops.describe(full).unwrap();
    assert_eq!(meta.shape, vec![2, 3]);
    assert_eq!(meta.dtype, DType::F64);
    assert_eq!(meta.layout, Layout::Strided);
    assert!(meta.device.is_cpu());
}

pub fn full_rounds_into_integer_dtypes<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops.create_full(&[3], 2.0, I32, STRIDED, &HOST, false).unwrap();
    assert_eq!(ops.describe(handle).unwrap().dtype, DType::I32);
    assert_eq!(values(&ops, handle), vec![2.0; 3]);
}

pub fn empty_has_requested_shape_and_dtype<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops.create_empty(&[4, 0, 2], I64, STRIDED, &HOST, false).unwrap();
    let meta = ops.describe(handle).unwrap();
    assert_eq!(meta.shape, vec![4, 0, 2]);
    assert_eq!(meta.dtype, DType::I64);
    assert!(ops.to_host(handle).unwrap().is_empty());

    let handle = ops.create_empty(&[3, 5], F32, STRIDED, &HOST, false).unwrap();
    assert_eq!(ops.to_host(handle).unwrap().len(), 15);
}

pub fn scalar_shape_holds_one_element<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops.create_full(&[], 4.0, F32, STRIDED, &HOST, false).unwrap();
    assert!(ops.describe(handle).unwrap().shape.is_empty());
    assert_eq!(values(&ops, handle), vec![4.0]);
}

pub fn arange_int32_counts_up<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops
        .create_arange(0.0, 10.0, 1.0, I32, STRIDED, &HOST, false)
        .unwrap();
    let meta = ops.describe(handle).unwrap();
    assert_eq!(meta.shape, vec![10]);
    assert_eq!(meta.dtype, DType::I32);
    let expected: Vec<f64> = (0..10).map(f64::from).collect();
    assert_eq!(values(&ops, handle), expected);
}

pub fn arange_rounds_length_up<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops
        .create_arange(0.0, 1.0, 0.25, F64, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(values(&ops, handle), vec![0.0, 0.25, 0.5, 0.75]);

    let handle = ops
        .create_arange(5.0, 0.0, -2.0, F64, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(values(&ops, handle), vec![5.0, 3.0, 1.0]);
}

pub fn arange_rejects_bad_steps<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let zero_step = ops
        .create_arange(0.0, 1.0, 0.0, F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(zero_step.kind(), ErrorKind::InvalidArgument);
    let wrong_sign = ops
        .create_arange(1.0, 0.0, 1.0, F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(wrong_sign.kind(), ErrorKind::InvalidArgument);
    assert_eq!(ops.live_handles(), 0);
}

pub fn linspace_includes_both_ends<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops
        .create_linspace(0.0, 1.0, 5, F32, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(values(&ops, handle), vec![0.0, 0.25, 0.5, 0.75, 1.0]);

    let handle = ops
        .create_linspace(-3.0, 7.0, 11, F64, STRIDED, &HOST, false)
        .unwrap();
    let expected: Vec<f64> = (-3..=7).map(f64::from).collect();
    assert_close(&values(&ops, handle), &expected, 1e-12);
}

pub fn linspace_handles_degenerate_step_counts<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let none = ops
        .create_linspace(0.0, 1.0, 0, F32, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(ops.describe(none).unwrap().shape, vec![0]);
    let single = ops
        .create_linspace(3.0, 9.0, 1, F32, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(values(&ops, single), vec![3.0]);
    let err = ops
        .create_linspace(0.0, 1.0, -1, F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

pub fn eye_places_ones_on_the_diagonal<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let square = ops.create_eye(3, 3, F32, STRIDED, &HOST, false).unwrap();
    assert_eq!(
        values(&ops, square),
        vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    );

    let wide = ops.create_eye(2, 3, F32, STRIDED, &HOST, false).unwrap();
    assert_eq!(ops.describe(wide).unwrap().shape, vec![2, 3]);
    assert_eq!(values(&ops, wide), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

    let tall = ops.create_eye(3, 1, I64, STRIDED, &HOST, false).unwrap();
    assert_eq!(values(&ops, tall), vec![1.0, 0.0, 0.0]);
}

pub fn eye_rejects_negative_extents<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    for (n, m) in [(-1, 3), (3, -2)] {
        let err = ops.create_eye(n, m, F32, STRIDED, &HOST, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "eye({n}, {m})");
    }
}

pub fn like_factories_return_distinct_tensors<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let source = ops.create_full(&[2, 2], 7.0, F64, STRIDED, &HOST, false).unwrap();

    let zeros = ops
        .create_zeros_like(source, DTYPE_UNSPECIFIED, STRIDED, &HOST, false)
        .unwrap();
    assert_ne!(zeros, source);
    let meta = ops.describe(zeros).unwrap();
    assert_eq!(meta.shape, vec![2, 2]);
    assert_eq!(meta.dtype, DType::F64);
    assert_eq!(values(&ops, zeros), vec![0.0; 4]);

    let ones = ops
        .create_ones_like(source, I32, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(ops.describe(ones).unwrap().dtype, DType::I32);
    assert_eq!(values(&ops, ones), vec![1.0; 4]);

    assert_eq!(values(&ops, source), vec![7.0; 4]);
    assert_eq!(ops.live_handles(), 3);
}

pub fn from_buffer_deep_copies_caller_memory<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<f32> = (0..12).map(|_| rng.gen_range(-4.0..4.0)).collect();
    let mut bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();

    let handle = ops
        .create_from_buffer(&bytes, &[3, 4], F32, STRIDED, &HOST, false)
        .unwrap();
    bytes.iter_mut().for_each(|b| *b = 0xff);

    let expected: Vec<f64> = data.iter().map(|&v| f64::from(v)).collect();
    assert_eq!(values(&ops, handle), expected);
    assert_eq!(ops.describe(handle).unwrap().shape, vec![3, 4]);
}

pub fn from_buffer_reads_integer_dtypes<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let data: [i64; 3] = [-5, 0, 1 << 40];
    let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
    let handle = ops
        .create_from_buffer(&bytes, &[3], I64, STRIDED, &HOST, false)
        .unwrap();
    let host = ops.to_host(handle).unwrap();
    assert_eq!(host.dtype(), DType::I64);
    assert_eq!(host.bytes(), bytes.as_slice());
}

pub fn sentinel_dtype_uses_native_defaults<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let zeros = ops
        .create_zeros(&[2], DTYPE_UNSPECIFIED, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(ops.describe(zeros).unwrap().dtype, DType::F32);

    let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    let from_buffer = ops
        .create_from_buffer(&bytes, &[2], DTYPE_UNSPECIFIED, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(ops.describe(from_buffer).unwrap().dtype, DType::F32);
    assert_eq!(values(&ops, from_buffer), vec![1.5, -2.0]);

    let source = ops.create_ones(&[2], I64, STRIDED, &HOST, false).unwrap();
    let like = ops
        .create_zeros_like(source, DTYPE_UNSPECIFIED, STRIDED, &HOST, false)
        .unwrap();
    assert_eq!(ops.describe(like).unwrap().dtype, DType::I64);
}

pub fn released_and_unknown_handles_are_rejected<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops.create_zeros(&[1], F32, STRIDED, &HOST, false).unwrap();
    ops.release(handle).unwrap();

    assert_eq!(ops.describe(handle).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(ops.to_host(handle).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(ops.release(handle).unwrap_err().kind(), ErrorKind::InvalidHandle);
    let like = ops
        .create_ones_like(handle, F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(like.kind(), ErrorKind::InvalidHandle);

    for bogus in [0, 1, u64::MAX] {
        assert_eq!(ops.describe(bogus).unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    let other = bridge(backend);
    let foreign = other.create_zeros(&[1], F32, STRIDED, &HOST, false).unwrap();
    assert_eq!(ops.describe(foreign).unwrap_err().kind(), ErrorKind::InvalidHandle);
}

pub fn negative_extents_are_invalid_arguments<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let err = ops.create_zeros(&[2, -1], F32, STRIDED, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = ops
        .create_full(&[-3], 1.0, F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = ops
        .create_from_buffer(&[0; 8], &[-2], F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

pub fn malformed_selectors_are_rejected<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let err = ops.create_zeros(&[1], F32, STRIDED, &[0], false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Marshaling);
    let err = ops.create_zeros(&[1], 9, STRIDED, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = ops.create_zeros(&[1], F32, 7, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = ops.create_zeros(&[1], F32, STRIDED, &[4, 0], false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = ops
        .create_from_buffer(&[0; 7], &[2], F32, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Marshaling);
}

pub fn failed_creations_leave_no_handles<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let keep = ops.create_ones(&[2], F32, STRIDED, &HOST, false).unwrap();
    let _ = ops.create_zeros(&[-1], F32, STRIDED, &HOST, false);
    let _ = ops.create_eye(-1, 2, F32, STRIDED, &HOST, false);
    let _ = ops.create_linspace(0.0, 1.0, -4, F32, STRIDED, &HOST, false);
    let _ = ops.create_from_buffer(&[0; 3], &[1], F32, STRIDED, &HOST, false);
    let _ = ops.create_zeros_like(keep + 1, F32, STRIDED, &HOST, false);
    assert_eq!(ops.live_handles(), 1);
}

pub fn oversized_shapes_are_native_faults<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let u8_code = 3;
    let err = ops
        .create_zeros(&[1i64 << 60], u8_code, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native, "{err}");
    let err = ops
        .create_full(&[1i64 << 40, 1i64 << 40], 2.0, F64, STRIDED, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native, "{err}");
    assert_eq!(ops.live_handles(), 0);
}

pub fn requires_grad_is_recorded<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let tracked = ops.create_ones(&[2], F32, STRIDED, &HOST, true).unwrap();
    let plain = ops.create_ones(&[2], F32, STRIDED, &HOST, false).unwrap();
    assert!(ops.describe(tracked).unwrap().requires_grad);
    assert!(!ops.describe(plain).unwrap().requires_grad);

    let bytes: Vec<u8> = [0.5f32; 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    let from_buffer = ops
        .create_from_buffer(&bytes, &[3], F32, STRIDED, &HOST, true)
        .unwrap();
    assert!(ops.describe(from_buffer).unwrap().requires_grad);
}

pub fn sparse_layout_densifies_on_read_back<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let eye = ops.create_eye(3, 3, F32, SPARSE, &HOST, false).unwrap();
    assert_eq!(ops.describe(eye).unwrap().layout, Layout::Sparse);
    assert_eq!(
        values(&ops, eye),
        vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    );

    let bytes: Vec<u8> = [0.0f32, 3.0, 0.0, -1.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let handle = ops
        .create_from_buffer(&bytes, &[2, 2], F32, SPARSE, &HOST, false)
        .unwrap();
    assert_eq!(ops.describe(handle).unwrap().layout, Layout::Sparse);
    assert_eq!(values(&ops, handle), vec![0.0, 3.0, 0.0, -1.0]);
}

pub fn opaque_layout_preserves_values<B: TensorBackend + 'static>(backend: &Arc<B>) {
    let ops = bridge(backend);
    let handle = ops.create_ones(&[2, 3], F32, OPAQUE, &HOST, false).unwrap();
    let meta = ops.describe(handle).unwrap();
    assert_eq!(meta.layout, Layout::Opaque);
    assert_eq!(meta.shape, vec![2, 3]);
    assert_eq!(values(&ops, handle), vec![1.0; 6]);
}

pub fn concurrent_creation_yields_distinct_handles<B: TensorBackend + 'static>(
    backend: &Arc<B>,
) {
    let ops = bridge(backend);
    let handles: Vec<Handle> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..32)
                        .map(|_| ops.create_zeros(&[4], F32, STRIDED, &HOST, false).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let unique: HashSet<Handle> = handles.iter().copied().collect();
    assert_eq!(unique.len(), 256);
    assert_eq!(ops.live_handles(), 256);
    for handle in handles {
        ops.release(handle).unwrap();
    }
    assert_eq!(ops.live_handles(), 0);
}
