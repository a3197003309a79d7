use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tbridge::backend::spec::{BackendError, BackendResult, TensorBackend, TensorOptions};
use tbridge::marshal::TensorView;
use tbridge::{CreationOps, DType, Device, ErrorKind, HostTensor, Layout, Shape, TensorBridge, TensorMeta};

const HOST: [i32; 2] = [0, -1];

/// Tensor that counts how many instances are alive.
struct Tracked {
    shape: Vec<i64>,
    layout: Layout,
    live: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Backend whose factories succeed, but whose layout conversions panic or fail.
#[derive(Default)]
struct FlakyBackend {
    live: Arc<AtomicUsize>,
}

impl FlakyBackend {
    fn make(&self, shape: &Shape) -> BackendResult<Tracked> {
        if shape.first_negative().is_some() {
            panic!("native allocator rejected {shape}");
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Tracked {
            shape: shape.dims().to_vec(),
            layout: Layout::Strided,
            live: Arc::clone(&self.live),
        })
    }
}

impl TensorBackend for FlakyBackend {
    type Tensor = Tracked;

    fn backend_name(&self) -> &str {
        "flaky"
    }

    fn from_view(&self, view: &TensorView<'_>, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(view.shape())
    }

    fn empty(&self, shape: &Shape, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(shape)
    }

    fn zeros(&self, shape: &Shape, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(shape)
    }

    fn ones(&self, shape: &Shape, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(shape)
    }

    fn full(&self, shape: &Shape, _: f64, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(shape)
    }

    fn zeros_like(&self, source: &Tracked, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(&Shape::new(source.shape.clone()))
    }

    fn ones_like(&self, source: &Tracked, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(&Shape::new(source.shape.clone()))
    }

    fn arange(&self, _: f64, _: f64, _: f64, _: &TensorOptions) -> BackendResult<Tracked> {
        Err(BackendError::unimplemented("arange", "not supported by this backend"))
    }

    fn linspace(&self, _: f64, _: f64, _: i64, _: &TensorOptions) -> BackendResult<Tracked> {
        Err(BackendError::unimplemented("linspace", "not supported by this backend"))
    }

    fn eye(&self, n: i64, m: i64, _: &TensorOptions) -> BackendResult<Tracked> {
        self.make(&Shape::new([n, m]))
    }

    fn to_sparse(&self, _: Tracked) -> BackendResult<Tracked> {
        panic!("sparse kernels missing");
    }

    fn to_opaque(&self, _: Tracked) -> BackendResult<Tracked> {
        Err(BackendError::unsupported_layout("no opaque format"))
    }

    fn to_device(&self, _: Tracked, device: Device) -> BackendResult<Tracked> {
        Err(BackendError::device_unavailable("flaky", device))
    }

    fn describe(&self, tensor: &Tracked) -> TensorMeta {
        TensorMeta {
            shape: tensor.shape.clone(),
            dtype: DType::F32,
            device: Device::cpu(),
            layout: tensor.layout,
            requires_grad: false,
        }
    }

    fn to_host(&self, _: &Tracked) -> BackendResult<HostTensor> {
        Err(BackendError::execution("read-back unavailable"))
    }
}

#[test]
fn panics_inside_the_backend_become_native_errors() {
    let ops = TensorBridge::new(FlakyBackend::default());
    let err = ops.create_zeros(&[-1], 0, 0, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);
    assert!(err.to_string().contains("native allocator rejected"), "{err}");
    assert_eq!(ops.live_handles(), 0);
}

#[test]
fn failed_conversions_drop_the_intermediate_tensor() {
    let backend = FlakyBackend::default();
    let live = Arc::clone(&backend.live);
    let ops = TensorBridge::new(backend);

    let err = ops.create_ones(&[2, 2], 0, 1, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);
    let err = ops.create_ones(&[2, 2], 0, 2, &HOST, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedLayout);
    assert_eq!(err.to_string(), "no opaque format");
    let err = ops
        .create_from_buffer(&[0; 16], &[4], 0, 0, &[1, 0], false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);

    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(ops.live_handles(), 0);
}

#[test]
fn release_drops_the_native_tensor() {
    let backend = FlakyBackend::default();
    let live = Arc::clone(&backend.live);
    let ops = TensorBridge::new(backend);

    let handle = ops.create_eye(2, 3, 0, 0, &HOST, false).unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 1);
    let held = ops.tensor(handle).unwrap();
    ops.release(handle).unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 1);
    drop(held);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn unimplemented_factories_report_their_name() {
    let ops = TensorBridge::new(FlakyBackend::default());
    let err = ops
        .create_linspace(0.0, 1.0, 3, 0, 0, &HOST, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);
    assert_eq!(err.to_string(), "linspace is not implemented: not supported by this backend");
    assert_eq!(ops.backend_name(), "flaky");
}
