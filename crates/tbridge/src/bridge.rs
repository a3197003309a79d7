//! Creation operations exposed to managed callers.
//!
//! [`TensorBridge`] ties a [`TensorBackend`] to a handle registry and implements
//! [`CreationOps`], the object-safe surface every managed boundary dispatches to. Each operation
//! marshals its arguments, resolves options, calls exactly one native factory, applies the
//! post-construction plan and registers the result. Registration is always the last step, so a
//! failure anywhere earlier leaves no handle behind.

use std::sync::Arc;

use crate::backend::spec::TensorBackend;
use crate::env::BridgeConfig;
use crate::error::{boundary, BridgeResult};
use crate::marshal::{self, TensorView};
use crate::options::{resolve_options, ResolvedOptions};
use crate::registry::{Handle, HandleRegistry};
use crate::tensor::{HostTensor, TensorMeta};

/// Tensor creation surface shared by every managed boundary.
///
/// Arguments arrive in their wire form: shapes as `i64` slices, dtype and layout as integer
/// codes, devices as `{kind, ordinal}` pairs. All failures come back as a
/// [`BridgeError`](crate::error::BridgeError) carrying the native diagnostic.
pub trait CreationOps: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Deep-copies `data` into a new tensor of `shape`.
    fn create_from_buffer(
        &self,
        data: &[u8],
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_empty(
        &self,
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_zeros(
        &self,
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_ones(
        &self,
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_full(
        &self,
        shape: &[i64],
        fill_value: f64,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_zeros_like(
        &self,
        source: Handle,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_ones_like(
        &self,
        source: Handle,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    #[allow(clippy::too_many_arguments)]
    fn create_arange(
        &self,
        start: f32,
        end: f32,
        step: f32,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    #[allow(clippy::too_many_arguments)]
    fn create_linspace(
        &self,
        start: f32,
        end: f32,
        steps: i32,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    fn create_eye(
        &self,
        n: i32,
        m: i32,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle>;

    /// Drops the tensor behind `handle`; the handle is invalid afterwards.
    fn release(&self, handle: Handle) -> BridgeResult<()>;

    fn describe(&self, handle: Handle) -> BridgeResult<TensorMeta>;

    /// Dense row-major host copy of the tensor behind `handle`.
    fn to_host(&self, handle: Handle) -> BridgeResult<HostTensor>;

    fn live_handles(&self) -> usize;
}

/// A backend plus the registry owning every tensor it produced for callers.
pub struct TensorBridge<B: TensorBackend> {
    backend: Arc<B>,
    handles: HandleRegistry<B::Tensor>,
}

impl<B: TensorBackend> TensorBridge<B> {
    pub fn new(backend: B) -> Self {
        Self::from_arc(Arc::new(backend), &BridgeConfig::default())
    }

    pub fn with_config(backend: B, config: &BridgeConfig) -> Self {
        Self::from_arc(Arc::new(backend), config)
    }

    pub fn from_arc(backend: Arc<B>, config: &BridgeConfig) -> Self {
        TensorBridge {
            backend,
            handles: HandleRegistry::with_capacity_limit(config.max_handles),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn handles(&self) -> &HandleRegistry<B::Tensor> {
        &self.handles
    }

    /// Shared reference to the native tensor behind `handle`.
    pub fn tensor(&self, handle: Handle) -> BridgeResult<Arc<B::Tensor>> {
        self.handles.get(handle)
    }

    fn resolve(
        &self,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<ResolvedOptions> {
        let device = marshal::device_from_codes(device)?;
        resolve_options(dtype, layout, device, requires_grad)
    }

    /// Applies the layout conversion and registers the result.
    fn register(&self, resolved: &ResolvedOptions, tensor: B::Tensor) -> BridgeResult<Handle> {
        let tensor = resolved.conversion().apply(self.backend.as_ref(), tensor)?;
        self.handles.wrap(tensor)
    }
}

impl<B: TensorBackend + 'static> CreationOps for TensorBridge<B> {
    fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    fn create_from_buffer(
        &self,
        data: &[u8],
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("from_buffer", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let shape = marshal::shape_from_i64s(shape);
            let dtype = resolved
                .dtype()
                .unwrap_or_else(|| self.backend.default_dtype());
            let view = TensorView::new(data, &shape, dtype)?;

            let tensor = self.backend.from_view(&view, &resolved.buffer_options())?;
            let tensor = resolved.conversion().apply(self.backend.as_ref(), tensor)?;
            let tensor = match resolved.buffer_transfer() {
                Some(target) => self.backend.to_device(tensor, target)?,
                None => tensor,
            };
            self.handles.wrap(tensor)
        })
    }

    fn create_empty(
        &self,
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("empty", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let shape = marshal::shape_from_i64s(shape);
            let tensor = self.backend.empty(&shape, &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn create_zeros(
        &self,
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("zeros", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let shape = marshal::shape_from_i64s(shape);
            let tensor = self.backend.zeros(&shape, &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn create_ones(
        &self,
        shape: &[i64],
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("ones", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let shape = marshal::shape_from_i64s(shape);
            let tensor = self.backend.ones(&shape, &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn create_full(
        &self,
        shape: &[i64],
        fill_value: f64,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("full", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let shape = marshal::shape_from_i64s(shape);
            let tensor = self
                .backend
                .full(&shape, fill_value, &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn create_zeros_like(
        &self,
        source: Handle,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("zeros_like", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let source = self.handles.get(source)?;
            let tensor = self
                .backend
                .zeros_like(&source, &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn create_ones_like(
        &self,
        source: Handle,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("ones_like", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let source = self.handles.get(source)?;
            let tensor = self
                .backend
                .ones_like(&source, &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn create_arange(
        &self,
        start: f32,
        end: f32,
        step: f32,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("arange", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let tensor = self.backend.arange(
                f64::from(start),
                f64::from(end),
                f64::from(step),
                &resolved.factory_options(),
            )?;
            self.register(&resolved, tensor)
        })
    }

    fn create_linspace(
        &self,
        start: f32,
        end: f32,
        steps: i32,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("linspace", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let tensor = self.backend.linspace(
                f64::from(start),
                f64::from(end),
                i64::from(steps),
                &resolved.factory_options(),
            )?;
            self.register(&resolved, tensor)
        })
    }

    fn create_eye(
        &self,
        n: i32,
        m: i32,
        dtype: i32,
        layout: i32,
        device: &[i32],
        requires_grad: bool,
    ) -> BridgeResult<Handle> {
        boundary("eye", || {
            let resolved = self.resolve(dtype, layout, device, requires_grad)?;
            let tensor =
                self.backend
                    .eye(i64::from(n), i64::from(m), &resolved.factory_options())?;
            self.register(&resolved, tensor)
        })
    }

    fn release(&self, handle: Handle) -> BridgeResult<()> {
        boundary("release", || self.handles.release(handle))
    }

    fn describe(&self, handle: Handle) -> BridgeResult<TensorMeta> {
        boundary("describe", || {
            let tensor = self.handles.get(handle)?;
            Ok(self.backend.describe(&tensor))
        })
    }

    fn to_host(&self, handle: Handle) -> BridgeResult<HostTensor> {
        boundary("to_host", || {
            let tensor = self.handles.get(handle)?;
            Ok(self.backend.to_host(&tensor)?)
        })
    }

    fn live_handles(&self) -> usize {
        self.handles.len()
    }
}
