//! C ABI over tbridge.
//!
//! Every creation function returns [`TB_OK`] or a negative status code and writes the new
//! handle through its `out` pointer only on success. The message of the most recent failure
//! on the calling thread is available from [`tb_last_error`].

#![allow(clippy::too_many_arguments)]

use std::ffi::{c_char, c_int, CStr, CString};
use std::sync::Once;

use tbridge::backend::registry;
use tbridge::{codes, marshal, BridgeConfig, BridgeError, BridgeResult, CreationOps, Handle};

mod status;

pub use status::{
    TB_ERR_INVALID_ARGUMENT, TB_ERR_INVALID_HANDLE, TB_ERR_MARSHALING, TB_ERR_NATIVE,
    TB_ERR_UNSUPPORTED_LAYOUT, TB_OK,
};
use status::guard;

/// An engine: one backend and the registry owning every handle it produced.
pub struct TbEngine {
    ops: Box<dyn CreationOps>,
}

/// Metadata filled by [`tb_describe`].
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TbTensorInfo {
    pub dtype: c_int,
    pub layout: c_int,
    pub device_kind: c_int,
    pub device_index: c_int,
    pub requires_grad: bool,
    pub rank: usize,
}

fn ensure_backends_registered() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        tbridge_backend_ref_cpu::register_cpu_backend();

        #[cfg(feature = "torch")]
        tbridge_backend_torch::register_torch_backend();
    });
}

unsafe fn slice<'a, T>(ptr: *const T, len: usize, what: &str) -> BridgeResult<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(BridgeError::marshaling(format!(
            "{what} pointer is null but length is {len}"
        )));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

unsafe fn engine<'a>(engine: *const TbEngine) -> BridgeResult<&'a dyn CreationOps> {
    if engine.is_null() {
        return Err(BridgeError::marshaling("engine pointer is null"));
    }
    Ok(unsafe { (*engine).ops.as_ref() })
}

unsafe fn write_handle(out: *mut u64, create: impl FnOnce() -> BridgeResult<Handle>) -> c_int {
    guard(|| {
        if out.is_null() {
            return Err(BridgeError::marshaling("output handle pointer is null"));
        }
        let handle = create()?;
        unsafe { out.write(handle) };
        Ok(())
    })
}

#[no_mangle]
/// Creates an engine on the backend called `name`, or on the configured default when `name`
/// is null. Returns null on failure.
///
/// # Safety
/// `name` must be null or point to a NUL-terminated string.
pub unsafe extern "C" fn tb_engine_new(name: *const c_char) -> *mut TbEngine {
    unsafe { tb_engine_new_with_limit(name, 0) }
}

#[no_mangle]
/// Like [`tb_engine_new`], capping the engine at `max_handles` live tensors when non-zero.
///
/// # Safety
/// `name` must be null or point to a NUL-terminated string.
pub unsafe extern "C" fn tb_engine_new_with_limit(
    name: *const c_char,
    max_handles: usize,
) -> *mut TbEngine {
    ensure_backends_registered();
    let mut created = None;
    let code = guard(|| {
        let mut config = BridgeConfig::from_env().clone();
        if max_handles > 0 {
            config = config.with_max_handles(max_handles);
        }
        let name = if name.is_null() {
            config.backend_name().to_string()
        } else {
            unsafe { CStr::from_ptr(name) }
                .to_str()
                .map_err(|_| BridgeError::marshaling("backend name is not valid UTF-8"))?
                .to_string()
        };
        let ops = registry::create_engine(&name, &config).ok_or_else(|| {
            BridgeError::invalid_argument(format!(
                "unknown backend: '{}'. Available backends: {}",
                name,
                registry::list_backends().join(", ")
            ))
        })?;
        created = Some(Box::new(TbEngine { ops }));
        Ok(())
    });
    match created {
        Some(engine) if code == TB_OK => Box::into_raw(engine),
        _ => std::ptr::null_mut(),
    }
}

#[no_mangle]
/// Destroys an engine and every tensor still registered with it.
///
/// # Safety
/// `engine` must be null or a pointer returned by `tb_engine_new*` that has not been freed.
pub unsafe extern "C" fn tb_engine_free(engine: *mut TbEngine) {
    if !engine.is_null() {
        drop(unsafe { Box::from_raw(engine) });
    }
}

#[no_mangle]
/// # Safety
/// `engine` must be a live engine; `data`, `shape` and `device` must be readable for their
/// lengths (or null with length 0); `out` must be writable.
pub unsafe extern "C" fn tb_from_blob(
    engine: *const TbEngine,
    data: *const u8,
    data_len: usize,
    shape: *const i64,
    rank: usize,
    dtype: c_int,
    layout: c_int,
    device: *const c_int,
    device_len: usize,
    requires_grad: bool,
    out: *mut u64,
) -> c_int {
    unsafe {
        write_handle(out, || {
            let ops = self::engine(engine)?;
            let data = slice(data, data_len, "data")?;
            let shape = slice(shape, rank, "shape")?;
            let device = slice(device, device_len, "device")?;
            ops.create_from_buffer(data, shape, dtype, layout, device, requires_grad)
        })
    }
}

macro_rules! shape_factory {
    ($(#[$doc:meta])* $name:ident => $method:ident) => {
        #[no_mangle]
        $(#[$doc])*
        ///
        /// # Safety
        /// `engine` must be a live engine; `shape` and `device` must be readable for their
        /// lengths (or null with length 0); `out` must be writable.
        pub unsafe extern "C" fn $name(
            engine: *const TbEngine,
            shape: *const i64,
            rank: usize,
            dtype: c_int,
            layout: c_int,
            device: *const c_int,
            device_len: usize,
            requires_grad: bool,
            out: *mut u64,
        ) -> c_int {
            unsafe {
                write_handle(out, || {
                    let ops = self::engine(engine)?;
                    let shape = slice(shape, rank, "shape")?;
                    let device = slice(device, device_len, "device")?;
                    ops.$method(shape, dtype, layout, device, requires_grad)
                })
            }
        }
    };
}

shape_factory!(
    /// Uninitialised tensor of `shape`.
    tb_empty => create_empty
);
shape_factory!(tb_zeros => create_zeros);
shape_factory!(tb_ones => create_ones);

macro_rules! like_factory {
    ($name:ident => $method:ident) => {
        #[no_mangle]
        /// # Safety
        /// `engine` must be a live engine; `device` must be readable for `device_len`
        /// elements (or null with length 0); `out` must be writable.
        pub unsafe extern "C" fn $name(
            engine: *const TbEngine,
            source: u64,
            dtype: c_int,
            layout: c_int,
            device: *const c_int,
            device_len: usize,
            requires_grad: bool,
            out: *mut u64,
        ) -> c_int {
            unsafe {
                write_handle(out, || {
                    let ops = self::engine(engine)?;
                    let device = slice(device, device_len, "device")?;
                    ops.$method(source, dtype, layout, device, requires_grad)
                })
            }
        }
    };
}

like_factory!(tb_zeros_like => create_zeros_like);
like_factory!(tb_ones_like => create_ones_like);

#[no_mangle]
/// # Safety
/// `engine` must be a live engine; `shape` and `device` must be readable for their lengths
/// (or null with length 0); `out` must be writable.
pub unsafe extern "C" fn tb_full(
    engine: *const TbEngine,
    shape: *const i64,
    rank: usize,
    fill_value: f64,
    dtype: c_int,
    layout: c_int,
    device: *const c_int,
    device_len: usize,
    requires_grad: bool,
    out: *mut u64,
) -> c_int {
    unsafe {
        write_handle(out, || {
            let ops = self::engine(engine)?;
            let shape = slice(shape, rank, "shape")?;
            let device = slice(device, device_len, "device")?;
            ops.create_full(shape, fill_value, dtype, layout, device, requires_grad)
        })
    }
}

#[no_mangle]
/// # Safety
/// `engine` must be a live engine; `device` must be readable for `device_len` elements (or
/// null with length 0); `out` must be writable.
pub unsafe extern "C" fn tb_arange(
    engine: *const TbEngine,
    start: f32,
    end: f32,
    step: f32,
    dtype: c_int,
    layout: c_int,
    device: *const c_int,
    device_len: usize,
    requires_grad: bool,
    out: *mut u64,
) -> c_int {
    unsafe {
        write_handle(out, || {
            let ops = self::engine(engine)?;
            let device = slice(device, device_len, "device")?;
            ops.create_arange(start, end, step, dtype, layout, device, requires_grad)
        })
    }
}

#[no_mangle]
/// # Safety
/// `engine` must be a live engine; `device` must be readable for `device_len` elements (or
/// null with length 0); `out` must be writable.
pub unsafe extern "C" fn tb_linspace(
    engine: *const TbEngine,
    start: f32,
    end: f32,
    steps: c_int,
    dtype: c_int,
    layout: c_int,
    device: *const c_int,
    device_len: usize,
    requires_grad: bool,
    out: *mut u64,
) -> c_int {
    unsafe {
        write_handle(out, || {
            let ops = self::engine(engine)?;
            let device = slice(device, device_len, "device")?;
            ops.create_linspace(start, end, steps, dtype, layout, device, requires_grad)
        })
    }
}

#[no_mangle]
/// # Safety
/// `engine` must be a live engine; `device` must be readable for `device_len` elements (or
/// null with length 0); `out` must be writable.
pub unsafe extern "C" fn tb_eye(
    engine: *const TbEngine,
    n: c_int,
    m: c_int,
    dtype: c_int,
    layout: c_int,
    device: *const c_int,
    device_len: usize,
    requires_grad: bool,
    out: *mut u64,
) -> c_int {
    unsafe {
        write_handle(out, || {
            let ops = self::engine(engine)?;
            let device = slice(device, device_len, "device")?;
            ops.create_eye(n, m, dtype, layout, device, requires_grad)
        })
    }
}

#[no_mangle]
/// # Safety
/// `engine` must be a live engine.
pub unsafe extern "C" fn tb_release(engine: *const TbEngine, handle: u64) -> c_int {
    guard(|| unsafe { self::engine(engine) }?.release(handle))
}

#[no_mangle]
/// Fills `info` and writes up to `dims_capacity` extents into `dims`.
///
/// # Safety
/// `engine` must be a live engine; `info` must be writable; `dims` must be writable for
/// `dims_capacity` elements (or null with capacity 0).
pub unsafe extern "C" fn tb_describe(
    engine: *const TbEngine,
    handle: u64,
    info: *mut TbTensorInfo,
    dims: *mut i64,
    dims_capacity: usize,
) -> c_int {
    guard(|| {
        if info.is_null() {
            return Err(BridgeError::marshaling("info pointer is null"));
        }
        if dims.is_null() && dims_capacity > 0 {
            return Err(BridgeError::marshaling(format!(
                "dims pointer is null but capacity is {dims_capacity}"
            )));
        }
        let meta = unsafe { self::engine(engine) }?.describe(handle)?;
        let [device_kind, device_index] = marshal::device_to_codes(meta.device);
        let written = TbTensorInfo {
            dtype: codes::encode_dtype(meta.dtype),
            layout: codes::encode_layout(meta.layout),
            device_kind,
            device_index,
            requires_grad: meta.requires_grad,
            rank: meta.shape.len(),
        };
        unsafe {
            info.write(written);
            for (i, dim) in meta.shape.iter().take(dims_capacity).enumerate() {
                dims.add(i).write(*dim);
            }
        }
        Ok(())
    })
}

#[no_mangle]
/// Copies the dense row-major contents of `handle` into `out`.
///
/// `written` always receives the byte size of the tensor, so a call with a too small buffer
/// fails with `TB_ERR_MARSHALING` and reports how much space is needed.
///
/// # Safety
/// `engine` must be a live engine; `out` must be writable for `capacity` bytes (or null with
/// capacity 0); `written` must be null or writable.
pub unsafe extern "C" fn tb_copy_to_host(
    engine: *const TbEngine,
    handle: u64,
    out: *mut u8,
    capacity: usize,
    written: *mut usize,
) -> c_int {
    guard(|| {
        let host = unsafe { self::engine(engine) }?.to_host(handle)?;
        let bytes = host.bytes();
        if !written.is_null() {
            unsafe { written.write(bytes.len()) };
        }
        if bytes.len() > capacity {
            return Err(BridgeError::marshaling(format!(
                "output buffer holds {capacity} bytes but the tensor needs {}",
                bytes.len()
            )));
        }
        if !bytes.is_empty() {
            if out.is_null() {
                return Err(BridgeError::marshaling("output buffer pointer is null"));
            }
            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len()) };
        }
        Ok(())
    })
}

#[no_mangle]
/// Number of live handles owned by `engine`, or 0 for a null engine.
///
/// # Safety
/// `engine` must be null or a live engine.
pub unsafe extern "C" fn tb_live_handles(engine: *const TbEngine) -> usize {
    unsafe { self::engine(engine) }
        .map(|ops| ops.live_handles())
        .unwrap_or(0)
}

#[no_mangle]
/// Message of the most recent failure on this thread, or null. The pointer stays valid until
/// the next failing call on the same thread.
pub extern "C" fn tb_last_error() -> *const c_char {
    status::last_error_ptr()
}

#[no_mangle]
pub extern "C" fn tb_clear_last_error() {
    status::clear_last_error();
}

#[no_mangle]
/// JSON describing every dtype, layout and device-kind code. Free with [`tb_string_free`].
/// Returns null on failure.
pub extern "C" fn tb_code_table_json() -> *mut c_char {
    codes::code_table_json()
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map_or(std::ptr::null_mut(), CString::into_raw)
}

#[no_mangle]
/// Comma-separated names of the registered backends. Free with [`tb_string_free`].
pub extern "C" fn tb_list_backends() -> *mut c_char {
    ensure_backends_registered();
    CString::new(registry::list_backends().join(","))
        .map_or(std::ptr::null_mut(), CString::into_raw)
}

#[no_mangle]
/// # Safety
/// `text` must be null or a string returned by this library that has not been freed.
pub unsafe extern "C" fn tb_string_free(text: *mut c_char) {
    if !text.is_null() {
        drop(unsafe { CString::from_raw(text) });
    }
}

#[no_mangle]
/// Installs a stderr `tracing` subscriber filtered by `TBRIDGE_LOG` (or `RUST_LOG`).
/// Returns 1 when installed, 0 when a subscriber already existed.
pub extern "C" fn tb_init_logging() -> c_int {
    let directive = tbridge::env::log_directive().unwrap_or_else(|| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    c_int::from(installed)
}
