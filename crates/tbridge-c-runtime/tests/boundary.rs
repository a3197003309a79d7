use std::ffi::{CStr, CString};
use std::ptr;

use tbridge_c::*;

const F32: i32 = 0;
const I32: i32 = 4;
const UNSPECIFIED: i32 = 8;
const STRIDED: i32 = 0;
const SPARSE: i32 = 1;
const HOST: [i32; 2] = [0, -1];
const UNSET: u64 = 0xdead_beef;

struct Engine(*mut TbEngine);

impl Engine {
    fn new(name: &str) -> Self {
        let name = CString::new(name).unwrap();
        let engine = unsafe { tb_engine_new(name.as_ptr()) };
        assert!(!engine.is_null(), "{}", last_error());
        Engine(engine)
    }

    fn with_limit(name: &str, limit: usize) -> Self {
        let name = CString::new(name).unwrap();
        let engine = unsafe { tb_engine_new_with_limit(name.as_ptr(), limit) };
        assert!(!engine.is_null(), "{}", last_error());
        Engine(engine)
    }

    fn zeros(&self, shape: &[i64], dtype: i32) -> Result<u64, i32> {
        let mut out = UNSET;
        let code = unsafe {
            tb_zeros(
                self.0,
                shape.as_ptr(),
                shape.len(),
                dtype,
                STRIDED,
                HOST.as_ptr(),
                HOST.len(),
                false,
                &mut out,
            )
        };
        if code == TB_OK {
            Ok(out)
        } else {
            assert_eq!(out, UNSET, "handle written on failure");
            Err(code)
        }
    }

    fn host_bytes(&self, handle: u64) -> Vec<u8> {
        let mut needed = 0usize;
        let code = unsafe { tb_copy_to_host(self.0, handle, ptr::null_mut(), 0, &mut needed) };
        if needed > 0 {
            assert_eq!(code, TB_ERR_MARSHALING);
        }
        let mut buffer = vec![0u8; needed];
        let code = unsafe {
            tb_copy_to_host(self.0, handle, buffer.as_mut_ptr(), buffer.len(), &mut needed)
        };
        assert_eq!(code, TB_OK, "{}", last_error());
        buffer
    }

    fn live(&self) -> usize {
        unsafe { tb_live_handles(self.0) }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        unsafe { tb_engine_free(self.0) };
    }
}

fn last_error() -> String {
    let message = tb_last_error();
    if message.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

fn f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
fn zeros_round_trip_through_the_c_surface() {
    let engine = Engine::new("cpu");
    let handle = engine.zeros(&[2, 3], F32).unwrap();
    assert_ne!(handle, 0);
    assert_eq!(f32s(&engine.host_bytes(handle)), vec![0.0; 6]);

    let mut info = TbTensorInfo::default();
    let mut dims = [0i64; 4];
    let code = unsafe { tb_describe(engine.0, handle, &mut info, dims.as_mut_ptr(), dims.len()) };
    assert_eq!(code, TB_OK);
    assert_eq!(info.rank, 2);
    assert_eq!(&dims[..2], &[2, 3]);
    assert_eq!(info.dtype, F32);
    assert_eq!((info.device_kind, info.device_index), (0, -1));
}

#[test]
fn arange_int32_counts_up() {
    let engine = Engine::new("cpu");
    let mut out = UNSET;
    let code = unsafe {
        tb_arange(engine.0, 0.0, 10.0, 1.0, I32, STRIDED, HOST.as_ptr(), 2, false, &mut out)
    };
    assert_eq!(code, TB_OK, "{}", last_error());
    let values: Vec<i32> = engine
        .host_bytes(out)
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(values, (0..10).collect::<Vec<_>>());
}

#[test]
fn from_blob_copies_and_eye_fills_the_diagonal() {
    let engine = Engine::new("cpu");
    let mut data: Vec<u8> = [1.5f32, -2.0, 3.25, 4.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let shape = [2i64, 2];
    let mut blob = UNSET;
    let code = unsafe {
        tb_from_blob(
            engine.0,
            data.as_ptr(),
            data.len(),
            shape.as_ptr(),
            shape.len(),
            F32,
            STRIDED,
            HOST.as_ptr(),
            2,
            false,
            &mut blob,
        )
    };
    assert_eq!(code, TB_OK, "{}", last_error());
    data.fill(0);
    assert_eq!(f32s(&engine.host_bytes(blob)), vec![1.5, -2.0, 3.25, 4.0]);

    let mut eye = UNSET;
    let code = unsafe {
        tb_eye(engine.0, 2, 3, UNSPECIFIED, SPARSE, HOST.as_ptr(), 2, false, &mut eye)
    };
    assert_eq!(code, TB_OK, "{}", last_error());
    assert_eq!(
        f32s(&engine.host_bytes(eye)),
        vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
    );
}

#[test]
fn failures_map_to_status_codes_and_messages() {
    let engine = Engine::new("cpu");

    assert_eq!(engine.zeros(&[2, -1], F32), Err(TB_ERR_INVALID_ARGUMENT));
    assert!(last_error().contains("negative dimension"), "{}", last_error());

    assert_eq!(engine.zeros(&[2], 9), Err(TB_ERR_INVALID_ARGUMENT));

    let mut out = UNSET;
    let code = unsafe {
        tb_from_blob(
            engine.0,
            ptr::null(),
            16,
            [4i64].as_ptr(),
            1,
            F32,
            STRIDED,
            HOST.as_ptr(),
            2,
            false,
            &mut out,
        )
    };
    assert_eq!(code, TB_ERR_MARSHALING);
    assert_eq!(out, UNSET);

    let device = [0, -1, 7];
    let code = unsafe {
        tb_ones(engine.0, [3i64].as_ptr(), 1, F32, STRIDED, device.as_ptr(), 3, false, &mut out)
    };
    assert_eq!(code, TB_ERR_MARSHALING);

    let cuda = [1, 0];
    let code = unsafe {
        tb_ones(engine.0, [3i64].as_ptr(), 1, F32, STRIDED, cuda.as_ptr(), 2, false, &mut out)
    };
    assert_eq!(code, TB_ERR_NATIVE);
    assert!(last_error().contains("cuda:0"), "{}", last_error());

    let code = unsafe { tb_linspace(engine.0, 0.0, 1.0, 5, F32, STRIDED, HOST.as_ptr(), 2, false, ptr::null_mut()) };
    assert_eq!(code, TB_ERR_MARSHALING);

    assert_eq!(out, UNSET);
    assert_eq!(engine.live(), 0);
}

#[test]
fn released_and_foreign_handles_are_rejected() {
    let engine = Engine::new("cpu");
    let other = Engine::new("cpu");
    let handle = engine.zeros(&[4], F32).unwrap();

    let mut out = UNSET;
    let code = unsafe {
        tb_zeros_like(other.0, handle, UNSPECIFIED, STRIDED, HOST.as_ptr(), 2, false, &mut out)
    };
    assert_eq!(code, TB_ERR_INVALID_HANDLE);

    assert_eq!(unsafe { tb_release(engine.0, handle) }, TB_OK);
    assert_eq!(unsafe { tb_release(engine.0, handle) }, TB_ERR_INVALID_HANDLE);
    let code = unsafe {
        tb_ones_like(engine.0, handle, UNSPECIFIED, STRIDED, HOST.as_ptr(), 2, false, &mut out)
    };
    assert_eq!(code, TB_ERR_INVALID_HANDLE);
    assert_eq!(out, UNSET);
    assert_eq!(engine.live(), 0);
}

#[test]
fn handle_limit_is_a_native_fault() {
    let engine = Engine::with_limit("cpu", 2);
    engine.zeros(&[1], F32).unwrap();
    engine.zeros(&[1], F32).unwrap();
    assert_eq!(engine.zeros(&[1], F32), Err(TB_ERR_NATIVE));
    assert_eq!(engine.live(), 2);
}

#[test]
fn null_and_unknown_engines_are_reported() {
    assert_eq!(unsafe { tb_release(ptr::null(), 1) }, TB_ERR_MARSHALING);
    assert_eq!(unsafe { tb_live_handles(ptr::null()) }, 0);

    let name = CString::new("no-such-backend").unwrap();
    let engine = unsafe { tb_engine_new(name.as_ptr()) };
    assert!(engine.is_null());
    assert!(last_error().contains("unknown backend"), "{}", last_error());
}

#[test]
fn code_table_and_backend_list_are_exported() {
    let table = tb_code_table_json();
    assert!(!table.is_null());
    let text = unsafe { CStr::from_ptr(table) }.to_str().unwrap().to_string();
    unsafe { tb_string_free(table) };
    assert!(text.contains("\"float32\""));
    assert!(text.contains("\"opaque\""));

    let backends = tb_list_backends();
    let names = unsafe { CStr::from_ptr(backends) }.to_str().unwrap().to_string();
    unsafe { tb_string_free(backends) };
    assert!(names.split(',').any(|name| name == "cpu-ref"));
}
