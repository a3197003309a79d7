//! Status codes and the per-thread last-error slot.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CString};
use std::panic::{self, AssertUnwindSafe};

use tbridge::{BridgeError, BridgeResult};

pub const TB_OK: c_int = 0;
pub const TB_ERR_MARSHALING: c_int = -1;
pub const TB_ERR_INVALID_ARGUMENT: c_int = -2;
pub const TB_ERR_UNSUPPORTED_LAYOUT: c_int = -3;
pub const TB_ERR_INVALID_HANDLE: c_int = -4;
pub const TB_ERR_NATIVE: c_int = -5;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(err: &BridgeError) {
    // Interior NULs would truncate the message on the C side anyway.
    let text = err.to_string().replace('\0', " ");
    let message = CString::new(text).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |message| message.as_ptr())
    })
}

/// Runs `body`, records any failure for `tb_last_error` and maps it to a status code.
///
/// Panics raised outside a bridge operation must not unwind into C, so they are caught here
/// as well and reported as native faults.
pub(crate) fn guard(body: impl FnOnce() -> BridgeResult<()>) -> c_int {
    let result = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
        Err(BridgeError::Native(tbridge::BackendError::execution(
            "panic in C runtime",
        )))
    });
    match result {
        Ok(()) => TB_OK,
        Err(err) => {
            let code = err.kind().status_code();
            set_last_error(&err);
            code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbridge::ErrorKind;

    #[test]
    fn status_codes_follow_error_kinds() {
        assert_eq!(ErrorKind::Marshaling.status_code(), TB_ERR_MARSHALING);
        assert_eq!(ErrorKind::InvalidArgument.status_code(), TB_ERR_INVALID_ARGUMENT);
        assert_eq!(ErrorKind::UnsupportedLayout.status_code(), TB_ERR_UNSUPPORTED_LAYOUT);
        assert_eq!(ErrorKind::InvalidHandle.status_code(), TB_ERR_INVALID_HANDLE);
        assert_eq!(ErrorKind::Native.status_code(), TB_ERR_NATIVE);
    }

    #[test]
    fn guard_records_the_message() {
        clear_last_error();
        let code = guard(|| Err(BridgeError::invalid_argument("bad step")));
        assert_eq!(code, TB_ERR_INVALID_ARGUMENT);
        let message = unsafe { std::ffi::CStr::from_ptr(last_error_ptr()) };
        assert_eq!(message.to_str().unwrap(), "bad step");
    }

    #[test]
    fn guard_converts_panics() {
        let code = guard(|| panic!("boom"));
        assert_eq!(code, TB_ERR_NATIVE);
    }
}
