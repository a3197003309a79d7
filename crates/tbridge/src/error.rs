//! Caller-visible error taxonomy and the boundary that every operation runs inside.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::backend::spec::BackendError;
use crate::registry::Handle;

/// Coarse classification of a [`BridgeError`], stable across boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or inaccessible input array/buffer from the caller.
    Marshaling,
    /// Shape/option combination rejected before or by the native factory.
    InvalidArgument,
    /// Sparse/opaque conversion the native library cannot represent.
    UnsupportedLayout,
    /// Unknown, released or foreign handle.
    InvalidHandle,
    /// Any other failure surfaced by the native library.
    Native,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Marshaling => "marshaling",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::UnsupportedLayout => "unsupported_layout",
            ErrorKind::InvalidHandle => "invalid_handle",
            ErrorKind::Native => "native",
        }
    }

    /// Negative status code used by the C boundary; `0` is reserved for success.
    pub fn status_code(self) -> i32 {
        match self {
            ErrorKind::Marshaling => -1,
            ErrorKind::InvalidArgument => -2,
            ErrorKind::UnsupportedLayout => -3,
            ErrorKind::InvalidHandle => -4,
            ErrorKind::Native => -5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("marshaling fault: {0}")]
    Marshaling(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    UnsupportedLayout(String),
    #[error("invalid handle {0:#x}")]
    InvalidHandle(Handle),
    #[error("{0}")]
    Native(BackendError),
}

impl BridgeError {
    pub fn marshaling(message: impl Into<String>) -> Self {
        BridgeError::Marshaling(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        BridgeError::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Marshaling(_) => ErrorKind::Marshaling,
            BridgeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BridgeError::UnsupportedLayout(_) => ErrorKind::UnsupportedLayout,
            BridgeError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            BridgeError::Native(_) => ErrorKind::Native,
        }
    }
}

impl From<BackendError> for BridgeError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidArgument { message } => BridgeError::InvalidArgument(message),
            BackendError::UnsupportedLayout { message } => BridgeError::UnsupportedLayout(message),
            other => BridgeError::Native(other),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Runs one bridge operation, translating native failures and panics into [`BridgeError`].
///
/// Nothing raised inside `body` escapes unconverted: backend errors arrive through `?`, and a
/// panic inside a native call is caught here and reported as [`ErrorKind::Native`].
pub fn boundary<T>(op: &'static str, body: impl FnOnce() -> BridgeResult<T>) -> BridgeResult<T> {
    let span = tracing::debug_span!("tbridge.op", op);
    let _entered = span.enter();

    let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(BridgeError::Native(BackendError::execution(format!(
            "{op} panicked: {}",
            panic_message(payload.as_ref())
        )))),
    };
    if let Err(err) = &result {
        tracing::debug!(kind = err.kind().as_str(), error = %err, "operation failed");
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn backend_errors_keep_their_message_and_map_to_kinds() {
        let err: BridgeError = BackendError::invalid_argument("negative dimension -1").into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "negative dimension -1");

        let err: BridgeError = BackendError::execution("out of memory").into();
        assert_eq!(err.kind(), ErrorKind::Native);
        assert_eq!(err.to_string(), "out of memory");
    }

    #[test]
    fn boundary_turns_panics_into_native_errors() {
        let result: BridgeResult<u64> = boundary("zeros", || panic!("allocator exploded"));
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Native);
        assert!(err.to_string().contains("allocator exploded"));
    }

    #[test]
    fn status_codes_are_distinct_and_negative() {
        let kinds = [
            ErrorKind::Marshaling,
            ErrorKind::InvalidArgument,
            ErrorKind::UnsupportedLayout,
            ErrorKind::InvalidHandle,
            ErrorKind::Native,
        ];
        let codes: HashSet<i32> = kinds.iter().map(|k| k.status_code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        assert_eq!(codes.len(), kinds.len());
    }
}
