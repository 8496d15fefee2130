/**
 * ffi/mod.rs
 *
 * C-ABI surface over the event loop and agent handles
 */

mod agent;
mod types;

pub use agent::*;
pub use types::*;

use libc::{c_char, c_int};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::panic;
use tracing::error;

use crate::config::BridgeConfig;
use crate::native;

thread_local! {
    // Per calling thread, like errno
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Initialize logging and load the native library (call once at startup).
/// Returns 0 on success, -1 when loading was required and failed.
#[no_mangle]
pub extern "C" fn nice_bridge_init() -> c_int {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    // Panics must not unwind into foreign frames
    panic::set_hook(Box::new(|panic_info| {
        error!("nice-bridge panic: {}", panic_info);
    }));

    match native::init(&BridgeConfig::from_env()) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Get library version string (static, do not free)
#[no_mangle]
pub extern "C" fn nice_bridge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Free a string allocated by the library
#[no_mangle]
pub extern "C" fn nice_bridge_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

/// Get the calling thread's last error message; free with `nice_bridge_free_string`
#[no_mangle]
pub extern "C" fn nice_bridge_last_error() -> *mut c_char {
    LAST_ERROR.with(|last| match last.borrow().as_deref() {
        Some(err) => into_c_string(err),
        None => std::ptr::null_mut(),
    })
}

/// Clear last error
#[no_mangle]
pub extern "C" fn nice_bridge_clear_error() {
    LAST_ERROR.with(|last| *last.borrow_mut() = None);
}

pub(crate) fn set_last_error(error: &str) {
    LAST_ERROR.with(|last| *last.borrow_mut() = Some(error.to_string()));
}

pub(crate) fn last_error() -> Option<String> {
    LAST_ERROR.with(|last| last.borrow().clone())
}

/// Helper to convert C string to Rust string
pub(crate) fn c_str_to_rust(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

/// Hand a string to C; interior NULs truncate it
pub(crate) fn into_c_string(s: &str) -> *mut c_char {
    let bytes = s.split('\0').next().unwrap_or_default();
    match CString::new(bytes) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}
