/**
 * ffi/types.rs
 *
 * Common FFI types and structures
 */

use libc::{c_char, c_int, c_uint, size_t};

/// Opaque handle for an `EventLoop`
#[repr(C)]
pub struct EventLoopHandle {
    _private: [u8; 0],
}

/// Opaque handle for an `Agent`
#[repr(C)]
pub struct AgentHandle {
    _private: [u8; 0],
}

/// FFI-safe buffer structure
#[repr(C)]
pub struct ByteBuffer {
    pub data: *mut u8,
    pub len: size_t,
    pub capacity: size_t,
}

impl ByteBuffer {
    /// Create from Vec<u8>
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let mut vec = std::mem::ManuallyDrop::new(vec);
        Self {
            data: vec.as_mut_ptr(),
            len: vec.len(),
            capacity: vec.capacity(),
        }
    }

    /// Create empty buffer
    pub fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    /// Take the allocation back
    ///
    /// # Safety
    /// `self` must come from `from_vec` and not have been released yet.
    pub unsafe fn into_vec(self) -> Vec<u8> {
        if self.data.is_null() {
            return Vec::new();
        }
        Vec::from_raw_parts(self.data, self.len, self.capacity)
    }
}

/// Free a ByteBuffer
#[no_mangle]
pub extern "C" fn nice_bridge_free_buffer(buffer: ByteBuffer) {
    drop(unsafe { buffer.into_vec() });
}

/// Agent creation options. Null pointers and zero values mean defaults.
#[repr(C)]
pub struct AgentOptions {
    /// `NiceCompatibility` value
    pub compatibility: c_uint,
    pub controlling: c_int,
    pub stun_host: *const c_char,
    pub stun_port: u16,
    pub disable_extra_features: c_int,
}
