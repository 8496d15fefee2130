/**
 * native/layout.rs
 *
 * Memory-layout mirror of the libnice records read by the bindings.
 *
 * Fields through `password` match the public `NiceCandidate` of libnice
 * 0.1.21 (soversion 10) on 64-bit platforms. The TURN tail is not part of
 * every release's public record, so views over native memory stop at the
 * end of `foundation`. Nothing here can detect a moved field at runtime;
 * the offsets are pinned by the assertions below.
 */

use std::mem::{offset_of, size_of};
use std::os::raw::c_char;

use super::types::{CandidateTransport, CandidateType, GPointer};

/// Size of the largest socket address variant (`sockaddr_in6`)
pub const NICE_ADDRESS_SIZE: usize = 28;

/// `NICE_CANDIDATE_MAX_FOUNDATION`
pub const FOUNDATION_LEN: usize = 33;

/// Buffer size handed to `nice_address_to_string`
pub const ADDRESS_STRING_LEN: usize = 256;

/// `NiceAddress`: a union of socket addresses, kept opaque
#[repr(C, align(4))]
#[derive(Clone, Copy)]
pub struct NiceAddress {
    pub opaque: [u8; NICE_ADDRESS_SIZE],
}

/// `NiceCandidate`
#[repr(C)]
pub struct NiceCandidate {
    pub kind: u32,
    pub transport: u32,
    pub addr: NiceAddress,
    pub base_addr: NiceAddress,
    pub priority: u32,
    pub stream_id: u32,
    pub component_id: u32,
    pub foundation: [c_char; FOUNDATION_LEN],
    pub _foundation_pad: [u8; 3],
    pub username: *mut c_char,
    pub password: *mut c_char,
    pub turn_addr: NiceAddress,
    pub turn_transport: u32,
    pub _reserved: [u8; 4],
}

/// `GSList` node
#[repr(C)]
pub struct GSList {
    pub data: GPointer,
    pub next: *mut GSList,
}

pub const CANDIDATE_SIZE: usize = size_of::<NiceCandidate>();

/// Bytes a view over native memory covers: up to the end of `foundation`
pub const CANDIDATE_PREFIX_LEN: usize = offset::FOUNDATION + FOUNDATION_LEN;

/// Byte offsets of the `NiceCandidate` fields
pub mod offset {
    use super::*;

    pub const TYPE: usize = offset_of!(NiceCandidate, kind);
    pub const TRANSPORT: usize = offset_of!(NiceCandidate, transport);
    pub const ADDR: usize = offset_of!(NiceCandidate, addr);
    pub const BASE_ADDR: usize = offset_of!(NiceCandidate, base_addr);
    pub const PRIORITY: usize = offset_of!(NiceCandidate, priority);
    pub const STREAM_ID: usize = offset_of!(NiceCandidate, stream_id);
    pub const COMPONENT_ID: usize = offset_of!(NiceCandidate, component_id);
    pub const FOUNDATION: usize = offset_of!(NiceCandidate, foundation);
    pub const USERNAME: usize = offset_of!(NiceCandidate, username);
    pub const PASSWORD: usize = offset_of!(NiceCandidate, password);
    pub const TURN_ADDR: usize = offset_of!(NiceCandidate, turn_addr);
    pub const TURN_TRANSPORT: usize = offset_of!(NiceCandidate, turn_transport);
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(size_of::<NiceAddress>() == NICE_ADDRESS_SIZE);
    assert!(offset::TYPE == 0);
    assert!(offset::TRANSPORT == 4);
    assert!(offset::ADDR == 8);
    assert!(offset::BASE_ADDR == 36);
    assert!(offset::PRIORITY == 64);
    assert!(offset::STREAM_ID == 68);
    assert!(offset::COMPONENT_ID == 72);
    assert!(offset::FOUNDATION == 76);
    assert!(offset::USERNAME == 112);
    assert!(offset::PASSWORD == 120);
    assert!(offset::TURN_ADDR == 128);
    assert!(offset::TURN_TRANSPORT == 156);
    assert!(CANDIDATE_SIZE == 168);
    assert!(CANDIDATE_PREFIX_LEN == 109);
    assert!(size_of::<GSList>() == 16);
};

/// Read-only view over the raw bytes of one `NiceCandidate`.
///
/// Field readers use native endianness and do no validation. The buffer
/// must cover at least `CANDIDATE_PREFIX_LEN` bytes. Readers for fields past
/// the prefix return `None` when the buffer is shorter.
#[derive(Clone, Copy)]
pub struct CandidateView<'a> {
    bytes: &'a [u8],
}

impl<'a> CandidateView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() >= CANDIDATE_PREFIX_LEN, "candidate buffer too small");
        Self { bytes }
    }

    /// View the prefix of the candidate behind a native pointer
    ///
    /// # Safety
    /// `ptr` must point to a live `NiceCandidate` that outlives `'a`.
    pub unsafe fn from_ptr(ptr: *const NiceCandidate) -> Self {
        Self::new(std::slice::from_raw_parts(ptr as *const u8, CANDIDATE_PREFIX_LEN))
    }

    fn u32_at(&self, at: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_ne_bytes(raw)
    }

    fn tail_u32_at(&self, at: usize) -> Option<u32> {
        let bytes = self.bytes.get(at..at + 4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Some(u32::from_ne_bytes(raw))
    }

    fn tail_usize_at(&self, at: usize) -> Option<usize> {
        let bytes = self.bytes.get(at..at + size_of::<usize>())?;
        let mut raw = [0u8; size_of::<usize>()];
        raw.copy_from_slice(bytes);
        Some(usize::from_ne_bytes(raw))
    }

    fn address_at(&self, at: usize) -> &'a [u8] {
        &self.bytes[at..at + NICE_ADDRESS_SIZE]
    }

    pub fn raw_type(&self) -> u32 {
        self.u32_at(offset::TYPE)
    }

    pub fn candidate_type(&self) -> Option<CandidateType> {
        CandidateType::from_raw(self.raw_type())
    }

    pub fn raw_transport(&self) -> u32 {
        self.u32_at(offset::TRANSPORT)
    }

    pub fn transport(&self) -> Option<CandidateTransport> {
        CandidateTransport::from_raw(self.raw_transport())
    }

    pub fn priority(&self) -> u32 {
        self.u32_at(offset::PRIORITY)
    }

    pub fn stream_id(&self) -> u32 {
        self.u32_at(offset::STREAM_ID)
    }

    pub fn component_id(&self) -> u32 {
        self.u32_at(offset::COMPONENT_ID)
    }

    pub fn turn_transport(&self) -> Option<u32> {
        self.tail_u32_at(offset::TURN_TRANSPORT)
    }

    /// Longest NUL-terminated prefix of the fixed foundation array
    pub fn foundation(&self) -> String {
        let field = &self.bytes[offset::FOUNDATION..offset::FOUNDATION + FOUNDATION_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(FOUNDATION_LEN);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }

    pub fn addr(&self) -> &'a [u8] {
        self.address_at(offset::ADDR)
    }

    pub fn base_addr(&self) -> &'a [u8] {
        self.address_at(offset::BASE_ADDR)
    }

    pub fn turn_addr(&self) -> Option<&'a [u8]> {
        self.bytes.get(offset::TURN_ADDR..offset::TURN_ADDR + NICE_ADDRESS_SIZE)
    }

    /// Raw value of the `username` pointer field
    pub fn username_ptr(&self) -> Option<usize> {
        self.tail_usize_at(offset::USERNAME)
    }

    /// Raw value of the `password` pointer field
    pub fn password_ptr(&self) -> Option<usize> {
        self.tail_usize_at(offset::PASSWORD)
    }

    /// Pointer to the embedded `addr` field, for the address accessors
    pub fn addr_ptr(&self) -> *const NiceAddress {
        self.addr().as_ptr() as *const NiceAddress
    }
}
