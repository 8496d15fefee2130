/**
 * agent/candidate.rs
 *
 * Caller-owned copies of native candidates
 */

use serde::Serialize;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;

use crate::native::layout::{CandidateView, GSList, NiceCandidate, ADDRESS_STRING_LEN};
use crate::native::types::{CandidateTransport, CandidateType};
use crate::native::Symbols;

/// Copy of the caller-relevant fields of one `NiceCandidate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSnapshot {
    pub candidate_type: Option<CandidateType>,
    pub transport: Option<CandidateTransport>,
    pub address: String,
    pub port: u16,
    pub foundation: String,
    pub priority: u32,
    pub stream_id: u32,
    pub component_id: u32,
}

impl CandidateSnapshot {
    /// Copy a candidate; address and port go through the native accessors
    pub fn capture(view: &CandidateView<'_>, symbols: &Symbols) -> Self {
        let address = match symbols.nice_address_to_string {
            Some(to_string) => {
                let mut buf = [0 as c_char; ADDRESS_STRING_LEN];
                unsafe { to_string(view.addr_ptr(), buf.as_mut_ptr()) };
                buf[ADDRESS_STRING_LEN - 1] = 0;
                unsafe { CStr::from_ptr(buf.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            }
            None => String::new(),
        };

        let port = match symbols.nice_address_get_port {
            Some(get_port) => (unsafe { get_port(view.addr_ptr()) }) as u16,
            None => 0,
        };

        Self {
            candidate_type: view.candidate_type(),
            transport: view.transport(),
            address,
            port,
            foundation: view.foundation(),
            priority: view.priority(),
            stream_id: view.stream_id(),
            component_id: view.component_id(),
        }
    }
}

impl fmt::Display for CandidateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.candidate_type.map(|t| t.as_str()).unwrap_or("unknown");
        let transport = self.transport.map(|t| t.as_str()).unwrap_or("unknown");
        write!(
            f,
            "[{}] {}:{} ({}, priority {}, foundation {})",
            kind, self.address, self.port, transport, self.priority, self.foundation
        )
    }
}

/// Snapshot every candidate of a native list, head to tail.
///
/// Does not free anything; the list belongs to the caller of this function.
///
/// # Safety
/// `list` must be null or a valid `GSList` whose non-null `data` entries
/// point to live `NiceCandidate`s.
pub unsafe fn snapshot_list(list: *const GSList, symbols: &Symbols) -> Vec<CandidateSnapshot> {
    let mut snapshots = Vec::new();
    let mut node = list;
    while !node.is_null() {
        let data = (*node).data as *const NiceCandidate;
        if !data.is_null() {
            let view = CandidateView::from_ptr(data);
            snapshots.push(CandidateSnapshot::capture(&view, symbols));
        }
        node = (*node).next;
    }
    snapshots
}
