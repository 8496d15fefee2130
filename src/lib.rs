#![allow(unused_doc_comments)]
/**
 * This style of comments threw out warnings.
 * This allow statement fixes that
 */

/**
 * lib.rs
 *
 * Runtime-loaded libnice bindings: symbol table, event loop, agent handle
 * and the bridge that turns native callbacks into waitable events.
 */

pub mod agent;
pub mod bridge;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod ffi;
pub mod native;
pub mod signalling;

pub use agent::{Agent, AgentConfig, CandidateSnapshot, Stream};
pub use bridge::{AgentEvents, ReceivedData, Signal};
pub use config::BridgeConfig;
pub use error::{Error, Result, SignallingError, WaitError};
pub use event_loop::{EventLoop, LoopStatus};
pub use native::types::{CandidateTransport, CandidateType, Compatibility, ComponentState};
pub use native::Symbols;
