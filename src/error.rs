/**
 * error.rs
 *
 * Error types. Absent symbols and native error codes are not errors here:
 * agent and loop operations return neutral values for those.
 */

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("native ICE library not found (tried: {})", tried.join(", "))]
    LibraryNotFound { tried: Vec<String> },

    #[error("required native symbols missing: {}", .0.join(", "))]
    MissingSymbols(Vec<&'static str>),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A caller-side wait that did not observe its signal.
///
/// The native operation may still complete later; the agent stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Description relay errors
#[derive(Debug, Error)]
pub enum SignallingError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),
    #[error("Relay error: {0}")]
    Relay(String),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
