// SPDX-License-Identifier: MIT

//! Error taxonomy for registry and lifecycle operations.
//!
//! Dataplane failures (bad frames, failed sends, dropped duplicates) never
//! reach this type — they are absorbed and surfaced only through
//! [`crate::metrics::Metrics`] and `log` records.

use std::fmt;
use std::io;

/// Coarse error classification, mirroring the small integer taxonomy a
/// C API of this shape would expose (`EXISTS`, `INVALID`, `NOT_FOUND`,
/// `LOCK`, `OOM`) for callers that want to `match` on kind rather than on
/// the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Exists,
    Invalid,
    NotFound,
    Lock,
    Oom,
    Io,
}

/// Error type returned by registry and lifecycle operations.
#[derive(Debug)]
pub enum RingError {
    /// `host_add` called with a `node_id` that already has a live host.
    HostExists(u16),
    /// `host_remove`/`get` called with a `node_id` that has no live host.
    HostNotFound(u16),
    /// A link configuration was rejected (bad id, or `latency_exp >= latency_fix`).
    InvalidLink(String),
    /// The handle's internal state no longer supports the requested operation
    /// (e.g. the local endpoint already hit end-of-stream).
    InvalidState(String),
    /// Allocation failed; the registry/handle is left unchanged.
    OutOfMemory,
    /// An OS-level I/O error occurred (socket creation, bind, poll setup, ...).
    Io(io::Error),
}

impl RingError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RingError::HostExists(_) => ErrorKind::Exists,
            RingError::HostNotFound(_) => ErrorKind::NotFound,
            RingError::InvalidLink(_) | RingError::InvalidState(_) => ErrorKind::Invalid,
            RingError::OutOfMemory => ErrorKind::Oom,
            RingError::Io(_) => ErrorKind::Io,
        }
    }
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::HostExists(id) => write!(f, "host {id} already registered"),
            RingError::HostNotFound(id) => write!(f, "host {id} not found"),
            RingError::InvalidLink(msg) => write!(f, "invalid link configuration: {msg}"),
            RingError::InvalidState(msg) => write!(f, "invalid handle state: {msg}"),
            RingError::OutOfMemory => write!(f, "allocation failed"),
            RingError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RingError {
    fn from(e: io::Error) -> Self {
        RingError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, RingError>;
