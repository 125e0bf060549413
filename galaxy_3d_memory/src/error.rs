//! Error types for the Galaxy3D memory core
//!
//! This module defines the error types used by the allocator, the transfer
//! pipeline and the backend seam. Out-of-memory is kept distinct from
//! programmer errors so callers can degrade gracefully (e.g. refuse to load
//! an asset) without masking broken invariants.

use std::fmt;

/// Result type for Galaxy3D memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D memory errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, poisoned lock, etc.)
    BackendError(String),

    /// Out of GPU memory (device allocation failed, even after growth)
    OutOfMemory,

    /// Invalid resource or argument (zero-sized allocation, shrinking resize, etc.)
    InvalidResource(String),

    /// Initialization failed (device, context, transfer manager)
    InitializationFailed(String),

    /// An internal invariant of the allocator or transfer pipeline was broken.
    ///
    /// This is a programmer error. Debug builds assert before returning it.
    InvariantViolation(String),
}

impl Error {
    /// Whether this error reports a broken internal invariant
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
