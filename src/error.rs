//! Crate-wide error type.

use std::io;

/// Alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the segment collection, data objects, buffer actions,
/// the buffer facade, and the save engine.
///
/// Variants roughly follow the taxonomy of the reference implementation:
/// input validation, arithmetic, resource, state, and not-implemented.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An offset, length, or handle was out of the valid range for the
    /// operation (e.g. `offset > total_size`, a negative length).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A signed offset/size computation would have overflowed.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    /// The operation is not valid for the buffer's current state (undo with
    /// an empty stack, `end_multi` without a matching `begin_multi`, ...).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Passthrough for an underlying OS/I/O failure (allocation, mapping,
    /// preallocation, read/write, ...).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operation is a documented non-goal of the core (`find`,
    /// cross-buffer `copy`) or of this crate's surface.
    #[error("not implemented")]
    NotImplemented,
}

impl Error {
    /// Recovers the passthrough `errno`-style code for callers that want a
    /// raw integer, mirroring the host API's positive system error codes.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
