use std::{fmt, io};

/// Errors surfaced by fallible operations in this crate.
///
/// Transient conditions (queue full, queue empty) are reported through return
/// values, never through this type. Protocol violations (overwriting a live
/// slot, releasing a free mutex, an unknown validity state) are programming
/// bugs and panic instead; once one is observed the segment has to be assumed
/// poisoned.
#[derive(Debug)]
pub enum TachyonError {
    SharedMemory(shared_memory::ShmemError),
    Io(io::Error),
    /// The pool has no free run of blocks large enough for the request.
    OutOfSpace,
    Config(String),
}

impl fmt::Display for TachyonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TachyonError::SharedMemory(e) => write!(f, "Shared memory error: {}", e),
            TachyonError::Io(e) => write!(f, "IO error: {}", e),
            TachyonError::OutOfSpace => write!(f, "Out of shared memory"),
            TachyonError::Config(s) => write!(f, "Configuration error: {}", s),
        }
    }
}

impl std::error::Error for TachyonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TachyonError::SharedMemory(e) => Some(e),
            TachyonError::Io(e) => Some(e),
            TachyonError::OutOfSpace => None,
            TachyonError::Config(_) => None,
        }
    }
}

impl From<shared_memory::ShmemError> for TachyonError {
    fn from(err: shared_memory::ShmemError) -> Self {
        TachyonError::SharedMemory(err)
    }
}

impl From<io::Error> for TachyonError {
    fn from(err: io::Error) -> Self {
        TachyonError::Io(err)
    }
}
