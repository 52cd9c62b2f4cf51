//! Collective-communication errors.

use std::fmt;
use thiserror::Error;

/// The collective operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collective {
    AllGather,
    AllToAll,
    AllToAllV,
    Gather,
    Broadcast,
    Barrier,
}

impl fmt::Display for Collective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collective::AllGather => "all-gather",
            Collective::AllToAll => "all-to-all",
            Collective::AllToAllV => "all-to-all-v",
            Collective::Gather => "gather",
            Collective::Broadcast => "broadcast",
            Collective::Barrier => "barrier",
        };
        f.write_str(name)
    }
}

/// A collective did not complete. None of these are retried: a half-finished collective
/// leaves the ranks out of step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    #[error("{op}: rank {peer} aborted the run")]
    PeerAborted { op: Collective, peer: usize },

    #[error("{op}: rank {peer} left before the collective completed")]
    Disconnected { op: Collective, peer: usize },

    #[error("{op}: rank {peer} contributed {actual} bytes, expected {expected}")]
    SizeMismatch {
        op: Collective,
        peer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{op}: {reason}")]
    InvalidArgument { op: Collective, reason: String },

    #[error("{op}: failed to allocate {bytes} bytes")]
    OutOfMemory { op: Collective, bytes: usize },
}

impl CommError {
    /// The collective this error came from.
    pub fn collective(&self) -> Collective {
        match self {
            CommError::PeerAborted { op, .. }
            | CommError::Disconnected { op, .. }
            | CommError::SizeMismatch { op, .. }
            | CommError::InvalidArgument { op, .. }
            | CommError::OutOfMemory { op, .. } => *op,
        }
    }
}

/// Result type for collective operations.
pub type CommResult<T> = Result<T, CommError>;
