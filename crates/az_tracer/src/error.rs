//! Engine errors. None of them are recoverable: any of these ends the whole run.

use std::fmt;

use az_comm::CommError;
use thiserror::Error;

use crate::RayKind;

/// Wire-level corruption: the nodes disagree about the message format.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("unknown ray kind {0} on the wire")]
    UnknownRayKind(u32),

    #[error("{len}-byte payload is not a whole number of {record}-byte ray records")]
    MalformedPayload { len: usize, record: usize },

    #[error("returning {kind:?} ray arrived at rank {rank}; only the root finalizes rays")]
    MisroutedReturn { kind: RayKind, rank: usize },

    #[error("termination broadcast carried a {0:?} ray")]
    UnexpectedControl(RayKind),

    #[error("terminate sentinel arrived at rank {rank} in the ray exchange")]
    StrayTerminate { rank: usize },

    #[error("pixel ({x}, {y}) is outside the frame")]
    PixelOutOfRange { x: u32, y: u32 },
}

/// The protocol step a collective failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Partition,
    CountNegotiation,
    RayExchange,
    Quiescence,
    Composite,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Partition => "partition exchange",
            Step::CountNegotiation => "ray count negotiation",
            Step::RayExchange => "ray exchange",
            Step::Quiescence => "quiescence check",
            Step::Composite => "frame composite",
        };
        f.write_str(name)
    }
}

/// Errors that end a distributed render.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("protocol corruption: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{step} failed")]
    Comm {
        step: Step,
        #[source]
        source: CommError,
    },

    #[error("failed to allocate {bytes} bytes for {what}")]
    Resource { what: &'static str, bytes: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TraceError {
    /// Adapter for `map_err` that tags a collective failure with its step.
    pub fn at(step: Step) -> impl FnOnce(CommError) -> TraceError {
        move |source| TraceError::Comm { step, source }
    }
}

/// Result type for engine operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Reserve exactly `count` elements or fail with [`TraceError::Resource`].
pub(crate) fn reserve<T>(what: &'static str, count: usize) -> TraceResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(count)
        .map_err(|_| TraceError::Resource {
            what,
            bytes: count.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(buf)
}
