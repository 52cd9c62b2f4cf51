//! Collective transport for azurender nodes.
//!
//! Nodes only talk through blocking collectives (all-gather, all-to-all, variable all-to-all,
//! gather, broadcast, barrier). [`Communicator`] is that surface; [`LocalCluster`] provides it
//! in-process with one thread per rank.

mod communicator;
mod error;
mod local;

pub use communicator::{from_bytes, Communicator, ROOT};
pub use error::{Collective, CommError, CommResult};
pub use local::{LocalCluster, ThreadComm};
