//! Quiescence detection: has every node run out of rays?

use az_comm::{Communicator, ROOT};

use crate::exchange::decode_rays;
use crate::{ProtocolError, Ray, RayKind, Step, TraceError, TraceResult, Termination};

/// Decides, identically on every node, whether the round loop is done.
///
/// Called once per round after the exchange, with this node's next-round queue size.
/// Both strategies are collective, so no node can leave the loop while another still
/// holds work, and none waits on a peer that already left.
#[derive(Debug, Clone, Copy)]
pub struct QuiescenceDetector {
    strategy: Termination,
}

impl QuiescenceDetector {
    pub fn new(strategy: Termination) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> Termination {
        self.strategy
    }

    /// True when no node anywhere has pending rays.
    pub fn is_quiescent<C: Communicator>(&self, comm: &mut C, pending: usize) -> TraceResult<bool> {
        match self.strategy {
            Termination::Symmetric => Self::symmetric(comm, pending),
            Termination::RootBroadcast => Self::root_broadcast(comm, pending),
        }
    }

    /// Every node gathers every count and sums them itself.
    fn symmetric<C: Communicator>(comm: &mut C, pending: usize) -> TraceResult<bool> {
        let counts: Vec<u64> = comm
            .all_gather_pod(&[pending as u64])
            .map_err(TraceError::at(Step::Quiescence))?;
        let total: u64 = counts.iter().sum();
        log::debug!("[rank {}] pending rays cluster-wide: {total}", comm.rank());
        Ok(total == 0)
    }

    /// The root sums the counts and broadcasts a terminate sentinel, or nothing.
    fn root_broadcast<C: Communicator>(comm: &mut C, pending: usize) -> TraceResult<bool> {
        let counts = comm
            .gather_pod::<u64>(ROOT, &[pending as u64])
            .map_err(TraceError::at(Step::Quiescence))?;

        let payload = match counts {
            Some(counts) if counts.iter().sum::<u64>() == 0 => {
                bytemuck::bytes_of(&Ray::terminate(comm.rank())).to_vec()
            }
            _ => Vec::new(),
        };
        let payload = comm
            .broadcast(ROOT, payload)
            .map_err(TraceError::at(Step::Quiescence))?;

        let control = decode_rays(&payload)?;
        match control.as_slice() {
            [] => Ok(false),
            [ray] => match ray.kind()? {
                RayKind::Terminate => Ok(true),
                other => Err(ProtocolError::UnexpectedControl(other).into()),
            },
            [ray, ..] => Err(ProtocolError::UnexpectedControl(ray.kind()?).into()),
        }
    }
}
