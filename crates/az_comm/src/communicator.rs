//! The collective primitives a node uses to talk to its peers.

use crate::{Collective, CommError, CommResult};
use bytemuck::Pod;

/// Rank of the node that composites and broadcasts termination.
pub const ROOT: usize = 0;

/// Blocking collective operations over a fixed set of ranks.
///
/// Every rank must enter the same collectives in the same order. A call returns once all
/// contributions it needs have arrived, or fails if a peer aborted or left.
pub trait Communicator {
    /// This node's rank, `0..size`.
    fn rank(&self) -> usize;

    /// Number of ranks in the run. Fixed for the run's lifetime.
    fn size(&self) -> usize;

    /// Every rank contributes `send` (same length everywhere); every rank receives all
    /// contributions concatenated in rank order.
    fn all_gather(&mut self, send: &[u8]) -> CommResult<Vec<u8>>;

    /// `send` holds `size` blocks of `block` bytes; block `j` goes to rank `j`. Returns the
    /// blocks addressed to this rank, in source rank order.
    fn all_to_all(&mut self, send: &[u8], block: usize) -> CommResult<Vec<u8>>;

    /// Variable-length all-to-all. Rank `j` receives `send[send_displs[j]..][..send_counts[j]]`;
    /// data from rank `i` lands at `recv_displs[i]` and must be exactly `recv_counts[i]` bytes.
    fn all_to_all_v(
        &mut self,
        send: &[u8],
        send_counts: &[usize],
        send_displs: &[usize],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> CommResult<Vec<u8>>;

    /// Equal-sized contributions from every rank, concatenated in rank order at `root`.
    /// Other ranks get `None`.
    fn gather(&mut self, root: usize, send: &[u8]) -> CommResult<Option<Vec<u8>>>;

    /// `root`'s `data` delivered to every rank. The payload length is only known at root.
    fn broadcast(&mut self, root: usize, data: Vec<u8>) -> CommResult<Vec<u8>>;

    /// Returns once every rank has entered the barrier.
    fn barrier(&mut self) -> CommResult<()>;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// [`Communicator::all_gather`] over plain-old-data records.
    fn all_gather_pod<T: Pod>(&mut self, send: &[T]) -> CommResult<Vec<T>>
    where
        Self: Sized,
    {
        let bytes = self.all_gather(bytemuck::cast_slice(send))?;
        from_bytes(Collective::AllGather, &bytes)
    }

    /// [`Communicator::all_to_all`] with one record per destination rank.
    fn all_to_all_pod<T: Pod>(&mut self, send: &[T]) -> CommResult<Vec<T>>
    where
        Self: Sized,
    {
        if send.len() != self.size() {
            return Err(CommError::InvalidArgument {
                op: Collective::AllToAll,
                reason: format!("{} records for {} ranks", send.len(), self.size()),
            });
        }
        let bytes = self.all_to_all(bytemuck::cast_slice(send), std::mem::size_of::<T>())?;
        from_bytes(Collective::AllToAll, &bytes)
    }

    /// [`Communicator::gather`] over plain-old-data records.
    fn gather_pod<T: Pod>(&mut self, root: usize, send: &[T]) -> CommResult<Option<Vec<T>>>
    where
        Self: Sized,
    {
        match self.gather(root, bytemuck::cast_slice(send))? {
            Some(bytes) => from_bytes(Collective::Gather, &bytes).map(Some),
            None => Ok(None),
        }
    }
}

/// Copy a received byte buffer into records, rejecting a trailing partial record.
///
/// Received buffers carry no alignment guarantee, so this copies rather than casting in place.
pub fn from_bytes<T: Pod>(op: Collective, bytes: &[u8]) -> CommResult<Vec<T>> {
    let record = std::mem::size_of::<T>();
    if record == 0 || bytes.len() % record != 0 {
        return Err(CommError::InvalidArgument {
            op,
            reason: format!("{} bytes is not a whole number of {record}-byte records", bytes.len()),
        });
    }

    let count = bytes.len() / record;
    let mut out: Vec<T> = Vec::new();
    out.try_reserve_exact(count)
        .map_err(|_| CommError::OutOfMemory { op, bytes: bytes.len() })?;
    out.resize(count, <T as bytemuck::Zeroable>::zeroed());
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
    Ok(out)
}
