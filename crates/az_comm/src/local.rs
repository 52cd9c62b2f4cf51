//! In-process cluster: one thread of control per rank, flume channels as the wire.

use std::collections::{HashMap, HashSet};

use crate::{Collective, CommError, CommResult, Communicator};

/// What travels between ranks.
enum Envelope {
    /// One rank's contribution to collective number `seq`.
    Data {
        seq: u64,
        source: usize,
        payload: Vec<u8>,
    },
    /// The sender failed; nothing more will come from it.
    Abort { source: usize },
    /// The sender finished normally; nothing more will come from it.
    Departed { source: usize },
}

/// Runs a fixed number of ranks on scoped threads.
pub struct LocalCluster;

impl LocalCluster {
    /// Run `node` once per rank, each on its own thread, and return the per-rank results in
    /// rank order.
    ///
    /// A rank that returns an error (or panics) aborts the run: every peer waiting in, or
    /// later entering, a collective fails with [`CommError::PeerAborted`]. A panic is
    /// re-raised on the calling thread once all ranks have stopped.
    pub fn run<T, E, F>(size: usize, node: F) -> Vec<Result<T, E>>
    where
        F: Fn(&mut ThreadComm) -> Result<T, E> + Sync,
        T: Send,
        E: Send,
    {
        let comms = Self::communicators(size);
        let node = &node;

        let joined: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut comm| {
                    scope.spawn(move || {
                        let result = node(&mut comm);
                        comm.finish(result.is_ok());
                        result
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join()).collect()
        });

        let mut results = Vec::with_capacity(size);
        for outcome in joined {
            match outcome {
                Ok(result) => results.push(result),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        results
    }

    /// Build connected communicators for `size` ranks, indexed by rank.
    pub fn communicators(size: usize) -> Vec<ThreadComm> {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| flume::unbounded()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                seq: 0,
                pending: HashMap::new(),
                aborted: None,
                departed: HashSet::new(),
                clean_exit: false,
            })
            .collect()
    }
}

/// One rank's endpoint in a [`LocalCluster`].
///
/// Every collective call takes the next sequence number, so contributions to consecutive
/// collectives never mix even when a fast peer is already one call ahead.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// Senders into every other rank's inbox, `None` at our own rank.
    peers: Vec<Option<flume::Sender<Envelope>>>,
    inbox: flume::Receiver<Envelope>,
    seq: u64,
    /// Contributions that arrived before we asked for them, keyed by (seq, source).
    pending: HashMap<(u64, usize), Vec<u8>>,
    aborted: Option<usize>,
    departed: HashSet<usize>,
    clean_exit: bool,
}

impl ThreadComm {
    /// Record how the node closure ended; `Drop` tells the peers.
    fn finish(&mut self, clean: bool) {
        self.clean_exit = clean;
    }

    /// Start a collective: fail fast if a peer already aborted, otherwise take a sequence number.
    fn begin(&mut self, op: Collective) -> CommResult<u64> {
        if let Some(peer) = self.aborted {
            return Err(CommError::PeerAborted { op, peer });
        }
        self.seq += 1;
        Ok(self.seq)
    }

    fn check_root(&self, op: Collective, root: usize) -> CommResult<()> {
        if root >= self.size {
            return Err(CommError::InvalidArgument {
                op,
                reason: format!("root {root} out of range for {} ranks", self.size),
            });
        }
        Ok(())
    }

    fn post(&mut self, op: Collective, dest: usize, seq: u64, payload: Vec<u8>) -> CommResult<()> {
        let Some(Some(tx)) = self.peers.get(dest) else {
            return Err(CommError::InvalidArgument {
                op,
                reason: format!("rank {} cannot send to rank {dest}", self.rank),
            });
        };
        let sent = tx.send(Envelope::Data {
            seq,
            source: self.rank,
            payload,
        });
        if sent.is_ok() {
            return Ok(());
        }

        // The peer's inbox is gone. It queued its abort notice before hanging up, so look for
        // that before calling it a disconnect.
        self.drain();
        match self.aborted {
            Some(peer) => Err(CommError::PeerAborted { op, peer }),
            None => Err(CommError::Disconnected { op, peer: dest }),
        }
    }

    /// Take everything already queued in the inbox without blocking.
    fn drain(&mut self) {
        while let Ok(envelope) = self.inbox.try_recv() {
            self.file(envelope);
        }
    }

    fn file(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Data {
                seq,
                source,
                payload,
            } => {
                self.pending.insert((seq, source), payload);
            }
            Envelope::Abort { source } => {
                log::debug!("[rank {}] rank {source} aborted", self.rank);
                self.aborted.get_or_insert(source);
            }
            Envelope::Departed { source } => {
                self.departed.insert(source);
            }
        }
    }

    /// Block until `source`'s contribution to collective `seq` is here.
    fn receive(&mut self, op: Collective, seq: u64, source: usize) -> CommResult<Vec<u8>> {
        loop {
            if let Some(payload) = self.pending.remove(&(seq, source)) {
                return Ok(payload);
            }
            if let Some(peer) = self.aborted {
                return Err(CommError::PeerAborted { op, peer });
            }
            // Channels are ordered per sender: once a peer said it left, everything it
            // sent before that is already in `pending`.
            if self.departed.contains(&source) {
                return Err(CommError::Disconnected { op, peer: source });
            }

            match self.inbox.recv() {
                Ok(envelope) => self.file(envelope),
                Err(flume::RecvError::Disconnected) => {
                    return Err(CommError::Disconnected { op, peer: source });
                }
            }
        }
    }

    fn allocate(op: Collective, bytes: usize) -> CommResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes)
            .map_err(|_| CommError::OutOfMemory { op, bytes })?;
        Ok(buf)
    }

    fn expect_len(op: Collective, peer: usize, expected: usize, actual: usize) -> CommResult<()> {
        if expected != actual {
            return Err(CommError::SizeMismatch {
                op,
                peer,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Equal-sized contributions from everyone, concatenated in rank order.
    fn gather_all(&mut self, op: Collective, send: &[u8]) -> CommResult<Vec<u8>> {
        let seq = self.begin(op)?;
        let rank = self.rank;
        for dest in (0..self.size).filter(|&d| d != rank) {
            self.post(op, dest, seq, send.to_vec())?;
        }

        let mut out = Self::allocate(op, send.len() * self.size)?;
        for source in 0..self.size {
            if source == self.rank {
                out.extend_from_slice(send);
            } else {
                let payload = self.receive(op, seq, source)?;
                Self::expect_len(op, source, send.len(), payload.len())?;
                out.extend_from_slice(&payload);
            }
        }
        Ok(out)
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&mut self, send: &[u8]) -> CommResult<Vec<u8>> {
        self.gather_all(Collective::AllGather, send)
    }

    fn all_to_all(&mut self, send: &[u8], block: usize) -> CommResult<Vec<u8>> {
        let op = Collective::AllToAll;
        if send.len() != block * self.size {
            return Err(CommError::InvalidArgument {
                op,
                reason: format!(
                    "{} bytes is not {} blocks of {block} bytes",
                    send.len(),
                    self.size
                ),
            });
        }

        let seq = self.begin(op)?;
        let rank = self.rank;
        for dest in (0..self.size).filter(|&d| d != rank) {
            self.post(op, dest, seq, send[dest * block..(dest + 1) * block].to_vec())?;
        }

        let mut out = Self::allocate(op, send.len())?;
        for source in 0..self.size {
            if source == self.rank {
                out.extend_from_slice(&send[source * block..(source + 1) * block]);
            } else {
                let payload = self.receive(op, seq, source)?;
                Self::expect_len(op, source, block, payload.len())?;
                out.extend_from_slice(&payload);
            }
        }
        Ok(out)
    }

    fn all_to_all_v(
        &mut self,
        send: &[u8],
        send_counts: &[usize],
        send_displs: &[usize],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> CommResult<Vec<u8>> {
        let op = Collective::AllToAllV;
        for (name, table) in [
            ("send_counts", send_counts),
            ("send_displs", send_displs),
            ("recv_counts", recv_counts),
            ("recv_displs", recv_displs),
        ] {
            if table.len() != self.size {
                return Err(CommError::InvalidArgument {
                    op,
                    reason: format!("{name} has {} entries for {} ranks", table.len(), self.size),
                });
            }
        }
        for dest in 0..self.size {
            if send_displs[dest] + send_counts[dest] > send.len() {
                return Err(CommError::InvalidArgument {
                    op,
                    reason: format!("send segment for rank {dest} overruns the {}-byte buffer", send.len()),
                });
            }
        }

        let seq = self.begin(op)?;
        let rank = self.rank;
        for dest in (0..self.size).filter(|&d| d != rank) {
            let segment = &send[send_displs[dest]..send_displs[dest] + send_counts[dest]];
            self.post(op, dest, seq, segment.to_vec())?;
        }

        let total = recv_counts
            .iter()
            .zip(recv_displs)
            .map(|(count, displ)| count + displ)
            .max()
            .unwrap_or(0);
        let mut out = Self::allocate(op, total)?;
        out.resize(total, 0);

        for source in 0..self.size {
            let payload = if source == self.rank {
                send[send_displs[source]..send_displs[source] + send_counts[source]].to_vec()
            } else {
                self.receive(op, seq, source)?
            };
            Self::expect_len(op, source, recv_counts[source], payload.len())?;
            out[recv_displs[source]..recv_displs[source] + payload.len()].copy_from_slice(&payload);
        }
        Ok(out)
    }

    fn gather(&mut self, root: usize, send: &[u8]) -> CommResult<Option<Vec<u8>>> {
        let op = Collective::Gather;
        self.check_root(op, root)?;
        let seq = self.begin(op)?;

        if self.rank != root {
            self.post(op, root, seq, send.to_vec())?;
            return Ok(None);
        }

        let mut out = Self::allocate(op, send.len() * self.size)?;
        for source in 0..self.size {
            if source == self.rank {
                out.extend_from_slice(send);
            } else {
                let payload = self.receive(op, seq, source)?;
                Self::expect_len(op, source, send.len(), payload.len())?;
                out.extend_from_slice(&payload);
            }
        }
        Ok(Some(out))
    }

    fn broadcast(&mut self, root: usize, data: Vec<u8>) -> CommResult<Vec<u8>> {
        let op = Collective::Broadcast;
        self.check_root(op, root)?;
        let seq = self.begin(op)?;

        if self.rank == root {
            let rank = self.rank;
            for dest in (0..self.size).filter(|&d| d != rank) {
                self.post(op, dest, seq, data.clone())?;
            }
            Ok(data)
        } else {
            self.receive(op, seq, root)
        }
    }

    fn barrier(&mut self) -> CommResult<()> {
        self.gather_all(Collective::Barrier, &[]).map(|_| ())
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        let source = self.rank;
        if !self.clean_exit {
            log::debug!("[rank {source}] aborting peers");
        }
        for tx in self.peers.iter().flatten() {
            let note = if self.clean_exit {
                Envelope::Departed { source }
            } else {
                Envelope::Abort { source }
            };
            // A peer that already hung up needs no notice.
            let _ = tx.send(note);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_gather_rank_order() {
        let results = LocalCluster::run(4, |comm| comm.all_gather(&[comm.rank() as u8; 2]));

        for result in results {
            assert_eq!(result.unwrap(), vec![0, 0, 1, 1, 2, 2, 3, 3]);
        }
    }

    #[test]
    fn test_all_to_all_transposes() {
        let results = LocalCluster::run(3, |comm| {
            let r = comm.rank() as u8;
            // Block j = [10 * r + j]
            let send: Vec<u8> = (0..3).map(|j| 10 * r + j).collect();
            comm.all_to_all(&send, 1)
        });

        for (rank, result) in results.into_iter().enumerate() {
            let rank = rank as u8;
            assert_eq!(result.unwrap(), vec![rank, 10 + rank, 20 + rank]);
        }
    }

    #[test]
    fn test_all_to_all_v_variable_lengths() {
        // Rank r sends (r + 1) bytes of value r to every rank.
        let results = LocalCluster::run(3, |comm| {
            let r = comm.rank();
            let n = comm.size();
            let send = vec![r as u8; (r + 1) * n];
            let send_counts = vec![r + 1; n];
            let send_displs: Vec<usize> = (0..n).map(|j| j * (r + 1)).collect();
            let recv_counts: Vec<usize> = (0..n).map(|i| i + 1).collect();
            let recv_displs: Vec<usize> = (0..n).map(|i| i * (i + 1) / 2).collect();
            comm.all_to_all_v(&send, &send_counts, &send_displs, &recv_counts, &recv_displs)
        });

        for result in results {
            assert_eq!(result.unwrap(), vec![0, 1, 1, 2, 2, 2]);
        }
    }

    #[test]
    fn test_all_to_all_v_count_mismatch() {
        let results = LocalCluster::run(2, |comm| {
            let send = vec![1u8; 4];
            // Both ranks claim to expect 3 bytes from everyone but send 2.
            comm.all_to_all_v(&send, &[2, 2], &[0, 2], &[3, 3], &[0, 3])
        });

        assert_eq!(
            results[0],
            Err(CommError::SizeMismatch {
                op: Collective::AllToAllV,
                peer: 0,
                expected: 3,
                actual: 2
            })
        );
        // Rank 1 either checks its own segment first or finds rank 0 already gone.
        assert!(matches!(
            results[1],
            Err(CommError::SizeMismatch { op: Collective::AllToAllV, .. })
                | Err(CommError::PeerAborted { op: Collective::AllToAllV, peer: 0 })
        ));
    }

    #[test]
    fn test_gather_at_root_only() {
        let results = LocalCluster::run(3, |comm| {
            let mine = [comm.rank() as u8 * 2];
            comm.gather(0, &mine)
        });

        assert_eq!(results[0].as_ref().unwrap(), &Some(vec![0, 2, 4]));
        assert_eq!(results[1].as_ref().unwrap(), &None);
        assert_eq!(results[2].as_ref().unwrap(), &None);
    }

    #[test]
    fn test_broadcast_from_root() {
        let results = LocalCluster::run(4, |comm| {
            let data = if comm.is_root() { vec![9, 8, 7] } else { Vec::new() };
            comm.broadcast(0, data)
        });

        for result in results {
            assert_eq!(result.unwrap(), vec![9, 8, 7]);
        }
    }

    #[test]
    fn test_consecutive_collectives_do_not_mix() {
        let results = LocalCluster::run(3, |comm| {
            let mut seen = Vec::new();
            for round in 0..20u8 {
                let out = comm.all_gather(&[round, comm.rank() as u8])?;
                seen.push(out);
            }
            Ok::<_, CommError>(seen)
        });

        for result in results {
            for (round, out) in result.unwrap().into_iter().enumerate() {
                let round = round as u8;
                assert_eq!(out, vec![round, 0, round, 1, round, 2]);
            }
        }
    }

    #[test]
    fn test_failing_rank_aborts_peers() {
        #[derive(Debug, PartialEq)]
        enum NodeError {
            Local,
            Comm(CommError),
        }

        let results = LocalCluster::run(3, |comm| {
            if comm.rank() == 1 {
                return Err(NodeError::Local);
            }
            // Would block forever without the abort notice
            comm.barrier().map_err(NodeError::Comm)
        });

        assert_eq!(results[1], Err(NodeError::Local));
        // Rank 0 hears from rank 1 first; rank 2 may hear rank 0's relayed abort first.
        assert_eq!(
            results[0],
            Err(NodeError::Comm(CommError::PeerAborted {
                op: Collective::Barrier,
                peer: 1
            }))
        );
        assert!(matches!(
            results[2],
            Err(NodeError::Comm(CommError::PeerAborted {
                op: Collective::Barrier,
                ..
            }))
        ));
    }

    #[test]
    fn test_clean_exit_is_not_an_abort() {
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                return Ok(());
            }
            comm.barrier()
        });

        assert_eq!(results[0], Ok(()));
        assert_eq!(
            results[1],
            Err(CommError::Disconnected {
                op: Collective::Barrier,
                peer: 0
            })
        );
    }

    #[test]
    fn test_all_gather_size_mismatch() {
        let results = LocalCluster::run(2, |comm| {
            let send = vec![0u8; comm.rank() + 1];
            comm.all_gather(&send)
        });

        assert_eq!(
            results[0],
            Err(CommError::SizeMismatch {
                op: Collective::AllGather,
                peer: 1,
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_pod_helpers() {
        let results = LocalCluster::run(2, |comm| {
            let gathered: Vec<u64> = comm.all_gather_pod(&[comm.rank() as u64 + 100])?;
            let counts: Vec<u32> = comm.all_to_all_pod(&[comm.rank() as u32, 5])?;
            Ok::<_, CommError>((gathered, counts))
        });

        let (gathered, counts) = results[1].clone().unwrap();
        assert_eq!(gathered, vec![100, 101]);
        assert_eq!(counts, vec![5, 5]);

        let (_, counts) = results[0].clone().unwrap();
        assert_eq!(counts, vec![0, 1]);
    }

    #[test]
    fn test_single_rank() {
        let results = LocalCluster::run(1, |comm| {
            comm.barrier()?;
            let out = comm.all_to_all_v(&[1, 2, 3], &[3], &[0], &[3], &[0])?;
            let root = comm.gather(0, &out)?;
            Ok::<_, CommError>(root)
        });

        assert_eq!(results[0], Ok(Some(vec![1, 2, 3])));
    }
}
