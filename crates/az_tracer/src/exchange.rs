//! Ray exchange: per-destination buckets and the two-phase collective that moves them.

use az_comm::{Collective, CommError, Communicator};
use bytemuck::Zeroable;

use crate::error::reserve;
use crate::{ProtocolError, Ray, RayKind, Step, TraceError, TraceResult, RAY_SIZE};

/// Outgoing rays of one round, grouped by destination rank.
///
/// Built fresh every round and consumed by [`exchange`].
#[derive(Debug, Clone, Default)]
pub struct RayBucket {
    per_dest: Vec<Vec<Ray>>,
}

/// A bucket laid out for a variable-length all-to-all: one contiguous byte buffer plus
/// per-destination ray counts and ray offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatBatch {
    pub bytes: Vec<u8>,
    pub counts: Vec<usize>,
    pub offsets: Vec<usize>,
}

impl RayBucket {
    /// An empty bucket for `size` destinations.
    pub fn new(size: usize) -> Self {
        Self {
            per_dest: vec![Vec::new(); size],
        }
    }

    /// Queue `ray` for rank `dest`.
    pub fn push(&mut self, dest: usize, ray: Ray) {
        self.per_dest[dest].push(ray);
    }

    /// Rays queued for `dest`.
    pub fn for_dest(&self, dest: usize) -> &[Ray] {
        &self.per_dest[dest]
    }

    /// Total number of queued rays.
    pub fn len(&self) -> usize {
        self.per_dest.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.per_dest.iter().all(Vec::is_empty)
    }

    /// Ray count per destination.
    pub fn counts(&self) -> Vec<u64> {
        self.per_dest.iter().map(|rays| rays.len() as u64).collect()
    }

    /// Concatenate all destinations into one byte buffer, destination 0 first.
    pub fn flatten(self) -> TraceResult<FlatBatch> {
        let counts: Vec<usize> = self.per_dest.iter().map(Vec::len).collect();
        let offsets = prefix_sum(&counts);
        let total = counts.iter().sum::<usize>();

        let mut bytes = reserve("outgoing ray buffer", total * RAY_SIZE)?;
        for rays in &self.per_dest {
            bytes.extend_from_slice(bytemuck::cast_slice(rays));
        }

        Ok(FlatBatch {
            bytes,
            counts,
            offsets,
        })
    }
}

/// Exclusive prefix sum: where each segment starts.
fn prefix_sum(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |next, &count| {
            let start = *next;
            *next += count;
            Some(start)
        })
        .collect()
}

/// Convert a received count to `usize`, treating an impossible value as a bad message.
fn count_to_usize(count: u64, peer: usize) -> TraceResult<usize> {
    usize::try_from(count).map_err(|_| TraceError::Comm {
        step: Step::CountNegotiation,
        source: CommError::InvalidArgument {
            op: Collective::AllToAll,
            reason: format!("rank {peer} announced {count} rays"),
        },
    })
}

/// Exchange one round's buckets. Collective: every node calls it once per round.
///
/// 1. All-to-all of per-destination ray counts, so every node learns what it will receive.
/// 2. Receive offsets by prefix sum, counts and offsets scaled to bytes, then one
///    variable-length all-to-all of the flattened rays.
///
/// The result holds the rays from rank 0 first, then rank 1, and so on; each sender's rays
/// keep their order. Every received ray has a known kind.
pub fn exchange<C: Communicator>(comm: &mut C, bucket: RayBucket) -> TraceResult<Vec<Ray>> {
    let rank = comm.rank();
    let recv_counts: Vec<u64> = comm
        .all_to_all_pod(&bucket.counts())
        .map_err(TraceError::at(Step::CountNegotiation))?;
    let recv_counts = recv_counts
        .into_iter()
        .enumerate()
        .map(|(peer, count)| count_to_usize(count, peer))
        .collect::<TraceResult<Vec<usize>>>()?;
    let recv_offsets = prefix_sum(&recv_counts);
    let incoming: usize = recv_counts.iter().sum();

    let batch = bucket.flatten()?;
    log::debug!(
        "[rank {rank}] exchange: sending {:?}, receiving {incoming}",
        batch.counts
    );

    let in_bytes = |rays: &[usize]| rays.iter().map(|n| n * RAY_SIZE).collect::<Vec<_>>();
    let bytes = comm
        .all_to_all_v(
            &batch.bytes,
            &in_bytes(&batch.counts),
            &in_bytes(&batch.offsets),
            &in_bytes(&recv_counts),
            &in_bytes(&recv_offsets),
        )
        .map_err(TraceError::at(Step::RayExchange))?;

    decode_rays(&bytes)
}

/// Unpack received bytes into rays, rejecting partial records and unknown kinds.
pub fn decode_rays(bytes: &[u8]) -> TraceResult<Vec<Ray>> {
    if bytes.len() % RAY_SIZE != 0 {
        return Err(ProtocolError::MalformedPayload {
            len: bytes.len(),
            record: RAY_SIZE,
        }
        .into());
    }
    let count = bytes.len() / RAY_SIZE;
    let mut rays: Vec<Ray> = reserve("incoming ray queue", count)?;
    rays.resize(count, Ray::zeroed());
    // The receive buffer has no alignment guarantee for `Ray`, so copy instead of casting.
    bytemuck::cast_slice_mut::<Ray, u8>(&mut rays).copy_from_slice(bytes);

    for ray in &rays {
        RayKind::try_from(ray.kind)?;
    }
    Ok(rays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_comm::LocalCluster;
    use az_math::Vec3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tagged_ray(source: usize, dest: usize, serial: u32) -> Ray {
        let mut ray = Ray::new(
            RayKind::GlobalIllumination,
            Vec3::new(source as f32, dest as f32, serial as f32),
            Vec3::new(0.25, -0.5, 1.0),
            serial,
            dest as u32,
            source,
        );
        ray.depth = -3;
        ray.color = [0.1, f32::MAX, -0.0];
        ray.maxt = 17.5;
        ray.time = f32::MIN_POSITIVE;
        ray.light = 99;
        ray
    }

    #[test]
    fn test_flatten_layout() {
        let mut bucket = RayBucket::new(3);
        bucket.push(2, tagged_ray(0, 2, 0));
        bucket.push(0, tagged_ray(0, 0, 1));
        bucket.push(2, tagged_ray(0, 2, 2));

        let batch = bucket.flatten().unwrap();
        assert_eq!(batch.counts, vec![1, 0, 2]);
        assert_eq!(batch.offsets, vec![0, 1, 1]);
        assert_eq!(batch.bytes.len(), 3 * RAY_SIZE);

        let rays = decode_rays(&batch.bytes).unwrap();
        assert_eq!(rays[0].x, 1);
        assert_eq!((rays[1].x, rays[2].x), (0, 2));
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        let bytes = vec![0u8; RAY_SIZE + 3];
        assert!(matches!(
            decode_rays(&bytes),
            Err(TraceError::Protocol(ProtocolError::MalformedPayload { record: RAY_SIZE, .. }))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let mut ray = tagged_ray(0, 0, 0);
        ray.kind = 41;
        assert!(matches!(
            decode_rays(bytemuck::bytes_of(&ray)),
            Err(TraceError::Protocol(ProtocolError::UnknownRayKind(41)))
        ));
    }

    #[test]
    fn test_exchange_delivers_every_ray_intact() {
        let nodes = 4;
        // plan[s][d] = rays rank s sends to rank d
        let mut rng = StdRng::seed_from_u64(9);
        let plan: Vec<Vec<u32>> = (0..nodes)
            .map(|_| (0..nodes).map(|_| rng.gen_range(0..6)).collect())
            .collect();
        let total: u32 = plan.iter().flatten().sum();

        let results = LocalCluster::run(nodes, |comm| {
            let me = comm.rank();
            let mut bucket = RayBucket::new(nodes);
            for dest in 0..nodes {
                for serial in 0..plan[me][dest] {
                    bucket.push(dest, tagged_ray(me, dest, serial));
                }
            }
            exchange(comm, bucket)
        });

        let mut delivered = 0;
        for (dest, result) in results.into_iter().enumerate() {
            let rays = result.unwrap();
            let expected: Vec<Ray> = (0..nodes)
                .flat_map(|source| (0..plan[source][dest]).map(move |s| tagged_ray(source, dest, s)))
                .collect();
            // Byte-for-byte identity, grouped by source in rank order
            assert_eq!(
                bytemuck::cast_slice::<Ray, u8>(&rays),
                bytemuck::cast_slice::<Ray, u8>(&expected)
            );
            delivered += rays.len() as u32;
        }
        assert_eq!(delivered, total);
    }

    #[test]
    fn test_empty_round() {
        let results = LocalCluster::run(3, |comm| exchange(comm, RayBucket::new(3)));
        for result in results {
            assert!(result.unwrap().is_empty());
        }
    }
}
