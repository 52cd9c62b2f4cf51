//! Per-node state threaded through the round loop.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::{FrameBuffer, Ray, TraceConfig, TraceResult};

/// Counters for one pass on one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub rounds: usize,
    /// Rays traced against local geometry
    pub traced: usize,
    /// Rays handed to another node
    pub forwarded: usize,
    /// Rays finalized at the root
    pub finalized: usize,
    /// Eye and global-illumination rays that left the scene
    pub missed: usize,
}

/// Everything a node owns while the round loop runs. Nothing here is shared with peers
/// except through the exchange.
#[derive(Debug)]
pub struct RoundState {
    pub rank: usize,
    pub size: usize,
    /// Rays to process this round
    pub queue: Vec<Ray>,
    /// Rays held back for the next pass
    pub deferred: Vec<Ray>,
    pub frame: FrameBuffer,
    pub rng: StdRng,
    pub stats: PassStats,
}

impl RoundState {
    pub fn new(rank: usize, size: usize, config: &TraceConfig) -> TraceResult<Self> {
        Ok(Self {
            rank,
            size,
            queue: Vec::new(),
            deferred: Vec::new(),
            frame: FrameBuffer::new(config.width, config.height, config.tie_epsilon)?,
            rng: Self::stream(config.seed, rank),
            stats: PassStats::default(),
        })
    }

    fn stream(seed: u64, rank: usize) -> StdRng {
        StdRng::seed_from_u64(seed.wrapping_add(rank as u64))
    }

    /// Start a new sample: drop anything left over and switch to the sample's random stream.
    pub fn begin_sample(&mut self, seed: u64) {
        self.queue.clear();
        self.deferred.clear();
        self.rng = Self::stream(seed, self.rank);
    }

    /// Start a pass: deferred rays become the queue, counters and frame start over.
    pub fn begin_pass(&mut self) {
        self.queue.append(&mut self.deferred);
        self.frame.reset();
        self.stats = PassStats::default();
    }
}
