//! Ray router: picks the next node a ray must visit.

use az_comm::ROOT;
use az_math::{Interval, Ray};

use crate::PartitionTable;

/// Routes rays along the partition chain in strictly increasing rank order.
///
/// From rank `r` a ray goes to the first rank above `r` whose box it intersects, or back to
/// the root once no later box is hit. Ranks only grow along a chain, so every chain ends at
/// the root after at most `N` hops.
#[derive(Debug, Clone)]
pub struct Router {
    table: PartitionTable,
    reach: Interval,
}

impl Router {
    /// `near` and `far` bound the ray-box test.
    pub fn new(table: PartitionTable, near: f32, far: f32) -> Self {
        Self {
            table,
            reach: Interval::new(near, far),
        }
    }

    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    /// Next rank for a ray currently held by `current`. [`ROOT`] means the chain is exhausted.
    pub fn route(&self, ray: &Ray, current: usize) -> usize {
        self.table
            .boxes()
            .iter()
            .enumerate()
            .skip(current + 1)
            .find(|(_, bounds)| bounds.hit(ray, self.reach))
            .map_or(ROOT, |(rank, _)| rank)
    }
}
