//! Spatial partition: every node's bounding box, known to every node.

use az_comm::Communicator;
use az_math::{Aabb, Vec3};
use bytemuck::{Pod, Zeroable};

use crate::{Step, TraceError, TraceResult};

/// Wire form of one node's bounds. An empty box is `min = +inf, max = -inf`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BoundsRecord {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl From<Aabb> for BoundsRecord {
    fn from(aabb: Aabb) -> Self {
        Self {
            min: aabb.min().to_array(),
            max: aabb.max().to_array(),
        }
    }
}

impl From<BoundsRecord> for Aabb {
    fn from(record: BoundsRecord) -> Self {
        Aabb::from_corners(Vec3::from_array(record.min), Vec3::from_array(record.max))
    }
}

/// Per-node bounding boxes indexed by rank. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTable {
    records: Vec<BoundsRecord>,
    boxes: Vec<Aabb>,
}

impl PartitionTable {
    /// Build a table from boxes indexed by rank.
    pub fn new(boxes: Vec<Aabb>) -> Self {
        let records: Vec<BoundsRecord> = boxes.iter().copied().map(BoundsRecord::from).collect();
        // Rebuild from the records so a local table matches an exchanged one exactly.
        let boxes = records.iter().copied().map(Aabb::from).collect();
        Self { records, boxes }
    }

    /// All-gather every node's local bounds. Every node must call this once, together.
    pub fn exchange<C: Communicator>(comm: &mut C, local: Aabb) -> TraceResult<Self> {
        let records: Vec<BoundsRecord> = comm
            .all_gather_pod(&[BoundsRecord::from(local)])
            .map_err(TraceError::at(Step::Partition))?;

        let table = Self {
            boxes: records.iter().copied().map(Aabb::from).collect(),
            records,
        };
        debug_assert_eq!(table.len(), comm.size());
        Ok(table)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Bounds of node `rank`.
    pub fn bounds(&self, rank: usize) -> Option<&Aabb> {
        self.boxes.get(rank)
    }

    pub fn boxes(&self) -> &[Aabb] {
        &self.boxes
    }

    /// The table as it travels on the wire. Identical bytes on every node.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }
}
