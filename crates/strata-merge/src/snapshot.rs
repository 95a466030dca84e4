use std::ops::Range;

use strata_store::chunked::read_all;
use strata_store::{build_root_index, BlockIndex, BlockStore, Partition, RootIndex};
use strata_types::Link;

use crate::error::MergeResult;

/// Position of a partition in [`Partition::ALL`].
pub fn slot(partition: Partition) -> usize {
    match partition {
        Partition::Vertex => 0,
        Partition::Edge => 1,
        Partition::Prop => 2,
        Partition::Value => 3,
        Partition::Index => 4,
    }
}

/// A graph root fully loaded into memory.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub root: Link,
    pub index: RootIndex,
    /// Partition bytes in [`Partition::ALL`] order.
    pub partitions: [Vec<u8>; 5],
}

impl Snapshot {
    pub fn load(store: &dyn BlockStore, root: &Link) -> MergeResult<Self> {
        let index = build_root_index(store, root)?;
        let read = |p: Partition| read_all(store, &index.partition(p).index);
        let partitions = [
            read(Partition::Vertex)?,
            read(Partition::Edge)?,
            read(Partition::Prop)?,
            read(Partition::Value)?,
            read(Partition::Index)?,
        ];
        Ok(Self {
            root: *root,
            index,
            partitions,
        })
    }

    pub fn bytes(&self, partition: Partition) -> &[u8] {
        &self.partitions[slot(partition)]
    }

    pub fn len(&self, partition: Partition) -> u64 {
        self.bytes(partition).len() as u64
    }
}

/// Byte ranges a side shares with the base, found by comparing chunk links
/// at equal start offsets.
#[derive(Clone, Debug, Default)]
pub struct Unchanged {
    ranges: Vec<Range<u64>>,
}

impl Unchanged {
    pub fn between(base: &BlockIndex, side: &BlockIndex) -> Self {
        let starts: Vec<(u64, Link)> = base.start_offsets.iter().map(|(s, l)| (*s, *l)).collect();
        let mut ranges: Vec<Range<u64>> = Vec::new();
        for (i, (start, link)) in starts.iter().enumerate() {
            if side.start_offsets.get(start) != Some(link) {
                continue;
            }
            let end = starts
                .get(i + 1)
                .map_or(base.byte_array_size, |(next, _)| *next);
            match ranges.last_mut() {
                Some(last) if last.end == *start => last.end = end,
                _ => ranges.push(*start..end),
            }
        }
        Self { ranges }
    }

    /// Whether `[offset, offset + len)` lies inside one unchanged range.
    pub fn covers(&self, offset: u64, len: u64) -> bool {
        let pos = self.ranges.partition_point(|r| r.end <= offset);
        self.ranges
            .get(pos)
            .is_some_and(|r| r.start <= offset && offset + len <= r.end)
    }
}
