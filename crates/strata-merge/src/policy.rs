use std::fmt;

use crate::error::MergeResult;
use crate::registry::MultiValueRegistry;
use crate::snapshot::Snapshot;

/// Available merge strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MergePolicyKind {
    /// Keep both sides' additions, relocating the current side's after the
    /// other's; concurrent scalar edits resolve to the current side.
    #[default]
    MultiValueRegistry,
}

impl fmt::Display for MergePolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicyKind::MultiValueRegistry => f.write_str("multi-value-registry"),
        }
    }
}

/// Combines two descendants of a common base into merged partition bytes,
/// in [`strata_store::Partition::ALL`] order.
pub trait MergePolicy: Send + Sync {
    fn kind(&self) -> MergePolicyKind;

    fn merge(&self, base: &Snapshot, current: &Snapshot, other: &Snapshot) -> MergeResult<[Vec<u8>; 5]>;
}

pub fn policy_for(kind: MergePolicyKind) -> Box<dyn MergePolicy> {
    match kind {
        MergePolicyKind::MultiValueRegistry => Box::new(MultiValueRegistry),
    }
}
