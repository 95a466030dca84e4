//! Reconciling replicas of one graph identity.
//!
//! Replicas never share mutable state. They diverge by committing
//! independently and converge by exchanging the blocks one side is missing
//! ([`VersionStore::pack_missing_blocks`]) and then merging
//! ([`VersionStore::merge_versions`]).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use strata_merge::{MergeInput, MergeSide, Merger};
use strata_pack::GraphPacker;
use strata_store::{build_root_index, BlockStore, RootIndex};
use strata_types::{Block, Link, MergeDetails, Version};
use tracing::{debug, info};

use crate::error::{VersionError, VersionResult};
use crate::store::{RootSet, VersionStore};

/// `other`'s log split by what this store already knows. Both lists keep
/// `other`'s most-recent-first order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionStoreDiff {
    /// Most recent shared version.
    pub last: Option<Version>,
    pub common: Vec<Version>,
    pub missing: Vec<Version>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeKind {
    /// Nothing was missing; the current version is unchanged.
    UpToDate,
    /// The other side's current version was adopted as is.
    FastForward,
    /// A new two-parent version was recorded.
    Merged,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeKind::UpToDate => "up-to-date",
            MergeKind::FastForward => "fast-forward",
            MergeKind::Merged => "merged",
        };
        f.write_str(name)
    }
}

/// Result of [`VersionStore::merge_versions`]. `blocks` is the full block
/// closure of `root`.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub kind: MergeKind,
    pub root: Link,
    pub index: Arc<RootIndex>,
    pub blocks: Vec<Block>,
}

impl VersionStore {
    fn packer(&self) -> GraphPacker {
        GraphPacker::new(self.codec.clone(), self.chunker.clone())
    }

    fn ensure_same_identity(&self, other: &VersionStore) -> VersionResult<()> {
        let (ours, theirs) = (self.id(), other.id());
        if ours != theirs {
            return Err(VersionError::IdentityMismatch { ours, theirs });
        }
        Ok(())
    }

    pub fn diff(&self, other: &VersionStore) -> VersionResult<VersionStoreDiff> {
        self.ensure_same_identity(other)?;
        let (common, missing): (Vec<Version>, Vec<Version>) = other
            .log()
            .into_iter()
            .partition(|v| self.version(&v.root).is_some());
        Ok(VersionStoreDiff {
            last: common.first().cloned(),
            common,
            missing,
        })
    }

    /// Bundle every block of `other`'s missing versions, read from
    /// `other_blocks`, as a random-block bundle.
    pub fn pack_missing_blocks(&self, other: &VersionStore, other_blocks: &dyn BlockStore) -> VersionResult<Block> {
        let diff = self.diff(other)?;
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        for version in &diff.missing {
            let mut links = vec![version.root];
            links.extend(build_root_index(other_blocks, &version.root)?.referenced_links());
            for link in links {
                if seen.insert(link) {
                    blocks.push(Block::new(link, other_blocks.get(&link)?));
                }
            }
        }
        debug!(
            missing = diff.missing.len(),
            blocks = blocks.len(),
            "packing missing blocks"
        );
        Ok(self.packer().pack_random_blocks(&blocks)?)
    }

    /// Bring `other`'s current version into this store.
    ///
    /// When `other`'s current version is a direct child of ours, it is
    /// adopted without a merge commit. Otherwise the two current
    /// roots are merged against the most recent shared version and recorded
    /// as a two-parent version.
    ///
    /// All blocks are read from this store's block store, so `other`'s
    /// missing blocks must have been transferred first.
    pub fn merge_versions(&self, other: &VersionStore) -> VersionResult<MergeOutcome> {
        let diff = self.diff(other)?;
        if diff.missing.is_empty() {
            let (version, index) = self.version_get()?.ok_or(VersionError::Empty)?;
            return self.outcome(MergeKind::UpToDate, version.root, index);
        }

        let (other_version, other_index) = other.version_get()?.ok_or(VersionError::Empty)?;
        let second = other_version.root;
        let first = self.current_root();
        // Only a direct child of our current version is adopted as is.
        if first.is_none() || other_version.parent == first {
            self.version_set(other_version, Some(other_index.clone()))?;
            info!(root = %second.short_hex(), "fast-forward");
            return self.outcome(MergeKind::FastForward, second, other_index);
        }

        let (current_version, _) = self.version_get()?.ok_or(VersionError::Empty)?;
        let first = current_version.root;
        let base = diff.last.ok_or(VersionError::NoCommonAncestor)?;
        let blocks = self.blocks.as_ref();
        let merger = Merger::new(self.policy, self.chunker.clone(), self.codec.clone());
        let output = merger.merge(
            MergeInput {
                base: MergeSide::new(base.root, blocks),
                current: MergeSide::new(first, blocks),
                other: MergeSide::new(second, blocks),
            },
            blocks,
        )?;

        let index = Arc::new(output.index);
        self.root_set(
            RootSet::new(output.root)
                .with_index(index.clone())
                .with_parent(first)
                .with_merge(
                    second,
                    MergeDetails {
                        parent: current_version.details,
                        merge_parent: other_version.details,
                    },
                ),
        )?;
        info!(
            base = %base.root.short_hex(),
            current = %first.short_hex(),
            other = %second.short_hex(),
            merged = %output.root.short_hex(),
            "merged versions"
        );
        Ok(MergeOutcome {
            kind: MergeKind::Merged,
            root: output.root,
            index,
            blocks: output.blocks,
        })
    }

    fn outcome(&self, kind: MergeKind, root: Link, index: Arc<RootIndex>) -> VersionResult<MergeOutcome> {
        let blocks = self.packer().extract_version_blocks(self.blocks.as_ref(), &root)?;
        Ok(MergeOutcome {
            kind,
            root,
            index,
            blocks,
        })
    }
}
