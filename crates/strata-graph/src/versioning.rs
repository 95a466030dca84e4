use std::sync::{Arc, RwLock};

use strata_store::{build_root_index, BlockStore, RootIndex};
use strata_types::{Link, Version};

use crate::error::{GraphError, GraphResult};

/// A graph root with its decoded block index.
#[derive(Clone, Debug)]
pub struct RootRef {
    pub root: Link,
    pub index: Arc<RootIndex>,
}

/// Where a [`Graph`](crate::Graph) reads its current root from and records
/// the versions its transactions commit.
pub trait VersionTracker: Send + Sync {
    /// The current root, or `None` for an empty graph.
    fn root_get(&self) -> GraphResult<Option<RootRef>>;

    /// Record `version` and make it current. `index` is the block index of
    /// `version.root` when the caller already has it.
    fn version_set(&self, version: Version, index: Option<Arc<RootIndex>>) -> GraphResult<()>;
}

/// Unpersisted tracker that only remembers the versions set on it.
pub struct MemoryVersionTracker {
    blocks: Arc<dyn BlockStore>,
    state: RwLock<Vec<(Version, Arc<RootIndex>)>>,
}

impl MemoryVersionTracker {
    pub fn new(blocks: Arc<dyn BlockStore>) -> Self {
        Self {
            blocks,
            state: RwLock::new(Vec::new()),
        }
    }

    /// Versions in the order they were set.
    pub fn versions(&self) -> Vec<Version> {
        let state = self.state.read().expect("lock poisoned");
        state.iter().map(|(v, _)| v.clone()).collect()
    }

    /// Make an already-stored root current.
    pub fn checkout(&self, root: &Link) -> GraphResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let pos = state
            .iter()
            .position(|(v, _)| v.root == *root)
            .ok_or_else(|| GraphError::Version(format!("unknown root {}", root.short_hex())))?;
        let entry = state.remove(pos);
        state.push(entry);
        Ok(())
    }
}

impl VersionTracker for MemoryVersionTracker {
    fn root_get(&self) -> GraphResult<Option<RootRef>> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.last().map(|(version, index)| RootRef {
            root: version.root,
            index: index.clone(),
        }))
    }

    fn version_set(&self, version: Version, index: Option<Arc<RootIndex>>) -> GraphResult<()> {
        let index = match index {
            Some(index) => index,
            None => Arc::new(build_root_index(self.blocks.as_ref(), &version.root)?),
        };
        let mut state = self.state.write().expect("lock poisoned");
        state.retain(|(v, _)| v.root != version.root);
        state.push((version, index));
        Ok(())
    }
}
