use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use strata_crypto::LinkCodec;
use strata_graph::{GraphResult, RootRef, VersionTracker};
use strata_merge::MergePolicyKind;
use strata_store::{build_root_index, BlockStore, ChunkedArray, Chunker, RootIndex, VersionLog};
use strata_types::{Clock, Link, MergeDetails, StoreId, Version, VersionDetails};
use tracing::{debug, info};

use crate::config::VersionStoreOptions;
use crate::error::{VersionError, VersionResult};

/// Arguments of [`VersionStore::root_set`].
#[derive(Clone, Debug)]
pub struct RootSet {
    pub root: Link,
    pub index: Option<Arc<RootIndex>>,
    pub parent: Option<Link>,
    pub merge_parent: Option<Link>,
    pub merge_details: Option<MergeDetails>,
}

impl RootSet {
    pub fn new(root: Link) -> Self {
        Self {
            root,
            index: None,
            parent: None,
            merge_parent: None,
            merge_details: None,
        }
    }

    pub fn with_index(mut self, index: Arc<RootIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_parent(mut self, parent: Link) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_merge(mut self, merge_parent: Link, details: MergeDetails) -> Self {
        self.merge_parent = Some(merge_parent);
        self.merge_details = Some(details);
        self
    }
}

struct State {
    identity: StoreId,
    /// Insertion order. Setting a known root again keeps its position.
    versions: Vec<Version>,
    positions: HashMap<Link, usize>,
    indices: HashMap<Link, Arc<RootIndex>>,
    current: Option<Link>,
    store_root: Option<Link>,
}

impl State {
    fn get(&self, root: &Link) -> Option<&Version> {
        self.positions.get(root).map(|pos| &self.versions[*pos])
    }

    fn insert(&mut self, version: Version) {
        match self.positions.get(&version.root) {
            Some(pos) => self.versions[*pos] = version,
            None => {
                self.positions.insert(version.root, self.versions.len());
                self.versions.push(version);
            }
        }
    }

    fn log(&self) -> VersionLog {
        VersionLog {
            identity: self.identity,
            versions: self.versions.clone(),
        }
    }
}

/// The version DAG of one graph identity.
///
/// Every recorded version is kept; one of them is current. Unless opened
/// read-only, each change re-encodes the whole log as a chunked byte array
/// and writes it to the block store; the array root is the store root.
pub struct VersionStore {
    pub(crate) blocks: Arc<dyn BlockStore>,
    pub(crate) chunker: Arc<dyn Chunker>,
    pub(crate) codec: Arc<dyn LinkCodec>,
    pub(crate) policy: MergePolicyKind,
    read_only: bool,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl VersionStore {
    /// Open a store. With `options.store_root` the identity and versions are
    /// read from that log and its last version becomes current; otherwise a
    /// new identity is derived from a fresh seed.
    pub fn open(
        blocks: Arc<dyn BlockStore>,
        chunker: Arc<dyn Chunker>,
        codec: Arc<dyn LinkCodec>,
        options: VersionStoreOptions,
    ) -> VersionResult<Self> {
        let state = match options.store_root {
            Some(store_root) => {
                let log = VersionLog::read(blocks.as_ref(), &store_root)?;
                let positions = log
                    .versions
                    .iter()
                    .enumerate()
                    .map(|(pos, v)| (v.root, pos))
                    .collect();
                State {
                    identity: log.identity,
                    current: log.versions.last().map(|v| v.root),
                    versions: log.versions,
                    positions,
                    indices: HashMap::new(),
                    store_root: Some(store_root),
                }
            }
            None => State {
                identity: StoreId::from_link(codec.encode(&options.id_source.next_seed())),
                versions: Vec::new(),
                positions: HashMap::new(),
                indices: HashMap::new(),
                current: None,
                store_root: None,
            },
        };
        debug!(
            identity = %state.identity.short_id(),
            versions = state.versions.len(),
            "opened version store"
        );

        let store = Self {
            blocks,
            chunker,
            codec,
            policy: options.policy,
            read_only: options.read_only,
            clock: options.clock,
            state: RwLock::new(state),
        };
        if let Some(root) = options.version_root {
            store.root_set(RootSet::new(root))?;
        }
        Ok(store)
    }

    pub fn id(&self) -> StoreId {
        self.state.read().expect("lock poisoned").identity
    }

    /// Root of the last persisted log, if any was written or opened.
    pub fn version_store_root(&self) -> Option<Link> {
        self.state.read().expect("lock poisoned").store_root
    }

    pub fn current_root(&self) -> Option<Link> {
        self.state.read().expect("lock poisoned").current
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn block_store(&self) -> &Arc<dyn BlockStore> {
        &self.blocks
    }

    pub fn version(&self, root: &Link) -> Option<Version> {
        self.state.read().expect("lock poisoned").get(root).cloned()
    }

    /// Record `version` and make it current. Returns the new store root, or
    /// `None` when read-only.
    pub fn version_set(&self, version: Version, index: Option<Arc<RootIndex>>) -> VersionResult<Option<Link>> {
        let index = match index {
            Some(index) => index,
            None => Arc::new(build_root_index(self.blocks.as_ref(), &version.root)?),
        };
        let root = version.root;
        let mut state = self.state.write().expect("lock poisoned");
        state.insert(version);
        state.indices.insert(root, index);
        state.current = Some(root);

        if self.read_only {
            info!(root = %root.short_hex(), "version set (read-only)");
            return Ok(None);
        }
        let array = state.log().encode(self.chunker.as_ref(), self.codec.as_ref())?;
        self.blocks.put_all(&array.blocks)?;
        state.store_root = Some(array.root);
        info!(
            root = %root.short_hex(),
            store_root = %array.root.short_hex(),
            versions = state.versions.len(),
            "version set"
        );
        Ok(Some(array.root))
    }

    /// Check out `args.root` if it is already known, otherwise record a new
    /// version for it. Returns the version root.
    pub fn root_set(&self, args: RootSet) -> VersionResult<Link> {
        let root = args.root;
        {
            let mut state = self.state.write().expect("lock poisoned");
            if state.positions.contains_key(&root) {
                state.current = Some(root);
                debug!(root = %root.short_hex(), "checked out known root");
                return Ok(root);
            }
        }
        let mut details = VersionDetails::at(self.clock.now_millis());
        details.merge = args.merge_details.map(Box::new);
        let version = Version {
            root,
            parent: args.parent,
            merge_parent: args.merge_parent,
            details,
        };
        self.version_set(version, args.index)?;
        Ok(root)
    }

    /// The current version and its block index.
    pub fn version_get(&self) -> VersionResult<Option<(Version, Arc<RootIndex>)>> {
        let (version, cached) = {
            let state = self.state.read().expect("lock poisoned");
            let Some(current) = state.current else {
                return Ok(None);
            };
            let version = state
                .get(&current)
                .cloned()
                .ok_or(VersionError::UnknownVersion(current))?;
            let cached = state.indices.get(&current).cloned();
            (version, cached)
        };
        let index = match cached {
            Some(index) => index,
            None => {
                let index = Arc::new(build_root_index(self.blocks.as_ref(), &version.root)?);
                self.state
                    .write()
                    .expect("lock poisoned")
                    .indices
                    .insert(version.root, index.clone());
                index
            }
        };
        Ok(Some((version, index)))
    }

    pub fn root_get(&self) -> VersionResult<Option<RootRef>> {
        Ok(self
            .version_get()?
            .map(|(version, index)| RootRef { root: version.root, index }))
    }

    pub fn checkout(&self, root: &Link) -> VersionResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if !state.positions.contains_key(root) {
            return Err(VersionError::UnknownVersion(*root));
        }
        state.current = Some(*root);
        debug!(root = %root.short_hex(), "checked out");
        Ok(())
    }

    /// Every version, most recent first.
    pub fn log(&self) -> Vec<Version> {
        let state = self.state.read().expect("lock poisoned");
        state.versions.iter().rev().cloned().collect()
    }

    /// Encode the log without writing it.
    pub fn blocks_extract(&self) -> VersionResult<ChunkedArray> {
        let log = self.state.read().expect("lock poisoned").log();
        Ok(log.encode(self.chunker.as_ref(), self.codec.as_ref())?)
    }

    /// Whether `root` is a known version or a direct parent of one.
    pub fn includes_version(&self, root: &Link) -> bool {
        let state = self.state.read().expect("lock poisoned");
        state
            .versions
            .iter()
            .any(|v| v.root == *root || v.parents().any(|p| p == root))
    }

    /// `root` and all its known ancestors, depth first: at each version the
    /// parent branch is exhausted before the merge parent branch. A version
    /// reachable along several paths is listed once per path.
    pub fn parent_versions(&self, root: &Link) -> Vec<Version> {
        let state = self.state.read().expect("lock poisoned");
        let mut out = Vec::new();
        let mut stack = vec![*root];
        while let Some(next) = stack.pop() {
            let Some(version) = state.get(&next) else {
                continue;
            };
            stack.extend(version.merge_parent);
            stack.extend(version.parent);
            out.push(version.clone());
        }
        out
    }
}

impl VersionTracker for VersionStore {
    fn root_get(&self) -> GraphResult<Option<RootRef>> {
        VersionStore::root_get(self).map_err(VersionError::into_graph_error)
    }

    fn version_set(&self, version: Version, index: Option<Arc<RootIndex>>) -> GraphResult<()> {
        VersionStore::version_set(self, version, index)
            .map(|_| ())
            .map_err(VersionError::into_graph_error)
    }
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("VersionStore")
            .field("identity", &state.identity)
            .field("versions", &state.versions.len())
            .field("current", &state.current)
            .field("read_only", &self.read_only)
            .finish()
    }
}
