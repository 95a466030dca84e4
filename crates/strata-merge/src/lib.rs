//! Three-way merge of Strata graph roots.
//!
//! Given a common base and two descendant roots, [`Merger::merge`] loads all
//! three, lets a [`MergePolicy`] combine their partitions and persists the
//! result as a new root. Blocks are read from each side's own store and the
//! merged blocks are written to the target store.

pub mod error;
pub mod policy;
pub mod registry;
pub mod snapshot;

use std::sync::Arc;

use strata_crypto::LinkCodec;
use strata_graph::{persist_partitions, CommitOutput};
use strata_store::{BlockStore, Chunker};
use strata_types::Link;
use tracing::info;

pub use error::{MergeError, MergeResult};
pub use policy::{policy_for, MergePolicy, MergePolicyKind};
pub use registry::MultiValueRegistry;
pub use snapshot::{Snapshot, Unchanged};

/// A root and the store holding its blocks.
#[derive(Clone, Copy)]
pub struct MergeSide<'a> {
    pub root: Link,
    pub store: &'a dyn BlockStore,
}

impl<'a> MergeSide<'a> {
    pub fn new(root: Link, store: &'a dyn BlockStore) -> Self {
        Self { root, store }
    }
}

#[derive(Clone, Copy)]
pub struct MergeInput<'a> {
    pub base: MergeSide<'a>,
    pub current: MergeSide<'a>,
    pub other: MergeSide<'a>,
}

/// Runs a merge policy and persists its output.
pub struct Merger {
    policy: Box<dyn MergePolicy>,
    chunker: Arc<dyn Chunker>,
    codec: Arc<dyn LinkCodec>,
}

impl Merger {
    pub fn new(kind: MergePolicyKind, chunker: Arc<dyn Chunker>, codec: Arc<dyn LinkCodec>) -> Self {
        Self {
            policy: policy_for(kind),
            chunker,
            codec,
        }
    }

    pub fn kind(&self) -> MergePolicyKind {
        self.policy.kind()
    }

    /// Merge `input.current` and `input.other` relative to `input.base`,
    /// writing the merged root's blocks to `target`.
    pub fn merge(&self, input: MergeInput<'_>, target: &dyn BlockStore) -> MergeResult<CommitOutput> {
        let base = Snapshot::load(input.base.store, &input.base.root)?;
        let current = Snapshot::load(input.current.store, &input.current.root)?;
        let other = Snapshot::load(input.other.store, &input.other.root)?;
        let partitions = self.policy.merge(&base, &current, &other)?;
        let output = persist_partitions(target, self.chunker.as_ref(), self.codec.as_ref(), partitions)?;
        info!(
            policy = %self.policy.kind(),
            base = %base.root.short_hex(),
            current = %current.root.short_hex(),
            other = %other.root.short_hex(),
            merged = %output.root.short_hex(),
            "merged roots"
        );
        Ok(output)
    }
}

/// Merge two item lists that share one block store. The merged list holds
/// the other side's items first, then the current side's additions.
pub fn merge_item_lists(
    store: &dyn BlockStore,
    base: Link,
    current: Link,
    other: Link,
    chunker: Arc<dyn Chunker>,
    codec: Arc<dyn LinkCodec>,
) -> MergeResult<CommitOutput> {
    let merger = Merger::new(MergePolicyKind::MultiValueRegistry, chunker, codec);
    merger.merge(
        MergeInput {
            base: MergeSide::new(base, store),
            current: MergeSide::new(current, store),
            other: MergeSide::new(other, store),
        },
        store,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use strata_crypto::Blake3LinkCodec;
    use strata_graph::{
        BlockGraphStore, CommitOptions, Graph, ItemList, ItemValue,
        MemoryVersionTracker, VersionTracker,
    };
    use strata_store::{ChunkerConfig, GearChunker, MemoryBlockStore, ValueCodec};
    use strata_types::{
        EdgeRef, KeyTag, PropValue, Status, TypeTag, Version, VersionDetails, VertexRef,
    };

    const NAME: KeyTag = 1;
    const FOLDER: TypeTag = 1;
    const FILE: TypeTag = 2;

    struct Fixture {
        blocks: Arc<dyn BlockStore>,
        chunker: Arc<dyn Chunker>,
        tracker: Arc<MemoryVersionTracker>,
        graph: Graph,
    }

    impl Fixture {
        fn new() -> Self {
            let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
            let chunker: Arc<dyn Chunker> = Arc::new(GearChunker::new(ChunkerConfig::small()).unwrap());
            let tracker = Arc::new(MemoryVersionTracker::new(blocks.clone()));
            let store = Arc::new(BlockGraphStore::new(
                blocks.clone(),
                chunker.clone(),
                Arc::new(Blake3LinkCodec),
                ValueCodec::plain(),
            ));
            let graph = Graph::new(tracker.clone(), store);
            Self {
                blocks,
                chunker,
                tracker,
                graph,
            }
        }

        fn merge(&self, base: Link, current: Link, other: Link) -> CommitOutput {
            merge_item_lists(
                self.blocks.as_ref(),
                base,
                current,
                other,
                self.chunker.clone(),
                Arc::new(Blake3LinkCodec),
            )
            .unwrap()
        }

        /// Make `root` current so the graph reads it.
        fn show(&self, output: &CommitOutput) {
            self.tracker
                .version_set(
                    Version::new(output.root, None, VersionDetails::default()),
                    Some(Arc::new(output.index.clone())),
                )
                .unwrap();
        }

        fn name(&self, vertex: VertexRef) -> String {
            let v = self.graph.get_vertex(vertex).unwrap();
            let prop = self.graph.props(v.next_prop).next().unwrap().unwrap();
            prop.value.as_str().unwrap().to_string()
        }
    }

    fn item(name: &str) -> ItemValue {
        BTreeMap::from([(NAME, PropValue::from(name))])
    }

    fn push_items(list: &ItemList, names: &[&str]) -> Link {
        let mut tx = list.tx().unwrap();
        for name in names {
            tx.push(item(name)).unwrap();
        }
        tx.commit(CommitOptions::default()).unwrap().root
    }

    #[test]
    fn concurrent_item_appends_keep_both() {
        let fx = Fixture::new();
        let list = ItemList::new(fx.graph);
        let base = push_items(&list, &["0", "1", "2"]);
        let first = push_items(&list, &["user1"]);
        fx.tracker.checkout(&base).unwrap();
        let second = push_items(&list, &["user2"]);

        let merged = merge_item_lists(
            fx.blocks.as_ref(),
            base,
            first,
            second,
            fx.chunker.clone(),
            Arc::new(Blake3LinkCodec),
        )
        .unwrap();
        fx.tracker
            .version_set(
                Version::new(merged.root, Some(first), VersionDetails::default()),
                Some(Arc::new(merged.index)),
            )
            .unwrap();

        assert_eq!(list.len().unwrap(), 5);
        let names: Vec<String> = list
            .range(0, 5)
            .unwrap()
            .into_iter()
            .map(|i| i.value[&NAME].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["0", "1", "2", "user2", "user1"]);
    }

    #[test]
    fn merge_is_deterministic() {
        let fx = Fixture::new();
        let list = ItemList::new(fx.graph);
        let base = push_items(&list, &["a"]);
        let first = push_items(&list, &["b"]);
        fx.tracker.checkout(&base).unwrap();
        let second = push_items(&list, &["c"]);

        let run = || {
            merge_item_lists(
                fx.blocks.as_ref(),
                base,
                first,
                second,
                fx.chunker.clone(),
                Arc::new(Blake3LinkCodec),
            )
            .unwrap()
            .root
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn unchanged_current_yields_other() {
        let fx = Fixture::new();
        let list = ItemList::new(fx.graph);
        let base = push_items(&list, &["a", "b"]);
        let other = push_items(&list, &["c"]);
        let out = fx_merge(&fx.blocks, &fx.chunker, base, base, other);
        assert_eq!(out, other);
        let out = fx_merge(&fx.blocks, &fx.chunker, base, other, base);
        assert_eq!(out, other);
    }

    fn fx_merge(blocks: &Arc<dyn BlockStore>, chunker: &Arc<dyn Chunker>, b: Link, c: Link, o: Link) -> Link {
        merge_item_lists(blocks.as_ref(), b, c, o, chunker.clone(), Arc::new(Blake3LinkCodec))
            .unwrap()
            .root
    }

    /// folder -> a, then each side adds one more file under the folder
    #[test]
    fn concurrent_edges_are_spliced_into_one_chain() {
        let fx = Fixture::new();
        let mut tx = fx.graph.tx().unwrap();
        let folder = tx.add_vertex(Some(FOLDER));
        let a = tx.add_vertex(Some(FILE));
        tx.add_vertex_prop(a, NAME, "a", None).unwrap();
        tx.add_edge(folder, a, None).unwrap();
        let base = tx.commit(CommitOptions::default()).unwrap().root;

        let mut tx = fx.graph.tx().unwrap();
        let b = tx.add_vertex(Some(FILE));
        tx.add_vertex_prop(b, NAME, "b", None).unwrap();
        tx.add_edge(folder, b, None).unwrap();
        let current = tx.commit(CommitOptions::default()).unwrap().root;

        fx.tracker.checkout(&base).unwrap();
        let mut tx = fx.graph.tx().unwrap();
        let c = tx.add_vertex(Some(FILE));
        tx.add_vertex_prop(c, NAME, "c", None).unwrap();
        tx.add_edge(folder, c, None).unwrap();
        let other = tx.commit(CommitOptions::default()).unwrap().root;

        let merged = fx.merge(base, current, other);
        fx.show(&merged);

        let vertex = fx.graph.get_vertex(folder).unwrap();
        let edges: Vec<_> = fx
            .graph
            .edges_outgoing(&vertex)
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(edges.len(), 3);
        let names: Vec<String> = edges.iter().map(|e| fx.name(e.target)).collect();
        assert_eq!(names, ["a", "c", "b"]);
        assert_eq!(edges[2].source_prev, Some(edges[1].offset));
        assert_eq!(edges[2].offset, EdgeRef(2 * strata_graph::EDGE_SIZE));
        assert_eq!(edges[2].target, VertexRef(3 * strata_graph::VERTEX_SIZE));
    }

    #[test]
    fn concurrent_scalar_edit_keeps_current() {
        let fx = Fixture::new();
        let mut tx = fx.graph.tx().unwrap();
        let v = tx.add_vertex(Some(FILE));
        let p = tx.add_vertex_prop(v, NAME, "x", None).unwrap();
        let base = tx.commit(CommitOptions::default()).unwrap().root;

        let mut tx = fx.graph.tx().unwrap();
        tx.set_prop_value(p, "from-current").unwrap();
        let current = tx.commit(CommitOptions::default()).unwrap().root;

        fx.tracker.checkout(&base).unwrap();
        let mut tx = fx.graph.tx().unwrap();
        tx.set_prop_value(p, "from-other").unwrap();
        tx.set_vertex_type(v, Some(42)).unwrap();
        let other = tx.commit(CommitOptions::default()).unwrap().root;

        let merged = fx.merge(base, current, other);
        fx.show(&merged);
        assert_eq!(fx.name(v), "from-current");
        // only the other side changed the kind
        assert_eq!(fx.graph.get_vertex(v).unwrap().kind, Some(42));
        assert_eq!(fx.graph.get_prop(p).unwrap().status, Status::Updated);
    }

    #[test]
    fn current_only_edit_survives() {
        let fx = Fixture::new();
        let mut tx = fx.graph.tx().unwrap();
        let v = tx.add_vertex(None);
        let p = tx.add_vertex_prop(v, NAME, "x", None).unwrap();
        let base = tx.commit(CommitOptions::default()).unwrap().root;

        let mut tx = fx.graph.tx().unwrap();
        tx.set_prop_value(p, "edited").unwrap();
        let current = tx.commit(CommitOptions::default()).unwrap().root;

        fx.tracker.checkout(&base).unwrap();
        let mut tx = fx.graph.tx().unwrap();
        let w = tx.add_vertex(None);
        tx.add_vertex_prop(w, NAME, "new", None).unwrap();
        let other = tx.commit(CommitOptions::default()).unwrap().root;

        let merged = fx.merge(base, current, other);
        fx.show(&merged);
        assert_eq!(fx.name(v), "edited");
        assert_eq!(fx.name(w), "new");
    }

    #[test]
    fn unrelated_roots_are_rejected() {
        let fx = Fixture::new();
        let list = ItemList::new(fx.graph);
        let small = push_items(&list, &["a"]);
        let large = push_items(&list, &["b", "c"]);
        let err = merge_item_lists(
            fx.blocks.as_ref(),
            large,
            small,
            large,
            fx.chunker.clone(),
            Arc::new(Blake3LinkCodec),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::NotDescendant { .. }));
    }

    #[test]
    fn merged_blocks_land_in_target() {
        let fx = Fixture::new();
        let list = ItemList::new(fx.graph);
        let base = push_items(&list, &["a"]);
        let first = push_items(&list, &["b"]);
        fx.tracker.checkout(&base).unwrap();
        let second = push_items(&list, &["c"]);

        let target = MemoryBlockStore::new();
        let merger = Merger::new(
            MergePolicyKind::default(),
            fx.chunker.clone(),
            Arc::new(Blake3LinkCodec),
        );
        assert_eq!(merger.kind(), MergePolicyKind::MultiValueRegistry);
        let store = fx.blocks.as_ref();
        let out = merger
            .merge(
                MergeInput {
                    base: MergeSide::new(base, store),
                    current: MergeSide::new(first, store),
                    other: MergeSide::new(second, store),
                },
                &target,
            )
            .unwrap();
        assert!(target.has(&out.root).unwrap());
        for link in out.index.referenced_links() {
            assert!(target.has(&link).unwrap());
        }
    }
}
