//! Version store for Strata.
//!
//! A [`VersionStore`] owns the append-only DAG of versions for one graph
//! identity. It is the [`VersionTracker`](strata_graph::VersionTracker) a
//! [`Graph`](strata_graph::Graph) commits through, persists its own log as a
//! chunked byte array, and reconciles with replicas of the same identity:
//!
//! - [`VersionStore::diff`] splits another replica's log into common and
//!   missing versions
//! - [`VersionStore::pack_missing_blocks`] bundles the blocks behind the
//!   missing versions for transfer
//! - [`VersionStore::merge_versions`] fast-forwards, or merges the two
//!   current roots into a two-parent version
//!
//! Replicas coordinate only through these calls. A store is safe to share
//! between threads, but one graph snapshot must have a single writer.

pub mod config;
pub mod error;
pub mod reconcile;
pub mod store;

pub use config::{VersionStoreConfig, VersionStoreOptions};
pub use error::{VersionError, VersionResult};
pub use reconcile::{MergeKind, MergeOutcome, VersionStoreDiff};
pub use store::{RootSet, VersionStore};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use strata_crypto::{
        verify_version, AesGcmCipher, Blake3LinkCodec, Ed25519Signer, LinkCodec, Secret, SigningKey,
    };
    use strata_graph::{BlockGraphStore, CommitOptions, Graph, ItemList, ItemValue};
    use strata_pack::GraphPacker;
    use strata_store::{BlockStore, Chunker, ChunkerConfig, GearChunker, MemoryBlockStore, ValueCodec};
    use strata_types::{KeyTag, Link, PropRef, PropValue, TypeTag, VertexRef};

    const NAME: KeyTag = 1;
    const CONTENT: KeyTag = 2;
    const FOLDER: TypeTag = 1;
    const FILE: TypeTag = 2;
    const CONTAINS: TypeTag = 1;

    fn chunker() -> Arc<dyn Chunker> {
        Arc::new(GearChunker::new(ChunkerConfig::small()).unwrap())
    }

    fn codec() -> Arc<dyn LinkCodec> {
        Arc::new(Blake3LinkCodec)
    }

    fn blocks() -> Arc<dyn BlockStore> {
        Arc::new(MemoryBlockStore::new())
    }

    fn open(blocks: &Arc<dyn BlockStore>, options: VersionStoreOptions) -> Arc<VersionStore> {
        Arc::new(VersionStore::open(blocks.clone(), chunker(), codec(), options).unwrap())
    }

    /// Open a replica of `store_root` checked out at `version_root`.
    fn replica(blocks: &Arc<dyn BlockStore>, store_root: Link, version_root: Link) -> Arc<VersionStore> {
        open(
            blocks,
            VersionStoreOptions::default()
                .with_store_root(store_root)
                .with_version_root(version_root),
        )
    }

    fn graph_with(store: &Arc<VersionStore>, values: ValueCodec) -> Graph {
        let graph_store = Arc::new(BlockGraphStore::new(
            store.block_store().clone(),
            chunker(),
            codec(),
            values,
        ));
        Graph::new(store.clone(), graph_store)
    }

    fn graph(store: &Arc<VersionStore>) -> Graph {
        graph_with(store, ValueCodec::plain())
    }

    fn list(store: &Arc<VersionStore>) -> ItemList {
        ItemList::new(graph(store))
    }

    fn push(list: &ItemList, names: impl IntoIterator<Item = String>) -> Link {
        let mut tx = list.tx().unwrap();
        for name in names {
            tx.push(ItemValue::from([(NAME, PropValue::from(name.as_str()))]))
                .unwrap();
        }
        tx.commit(CommitOptions::default()).unwrap().root
    }

    fn push_range(list: &ItemList, prefix: &str, range: std::ops::Range<u32>) -> Link {
        push(list, range.map(|i| format!("{prefix} {i}")))
    }

    fn names(list: &ItemList) -> Vec<String> {
        let len = list.len().unwrap();
        list.range(0, len as usize)
            .unwrap()
            .into_iter()
            .map(|item| item.value[&NAME].as_str().unwrap().to_string())
            .collect()
    }

    fn prop_name(graph: &Graph, vertex: VertexRef) -> String {
        let vertex = graph.get_vertex(vertex).unwrap();
        let prop = graph.props(vertex.next_prop).next().unwrap().unwrap();
        prop.value.as_str().unwrap().to_string()
    }

    // ---- scenario A: concurrent appends to an item list ----

    #[test]
    fn concurrent_item_appends_merge() {
        let blocks = blocks();
        let origin = open(&blocks, VersionStoreOptions::default());
        let base = push_range(&list(&origin), "item", 0..3);
        let store_root = origin.version_store_root().unwrap();

        let one = replica(&blocks, store_root, base);
        let first = push(&list(&one), ["item user1".to_string()]);
        let two = replica(&blocks, store_root, base);
        let second = push(&list(&two), ["item user2".to_string()]);

        let outcome = one.merge_versions(&two).unwrap();
        assert_eq!(outcome.kind, MergeKind::Merged);
        assert_eq!(one.current_root(), Some(outcome.root));

        let merged = list(&one);
        assert_eq!(merged.len().unwrap(), 5);
        assert_eq!(
            names(&merged),
            ["item 0", "item 1", "item 2", "item user2", "item user1"]
        );

        let version = one.version(&outcome.root).unwrap();
        assert_eq!(version.parent, Some(first));
        assert_eq!(version.merge_parent, Some(second));
    }

    // ---- scenario B: encrypted values ----

    #[test]
    fn encrypted_graph_needs_secret() {
        let secret = [7u8; 32];
        let encrypted = || ValueCodec::encrypted(Arc::new(AesGcmCipher::new(Secret::from_bytes(secret))));

        let blocks = blocks();
        let writer = open(&blocks, VersionStoreOptions::default());
        let g = graph_with(&writer, encrypted());
        let mut tx = g.tx().unwrap();
        let v1 = tx.add_vertex(Some(FOLDER));
        let v2 = tx.add_vertex(Some(FOLDER));
        let v3 = tx.add_vertex(Some(FILE));
        tx.add_edge(v1, v2, Some(CONTAINS)).unwrap();
        tx.add_edge(v1, v3, Some(CONTAINS)).unwrap();
        let p1 = tx.add_vertex_prop(v1, NAME, "root-folder", None).unwrap();
        let p2 = tx.add_vertex_prop(v3, NAME, "secret-file", None).unwrap();
        tx.commit(CommitOptions::default()).unwrap();
        let store_root = writer.version_store_root().unwrap();

        let reader = open(&blocks, VersionStoreOptions::default().with_store_root(store_root));
        let with_secret = graph_with(&reader, encrypted());
        assert_eq!(with_secret.get_prop(p1).unwrap().value.as_str(), Some("root-folder"));
        assert_eq!(with_secret.get_prop(p2).unwrap().value.as_str(), Some("secret-file"));

        let without = graph_with(&reader, ValueCodec::plain());
        assert_eq!(without.get_vertex(v3).unwrap().kind, Some(FILE));
        for prop in [p1, p2] {
            assert!(without.get_prop(prop).unwrap_err().is_decoding());
        }

        let wrong = ValueCodec::encrypted(Arc::new(AesGcmCipher::new(Secret::from_bytes([8; 32]))));
        assert!(graph_with(&reader, wrong).get_prop(p1).unwrap_err().is_decoding());
    }

    // ---- scenario C: three replicas ----

    #[test]
    fn replicas_converge_to_three_hundred() {
        let b0 = blocks();
        let origin = open(&b0, VersionStoreOptions::default());
        let original = push_range(&list(&origin), "item", 0..100);
        let store_root = origin.version_store_root().unwrap();

        let b1 = blocks();
        let b2 = blocks();
        b0.push(b1.as_ref()).unwrap();
        b0.push(b2.as_ref()).unwrap();

        let one = replica(&b1, store_root, original);
        let first = push_range(&list(&one), "item user1", 100..200);
        let two = replica(&b2, store_root, original);
        let second = push_range(&list(&two), "item user2", 200..300);
        assert_eq!(list(&one).len().unwrap(), 200);
        assert_eq!(list(&two).len().unwrap(), 200);

        let (root1, root2) = (one.version_store_root().unwrap(), two.version_store_root().unwrap());

        // one merges two
        let b3 = blocks();
        b1.push(b3.as_ref()).unwrap();
        b2.push(b3.as_ref()).unwrap();
        let one_a = replica(&b3, root1, first);
        let two_a = replica(&b3, root2, second);
        assert_eq!(one_a.merge_versions(&two_a).unwrap().kind, MergeKind::Merged);
        assert!(one_a.includes_version(&first));
        assert!(one_a.includes_version(&second));
        let merged = list(&one_a);
        assert_eq!(merged.len().unwrap(), 300);
        let merged_names = names(&merged);
        assert_eq!(merged_names[100], "item user2 200");
        assert_eq!(merged_names[200], "item user1 100");

        // two merges one, in a separate store
        let b4 = blocks();
        b1.push(b4.as_ref()).unwrap();
        b2.push(b4.as_ref()).unwrap();
        let one_b = replica(&b4, root1, first);
        let two_b = replica(&b4, root2, second);
        assert_eq!(two_b.merge_versions(&one_b).unwrap().kind, MergeKind::Merged);
        assert_eq!(list(&two_b).len().unwrap(), 300);

        // the untouched original catches up with the merge; the merge is not
        // a direct child of the original, so a merge version is recorded
        let zero = replica(&b3, store_root, original);
        let outcome = zero.merge_versions(&one_a).unwrap();
        assert_eq!(outcome.kind, MergeKind::Merged);
        let caught_up = zero.version(&outcome.root).unwrap();
        assert_eq!(caught_up.parent, Some(original));
        assert_eq!(caught_up.merge_parent, one_a.current_root());
        assert_eq!(names(&list(&zero)), merged_names);

        for store in [&origin, &one, &two, &one_a, &two_a, &two_b, &zero] {
            assert_eq!(store.id(), origin.id());
        }
    }

    // ---- merge parents survive a reopen ----

    #[test]
    fn merge_parents_preserved_after_restore() {
        let b1 = blocks();
        let b2 = blocks();
        let origin = open(&b1, VersionStoreOptions::default());
        let g = graph(&origin);
        let mut tx = g.tx().unwrap();
        let v1 = tx.add_vertex(Some(FOLDER));
        let v2 = tx.add_vertex(Some(FOLDER));
        let v3 = tx.add_vertex(Some(FILE));
        tx.add_edge(v1, v2, Some(CONTAINS)).unwrap();
        tx.add_edge(v1, v3, Some(CONTAINS)).unwrap();
        tx.add_vertex_prop(v1, NAME, "root-folder", None).unwrap();
        tx.add_vertex_prop(v2, NAME, "nested-folder", None).unwrap();
        tx.add_vertex_prop(v3, NAME, "nested-file", None).unwrap();
        tx.add_vertex_prop(v2, CONTENT, "hello world from v2", None).unwrap();
        tx.add_vertex_prop(v3, CONTENT, "hello world from v3", None).unwrap();
        let original = tx.commit(CommitOptions::default()).unwrap().root;
        b1.push(b2.as_ref()).unwrap();
        let store_root = origin.version_store_root().unwrap();

        let add_file = |store: &Arc<VersionStore>, name: &str, comment: &str, tag: &str| {
            let g = graph(store);
            let mut tx = g.tx().unwrap();
            let file = tx.add_vertex(Some(FILE));
            tx.add_edge(VertexRef(0), file, Some(CONTAINS)).unwrap();
            tx.add_vertex_prop(file, NAME, name, None).unwrap();
            tx.add_vertex_prop(file, CONTENT, format!("hello world from {name}").as_str(), None)
                .unwrap();
            tx.commit(CommitOptions::default().comment(comment).tag(tag))
                .unwrap()
                .root
        };
        let one = replica(&b1, store_root, original);
        add_file(&one, "nested-file-user-1", "first commit", "first");
        let two = replica(&b2, store_root, original);
        add_file(&two, "nested-file-user-2", "second commit", "second");

        let bundle = one.pack_missing_blocks(&two, b2.as_ref()).unwrap();
        GraphPacker::new(codec(), chunker())
            .restore_random_blocks(&bundle, b1.as_ref())
            .unwrap();

        let outcome = one.merge_versions(&two).unwrap();
        assert_eq!(Some(outcome.root), one.current_root());
        assert!(!outcome.blocks.is_empty());

        let merged = graph(&one);
        let root_vertex = merged.get_vertex(VertexRef(0)).unwrap();
        let targets: Vec<String> = merged
            .edges_outgoing(&root_vertex)
            .map(|edge| prop_name(&merged, edge.unwrap().target))
            .collect();
        assert_eq!(
            targets,
            ["nested-folder", "nested-file", "nested-file-user-2", "nested-file-user-1"]
        );

        let store_root = one.version_store_root().unwrap();
        let reopened = open(&b1, VersionStoreOptions::default().with_store_root(store_root));
        assert_eq!(reopened.log(), one.log());
        assert_eq!(reopened.id(), one.id());
        assert_eq!(reopened.current_root(), one.current_root());

        let pinned = replica(&b1, store_root, outcome.root);
        assert_eq!(pinned.log(), one.log());
        assert_eq!(pinned.version_store_root(), Some(store_root));

        let log = one.log();
        let merge = log[0].details.merge.as_deref().unwrap();
        assert_eq!(merge.parent, log[1].details);
        assert_eq!(merge.merge_parent, two.log()[0].details);
        assert_eq!(merge.parent.comment.as_deref(), Some("first commit"));
        assert_eq!(merge.merge_parent.tags, ["second"]);
    }

    // ---- pack and restore a complete history ----

    #[test]
    fn complete_history_round_trip() {
        let blocks = blocks();
        let store = open(&blocks, VersionStoreOptions::default());
        let items = list(&store);
        let original = push_range(&items, "item", 0..30);
        let first = push_range(&items, "item user1", 30..40);
        let second = push_range(&items, "item user2", 40..50);

        let packer = GraphPacker::new(codec(), chunker());
        let store_root = store.version_store_root().unwrap();
        let bundle = packer.pack_complete(&store_root, blocks.as_ref()).unwrap();

        let transient: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let restored = packer.restore_complete(&bundle, transient.as_ref()).unwrap();
        assert_eq!(restored.version_store_root, store_root);
        assert_eq!(restored.version_roots, [second, first, original]);

        let reopened = replica(&transient, restored.version_store_root, restored.version_roots[0]);
        assert_eq!(reopened.version_store_root(), store.version_store_root());
        assert_eq!(reopened.id(), store.id());
        assert_eq!(reopened.current_root(), store.current_root());
        assert_eq!(reopened.log(), store.log());

        let items = list(&reopened);
        assert_eq!(items.len().unwrap(), 50);
        assert_eq!(items.get(0).unwrap().value[&NAME].as_str(), Some("item 0"));
        assert_eq!(items.get(49).unwrap().value[&NAME].as_str(), Some("item user2 49"));
    }

    // ---- fast-forward and up-to-date ----

    #[test]
    fn fast_forward_adds_no_version() {
        let blocks = blocks();
        let origin = open(&blocks, VersionStoreOptions::default());
        let original = push_range(&list(&origin), "item", 0..3);
        let store_root = origin.version_store_root().unwrap();

        let ahead = replica(&blocks, store_root, original);
        let next = push_range(&list(&ahead), "item", 3..5);

        let outcome = origin.merge_versions(&ahead).unwrap();
        assert_eq!(outcome.kind, MergeKind::FastForward);
        assert_eq!(outcome.root, next);
        assert_eq!(origin.current_root(), Some(next));
        assert_eq!(origin.log().len(), 2);
        assert!(origin.log().iter().all(|v| !v.is_merge()));
        assert_eq!(list(&origin).len().unwrap(), 5);
    }

    #[test]
    fn two_commits_ahead_is_merged() {
        let blocks = blocks();
        let origin = open(&blocks, VersionStoreOptions::default());
        let a = push_range(&list(&origin), "item", 0..2);
        let store_root = origin.version_store_root().unwrap();

        let ahead = replica(&blocks, store_root, a);
        let b = push_range(&list(&ahead), "item", 2..4);
        let c = push_range(&list(&ahead), "item", 4..6);
        assert_eq!(ahead.version(&c).unwrap().parent, Some(b));

        let outcome = origin.merge_versions(&ahead).unwrap();
        assert_eq!(outcome.kind, MergeKind::Merged);
        let merge = origin.version(&outcome.root).unwrap();
        assert_eq!(merge.parent, Some(a));
        assert_eq!(merge.merge_parent, Some(c));

        let ancestry: Vec<Link> = origin.parent_versions(&outcome.root).iter().map(|v| v.root).collect();
        assert_eq!(ancestry, [outcome.root, a]);
        assert!(origin.includes_version(&c));
        assert_eq!(list(&origin).len().unwrap(), 6);
    }

    #[test]
    fn nothing_missing_is_up_to_date() {
        let blocks = blocks();
        let origin = open(&blocks, VersionStoreOptions::default());
        let original = push_range(&list(&origin), "item", 0..3);
        let same = replica(&blocks, origin.version_store_root().unwrap(), original);

        let outcome = origin.merge_versions(&same).unwrap();
        assert_eq!(outcome.kind, MergeKind::UpToDate);
        assert_eq!(outcome.root, original);
        assert_eq!(outcome.blocks[0].link, original);
        assert_eq!(origin.log().len(), 1);
    }

    // ---- diff ----

    #[test]
    fn diff_splits_common_and_missing() {
        let blocks = blocks();
        let origin = open(&blocks, VersionStoreOptions::default());
        let items = list(&origin);
        let a = push_range(&items, "item", 0..2);
        let b = push_range(&items, "item", 2..4);
        let store_root = origin.version_store_root().unwrap();

        let other = replica(&blocks, store_root, b);
        let c = push_range(&list(&other), "item", 4..6);

        let diff = origin.diff(&other).unwrap();
        let roots = |vs: &[strata_types::Version]| vs.iter().map(|v| v.root).collect::<Vec<_>>();
        assert_eq!(roots(&diff.common), [b, a]);
        assert_eq!(roots(&diff.missing), [c]);
        assert_eq!(diff.last.map(|v| v.root), Some(b));
    }

    #[test]
    fn unrelated_stores_do_not_diff() {
        let blocks = blocks();
        let ours = open(&blocks, VersionStoreOptions::default());
        let theirs = open(&blocks, VersionStoreOptions::default());
        assert!(matches!(
            ours.diff(&theirs),
            Err(VersionError::IdentityMismatch { .. })
        ));
        assert!(matches!(
            ours.merge_versions(&theirs),
            Err(VersionError::IdentityMismatch { .. })
        ));
    }

    // ---- history ----

    #[test]
    fn history_is_reachable_after_merges() {
        let blocks = blocks();
        let origin = open(&blocks, VersionStoreOptions::default());
        let base = push_range(&list(&origin), "item", 0..2);
        let store_root = origin.version_store_root().unwrap();
        let one = replica(&blocks, store_root, base);
        let ours = push_range(&list(&one), "one", 0..2);
        let two = replica(&blocks, store_root, base);
        let theirs = push_range(&list(&two), "two", 0..2);
        one.merge_versions(&two).unwrap();

        // theirs is known only as a merge parent
        let current = one.current_root().unwrap();
        let ancestry: Vec<Link> = one.parent_versions(&current).iter().map(|v| v.root).collect();
        assert_eq!(ancestry, [current, ours, base]);
        for root in [current, ours, base, theirs] {
            assert!(one.includes_version(&root));
        }
        let merges: Vec<_> = one.log().into_iter().filter(|v| v.is_merge()).collect();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].root, current);
    }

    // ---- signing ----

    #[test]
    fn signed_commit_verifies() {
        let blocks = blocks();
        let store = open(&blocks, VersionStoreOptions::default());
        let signer = Ed25519Signer::new(SigningKey::generate()).with_author("ann", "ann@example.org");
        let items = list(&store);
        let mut tx = items.tx().unwrap();
        tx.push(BTreeMap::from([(NAME, PropValue::from("signed"))])).unwrap();
        tx.commit(CommitOptions::default().signer(&signer)).unwrap();

        let version = store.log().remove(0);
        assert!(verify_version(&version).is_ok());
        assert_eq!(version.details.author.as_deref(), Some("ann"));
        assert_eq!(version.details.email.as_deref(), Some("ann@example.org"));

        let reopened = open(
            &blocks,
            VersionStoreOptions::default().with_store_root(store.version_store_root().unwrap()),
        );
        assert!(verify_version(&reopened.log()[0]).is_ok());
    }

    #[test]
    fn read_only_store_still_tracks_graph() {
        let blocks = blocks();
        let store = open(&blocks, VersionStoreOptions::default().read_only());
        let items = list(&store);
        let root = push_range(&items, "item", 0..2);
        assert_eq!(store.current_root(), Some(root));
        assert!(store.version_store_root().is_none());
        assert_eq!(items.len().unwrap(), 2);
    }

    #[test]
    fn prop_ref_of_missing_record() {
        let blocks = blocks();
        let store = open(&blocks, VersionStoreOptions::default());
        push_range(&list(&store), "item", 0..1);
        assert!(graph(&store).get_prop(PropRef(30_000)).is_err());
    }
}
