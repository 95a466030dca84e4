use std::collections::HashSet;
use std::sync::Arc;

use strata_crypto::LinkCodec;
use strata_graph::BlockGraphStore;
use strata_store::{build_root_index, BlockStore, Chunker, RootIndex, ValueCodec, VersionLog};
use strata_types::{Block, Link};
use tracing::debug;

use crate::bundle::{Bundle, BundleHeader, BundleMode, FragmentDescriptor};
use crate::error::{PackError, PackResult};
use crate::fragment::{compute, Fragment, RecordingBlockStore};

/// A graph root restored from a version bundle.
#[derive(Clone, Debug)]
pub struct RestoredVersion {
    pub root: Link,
    pub index: RootIndex,
    pub blocks: Vec<Block>,
}

/// A version store history restored from a complete bundle.
#[derive(Clone, Debug)]
pub struct RestoredComplete {
    pub version_store_root: Link,
    /// Most recent first.
    pub version_roots: Vec<Link>,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug)]
pub struct RestoredFragment {
    pub descriptor: FragmentDescriptor,
    pub fragment: Fragment,
    pub blocks: Vec<Block>,
}

/// Packs block sets into bundles and restores them into block stores.
#[derive(Clone)]
pub struct GraphPacker {
    codec: Arc<dyn LinkCodec>,
    chunker: Arc<dyn Chunker>,
}

impl GraphPacker {
    pub fn new(codec: Arc<dyn LinkCodec>, chunker: Arc<dyn Chunker>) -> Self {
        Self { codec, chunker }
    }

    /// The root block of `root` and every block it references.
    pub fn extract_version_blocks(&self, store: &dyn BlockStore, root: &Link) -> PackResult<Vec<Block>> {
        let index = build_root_index(store, root)?;
        let mut links = vec![*root];
        links.extend(index.referenced_links());
        fetch(store, links)
    }

    // ---- single version ----

    pub fn pack_graph_version(&self, store: &dyn BlockStore, root: &Link) -> PackResult<Block> {
        let blocks = self.extract_version_blocks(store, root)?;
        self.seal(Bundle::new(BundleHeader::Version { root: *root }, blocks))
    }

    pub fn restore_graph_version(&self, bundle: &Block, target: &dyn BlockStore) -> PackResult<RestoredVersion> {
        let bundle = self.open(bundle, BundleMode::Version, target)?;
        let mode = bundle.mode();
        let BundleHeader::Version { root } = bundle.header else {
            return Err(unexpected(BundleMode::Version, mode));
        };
        let index = build_root_index(target, &root)?;
        Ok(RestoredVersion {
            root,
            index,
            blocks: bundle.blocks,
        })
    }

    // ---- arbitrary blocks ----

    pub fn pack_random_blocks(&self, blocks: &[Block]) -> PackResult<Block> {
        self.seal(Bundle::new(BundleHeader::Random, blocks.to_vec()))
    }

    pub fn restore_random_blocks(&self, bundle: &Block, target: &dyn BlockStore) -> PackResult<Vec<Block>> {
        Ok(self.open(bundle, BundleMode::Random, target)?.blocks)
    }

    // ---- complete history ----

    /// Bundle a version store: its own encoded log plus the closure of every
    /// version root it records.
    pub fn pack_complete(&self, store_root: &Link, store: &dyn BlockStore) -> PackResult<Block> {
        let log = VersionLog::read(store, store_root)?;
        let mut links = VersionLog::links(store, store_root)?;
        for version in &log.versions {
            links.push(version.root);
            links.extend(build_root_index(store, &version.root)?.referenced_links());
        }
        let version_roots = log.versions.iter().rev().map(|v| v.root).collect();
        let blocks = fetch(store, links)?;
        self.seal(Bundle::new(
            BundleHeader::Complete {
                version_store_root: *store_root,
                version_roots,
            },
            blocks,
        ))
    }

    pub fn restore_complete(&self, bundle: &Block, target: &dyn BlockStore) -> PackResult<RestoredComplete> {
        let bundle = self.open(bundle, BundleMode::Complete, target)?;
        let mode = bundle.mode();
        let BundleHeader::Complete {
            version_store_root,
            version_roots,
        } = bundle.header
        else {
            return Err(unexpected(BundleMode::Complete, mode));
        };
        Ok(RestoredComplete {
            version_store_root,
            version_roots,
            blocks: bundle.blocks,
        })
    }

    // ---- fragments ----

    /// Bundle exactly the blocks needed to read the fragment back: the root
    /// and partition index blocks plus the chunks its records live in.
    pub fn pack_computed(
        &self,
        store: Arc<dyn BlockStore>,
        values: ValueCodec,
        descriptor: FragmentDescriptor,
    ) -> PackResult<Block> {
        let recording = Arc::new(RecordingBlockStore::new(store.clone()));
        let index = build_root_index(recording.as_ref(), &descriptor.root)?;
        let graph_store = self.graph_store(recording.clone(), values);
        let fragment = compute(&graph_store, &index, &descriptor)?;
        let blocks = fetch(store.as_ref(), recording.read_links())?;
        debug!(
            root = %descriptor.root.short_hex(),
            vertices = fragment.vertices.len(),
            blocks = blocks.len(),
            "packed fragment"
        );
        self.seal(Bundle::new(BundleHeader::Fragment(descriptor), blocks))
    }

    pub fn restore_computed(
        &self,
        bundle: &Block,
        target: Arc<dyn BlockStore>,
        values: ValueCodec,
    ) -> PackResult<RestoredFragment> {
        let bundle = self.open(bundle, BundleMode::Fragment, target.as_ref())?;
        let mode = bundle.mode();
        let BundleHeader::Fragment(descriptor) = bundle.header else {
            return Err(unexpected(BundleMode::Fragment, mode));
        };
        let index = build_root_index(target.as_ref(), &descriptor.root)?;
        let graph_store = self.graph_store(target, values);
        let fragment = compute(&graph_store, &index, &descriptor)?;
        Ok(RestoredFragment {
            descriptor,
            fragment,
            blocks: bundle.blocks,
        })
    }

    // ---- helpers ----

    /// Decode a bundle block of any mode without writing anything.
    pub fn inspect(&self, bundle: &Block) -> PackResult<Bundle> {
        if !self.codec.verify(bundle) {
            return Err(PackError::BundleLinkMismatch(bundle.link));
        }
        Bundle::decode(&bundle.bytes, self.codec.as_ref())
    }

    fn open(&self, bundle: &Block, expected: BundleMode, target: &dyn BlockStore) -> PackResult<Bundle> {
        let decoded = self.inspect(bundle)?;
        if decoded.mode() != expected {
            return Err(unexpected(expected, decoded.mode()));
        }
        target.put_all(&decoded.blocks)?;
        debug!(
            bundle = %bundle.link.short_hex(),
            mode = %expected,
            blocks = decoded.blocks.len(),
            "restored bundle"
        );
        Ok(decoded)
    }

    fn seal(&self, bundle: Bundle) -> PackResult<Block> {
        let block = bundle.to_block(self.codec.as_ref())?;
        debug!(
            bundle = %block.link.short_hex(),
            mode = %bundle.mode(),
            blocks = bundle.blocks.len(),
            bytes = block.bytes.len(),
            "packed bundle"
        );
        Ok(block)
    }

    fn graph_store(&self, blocks: Arc<dyn BlockStore>, values: ValueCodec) -> BlockGraphStore {
        BlockGraphStore::new(blocks, self.chunker.clone(), self.codec.clone(), values)
    }
}

fn unexpected(expected: BundleMode, actual: BundleMode) -> PackError {
    PackError::UnexpectedMode { expected, actual }
}

/// Read each distinct link once, keeping first-seen order.
fn fetch(store: &dyn BlockStore, links: impl IntoIterator<Item = Link>) -> PackResult<Vec<Block>> {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    for link in links {
        if seen.insert(link) {
            blocks.push(Block::new(link, store.get(&link)?));
        }
    }
    Ok(blocks)
}
