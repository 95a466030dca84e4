use std::collections::HashMap;
use std::sync::RwLock;

use strata_types::{Block, Link};

use crate::error::{StoreError, StoreResult};

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written; rewriting an existing link is a no-op.
/// - Concurrent reads are always safe.
/// - The store never interprets block contents.
pub trait BlockStore: Send + Sync {
    /// Read a block's bytes. Fails with [`StoreError::NotFound`] if absent.
    fn get(&self, link: &Link) -> StoreResult<Vec<u8>>;

    /// Write a block. Idempotent.
    fn put(&self, block: &Block) -> StoreResult<()>;

    /// Check whether a block exists.
    fn has(&self, link: &Link) -> StoreResult<bool>;

    /// Every link currently held, in a stable order.
    fn links(&self) -> StoreResult<Vec<Link>>;

    /// Write multiple blocks.
    fn put_all(&self, blocks: &[Block]) -> StoreResult<()> {
        blocks.iter().try_for_each(|block| self.put(block))
    }

    /// Copy every block of this store into `other`. Returns the number of
    /// blocks copied.
    fn push(&self, other: &dyn BlockStore) -> StoreResult<usize> {
        let links = self.links()?;
        for link in &links {
            let bytes = self.get(link)?;
            other.put(&Block::new(*link, bytes))?;
        }
        Ok(links.len())
    }
}

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. All blocks are held in memory behind a
/// `RwLock` for safe concurrent access.
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Link, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blocks.
    pub fn total_bytes(&self) -> u64 {
        self.blocks
            .read()
            .expect("lock poisoned")
            .values()
            .map(|bytes| bytes.len() as u64)
            .sum()
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, link: &Link) -> StoreResult<Vec<u8>> {
        let map = self.blocks.read().expect("lock poisoned");
        map.get(link).cloned().ok_or(StoreError::NotFound(*link))
    }

    fn put(&self, block: &Block) -> StoreResult<()> {
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(block.link).or_insert_with(|| block.bytes.clone());
        Ok(())
    }

    fn has(&self, link: &Link) -> StoreResult<bool> {
        Ok(self.blocks.read().expect("lock poisoned").contains_key(link))
    }

    fn links(&self) -> StoreResult<Vec<Link>> {
        let map = self.blocks.read().expect("lock poisoned");
        let mut links: Vec<Link> = map.keys().copied().collect();
        links.sort();
        Ok(links)
    }
}

impl std::fmt::Debug for MemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlockStore")
            .field("block_count", &self.len())
            .finish()
    }
}
