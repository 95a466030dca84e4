use std::sync::Arc;

use strata_crypto::LinkCodec;
use strata_types::{IndexedValue, Link, PropValue};
use tracing::debug;

use crate::block_store::BlockStore;
use crate::chunked::{create, read_all, read_index};
use crate::chunker::Chunker;
use crate::error::{StoreError, StoreResult};

/// Secondary search structures referenced by index records.
pub trait IndexStore: Send + Sync {
    /// Persist a searchable structure over `values` and return its root.
    fn index_create(&self, values: &[IndexedValue]) -> StoreResult<Link>;

    /// Look up `value` in the structure rooted at `link`.
    fn index_search(&self, link: &Link, value: &PropValue) -> StoreResult<Option<IndexedValue>>;
}

/// Sorted-array index stored as a chunked byte array.
///
/// Values are sorted by their bytes and deduplicated (first occurrence wins),
/// then searched by binary search.
pub struct SortedIndexStore {
    store: Arc<dyn BlockStore>,
    chunker: Arc<dyn Chunker>,
    codec: Arc<dyn LinkCodec>,
}

impl SortedIndexStore {
    pub fn new(store: Arc<dyn BlockStore>, chunker: Arc<dyn Chunker>, codec: Arc<dyn LinkCodec>) -> Self {
        Self {
            store,
            chunker,
            codec,
        }
    }

    fn load(&self, link: &Link) -> StoreResult<Vec<IndexedValue>> {
        let index = read_index(self.store.as_ref(), link)?;
        let bytes = read_all(self.store.as_ref(), &index)?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl IndexStore for SortedIndexStore {
    fn index_create(&self, values: &[IndexedValue]) -> StoreResult<Link> {
        let mut sorted: Vec<IndexedValue> = Vec::with_capacity(values.len());
        for value in values {
            if let Err(pos) =
                sorted.binary_search_by(|probe| probe.value.as_bytes().cmp(value.value.as_bytes()))
            {
                sorted.insert(pos, value.clone());
            }
        }
        let bytes =
            bincode::serialize(&sorted).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let array = create(&bytes, self.chunker.as_ref(), self.codec.as_ref())?;
        self.store.put_all(&array.blocks)?;
        debug!(root = %array.root.short_hex(), entries = sorted.len(), "created sorted index");
        Ok(array.root)
    }

    fn index_search(&self, link: &Link, value: &PropValue) -> StoreResult<Option<IndexedValue>> {
        let entries = self.load(link)?;
        Ok(entries
            .binary_search_by(|probe| probe.value.as_bytes().cmp(value.as_bytes()))
            .ok()
            .map(|pos| entries[pos].clone()))
    }
}
