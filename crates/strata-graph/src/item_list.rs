use std::collections::BTreeMap;

use strata_types::{KeyTag, PropRef, PropValue, TypeTag, VertexRef};

use crate::cursor::{props, ElementAccess};
use crate::error::GraphResult;
use crate::graph::Graph;
use crate::layout::VERTEX_SIZE;
use crate::tx::{CommitOptions, CommitResult, Tx};

/// Vertex type of list items.
pub const ITEM_TYPE: TypeTag = 0;

/// Properties of one item, by key.
pub type ItemValue = BTreeMap<KeyTag, PropValue>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub index: u64,
    pub value: ItemValue,
}

/// An append-only list on top of a [`Graph`]: item `i` is the vertex at
/// offset `i * VERTEX_SIZE`, its properties are the item's fields.
pub struct ItemList {
    graph: Graph,
}

impl ItemList {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn tx(&self) -> GraphResult<ItemListTx<'_>> {
        Ok(ItemListTx {
            tx: self.graph.tx()?,
        })
    }

    pub fn len(&self) -> GraphResult<u64> {
        Ok(self.graph.offsets()?.vertex_count())
    }

    pub fn is_empty(&self) -> GraphResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: u64) -> GraphResult<Item> {
        let vertex = self.graph.get_vertex(VertexRef(index * VERTEX_SIZE))?;
        Ok(Item {
            index,
            value: read_value(&self.graph, vertex.next_prop)?,
        })
    }

    /// Up to `count` items starting at `start`.
    pub fn range(&self, start: u64, count: usize) -> GraphResult<Vec<Item>> {
        self.graph
            .vertex_range(VertexRef(start * VERTEX_SIZE), count)?
            .into_iter()
            .map(|vertex| {
                Ok(Item {
                    index: vertex.offset.0 / VERTEX_SIZE,
                    value: read_value(&self.graph, vertex.next_prop)?,
                })
            })
            .collect()
    }
}

fn read_value<A: ElementAccess + ?Sized>(
    access: &A,
    head: Option<PropRef>,
) -> GraphResult<ItemValue> {
    let mut value = ItemValue::new();
    for prop in props(access, head) {
        let prop = prop?;
        value.insert(prop.key, prop.value);
    }
    Ok(value)
}

/// Appends items within one graph transaction.
pub struct ItemListTx<'a> {
    tx: Tx<'a>,
}

impl<'a> ItemListTx<'a> {
    /// Append an item and return its position.
    pub fn push(&mut self, value: ItemValue) -> GraphResult<u64> {
        let vertex = self.tx.add_vertex(Some(ITEM_TYPE));
        for (key, field) in value {
            self.tx.add_vertex_prop(vertex, key, field, None)?;
        }
        Ok(vertex.0 / VERTEX_SIZE)
    }

    pub fn commit(self, options: CommitOptions<'_>) -> GraphResult<CommitResult> {
        self.tx.commit(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::graph_store::BlockGraphStore;
    use crate::versioning::MemoryVersionTracker;
    use crate::GraphError;
    use strata_crypto::Blake3LinkCodec;
    use strata_store::{BlockStore, ChunkerConfig, GearChunker, MemoryBlockStore, ValueCodec};

    fn item_list() -> ItemList {
        let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let store = Arc::new(BlockGraphStore::new(
            blocks.clone(),
            Arc::new(GearChunker::new(ChunkerConfig::small()).unwrap()),
            Arc::new(Blake3LinkCodec),
            ValueCodec::plain(),
        ));
        ItemList::new(Graph::new(Arc::new(MemoryVersionTracker::new(blocks)), store))
    }

    fn item(fields: &[(KeyTag, &str)]) -> ItemValue {
        fields.iter().map(|(k, v)| (*k, PropValue::from(*v))).collect()
    }

    #[test]
    fn push_and_read_back() {
        let list = item_list();
        assert!(list.is_empty().unwrap());

        let mut tx = list.tx().unwrap();
        for i in 0..5 {
            let pos = tx.push(item(&[(1, "name"), (2, format!("v{i}").as_str())])).unwrap();
            assert_eq!(pos, i);
        }
        tx.commit(CommitOptions::default()).unwrap();

        assert_eq!(list.len().unwrap(), 5);
        let third = list.get(3).unwrap();
        assert_eq!(third.index, 3);
        assert_eq!(third.value, item(&[(1, "name"), (2, "v3")]));
    }

    #[test]
    fn later_transactions_continue_numbering() {
        let list = item_list();
        let mut tx = list.tx().unwrap();
        tx.push(item(&[(1, "a")])).unwrap();
        tx.commit(CommitOptions::default()).unwrap();

        let mut tx = list.tx().unwrap();
        assert_eq!(tx.push(item(&[(1, "b")])).unwrap(), 1);
        tx.commit(CommitOptions::default()).unwrap();

        let all = list.range(0, 10).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|i| i.value[&1].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn empty_item_has_no_fields() {
        let list = item_list();
        let mut tx = list.tx().unwrap();
        tx.push(ItemValue::new()).unwrap();
        tx.commit(CommitOptions::default()).unwrap();
        assert!(list.get(0).unwrap().value.is_empty());
    }

    #[test]
    fn missing_item_is_not_found() {
        let list = item_list();
        assert!(matches!(list.get(0), Err(GraphError::NotFound { .. })));
    }
}
