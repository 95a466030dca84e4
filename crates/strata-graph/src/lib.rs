//! Offset-addressed property graph for Strata.
//!
//! A graph root is five chunked partitions: fixed-size vertex, edge, prop and
//! index records plus a value partition of encoded property payloads. Records
//! refer to each other by byte offset and form singly linked chains.
//!
//! - [`layout`] -- binary record encoding
//! - [`GraphStore`] -- reads records of a root, persists deltas as new roots
//! - [`Graph`] -- cached reads of the current root
//! - [`Tx`] -- staged mutation and commit
//! - [`traverse`] -- depth-first walk along outgoing edges
//! - [`ItemList`] -- an append-only list of property maps
//!
//! Which root is current is decided by a [`VersionTracker`]; the version
//! store implements it, [`MemoryVersionTracker`] covers ephemeral use.

pub mod cursor;
pub mod error;
pub mod graph;
pub mod graph_store;
pub mod item_list;
pub mod layout;
pub mod traversal;
pub mod tx;
pub mod versioning;

pub use cursor::{edges_from, edges_outgoing, indices, props, ElementAccess};
pub use error::{GraphError, GraphResult};
pub use graph::{Graph, Offsets};
pub use graph_store::{
    persist_partitions, BlockGraphStore, CommitOutput, Delta, GraphStore, PartitionDelta,
};
pub use item_list::{Item, ItemList, ItemListTx, ItemValue, ITEM_TYPE};
pub use layout::{EDGE_SIZE, INDEX_SIZE, PROP_SIZE, VERTEX_SIZE};
pub use traversal::{traverse, TraversalVisitor};
pub use tx::{CommitOptions, CommitResult, Tx};
pub use versioning::{MemoryVersionTracker, RootRef, VersionTracker};
