//! Content-addressed block storage for Strata.
//!
//! Everything Strata persists is an immutable block identified by its link.
//! This crate provides the storage seam and the structures built on it:
//!
//! - [`BlockStore`] -- get/put/has/push over blocks; [`MemoryBlockStore`]
//!   for tests and embedding
//! - [`Chunker`] -- content-defined split points; [`GearChunker`]
//! - [`chunked`] -- byte arrays stored as chunk blocks plus an index block
//! - [`ValueCodec`] -- framing and optional encryption of property values
//! - [`RootIndex`] -- per-partition block index of a graph root
//! - [`IndexStore`] -- secondary search structures; [`SortedIndexStore`]
//! - [`VersionLog`] -- the persisted form of a version store
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written; rewriting one is harmless.
//! 2. Concurrent reads are always safe.
//! 3. The block store never interprets block contents.
//! 4. All errors are propagated, never silently ignored.

pub mod block_index;
pub mod block_store;
pub mod chunked;
pub mod chunker;
pub mod error;
pub mod index_store;
pub mod value_codec;
pub mod version_log;

pub use block_index::{
    build_root_index, Partition, PartitionIndex, RootIndex, RootIndexBuilder, RootStruct,
};
pub use block_store::{BlockStore, MemoryBlockStore};
pub use chunked::{BlockIndex, ChunkedArray};
pub use chunker::{Chunker, ChunkerConfig, GearChunker};
pub use error::{StoreError, StoreResult};
pub use index_store::{IndexStore, SortedIndexStore};
pub use value_codec::ValueCodec;
pub use version_log::VersionLog;
