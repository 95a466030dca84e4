//! Foundation types for Strata, a versioned content-addressed property graph.
//!
//! Every other Strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`Link`]: content hash of an immutable [`Block`]
//! - [`StoreId`]: stable identity shared by all replicas of one graph
//! - [`Vertex`], [`Edge`], [`Prop`], [`Index`]: offset-addressed graph records
//! - [`Version`]: a graph root plus its parent links and [`VersionDetails`]
//! - [`Clock`] and [`IdSource`]: injectable time and identity generation

pub mod clock;
pub mod error;
pub mod identity;
pub mod link;
pub mod record;
pub mod version;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::TypeError;
pub use identity::{FixedIdSource, IdSource, StoreId, UuidIdSource};
pub use link::{Block, Link};
pub use record::{
    Edge, EdgeRef, Index, IndexRef, IndexedValue, KeyTag, Prop, PropRef, PropValue, Status,
    TypeTag, ValueRef, Vertex, VertexRef,
};
pub use version::{MergeDetails, Version, VersionDetails};
