//! Bundles for moving Strata blocks between stores.
//!
//! A bundle is a single content-addressed block that carries other blocks
//! plus the metadata needed to use them once restored. [`GraphPacker`]
//! builds four kinds:
//!
//! - **version**: the full block closure of one graph root
//! - **random**: an arbitrary block list, used for missing-block transfer
//! - **complete**: a version store log and the closure of every version
//! - **fragment**: the blocks behind a bounded traversal of one root
//!
//! Restoring writes the carried blocks into a target store and returns the
//! roots needed to reopen them. See [`bundle`] for the wire format.

pub mod bundle;
pub mod error;
pub mod fragment;
pub mod packer;

pub use bundle::{Bundle, BundleHeader, BundleMode, FragmentDescriptor, FORMAT_VERSION, MAGIC};
pub use error::{PackError, PackResult};
pub use fragment::Fragment;
pub use packer::{GraphPacker, RestoredComplete, RestoredFragment, RestoredVersion};
