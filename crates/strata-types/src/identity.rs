use std::fmt;

use serde::{Deserialize, Serialize};

use crate::link::Link;

/// Stable identity of a version store.
///
/// Derived once from a random 16-byte seed hashed through the link codec and
/// persisted with the store; every replica of the same graph carries the same
/// `StoreId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(Link);

impl StoreId {
    pub fn from_link(link: Link) -> Self {
        Self(link)
    }

    pub fn as_link(&self) -> &Link {
        &self.0
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("st:{}", self.0.short_hex())
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.short_id())
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of identity seeds for new stores.
pub trait IdSource: Send + Sync {
    /// Produce a fresh 16-byte seed.
    fn next_seed(&self) -> [u8; 16];
}

/// Random UUID v4 seeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_seed(&self) -> [u8; 16] {
        uuid::Uuid::new_v4().into_bytes()
    }
}

/// Always returns the same seed. Used by tests that need reproducible ids.
#[derive(Clone, Copy, Debug)]
pub struct FixedIdSource(pub [u8; 16]);

impl IdSource for FixedIdSource {
    fn next_seed(&self) -> [u8; 16] {
        self.0
    }
}
