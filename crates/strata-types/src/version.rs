use serde::{Deserialize, Serialize};

use crate::link::Link;

/// Descriptive metadata recorded with a version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub email: Option<String>,
    pub public_key: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Present on merge versions only.
    pub merge: Option<Box<MergeDetails>>,
}

impl VersionDetails {
    pub fn at(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

/// Details of both versions that contributed to a merge, copied verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDetails {
    pub parent: VersionDetails,
    pub merge_parent: VersionDetails,
}

/// One immutable snapshot of a graph plus its lineage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub root: Link,
    pub parent: Option<Link>,
    pub merge_parent: Option<Link>,
    pub details: VersionDetails,
}

impl Version {
    pub fn new(root: Link, parent: Option<Link>, details: VersionDetails) -> Self {
        Self {
            root,
            parent,
            merge_parent: None,
            details,
        }
    }

    /// Returns `true` for two-parent versions produced by a merge.
    pub fn is_merge(&self) -> bool {
        self.merge_parent.is_some()
    }

    /// Parent links in order: `parent` first, then `merge_parent`.
    pub fn parents(&self) -> impl Iterator<Item = &Link> {
        self.parent.iter().chain(self.merge_parent.iter())
    }
}
