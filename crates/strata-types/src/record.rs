//! Graph records: vertices, edges, properties and secondary indices.
//!
//! Every record lives in its own partition and is addressed by its byte
//! offset there. Relations between records are offsets too, so the chains
//! hanging off a vertex (outgoing edges, properties, indices) are linked
//! lists threaded through the records themselves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::link::Link;

/// Type tag attached to a record by the caller.
pub type TypeTag = u32;

/// Property or index key tag.
pub type KeyTag = u32;

/// Lifecycle status of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Unknown = 0x0,
    Created = 0x1,
    Updated = 0x4,
    Deleted = 0x8,
}

impl Status {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self, TypeError> {
        match byte {
            0x0 => Ok(Self::Unknown),
            0x1 => Ok(Self::Created),
            0x4 => Ok(Self::Updated),
            0x8 => Ok(Self::Deleted),
            other => Err(TypeError::UnknownStatus(other)),
        }
    }
}

macro_rules! offset_ref {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub fn offset(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(offset: u64) -> Self {
                Self(offset)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "@{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

offset_ref!(
    /// Offset of a vertex in the vertex partition.
    VertexRef,
    "v"
);
offset_ref!(
    /// Offset of an edge in the edge partition.
    EdgeRef,
    "e"
);
offset_ref!(
    /// Offset of a property in the prop partition.
    PropRef,
    "p"
);
offset_ref!(
    /// Offset of an index record in the index partition.
    IndexRef,
    "i"
);

/// Location of an encoded property value in the value partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRef {
    pub offset: u64,
    pub length: u32,
}

/// Opaque property payload. Interpretation belongs to the caller.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PropValue(Vec<u8>);

impl PropValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) if self.0.len() <= 64 => write!(f, "PropValue({text:?})"),
            _ => write!(f, "PropValue({} bytes)", self.0.len()),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for PropValue {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for PropValue {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub status: Status,
    pub offset: VertexRef,
    pub kind: Option<TypeTag>,
    /// Head of the outgoing edge chain.
    pub next_edge: Option<EdgeRef>,
    /// Head of the property chain.
    pub next_prop: Option<PropRef>,
    /// Head of the index chain.
    pub next_index: Option<IndexRef>,
}

impl Vertex {
    pub fn new(offset: VertexRef, kind: Option<TypeTag>) -> Self {
        Self {
            status: Status::Created,
            offset,
            kind,
            next_edge: None,
            next_prop: None,
            next_index: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub status: Status,
    pub offset: EdgeRef,
    pub kind: Option<TypeTag>,
    pub source: VertexRef,
    pub target: VertexRef,
    /// Previous edge sharing the same source vertex.
    pub source_prev: Option<EdgeRef>,
    /// Next edge sharing the same source vertex.
    pub source_next: Option<EdgeRef>,
    /// Derived at commit time, never set by the edge-adding calls.
    pub target_prev: Option<EdgeRef>,
    /// Derived at commit time, never set by the edge-adding calls.
    pub target_next: Option<EdgeRef>,
    pub next_prop: Option<PropRef>,
}

impl Edge {
    pub fn new(offset: EdgeRef, source: VertexRef, target: VertexRef, kind: Option<TypeTag>) -> Self {
        Self {
            status: Status::Created,
            offset,
            kind,
            source,
            target,
            source_prev: None,
            source_next: None,
            target_prev: None,
            target_next: None,
            next_prop: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prop {
    pub status: Status,
    pub offset: PropRef,
    pub kind: Option<TypeTag>,
    pub key: KeyTag,
    pub value: PropValue,
    /// Where the encoded value is persisted; `None` until the value is
    /// written by a commit, and reset whenever the value changes.
    pub value_ref: Option<ValueRef>,
    pub next_prop: Option<PropRef>,
}

impl Prop {
    pub fn new(offset: PropRef, key: KeyTag, value: PropValue, kind: Option<TypeTag>) -> Self {
        Self {
            status: Status::Created,
            offset,
            kind,
            key,
            value,
            value_ref: None,
            next_prop: None,
        }
    }

    /// Replace the value, invalidating the persisted location.
    pub fn set_value(&mut self, value: PropValue) {
        self.value = value;
        self.value_ref = None;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub status: Status,
    pub offset: IndexRef,
    pub kind: Option<TypeTag>,
    pub key: KeyTag,
    /// Root of the secondary search structure.
    pub value: Link,
    pub next_index: Option<IndexRef>,
}

impl Index {
    pub fn new(offset: IndexRef, key: KeyTag, value: Link, kind: Option<TypeTag>) -> Self {
        Self {
            status: Status::Created,
            offset,
            kind,
            key,
            value,
            next_index: None,
        }
    }
}

/// A value collected for a secondary index, with the offset it points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedValue {
    pub value: PropValue,
    pub reference: u64,
}
