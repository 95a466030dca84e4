//! Bundle wire format.
//!
//! ```text
//! "STRB" | u32 BE format | mode u8 | u32 BE header len | bincode header
//!        | u32 BE entry count | entries... | blake3(everything before)
//! entry: link (32) | varint raw len | varint compressed len | u32 BE crc32 | zstd payload
//! ```
//!
//! The crc covers the compressed payload. Each restored block is checked
//! against its link with the bundle's link codec.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_crypto::LinkCodec;
use strata_types::{Block, Link, VertexRef};

use crate::error::{PackError, PackResult};

pub const MAGIC: &[u8; 4] = b"STRB";
pub const FORMAT_VERSION: u32 = 1;

const COMPRESSION_LEVEL: i32 = 3;
const CHECKSUM_LEN: usize = 32;
const LINK_LEN: usize = 32;

/// Which kind of bundle a header describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BundleMode {
    Version = 1,
    Random = 2,
    Complete = 3,
    Fragment = 4,
}

impl BundleMode {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Version),
            2 => Some(Self::Random),
            3 => Some(Self::Complete),
            4 => Some(Self::Fragment),
            _ => None,
        }
    }
}

impl fmt::Display for BundleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Version => "version",
            Self::Random => "random",
            Self::Complete => "complete",
            Self::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// A bounded subgraph: `count` vertices from `start`, followed along
/// outgoing edges to `depth`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    pub root: Link,
    pub start: VertexRef,
    pub count: u64,
    pub depth: u32,
}

/// Structural metadata carried ahead of the blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleHeader {
    /// Closure of one graph root.
    Version { root: Link },
    /// Arbitrary blocks with no structure.
    Random,
    /// A version store root and every version root, most recent first.
    Complete {
        version_store_root: Link,
        version_roots: Vec<Link>,
    },
    Fragment(FragmentDescriptor),
}

impl BundleHeader {
    pub fn mode(&self) -> BundleMode {
        match self {
            Self::Version { .. } => BundleMode::Version,
            Self::Random => BundleMode::Random,
            Self::Complete { .. } => BundleMode::Complete,
            Self::Fragment(_) => BundleMode::Fragment,
        }
    }
}

/// A header plus the blocks it describes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    pub header: BundleHeader,
    pub blocks: Vec<Block>,
}

impl Bundle {
    pub fn new(header: BundleHeader, blocks: Vec<Block>) -> Self {
        Self { header, blocks }
    }

    pub fn mode(&self) -> BundleMode {
        self.header.mode()
    }

    /// Total uncompressed size of the carried blocks.
    pub fn payload_size(&self) -> u64 {
        self.blocks.iter().map(|b| b.bytes.len() as u64).sum()
    }

    pub fn encode(&self) -> PackResult<Vec<u8>> {
        let header = bincode::serialize(&self.header)
            .map_err(|e| PackError::Serialization(e.to_string()))?;

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        out.push(self.mode().to_byte());
        out.extend_from_slice(&(header.len() as u32).to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&(self.blocks.len() as u32).to_be_bytes());

        for block in &self.blocks {
            let compressed = zstd::encode_all(block.bytes.as_slice(), COMPRESSION_LEVEL)
                .map_err(|e| PackError::Compression(e.to_string()))?;
            out.extend_from_slice(block.link.as_bytes());
            encode_varint(&mut out, block.bytes.len() as u64);
            encode_varint(&mut out, compressed.len() as u64);
            out.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
            out.extend_from_slice(&compressed);
        }

        let checksum = *blake3::hash(&out).as_bytes();
        out.extend_from_slice(&checksum);
        Ok(out)
    }

    /// Encode and wrap as a content-addressed block.
    pub fn to_block(&self, codec: &dyn LinkCodec) -> PackResult<Block> {
        Ok(codec.block(self.encode()?))
    }

    pub fn decode(data: &[u8], codec: &dyn LinkCodec) -> PackResult<Self> {
        if data.len() < MAGIC.len() + 4 + 1 + 4 + 4 + CHECKSUM_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "bundle too short".into(),
            });
        }
        if &data[0..4] != MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }

        let (body, trailer) = data.split_at(data.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != trailer {
            return Err(PackError::ChecksumMismatch);
        }

        let mut input = Input::new(body);
        input.skip(MAGIC.len())?;
        let version = input.u32()?;
        if version != FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mode_offset = input.pos as u64;
        let mode_byte = input.take(1)?[0];
        let mode = BundleMode::from_byte(mode_byte).ok_or_else(|| PackError::CorruptEntry {
            offset: mode_offset,
            reason: format!("unknown mode byte: {mode_byte}"),
        })?;
        let header_len = input.u32()? as usize;
        let header: BundleHeader = bincode::deserialize(input.take(header_len)?)
            .map_err(|e| PackError::Serialization(e.to_string()))?;
        if header.mode() != mode {
            return Err(PackError::CorruptEntry {
                offset: mode_offset,
                reason: format!("mode byte says {mode}, header is {}", header.mode()),
            });
        }

        let count = input.u32()?;
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            blocks.push(input.entry(codec)?);
        }
        if !input.is_empty() {
            return Err(PackError::CorruptEntry {
                offset: input.pos as u64,
                reason: "trailing bytes after last entry".into(),
            });
        }
        Ok(Self { header, blocks })
    }
}

struct Input<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, len: usize) -> PackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| PackError::CorruptEntry {
                offset: self.pos as u64,
                reason: format!("truncated: wanted {len} bytes"),
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> PackResult<()> {
        self.take(len).map(|_| ())
    }

    fn u32(&mut self) -> PackResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn varint(&mut self) -> PackResult<u64> {
        let (value, consumed) = decode_varint(&self.data[self.pos..], self.pos as u64)?;
        self.pos += consumed;
        Ok(value)
    }

    fn entry(&mut self, codec: &dyn LinkCodec) -> PackResult<Block> {
        let offset = self.pos as u64;
        let link = Link::from_slice(self.take(LINK_LEN)?).map_err(|e| PackError::CorruptEntry {
            offset,
            reason: e.to_string(),
        })?;
        let raw_len = self.varint()?;
        let compressed_len = self.varint()? as usize;
        let crc = self.u32()?;
        let compressed = self.take(compressed_len)?;

        if crc32fast::hash(compressed) != crc {
            return Err(PackError::CrcMismatch { link });
        }
        let bytes =
            zstd::decode_all(compressed).map_err(|e| PackError::Decompression(e.to_string()))?;
        if bytes.len() as u64 != raw_len {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("size mismatch: expected {raw_len}, got {}", bytes.len()),
            });
        }
        let block = Block::new(link, bytes);
        if !codec.verify(&block) {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("content does not hash to {}", link.short_hex()),
            });
        }
        Ok(block)
    }
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
/// `offset` is only used for error reporting.
pub(crate) fn decode_varint(data: &[u8], offset: u64) -> PackResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return Err(PackError::CorruptEntry {
                offset,
                reason: "varint overflow".into(),
            });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(PackError::CorruptEntry {
        offset,
        reason: "truncated varint".into(),
    })
}
