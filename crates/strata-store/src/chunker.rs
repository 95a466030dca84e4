use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Content-defined chunking function.
///
/// Returns the end offset of every chunk, in increasing order; the last
/// element equals `data.len()`. Empty input yields no chunks. The same input
/// always yields the same split points.
pub trait Chunker: Send + Sync {
    fn chunk(&self, data: &[u8]) -> Vec<usize>;
}

/// Chunk size bounds, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub min_size: usize,
    pub avg_size: usize,
    pub max_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: 512,
            avg_size: 1024,
            max_size: 4096,
        }
    }
}

impl ChunkerConfig {
    /// Small chunks, so modest test graphs span many blocks.
    pub fn small() -> Self {
        Self {
            min_size: 64,
            avg_size: 128,
            max_size: 512,
        }
    }

    fn validate(&self) -> StoreResult<()> {
        if self.min_size == 0 {
            return Err(StoreError::InvalidChunker("min_size must be positive".into()));
        }
        if !(self.min_size < self.avg_size && self.avg_size < self.max_size) {
            return Err(StoreError::InvalidChunker(format!(
                "expected min < avg < max, got {}/{}/{}",
                self.min_size, self.avg_size, self.max_size
            )));
        }
        if !self.avg_size.is_power_of_two() {
            return Err(StoreError::InvalidChunker(format!(
                "avg_size must be a power of two, got {}",
                self.avg_size
            )));
        }
        Ok(())
    }
}

/// Gear-hash content-defined chunker.
///
/// A boundary is declared where the rolling gear hash has its top
/// `log2(avg_size)` bits clear, searching only between `min_size` and
/// `max_size` bytes past the previous boundary.
#[derive(Clone)]
pub struct GearChunker {
    config: ChunkerConfig,
    mask: u64,
    gear: Box<[u64; 256]>,
}

impl GearChunker {
    pub fn new(config: ChunkerConfig) -> StoreResult<Self> {
        config.validate()?;
        let bits = config.avg_size.trailing_zeros();
        let mask = ((1u64 << bits) - 1) << (64 - bits);
        Ok(Self {
            config,
            mask,
            gear: Box::new(gear_table()),
        })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    fn next_boundary(&self, data: &[u8]) -> usize {
        let ChunkerConfig {
            min_size, max_size, ..
        } = self.config;
        if data.len() <= min_size {
            return data.len();
        }
        let end = data.len().min(max_size);
        let mut hash = 0u64;
        for (i, &byte) in data.iter().enumerate().take(end).skip(min_size) {
            hash = (hash << 1).wrapping_add(self.gear[byte as usize]);
            if hash & self.mask == 0 {
                return i + 1;
            }
        }
        end
    }
}

impl Default for GearChunker {
    fn default() -> Self {
        let config = ChunkerConfig::default();
        let bits = config.avg_size.trailing_zeros();
        Self {
            config,
            mask: ((1u64 << bits) - 1) << (64 - bits),
            gear: Box::new(gear_table()),
        }
    }
}

impl Chunker for GearChunker {
    fn chunk(&self, data: &[u8]) -> Vec<usize> {
        let mut cuts = Vec::new();
        let mut start = 0;
        while start < data.len() {
            start += self.next_boundary(&data[start..]);
            cuts.push(start);
        }
        cuts
    }
}

impl std::fmt::Debug for GearChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GearChunker")
            .field("config", &self.config)
            .finish()
    }
}

/// Fixed pseudo-random gear table (splitmix64 sequence).
fn gear_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state: u64 = 0x5354_5241_5441_0001;
    for slot in table.iter_mut() {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        *slot = z ^ (z >> 31);
    }
    table
}
