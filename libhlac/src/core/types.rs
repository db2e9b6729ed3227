//! common types for hlac codec

use std::collections::BTreeMap;

use super::error::{HlacError, HlacResult};

// constants

/// Magic number "HLAC"
pub const MAGIC: [u8; 4] = [0x48, 0x4c, 0x41, 0x43];

/// format version
pub const VERSION: u16 = 1;

/// widest value any block may carry (16-bit pcm plus one overflow bit)
pub const MAX_BIT_WIDTH: u8 = 17;

/// deepest source bit depth the codec accepts
pub const MAX_BIT_DEPTH: u8 = 16;

/// upper bound on samples in one block, guards allocations while decoding
pub const MAX_BLOCK_SAMPLES: u32 = 1 << 20;

/// window used when the block width is adaptive
pub const DEFAULT_BLOCK_WIDTH: usize = 4096;

/// window used by diff mode when no width is given
pub const DEFAULT_DIFF_BLOCK_WIDTH: usize = 1024;

/// smallest window adaptive pcm splitting goes down to
pub const MIN_ADAPTIVE_BLOCK_WIDTH: usize = 256;

/// samples per channel used to estimate the dc offset
pub const DC_LEAD_IN_SAMPLES: usize = 4096;

/// mode(1) + bit width(1) + samples(4) + cycle(4) + payload length(4)
pub const BLOCK_HEADER_SIZE: usize = 14;

/// tag byte that closes a stream
pub const END_MARKER_TAG: u8 = 0xFF;

/// tag(1) + total samples(8) + ratio(4)
pub const END_MARKER_SIZE: usize = 13;

/// placeholder for trailer fields that have not been patched yet
pub const UNPATCHED_TOTAL: u64 = u64::MAX;

// types

/// block mode
///
/// | Value | Mode     | Description                              |
/// |-------|----------|------------------------------------------|
/// | 0     | FixedPcm | samples packed at one width              |
/// | 1     | Delta    | first cycle raw, later cycles as deltas  |
/// | 2     | Diff     | anchor layer plus interpolation residual |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockMode {
    FixedPcm = 0,
    Delta = 1,
    Diff = 2,
}

impl BlockMode {
    pub const ALL: [BlockMode; 3] = [BlockMode::FixedPcm, BlockMode::Delta, BlockMode::Diff];

    pub fn name(self) -> &'static str {
        match self {
            BlockMode::FixedPcm => "pcm",
            BlockMode::Delta => "delta",
            BlockMode::Diff => "diff",
        }
    }
}

impl TryFrom<u8> for BlockMode {
    type Error = HlacError;

    fn try_from(v: u8) -> HlacResult<Self> {
        match v {
            0 => Ok(BlockMode::FixedPcm),
            1 => Ok(BlockMode::Delta),
            2 => Ok(BlockMode::Diff),
            other => Err(HlacError::UnsupportedMode(other)),
        }
    }
}

// data structures

/// one channel's window of samples after encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    pub mode: BlockMode,
    pub bit_width: u8,
    pub sample_count: u32,
    /// delta only, 0 otherwise
    pub cycle_length: u32,
    pub payload: Vec<u8>,
}

impl CompressedBlock {
    /// byte size of this block once framed
    pub fn framed_size(&self) -> usize {
        BLOCK_HEADER_SIZE + self.payload.len()
    }

    /// check the header fields against the format limits
    pub fn validate_header(&self) -> HlacResult<()> {
        validate_block_header(self.mode, self.bit_width, self.sample_count, self.cycle_length)
    }
}

/// header checks shared by the decoder and the block scanner
pub fn validate_block_header(
    mode: BlockMode,
    bit_width: u8,
    sample_count: u32,
    cycle_length: u32,
) -> HlacResult<()> {
    if bit_width == 0 || bit_width > MAX_BIT_WIDTH {
        return Err(HlacError::CorruptStream(format!(
            "block bit width {} outside 1..={}",
            bit_width, MAX_BIT_WIDTH
        )));
    }

    if sample_count == 0 || sample_count > MAX_BLOCK_SAMPLES {
        return Err(HlacError::CorruptStream(format!(
            "block sample count {} outside 1..={}",
            sample_count, MAX_BLOCK_SAMPLES
        )));
    }

    match mode {
        BlockMode::Delta if cycle_length == 0 || cycle_length > sample_count => {
            Err(HlacError::CorruptStream(format!(
                "delta cycle length {} invalid for {} samples",
                cycle_length, sample_count
            )))
        }
        BlockMode::FixedPcm | BlockMode::Diff if cycle_length != 0 => Err(
            HlacError::CorruptStream(format!("{} block carries a cycle length", mode.name())),
        ),
        _ => Ok(()),
    }
}

/// totals written when a stream is closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trailer {
    pub total_samples: u64,
    pub compression_ratio: f32,
}

impl Trailer {
    pub fn placeholder() -> Self {
        Trailer {
            total_samples: UNPATCHED_TOTAL,
            compression_ratio: 0.0,
        }
    }

    /// false while the writer has not filled it in, or when the bytes are garbage
    pub fn is_valid(&self) -> bool {
        self.total_samples != UNPATCHED_TOTAL
            && self.compression_ratio.is_finite()
            && self.compression_ratio >= 0.0
    }
}

/// format description handed to the writer
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: f64,
    pub num_channels: u16,
    pub bit_depth: u8,
    pub metadata: BTreeMap<String, String>,
}

impl StreamInfo {
    pub fn new(sample_rate: f64, num_channels: u16, bit_depth: u8) -> Self {
        StreamInfo {
            sample_rate,
            num_channels,
            bit_depth,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> HlacResult<()> {
        if self.num_channels == 0 {
            return Err(HlacError::Configuration(
                "stream needs at least one channel".to_string(),
            ));
        }
        if self.bit_depth == 0 || self.bit_depth > MAX_BIT_DEPTH {
            return Err(HlacError::Configuration(format!(
                "bit depth {} outside 1..={}",
                self.bit_depth, MAX_BIT_DEPTH
            )));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(HlacError::Configuration(format!(
                "invalid sample rate {}",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// hlac stream header
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    pub version: u16,
    pub sample_rate: f64,
    pub num_channels: u16,
    pub bit_depth: u8,
    /// per channel, present when dc removal was on
    pub dc_offsets: Option<Vec<i32>>,
    pub metadata: BTreeMap<String, String>,
    pub trailer: Trailer,
}

impl StreamHeader {
    pub fn new(info: &StreamInfo, dc_offsets: Option<Vec<i32>>) -> Self {
        StreamHeader {
            version: VERSION,
            sample_rate: info.sample_rate,
            num_channels: info.num_channels,
            bit_depth: info.bit_depth,
            dc_offsets,
            metadata: info.metadata.clone(),
            trailer: Trailer::placeholder(),
        }
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            sample_rate: self.sample_rate,
            num_channels: self.num_channels,
            bit_depth: self.bit_depth,
            metadata: self.metadata.clone(),
        }
    }

    /// uncompressed size of n samples per channel
    pub fn uncompressed_bytes(&self, samples: u64) -> f64 {
        uncompressed_bytes(samples, self.num_channels as usize, self.bit_depth)
    }
}

/// bytes n samples per channel take as plain pcm at this depth
pub fn uncompressed_bytes(samples: u64, channels: usize, bit_depth: u8) -> f64 {
    samples as f64 * channels as f64 * bit_depth as f64 / 8.0
}
