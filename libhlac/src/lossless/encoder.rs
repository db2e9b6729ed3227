use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::types::uncompressed_bytes;
use crate::core::{
    f32_to_i32, BlockMode, CompressedBlock, CompressionOptions, EncodingStrategy, HlacError,
    HlacResult, SampleBuffer, BLOCK_HEADER_SIZE, DC_LEAD_IN_SAMPLES, MAX_BIT_DEPTH,
    MIN_ADAPTIVE_BLOCK_WIDTH,
};

use super::codec::BlockCodec;
use super::pcm;

/// where an encoding session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// nothing seen yet
    Idle,
    /// dc offsets estimated, no block emitted yet
    Priming,
    /// emitting block groups
    Encoding,
    /// flushed, only `reset` gets out of here
    Flushed,
}

/// totals of one encoding session
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSummary {
    /// samples per channel
    pub total_samples: u64,
    /// framed block bytes
    pub compressed_bytes: u64,
    pub uncompressed_bytes: f64,
    /// compressed / uncompressed, 1.0 for an empty stream
    pub compression_ratio: f64,
    pub pcm_blocks: u64,
    pub delta_blocks: u64,
    pub diff_blocks: u64,
    pub elapsed: Duration,
}

impl EncodeSummary {
    pub fn total_blocks(&self) -> u64 {
        self.pcm_blocks + self.delta_blocks + self.diff_blocks
    }
}

/// blocks of every channel covering the same window, channel-major
pub type BlockGroup = Vec<CompressedBlock>;

/// Block encoder
///
/// Takes planar float buffers of any length, holds back what does not fill a
/// window and emits one block group per window. `flush` emits the remainder
/// and closes the session.
pub struct Encoder {
    num_channels: usize,
    bit_depth: u8,
    options: CompressionOptions,
    codec: BlockCodec,
    state: EncoderState,
    /// quantized, dc removed samples waiting for a full window
    pending: Vec<Vec<i32>>,
    dc_offsets: Option<Vec<i32>>,
    /// cycle length of the first block, when reuse is on
    first_cycle_length: Option<usize>,
    total_samples: u64,
    compressed_bytes: u64,
    block_counts: [u64; 3],
    elapsed: Duration,
}

impl Encoder {
    pub fn new(
        num_channels: usize,
        bit_depth: u8,
        options: CompressionOptions,
    ) -> HlacResult<Self> {
        options.validate()?;
        if num_channels == 0 || num_channels > u16::MAX as usize {
            return Err(HlacError::Configuration(format!(
                "invalid channel count {}",
                num_channels
            )));
        }
        if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH {
            return Err(HlacError::Configuration(format!(
                "bit depth {} outside 1..={}",
                bit_depth, MAX_BIT_DEPTH
            )));
        }

        Ok(Encoder {
            num_channels,
            bit_depth,
            options,
            codec: BlockCodec::new(),
            state: EncoderState::Idle,
            pending: vec![Vec::new(); num_channels],
            dc_offsets: None,
            first_cycle_length: None,
            total_samples: 0,
            compressed_bytes: 0,
            block_counts: [0; 3],
            elapsed: Duration::ZERO,
        })
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn options(&self) -> &CompressionOptions {
        &self.options
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    /// offsets subtracted per channel, known once primed
    pub fn dc_offsets(&self) -> Option<&[i32]> {
        self.dc_offsets.as_deref()
    }

    /// Estimate dc offsets from the first input and leave `Idle`.
    ///
    /// Called by the first `encode`; a writer calls it itself to learn the
    /// offsets before it writes the header. Does nothing once primed.
    pub fn prime(&mut self, first: &SampleBuffer) -> HlacResult<()> {
        match self.state {
            EncoderState::Idle => {}
            EncoderState::Flushed => return Err(HlacError::SessionClosed),
            _ => return Ok(()),
        }
        self.check_channels(first)?;

        if self.options.remove_dc_offset {
            let offsets: Vec<i32> = first
                .channels()
                .iter()
                .map(|ch| {
                    let lead = &ch[..ch.len().min(DC_LEAD_IN_SAMPLES)];
                    dc_offset(lead, self.bit_depth)
                })
                .collect();
            debug!(?offsets, "estimated dc offsets");
            self.dc_offsets = Some(offsets);
        }

        self.state = EncoderState::Priming;
        Ok(())
    }

    /// Encode a buffer, returning every block group it completed.
    pub fn encode(&mut self, buffer: &SampleBuffer) -> HlacResult<Vec<BlockGroup>> {
        if self.state == EncoderState::Flushed {
            return Err(HlacError::SessionClosed);
        }
        self.check_channels(buffer)?;
        self.prime(buffer)?;

        let started = Instant::now();
        let depth = self.bit_depth;
        for (ch, samples) in buffer.channels().iter().enumerate() {
            let dc = self.dc_for(ch);
            self.pending[ch].extend(samples.iter().map(|&s| f32_to_i32(s, depth) - dc));
        }

        let window = self.options.window_width();
        let mut groups = Vec::new();
        while self.pending[0].len() >= window {
            self.encode_window(window, &mut groups);
        }
        self.elapsed += started.elapsed();

        Ok(groups)
    }

    /// Emit what is still pending, with its true shorter length, and close the
    /// session.
    pub fn flush(&mut self) -> HlacResult<Vec<BlockGroup>> {
        if self.state == EncoderState::Flushed {
            return Err(HlacError::SessionClosed);
        }
        if self.state == EncoderState::Idle {
            self.prime(&SampleBuffer::silence(self.num_channels, 0))?;
        }

        let started = Instant::now();
        let mut groups = Vec::new();
        let remaining = self.pending[0].len();
        if remaining > 0 {
            self.encode_window(remaining, &mut groups);
        }
        self.elapsed += started.elapsed();
        self.state = EncoderState::Flushed;

        debug!(
            total_samples = self.total_samples,
            compressed_bytes = self.compressed_bytes,
            ratio = self.compression_ratio(),
            "encoder flushed"
        );
        Ok(groups)
    }

    /// Back to `Idle`, dropping pending samples and every total.
    pub fn reset(&mut self) {
        self.state = EncoderState::Idle;
        for ch in &mut self.pending {
            ch.clear();
        }
        self.dc_offsets = None;
        self.first_cycle_length = None;
        self.total_samples = 0;
        self.compressed_bytes = 0;
        self.block_counts = [0; 3];
        self.elapsed = Duration::ZERO;
    }

    /// samples per channel emitted so far
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// framed bytes emitted so far
    pub fn compressed_bytes(&self) -> u64 {
        self.compressed_bytes
    }

    pub fn uncompressed_bytes(&self) -> f64 {
        uncompressed_bytes(self.total_samples, self.num_channels, self.bit_depth)
    }

    /// compressed / uncompressed bytes, 1.0 before anything was emitted
    pub fn compression_ratio(&self) -> f64 {
        let uncompressed = self.uncompressed_bytes();
        if uncompressed <= 0.0 {
            1.0
        } else {
            self.compressed_bytes as f64 / uncompressed
        }
    }

    pub fn summary(&self) -> EncodeSummary {
        EncodeSummary {
            total_samples: self.total_samples,
            compressed_bytes: self.compressed_bytes,
            uncompressed_bytes: self.uncompressed_bytes(),
            compression_ratio: self.compression_ratio(),
            pcm_blocks: self.block_counts[BlockMode::FixedPcm as usize],
            delta_blocks: self.block_counts[BlockMode::Delta as usize],
            diff_blocks: self.block_counts[BlockMode::Diff as usize],
            elapsed: self.elapsed,
        }
    }

    fn check_channels(&self, buffer: &SampleBuffer) -> HlacResult<()> {
        if buffer.num_channels() != self.num_channels {
            return Err(HlacError::SizeMismatch(format!(
                "buffer has {} channels, encoder expects {}",
                buffer.num_channels(),
                self.num_channels
            )));
        }
        Ok(())
    }

    fn dc_for(&self, ch: usize) -> i32 {
        self.dc_offsets.as_ref().map_or(0, |dc| dc[ch])
    }

    /// Take `len` pending samples of every channel and encode them.
    fn encode_window(&mut self, len: usize, groups: &mut Vec<BlockGroup>) {
        let window: Vec<Vec<i32>> = self
            .pending
            .iter_mut()
            .map(|ch| ch.drain(..len).collect())
            .collect();

        let splits = if self.options.strategy() == EncodingStrategy::FixedPcm
            && self.options.is_adaptive()
        {
            adaptive_splits(&window, 0, len).1
        } else {
            vec![(0, len)]
        };

        for (start, count) in splits {
            let group: BlockGroup = window
                .iter()
                .map(|ch| self.encode_block(&ch[start..start + count]))
                .collect();

            for block in &group {
                self.compressed_bytes += block.framed_size() as u64;
                self.block_counts[block.mode as usize] += 1;
            }
            self.total_samples += count as u64;
            self.state = EncoderState::Encoding;
            groups.push(group);
        }
    }

    fn encode_block(&mut self, samples: &[i32]) -> CompressedBlock {
        match self.options.strategy() {
            EncodingStrategy::FixedPcm => self.codec.encode_pcm(samples),
            EncodingStrategy::Delta => {
                let cycle_length = match self.first_cycle_length {
                    Some(l) => l.min(samples.len()),
                    None => {
                        let l = self.codec.detect_cycle_length(samples);
                        if self.options.reuse_first_cycle_length_for_block {
                            debug!(cycle_length = l, "reusing first cycle length");
                            self.first_cycle_length = Some(l);
                        }
                        l
                    }
                };
                self.codec
                    .encode_delta(samples, cycle_length, self.options.delta_cycle_threshold)
            }
            EncodingStrategy::Diff => self
                .codec
                .encode_diff(samples, self.options.bit_rate_for_whole_block),
        }
    }
}

/// rounded mean of the quantized samples, 0 when there are none
fn dc_offset(samples: &[f32], bit_depth: u8) -> i32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: i64 = samples
        .iter()
        .map(|&s| f32_to_i32(s, bit_depth) as i64)
        .sum();
    (sum as f64 / samples.len() as f64).round() as i32
}

/// Framed pcm cost of `[start, start + len)` over every channel.
fn pcm_cost(window: &[Vec<i32>], start: usize, len: usize) -> usize {
    window
        .iter()
        .map(|ch| BLOCK_HEADER_SIZE + pcm::encoded_size(&ch[start..start + len]))
        .sum()
}

/// Halve a window while the halves are cheaper than the whole.
///
/// Returns the cost and the `(start, len)` pieces, the same for every
/// channel.
fn adaptive_splits(window: &[Vec<i32>], start: usize, len: usize) -> (usize, Vec<(usize, usize)>) {
    let whole = pcm_cost(window, start, len);
    let half = len / 2;
    if half < MIN_ADAPTIVE_BLOCK_WIDTH {
        return (whole, vec![(start, len)]);
    }

    let (left_cost, mut left) = adaptive_splits(window, start, half);
    let (right_cost, right) = adaptive_splits(window, start + half, len - half);
    if left_cost + right_cost < whole {
        left.extend(right);
        (left_cost + right_cost, left)
    } else {
        (whole, vec![(start, len)])
    }
}
