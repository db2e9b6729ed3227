use std::time::{Duration, Instant};

use crate::core::audio_constants::{i32_to_f32, max_for_depth, min_for_depth};
use crate::core::{
    CompressedBlock, HlacError, HlacResult, SampleBuffer, StreamHeader, MAX_BIT_DEPTH,
};

use super::codec::BlockCodec;

/// where a decoding session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// no block decoded yet
    Idle,
    /// decoding block groups
    Decoding,
    /// stream finished
    Done,
}

/// Block decoder
///
/// Turns block groups back into planar floats and keeps track of how fast
/// it does so.
pub struct Decoder {
    num_channels: usize,
    bit_depth: u8,
    sample_rate: f64,
    dc_offsets: Vec<i32>,
    codec: BlockCodec,
    state: DecoderState,
    scratch: Vec<i32>,
    samples_decoded: u64,
    elapsed: Duration,
}

impl Decoder {
    pub fn new(
        num_channels: usize,
        bit_depth: u8,
        sample_rate: f64,
        dc_offsets: Option<Vec<i32>>,
    ) -> HlacResult<Self> {
        if num_channels == 0 {
            return Err(HlacError::Configuration(
                "decoder needs at least one channel".to_string(),
            ));
        }
        if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH {
            return Err(HlacError::Configuration(format!(
                "bit depth {} outside 1..={}",
                bit_depth, MAX_BIT_DEPTH
            )));
        }
        let dc_offsets = dc_offsets.unwrap_or_else(|| vec![0; num_channels]);
        if dc_offsets.len() != num_channels {
            return Err(HlacError::SizeMismatch(format!(
                "{} dc offsets for {} channels",
                dc_offsets.len(),
                num_channels
            )));
        }

        Ok(Decoder {
            num_channels,
            bit_depth,
            sample_rate,
            dc_offsets,
            codec: BlockCodec::new(),
            state: DecoderState::Idle,
            scratch: Vec::new(),
            samples_decoded: 0,
            elapsed: Duration::ZERO,
        })
    }

    /// decoder for the stream described by `header`
    pub fn from_header(header: &StreamHeader) -> HlacResult<Self> {
        Self::new(
            header.num_channels as usize,
            header.bit_depth,
            header.sample_rate,
            header.dc_offsets.clone(),
        )
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Decode one channel's block, dc offset re-applied.
    pub fn decode_block(
        &mut self,
        block: &CompressedBlock,
        channel: usize,
    ) -> HlacResult<Vec<f32>> {
        let started = Instant::now();
        let samples = self.decode_channel(block, channel)?;
        self.elapsed += started.elapsed();
        Ok(samples)
    }

    /// Decode a block group, one block per channel, all the same length.
    pub fn decode_group(&mut self, group: &[CompressedBlock]) -> HlacResult<SampleBuffer> {
        if self.state == DecoderState::Done {
            return Err(HlacError::SessionClosed);
        }
        if group.len() != self.num_channels {
            return Err(HlacError::CorruptStream(format!(
                "block group has {} blocks for {} channels",
                group.len(),
                self.num_channels
            )));
        }
        let len = group[0].sample_count;
        if group.iter().any(|b| b.sample_count != len) {
            return Err(HlacError::CorruptStream(
                "blocks of one group disagree on sample count".to_string(),
            ));
        }

        let started = Instant::now();
        let mut channels = Vec::with_capacity(self.num_channels);
        for (ch, block) in group.iter().enumerate() {
            channels.push(self.decode_channel(block, ch)?);
        }
        self.elapsed += started.elapsed();
        self.samples_decoded += len as u64;
        self.state = DecoderState::Decoding;

        SampleBuffer::from_channels(channels)
    }

    /// no more groups follow
    pub fn finish(&mut self) {
        self.state = DecoderState::Done;
    }

    /// Start another pass over the stream, keeping the timing totals.
    pub fn rewind(&mut self) {
        self.state = DecoderState::Idle;
    }

    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.samples_decoded = 0;
        self.elapsed = Duration::ZERO;
    }

    /// samples per channel decoded through `decode_group`
    pub fn samples_decoded(&self) -> u64 {
        self.samples_decoded
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// samples per channel per second of decoding
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.samples_decoded as f64 / secs
        } else {
            0.0
        }
    }

    /// seconds of audio decoded per second of decoding
    pub fn realtime_factor(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.throughput() / self.sample_rate
        } else {
            0.0
        }
    }

    fn decode_channel(&mut self, block: &CompressedBlock, channel: usize) -> HlacResult<Vec<f32>> {
        let dc = *self.dc_offsets.get(channel).ok_or_else(|| {
            HlacError::CorruptStream(format!("block for missing channel {}", channel))
        })?;

        self.scratch.clear();
        self.codec.decode(block, &mut self.scratch)?;

        let lo = min_for_depth(self.bit_depth);
        let hi = max_for_depth(self.bit_depth);
        let mut out = Vec::with_capacity(self.scratch.len());
        for &v in &self.scratch {
            let s = v.wrapping_add(dc);
            if s < lo || s > hi {
                return Err(HlacError::CorruptStream(format!(
                    "decoded sample {} outside {}-bit range",
                    s, self.bit_depth
                )));
            }
            out.push(i32_to_f32(s, self.bit_depth));
        }
        Ok(out)
    }
}
