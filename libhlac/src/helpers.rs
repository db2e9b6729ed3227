//! Measurement helpers shared by tests and the conformance tool

use std::time::Duration;

use crate::core::types::uncompressed_bytes;
use crate::core::SampleBuffer;
#[cfg(feature = "reference-flac")]
use crate::core::{HlacError, HlacResult};

/// ratios, throughput and buffer comparison
pub struct CompressionHelpers;

impl CompressionHelpers {
    /// compressed / uncompressed, 1.0 when there is nothing to compress
    pub fn ratio(compressed_bytes: u64, uncompressed_bytes: f64) -> f64 {
        if uncompressed_bytes <= 0.0 {
            1.0
        } else {
            compressed_bytes as f64 / uncompressed_bytes
        }
    }

    /// ratio of a buffer encoded to `compressed_bytes` at `bit_depth`
    pub fn buffer_ratio(buffer: &SampleBuffer, bit_depth: u8, compressed_bytes: u64) -> f64 {
        let raw = uncompressed_bytes(
            buffer.num_samples() as u64,
            buffer.num_channels(),
            bit_depth,
        );
        Self::ratio(compressed_bytes, raw)
    }

    /// samples per second, 0 when no time was measured
    pub fn throughput(samples: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            samples as f64 / secs
        } else {
            0.0
        }
    }

    /// Same shape and bit-identical samples.
    pub fn buffers_equal(a: &SampleBuffer, b: &SampleBuffer) -> bool {
        Self::first_mismatch(a, b).is_none() && a.num_channels() == b.num_channels()
    }

    /// `(channel, index)` of the first differing sample, or of the first
    /// sample one buffer lacks
    pub fn first_mismatch(a: &SampleBuffer, b: &SampleBuffer) -> Option<(usize, usize)> {
        for (ch, (x, y)) in a.channels().iter().zip(b.channels()).enumerate() {
            if let Some(i) = x.iter().zip(y).position(|(p, q)| p.to_bits() != q.to_bits()) {
                return Some((ch, i));
            }
            if x.len() != y.len() {
                return Some((ch, x.len().min(y.len())));
            }
        }
        None
    }

    /// Ratio FLAC reaches on the same samples, same convention as ours.
    #[cfg(feature = "reference-flac")]
    pub fn reference_ratio(
        buffer: &SampleBuffer,
        sample_rate: u32,
        bit_depth: u8,
    ) -> HlacResult<f64> {
        use flacenc::component::BitRepr;
        use flacenc::error::Verify;

        if buffer.is_empty() {
            return Ok(1.0);
        }

        let channels = buffer.num_channels();
        let per_channel: Vec<Vec<i32>> = (0..channels)
            .map(|ch| buffer.channel_to_i32(ch, bit_depth))
            .collect();
        let mut interleaved = Vec::with_capacity(buffer.num_samples() * channels);
        for i in 0..buffer.num_samples() {
            for ch in &per_channel {
                interleaved.push(ch[i]);
            }
        }

        let config = flacenc::config::Encoder::default()
            .into_verified()
            .map_err(|(_, e)| HlacError::Configuration(format!("flac config: {:?}", e)))?;
        let source = flacenc::source::MemSource::from_samples(
            &interleaved,
            channels,
            bit_depth as usize,
            sample_rate as usize,
        );
        let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
            .map_err(|e| HlacError::Configuration(format!("flac encode: {:?}", e)))?;

        let bytes = stream.count_bits().div_ceil(8) as u64;
        Ok(Self::buffer_ratio(buffer, bit_depth, bytes))
    }
}
