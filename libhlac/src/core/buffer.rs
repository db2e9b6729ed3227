//! planar sample buffer

use super::audio_constants::{f32_to_i32, quantize};
use super::error::{HlacError, HlacResult};

/// Planar float samples, one vector per channel, all the same length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// build from per-channel vectors, which must agree on length
    pub fn from_channels(channels: Vec<Vec<f32>>) -> HlacResult<Self> {
        if let Some(first) = channels.first() {
            let len = first.len();
            if let Some((idx, ch)) = channels.iter().enumerate().find(|(_, c)| c.len() != len) {
                return Err(HlacError::SizeMismatch(format!(
                    "channel {} has {} samples, channel 0 has {}",
                    idx,
                    ch.len(),
                    len
                )));
            }
        }
        Ok(SampleBuffer { channels })
    }

    /// deinterleave `samples` into `num_channels` channels
    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> HlacResult<Self> {
        if num_channels == 0 {
            return Err(HlacError::SizeMismatch(
                "interleaved data needs at least one channel".to_string(),
            ));
        }
        if samples.len() % num_channels != 0 {
            return Err(HlacError::SizeMismatch(format!(
                "{} interleaved samples do not split into {} channels",
                samples.len(),
                num_channels
            )));
        }

        let channels = (0..num_channels)
            .map(|ch| {
                samples
                    .iter()
                    .skip(ch)
                    .step_by(num_channels)
                    .copied()
                    .collect()
            })
            .collect();
        Ok(SampleBuffer { channels })
    }

    pub fn silence(num_channels: usize, num_samples: usize) -> Self {
        SampleBuffer {
            channels: vec![vec![0.0; num_samples]; num_channels],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn channel(&self, idx: usize) -> &[f32] {
        &self.channels[idx]
    }

    pub fn channel_mut(&mut self, idx: usize) -> &mut [f32] {
        &mut self.channels[idx]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let n = self.num_samples();
        let mut out = Vec::with_capacity(n * self.num_channels());
        for i in 0..n {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// copy of `[start, start + len)`, clipped to the buffer
    pub fn slice(&self, start: usize, len: usize) -> SampleBuffer {
        let n = self.num_samples();
        let start = start.min(n);
        let end = start.saturating_add(len).min(n);
        SampleBuffer {
            channels: self
                .channels
                .iter()
                .map(|c| c[start..end].to_vec())
                .collect(),
        }
    }

    /// add the samples of `other` to the end of every channel
    pub fn append(&mut self, other: &SampleBuffer) -> HlacResult<()> {
        if self.channels.is_empty() {
            self.channels = other.channels.clone();
            return Ok(());
        }
        if other.num_channels() != self.num_channels() {
            return Err(HlacError::SizeMismatch(format!(
                "cannot append {} channels to {}",
                other.num_channels(),
                self.num_channels()
            )));
        }
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }

    /// copy snapped to the grid of `bit_depth`
    pub fn quantized(&self, bit_depth: u8) -> SampleBuffer {
        SampleBuffer {
            channels: self
                .channels
                .iter()
                .map(|c| c.iter().map(|&s| quantize(s, bit_depth)).collect())
                .collect(),
        }
    }

    /// one channel in the integer domain
    pub fn channel_to_i32(&self, idx: usize, bit_depth: u8) -> Vec<i32> {
        self.channels[idx]
            .iter()
            .map(|&s| f32_to_i32(s, bit_depth))
            .collect()
    }
}
