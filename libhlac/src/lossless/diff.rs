//! Diff blocks
//!
//! Two layers: every `DIFF_STRIDE`th sample is an anchor stored at the
//! block's bit width, the samples in between are predicted by linear
//! interpolation between their anchors and only the residual is stored.
//! The residual layer always carries the full correction, so decoding is
//! exact.
//!
//! Payload layout:
//!
//! ```text
//! residual width   u8
//! anchors          ceil(n / 4) x bit_width bits
//! residuals        (n - anchors) x residual width bits
//! ```

use crate::core::bits::{bytes_for_bits, width_of, BitReader, BitWriter};
use crate::core::{BlockMode, CompressedBlock, HlacError, HlacResult, MAX_BIT_WIDTH};

use super::pcm;

/// distance between anchors
pub const DIFF_STRIDE: usize = 4;

#[inline]
pub fn anchor_count(sample_count: usize) -> usize {
    sample_count.div_ceil(DIFF_STRIDE)
}

/// interpolated value at `idx`, holding the last anchor past the end
#[inline]
fn predict(anchors: &[i32], idx: usize) -> i32 {
    let k = idx / DIFF_STRIDE;
    let j = (idx % DIFF_STRIDE) as i32;
    let a = anchors[k];
    match anchors.get(k + 1) {
        Some(&b) => a + (((b - a) * j) >> 2),
        None => a,
    }
}

/// payload bytes for the given header and residual width
pub fn payload_len(bit_width: u8, sample_count: usize, residual_width: u8) -> usize {
    let anchors = anchor_count(sample_count) as u64;
    let residuals = (sample_count as u64) - anchors;
    1 + bytes_for_bits(anchors * bit_width as u64 + residuals * residual_width as u64)
}

/// both layers of a block, ready to be packed
#[derive(Debug, Default)]
pub struct DiffLayers {
    pub anchors: Vec<i32>,
    pub residuals: Vec<i32>,
}

impl DiffLayers {
    /// split `samples` into anchors and interpolation residuals
    pub fn split(&mut self, samples: &[i32]) {
        self.anchors.clear();
        self.residuals.clear();
        self.anchors
            .extend(samples.iter().step_by(DIFF_STRIDE).copied());
        for (i, &s) in samples.iter().enumerate() {
            if i % DIFF_STRIDE != 0 {
                self.residuals.push(s - predict(&self.anchors, i));
            }
        }
    }

    pub fn anchor_width(&self) -> u8 {
        pcm::block_width(&self.anchors)
    }

    pub fn residual_width(&self) -> u8 {
        width_of(&self.residuals)
    }

    pub fn payload_len(&self) -> usize {
        payload_len(
            self.anchor_width(),
            self.anchors.len() + self.residuals.len(),
            self.residual_width(),
        )
    }
}

/// Pack the layers of `split`. The residual width must fit `MAX_BIT_WIDTH`.
pub fn encode(layers: &DiffLayers) -> CompressedBlock {
    let bit_width = layers.anchor_width();
    let residual_width = layers.residual_width();
    let sample_count = layers.anchors.len() + layers.residuals.len();

    let mut payload = Vec::with_capacity(payload_len(bit_width, sample_count, residual_width));
    payload.push(residual_width);

    let mut bits = BitWriter::with_capacity(payload.capacity());
    bits.write_all_signed(&layers.anchors, bit_width);
    bits.write_all_signed(&layers.residuals, residual_width);
    payload.extend_from_slice(&bits.into_bytes());

    CompressedBlock {
        mode: BlockMode::Diff,
        bit_width,
        sample_count: sample_count as u32,
        cycle_length: 0,
        payload,
    }
}

fn residual_width(payload: &[u8]) -> HlacResult<u8> {
    let w = *payload
        .first()
        .ok_or_else(|| HlacError::CorruptStream("empty diff payload".to_string()))?;
    if w > MAX_BIT_WIDTH {
        return Err(HlacError::CorruptStream(format!(
            "diff residual width {} above {}",
            w, MAX_BIT_WIDTH
        )));
    }
    Ok(w)
}

/// payload bytes implied by the header and the residual width byte
pub fn payload_len_from_prefix(
    bit_width: u8,
    sample_count: usize,
    payload: &[u8],
) -> HlacResult<usize> {
    Ok(payload_len(bit_width, sample_count, residual_width(payload)?))
}

pub fn decode(
    block: &CompressedBlock,
    anchors: &mut Vec<i32>,
    out: &mut Vec<i32>,
) -> HlacResult<()> {
    let n = block.sample_count as usize;
    let expected = payload_len_from_prefix(block.bit_width, n, &block.payload)?;
    if block.payload.len() != expected {
        return Err(HlacError::CorruptStream(format!(
            "diff payload is {} bytes, header implies {}",
            block.payload.len(),
            expected
        )));
    }
    let rw = block.payload[0];

    let mut bits = BitReader::new(&block.payload[1..]);
    anchors.clear();
    anchors.resize(anchor_count(n), 0);
    bits.read_into_signed(anchors, block.bit_width)?;

    out.reserve(n);
    for i in 0..n {
        if i % DIFF_STRIDE == 0 {
            out.push(anchors[i / DIFF_STRIDE]);
        } else {
            let r = bits.read_signed(rw)?;
            out.push(predict(anchors, i).wrapping_add(r));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_with_noise(len: usize) -> Vec<i32> {
        (0..len as i32)
            .map(|i| i * 40 - 10000 + (i * 7919 % 13) - 6)
            .collect()
    }

    #[test]
    fn test_split_and_roundtrip() {
        let samples = ramp_with_noise(1023);
        let mut layers = DiffLayers::default();
        layers.split(&samples);
        assert_eq!(layers.anchors.len(), 256);
        assert_eq!(layers.residuals.len(), 767);

        let block = encode(&layers);
        assert_eq!(block.payload.len(), layers.payload_len());

        let mut anchors = Vec::new();
        let mut out = Vec::new();
        decode(&block, &mut anchors, &mut out).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_smooth_signal_has_small_residuals() {
        let samples = ramp_with_noise(1024);
        let mut layers = DiffLayers::default();
        layers.split(&samples);
        assert!(layers.residual_width() <= 5);
        assert!(layers.payload_len() < pcm::encoded_size(&samples));
    }

    #[test]
    fn test_single_sample() {
        let mut layers = DiffLayers::default();
        layers.split(&[-3]);
        let block = encode(&layers);
        assert_eq!(block.payload[0], 0);

        let mut anchors = Vec::new();
        let mut out = Vec::new();
        decode(&block, &mut anchors, &mut out).unwrap();
        assert_eq!(out, vec![-3]);
    }

    #[test]
    fn test_bad_residual_width_rejected() {
        let mut layers = DiffLayers::default();
        layers.split(&ramp_with_noise(64));
        let mut block = encode(&layers);
        block.payload[0] = 30;
        let mut anchors = Vec::new();
        let mut out = Vec::new();
        assert!(decode(&block, &mut anchors, &mut out).is_err());
    }
}
