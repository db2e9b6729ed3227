//! Fixed-width pcm blocks
//!
//! Every sample of the block is packed at the width of the largest one. This
//! is the fallback for the other modes and the baseline for ratios.

use crate::core::bits::{bytes_for_bits, width_of, BitReader, BitWriter};
use crate::core::{BlockMode, CompressedBlock, HlacError, HlacResult};

/// header width for a set of samples, never below 1
pub fn block_width(samples: &[i32]) -> u8 {
    width_of(samples).max(1)
}

/// payload bytes of a pcm block
pub fn payload_len(bit_width: u8, sample_count: usize) -> usize {
    bytes_for_bits(bit_width as u64 * sample_count as u64)
}

/// payload bytes `encode` would produce, without packing anything
pub fn encoded_size(samples: &[i32]) -> usize {
    payload_len(block_width(samples), samples.len())
}

pub fn encode(samples: &[i32]) -> CompressedBlock {
    let bit_width = block_width(samples);
    let mut bits = BitWriter::with_capacity(payload_len(bit_width, samples.len()));
    bits.write_all_signed(samples, bit_width);

    CompressedBlock {
        mode: BlockMode::FixedPcm,
        bit_width,
        sample_count: samples.len() as u32,
        cycle_length: 0,
        payload: bits.into_bytes(),
    }
}

pub fn decode(block: &CompressedBlock, out: &mut Vec<i32>) -> HlacResult<()> {
    let n = block.sample_count as usize;
    let expected = payload_len(block.bit_width, n);
    if block.payload.len() != expected {
        return Err(HlacError::CorruptStream(format!(
            "pcm payload is {} bytes, header implies {}",
            block.payload.len(),
            expected
        )));
    }

    let start = out.len();
    out.resize(start + n, 0);
    let mut bits = BitReader::new(&block.payload);
    bits.read_into_signed(&mut out[start..], block.bit_width)
}
