//! Cycle delta blocks
//!
//! A block is cut into cycles of `cycle_length` samples. The first cycle is
//! stored raw at the block's bit width; every later cycle carries a 5 bit
//! width followed by its differences against the previous cycle.
//!
//! Payload layout (MSB-first bits, zero padded to a byte):
//!
//! ```text
//! first cycle   cycle_length x bit_width
//! per cycle     width:5, n x width
//! ```

use crate::core::bits::{range_width, width_of, BitReader, BitWriter};
use crate::core::{BlockMode, CompressedBlock, HlacError, HlacResult, MAX_BIT_WIDTH};

use super::pcm;

/// shortest cycle the detector tries
pub const MIN_CYCLE_LENGTH: usize = 2;

/// longest cycle the detector tries
pub const MAX_CYCLE_LENGTH: usize = 1024;

/// bits of the per-cycle width sub-header
pub const CYCLE_WIDTH_BITS: u8 = 5;

/// what the encoder needs to decide between delta and pcm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// largest |difference| between a sample and the one a cycle earlier
    pub max_abs_diff: u32,
    /// widest per-cycle width
    pub max_width: u8,
    /// exact payload size in bits
    pub payload_bits: u64,
}

/// Exact payload bits for `cycle_length`, or None once `limit` is reached.
fn cost_in_bits(samples: &[i32], cycle_length: usize, limit: u64) -> Option<u64> {
    let n = samples.len();
    let l = cycle_length.min(n);
    let mut bits = pcm::block_width(&samples[..l]) as u64 * l as u64;
    let mut start = l;

    while start < n {
        if bits >= limit {
            return None;
        }
        let end = (start + l).min(n);
        let mut lo = 0i32;
        let mut hi = 0i32;
        for i in start..end {
            let d = samples[i] - samples[i - l];
            lo = lo.min(d);
            hi = hi.max(d);
        }
        bits += CYCLE_WIDTH_BITS as u64 + range_width(lo, hi) as u64 * (end - start) as u64;
        start = end;
    }

    (bits < limit).then_some(bits)
}

/// Find the cycle length with the smallest payload.
///
/// Tries every length from `MIN_CYCLE_LENGTH` to half the block (capped at
/// `MAX_CYCLE_LENGTH`) and finally the whole block as one cycle. Ties go to
/// the shortest length.
pub fn detect_cycle_length(samples: &[i32]) -> usize {
    let n = samples.len();
    if n < 2 * MIN_CYCLE_LENGTH {
        return n.max(1);
    }

    let max_len = (n / 2).min(MAX_CYCLE_LENGTH);
    let mut best_len = n;
    let mut best_cost = u64::MAX;

    for l in (MIN_CYCLE_LENGTH..=max_len).chain(std::iter::once(n)) {
        if let Some(cost) = cost_in_bits(samples, l, best_cost) {
            best_cost = cost;
            best_len = l;
        }
    }

    best_len
}

/// measure a cycle length without packing anything
pub fn analyze(samples: &[i32], cycle_length: usize) -> CycleStats {
    let n = samples.len();
    let l = cycle_length.clamp(1, n.max(1)).min(n);
    let mut stats = CycleStats {
        max_abs_diff: 0,
        max_width: 0,
        payload_bits: pcm::block_width(&samples[..l]) as u64 * l as u64,
    };

    let mut start = l;
    while start < n {
        let end = (start + l).min(n);
        let mut lo = 0i32;
        let mut hi = 0i32;
        for i in start..end {
            let d = samples[i] - samples[i - l];
            lo = lo.min(d);
            hi = hi.max(d);
        }
        let w = range_width(lo, hi);
        stats.max_width = stats.max_width.max(w);
        stats.max_abs_diff = stats
            .max_abs_diff
            .max(lo.unsigned_abs())
            .max(hi.unsigned_abs());
        stats.payload_bits += CYCLE_WIDTH_BITS as u64 + w as u64 * (end - start) as u64;
        start = end;
    }

    stats
}

/// Pack a delta block. Per-cycle widths must fit `MAX_BIT_WIDTH`, which
/// `analyze` lets the caller check first.
pub fn encode(samples: &[i32], cycle_length: usize, diffs: &mut Vec<i32>) -> CompressedBlock {
    let n = samples.len();
    let l = cycle_length.clamp(1, n);
    let bit_width = pcm::block_width(&samples[..l]);

    let mut bits = BitWriter::with_capacity(pcm::payload_len(bit_width, n));
    bits.write_all_signed(&samples[..l], bit_width);

    let mut start = l;
    while start < n {
        let end = (start + l).min(n);
        diffs.clear();
        diffs.extend((start..end).map(|i| samples[i] - samples[i - l]));

        let w = width_of(diffs);
        bits.write_bits(w as u32, CYCLE_WIDTH_BITS);
        bits.write_all_signed(diffs, w);
        start = end;
    }

    CompressedBlock {
        mode: BlockMode::Delta,
        bit_width,
        sample_count: n as u32,
        cycle_length: l as u32,
        payload: bits.into_bytes(),
    }
}

fn read_cycle_width(bits: &mut BitReader) -> HlacResult<u8> {
    let w = bits.read_bits(CYCLE_WIDTH_BITS)? as u8;
    if w > MAX_BIT_WIDTH {
        return Err(HlacError::CorruptStream(format!(
            "cycle width {} above {}",
            w, MAX_BIT_WIDTH
        )));
    }
    Ok(w)
}

/// Payload bytes implied by the header and the cycle sub-headers.
pub fn payload_len(
    bit_width: u8,
    sample_count: usize,
    cycle_length: usize,
    payload: &[u8],
) -> HlacResult<usize> {
    let l = cycle_length.min(sample_count);
    let mut bits = BitReader::new(payload);
    bits.skip_bits(bit_width as u64 * l as u64)?;

    let mut start = l;
    while start < sample_count {
        let end = (start + l).min(sample_count);
        let w = read_cycle_width(&mut bits)?;
        bits.skip_bits(w as u64 * (end - start) as u64)?;
        start = end;
    }

    Ok(bits.bytes_consumed())
}

pub fn decode(block: &CompressedBlock, out: &mut Vec<i32>) -> HlacResult<()> {
    let n = block.sample_count as usize;
    let l = block.cycle_length as usize;
    if l == 0 || l > n {
        return Err(HlacError::CorruptStream(format!(
            "cycle length {} invalid for {} samples",
            l, n
        )));
    }

    let start = out.len();
    out.resize(start + n, 0);
    let dst = &mut out[start..];

    let mut bits = BitReader::new(&block.payload);
    bits.read_into_signed(&mut dst[..l], block.bit_width)?;

    let mut pos = l;
    while pos < n {
        let end = (pos + l).min(n);
        let w = read_cycle_width(&mut bits)?;
        for i in pos..end {
            let d = bits.read_signed(w)?;
            dst[i] = dst[i - l].wrapping_add(d);
        }
        pos = end;
    }

    let used = bits.bytes_consumed();
    if used != block.payload.len() {
        return Err(HlacError::CorruptStream(format!(
            "delta payload is {} bytes, cycles account for {}",
            block.payload.len(),
            used
        )));
    }

    Ok(())
}
