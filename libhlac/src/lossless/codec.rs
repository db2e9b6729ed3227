use tracing::trace;

use crate::core::bits::bytes_for_bits;
use crate::core::{BlockMode, CompressedBlock, HlacError, HlacResult, MAX_BIT_WIDTH};

use super::delta;
use super::diff::{self, DiffLayers};
use super::pcm;

/// Per-block encode and decode for every block mode.
///
/// Holds only scratch buffers, so one codec can be reused across blocks and
/// streams without carrying anything from one block into the next.
#[derive(Debug, Default)]
pub struct BlockCodec {
    diffs: Vec<i32>,
    layers: DiffLayers,
    anchors: Vec<i32>,
}

impl BlockCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode_pcm(&self, samples: &[i32]) -> CompressedBlock {
        pcm::encode(samples)
    }

    /// cycle length with the smallest delta payload for this block
    pub fn detect_cycle_length(&self, samples: &[i32]) -> usize {
        delta::detect_cycle_length(samples)
    }

    /// Delta encode with `cycle_length`, or fixed pcm when the cycles do not
    /// line up well enough.
    pub fn encode_delta(
        &mut self,
        samples: &[i32],
        cycle_length: usize,
        threshold: f32,
    ) -> CompressedBlock {
        let n = samples.len();
        let l = cycle_length.clamp(1, n.max(1));
        let stats = delta::analyze(samples, l);

        let (lo, hi) = samples
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let range = if n == 0 { 0.0 } else { (hi as f64) - (lo as f64) };
        let limit = threshold as f64 * range;

        if stats.max_abs_diff as f64 > limit {
            trace!(
                cycle_length = l,
                max_abs_diff = stats.max_abs_diff,
                limit,
                "cycle differences above threshold, storing pcm"
            );
            return pcm::encode(samples);
        }

        if stats.max_width > MAX_BIT_WIDTH {
            trace!(width = stats.max_width, "cycle differences too wide, storing pcm");
            return pcm::encode(samples);
        }

        let delta_bytes = bytes_for_bits(stats.payload_bits);
        let pcm_bytes = pcm::encoded_size(samples);
        if delta_bytes >= pcm_bytes {
            trace!(delta_bytes, pcm_bytes, "delta not smaller, storing pcm");
            return pcm::encode(samples);
        }

        delta::encode(samples, l, &mut self.diffs)
    }

    /// Diff encode, storing the block whole as pcm when it is already narrow
    /// or the residual layer does not pay off.
    pub fn encode_diff(&mut self, samples: &[i32], whole_block_bits: u8) -> CompressedBlock {
        let raw_width = pcm::block_width(samples);
        if raw_width <= whole_block_bits {
            trace!(raw_width, whole_block_bits, "narrow block stored whole");
            return pcm::encode(samples);
        }

        self.layers.split(samples);
        let residual_width = self.layers.residual_width();
        if residual_width > MAX_BIT_WIDTH {
            trace!(residual_width, "residuals too wide, storing pcm");
            return pcm::encode(samples);
        }

        let diff_bytes = self.layers.payload_len();
        let pcm_bytes = pcm::payload_len(raw_width, samples.len());
        if diff_bytes >= pcm_bytes {
            trace!(diff_bytes, pcm_bytes, "diff not smaller, storing pcm");
            return pcm::encode(samples);
        }

        diff::encode(&self.layers)
    }

    /// Decode one block, appending its samples to `out`.
    pub fn decode(&mut self, block: &CompressedBlock, out: &mut Vec<i32>) -> HlacResult<()> {
        block.validate_header()?;
        match block.mode {
            BlockMode::FixedPcm => pcm::decode(block, out),
            BlockMode::Delta => delta::decode(block, out),
            BlockMode::Diff => diff::decode(block, &mut self.anchors, out),
        }
    }

    /// Payload size implied by a block header and the start of its payload.
    ///
    /// Pcm needs nothing from the payload. Delta reads its per-cycle widths
    /// and diff its residual width byte, so `payload` must hold at least
    /// those sub-headers.
    pub fn payload_len(
        mode: BlockMode,
        bit_width: u8,
        sample_count: u32,
        cycle_length: u32,
        payload: &[u8],
    ) -> HlacResult<usize> {
        let n = sample_count as usize;
        match mode {
            BlockMode::FixedPcm => Ok(pcm::payload_len(bit_width, n)),
            BlockMode::Delta => {
                if cycle_length == 0 {
                    return Err(HlacError::CorruptStream(
                        "delta block without a cycle length".to_string(),
                    ));
                }
                delta::payload_len(bit_width, n, cycle_length as usize, payload)
            }
            BlockMode::Diff => diff::payload_len_from_prefix(bit_width, n, payload),
        }
    }
}
