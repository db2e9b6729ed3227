//! Compression options for one encoding pass

use serde::{Deserialize, Serialize};

use super::error::{HlacError, HlacResult};
use super::types::{
    DEFAULT_BLOCK_WIDTH, DEFAULT_DIFF_BLOCK_WIDTH, MAX_BIT_WIDTH, MAX_BLOCK_SAMPLES,
};

/// which block codec an encoding pass drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStrategy {
    FixedPcm,
    Delta,
    Diff,
}

/// Encoder configuration
///
/// `fixed_block_width = None` means adaptive: pcm mode splits 4096 sample
/// windows where that pays off, delta uses 4096 sample windows and diff 1024.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub fixed_block_width: Option<u32>,
    pub remove_dc_offset: bool,
    pub use_delta_encoding: bool,
    pub use_diff_encoding_with_fixed_blocks: bool,
    /// detect the cycle length once, on the first block, then keep it
    pub reuse_first_cycle_length_for_block: bool,
    /// largest cycle difference allowed, as a fraction of the block's range
    pub delta_cycle_threshold: f32,
    /// blocks whose samples fit in this many bits are stored whole
    pub bit_rate_for_whole_block: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        CompressionOptions {
            fixed_block_width: None,
            remove_dc_offset: false,
            use_delta_encoding: false,
            use_diff_encoding_with_fixed_blocks: false,
            reuse_first_cycle_length_for_block: false,
            delta_cycle_threshold: 0.2,
            bit_rate_for_whole_block: 6,
        }
    }
}

impl CompressionOptions {
    /// fixed pcm blocks of 512 samples
    pub fn fixed_blocks() -> Self {
        CompressionOptions {
            fixed_block_width: Some(512),
            ..Default::default()
        }
    }

    /// adaptive delta with cycle reuse
    pub fn delta() -> Self {
        CompressionOptions {
            use_delta_encoding: true,
            reuse_first_cycle_length_for_block: true,
            delta_cycle_threshold: 0.1,
            ..Default::default()
        }
    }

    /// diff on 1024 sample blocks
    pub fn diff() -> Self {
        CompressionOptions {
            fixed_block_width: Some(DEFAULT_DIFF_BLOCK_WIDTH as u32),
            use_diff_encoding_with_fixed_blocks: true,
            bit_rate_for_whole_block: 4,
            ..Default::default()
        }
    }

    pub fn with_block_width(mut self, width: Option<u32>) -> Self {
        self.fixed_block_width = width;
        self
    }

    pub fn with_dc_removal(mut self, enabled: bool) -> Self {
        self.remove_dc_offset = enabled;
        self
    }

    pub fn with_cycle_reuse(mut self, enabled: bool) -> Self {
        self.reuse_first_cycle_length_for_block = enabled;
        self
    }

    pub fn with_delta_threshold(mut self, threshold: f32) -> Self {
        self.delta_cycle_threshold = threshold;
        self
    }

    pub fn with_whole_block_bit_rate(mut self, bits: u8) -> Self {
        self.bit_rate_for_whole_block = bits;
        self
    }

    /// reject combinations that cannot be encoded
    pub fn validate(&self) -> HlacResult<()> {
        if self.use_delta_encoding && self.use_diff_encoding_with_fixed_blocks {
            return Err(HlacError::Configuration(
                "delta and diff encoding are mutually exclusive".to_string(),
            ));
        }

        if let Some(width) = self.fixed_block_width {
            if width == 0 || width > MAX_BLOCK_SAMPLES {
                return Err(HlacError::Configuration(format!(
                    "block width {} outside 1..={}",
                    width, MAX_BLOCK_SAMPLES
                )));
            }
        }

        if !self.delta_cycle_threshold.is_finite() || self.delta_cycle_threshold < 0.0 {
            return Err(HlacError::Configuration(format!(
                "invalid delta cycle threshold {}",
                self.delta_cycle_threshold
            )));
        }

        if self.bit_rate_for_whole_block > MAX_BIT_WIDTH {
            return Err(HlacError::Configuration(format!(
                "whole block bit rate {} above {}",
                self.bit_rate_for_whole_block, MAX_BIT_WIDTH
            )));
        }

        Ok(())
    }

    pub fn strategy(&self) -> EncodingStrategy {
        if self.use_delta_encoding {
            EncodingStrategy::Delta
        } else if self.use_diff_encoding_with_fixed_blocks {
            EncodingStrategy::Diff
        } else {
            EncodingStrategy::FixedPcm
        }
    }

    /// samples per encoding window
    pub fn window_width(&self) -> usize {
        match (self.fixed_block_width, self.strategy()) {
            (Some(w), _) => w as usize,
            (None, EncodingStrategy::Diff) => DEFAULT_DIFF_BLOCK_WIDTH,
            (None, _) => DEFAULT_BLOCK_WIDTH,
        }
    }

    /// adaptive pcm may split windows
    pub fn is_adaptive(&self) -> bool {
        self.fixed_block_width.is_none()
    }

    pub fn from_json(json: &str) -> HlacResult<Self> {
        let options: CompressionOptions = serde_json::from_str(json)
            .map_err(|e| HlacError::Configuration(format!("invalid options json: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
