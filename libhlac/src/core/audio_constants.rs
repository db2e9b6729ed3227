//! sample quantization

/// scale between floats and integers at a bit depth (2^(depth-1))
#[inline]
pub fn scale_for_depth(bit_depth: u8) -> f32 {
    (1u32 << (bit_depth - 1)) as f32
}

/// smallest integer a sample can take at this depth
#[inline]
pub fn min_for_depth(bit_depth: u8) -> i32 {
    -(1i32 << (bit_depth - 1))
}

/// largest integer a sample can take at this depth
#[inline]
pub fn max_for_depth(bit_depth: u8) -> i32 {
    (1i32 << (bit_depth - 1)) - 1
}

/// Convert f32 sample to an integer at the given depth
///
/// Rounds to nearest and clamps, so values produced by `i32_to_f32` come back
/// unchanged.
#[inline]
pub fn f32_to_i32(sample: f32, bit_depth: u8) -> i32 {
    let scaled = (sample * scale_for_depth(bit_depth)).round();
    if scaled.is_nan() {
        return 0;
    }
    (scaled as i32).clamp(min_for_depth(bit_depth), max_for_depth(bit_depth))
}

/// Convert an integer at the given depth back to f32
#[inline]
pub fn i32_to_f32(sample: i32, bit_depth: u8) -> f32 {
    sample as f32 / scale_for_depth(bit_depth)
}

/// snap a float onto the grid of the given depth
#[inline]
pub fn quantize(sample: f32, bit_depth: u8) -> f32 {
    i32_to_f32(f32_to_i32(sample, bit_depth), bit_depth)
}
