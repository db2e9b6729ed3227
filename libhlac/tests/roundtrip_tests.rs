//! Full pipeline tests: buffer -> stream bytes -> buffer, for every mode.

use libhlac::{
    decode_bytes, encode_buffer, version, BlockMode, CompressionHelpers, CompressionOptions,
    Encoder, SampleBuffer, StreamInfo,
};

fn sine(len: usize, freq: f32, rate: f32, amp: f32, offset: f32) -> Vec<f32> {
    (0..len)
        .map(|i| offset + (i as f32 * freq / rate * std::f32::consts::TAU).sin() * amp)
        .collect()
}

fn noisy(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(2654435761).max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) * 1.6 - 0.8
        })
        .collect()
}

fn all_modes() -> Vec<(&'static str, CompressionOptions)> {
    vec![
        ("fixed_blocks", CompressionOptions::fixed_blocks()),
        ("adaptive_pcm", CompressionOptions::default()),
        ("delta", CompressionOptions::delta()),
        (
            "delta_no_reuse",
            CompressionOptions::delta().with_cycle_reuse(false),
        ),
        ("diff", CompressionOptions::diff()),
        ("diff_adaptive", CompressionOptions::diff().with_block_width(None)),
    ]
}

fn roundtrip(buffer: &SampleBuffer, rate: f64, options: CompressionOptions) -> SampleBuffer {
    let info = StreamInfo::new(rate, buffer.num_channels() as u16, 16);
    let (bytes, summary) = encode_buffer(buffer, info, options).expect("encode failed");
    assert_eq!(summary.total_samples, buffer.num_samples() as u64);
    let (header, decoded) = decode_bytes(&bytes).expect("decode failed");
    assert_eq!(header.trailer.total_samples, buffer.num_samples() as u64);
    decoded
}

fn assert_exact(buffer: &SampleBuffer, options: CompressionOptions, label: &str) {
    let expected = buffer.quantized(16);
    let decoded = roundtrip(buffer, 44100.0, options);
    assert!(
        CompressionHelpers::buffers_equal(&expected, &decoded),
        "{}: first mismatch at {:?}",
        label,
        CompressionHelpers::first_mismatch(&expected, &decoded)
    );
}

// ============================================================================
// Version
// ============================================================================

#[test]
fn test_version() {
    assert_eq!(version(), env!("CARGO_PKG_VERSION"));
}

// ============================================================================
// Exactness
// ============================================================================

#[test]
fn test_roundtrip_lengths_all_modes() {
    for len in [0usize, 1, 2, 3, 5, 255, 513, 1023, 1025, 4097, 9000] {
        let chan = sine(len, 440.0, 44100.0, 0.6, 0.0);
        let buffer = SampleBuffer::from_channels(vec![chan]).unwrap();
        for (name, opts) in all_modes() {
            assert_exact(&buffer, opts, &format!("{} len {}", name, len));
        }
    }
}

#[test]
fn test_roundtrip_multichannel() {
    let buffer = SampleBuffer::from_channels(vec![
        sine(5000, 440.0, 44100.0, 0.5, 0.0),
        sine(5000, 97.0, 44100.0, 0.9, 0.0),
        noisy(5000, 7),
    ])
    .unwrap();
    for (name, opts) in all_modes() {
        assert_exact(&buffer, opts, name);
    }
}

#[test]
fn test_roundtrip_with_dc_removal() {
    let buffer = SampleBuffer::from_channels(vec![
        sine(6000, 220.0, 44100.0, 0.4, 0.5),
        sine(6000, 330.0, 44100.0, 0.3, -0.6),
    ])
    .unwrap();
    for (name, opts) in all_modes() {
        assert_exact(&buffer, opts.with_dc_removal(true), name);
    }
}

#[test]
fn test_roundtrip_noise_and_extremes() {
    let mut extremes = vec![1.0f32; 700];
    extremes.extend(vec![-1.0f32; 700]);
    extremes.extend((0..700).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }));
    let buffer = SampleBuffer::from_channels(vec![extremes, noisy(2100, 3)]).unwrap();
    for (name, opts) in all_modes() {
        assert_exact(&buffer, opts.clone(), name);
        assert_exact(&buffer, opts.with_dc_removal(true), name);
    }
}

#[test]
fn test_idempotent_reencode() {
    let buffer = SampleBuffer::from_channels(vec![
        sine(3000, 440.0, 44100.0, 0.5, 0.1),
        noisy(3000, 11),
    ])
    .unwrap();
    for (name, opts) in all_modes() {
        let info = StreamInfo::new(44100.0, 2, 16);
        let (first, _) = encode_buffer(&buffer, info.clone(), opts.clone()).unwrap();
        let (_, decoded) = decode_bytes(&first).unwrap();
        let (second, _) = encode_buffer(&decoded, info, opts).unwrap();
        assert_eq!(first, second, "{}", name);
    }
}

// ============================================================================
// Ratios
// ============================================================================

#[test]
fn test_sine_440_delta_beats_pcm() {
    let buffer =
        SampleBuffer::from_channels(vec![sine(44100, 440.0, 44100.0, 0.5, 0.0)]).unwrap();
    let info = StreamInfo::new(44100.0, 1, 16);

    let delta = CompressionOptions::delta()
        .with_block_width(Some(512))
        .with_delta_threshold(0.1);
    let (bytes, delta_summary) = encode_buffer(&buffer, info.clone(), delta).unwrap();
    let (_, decoded) = decode_bytes(&bytes).unwrap();
    assert_eq!(decoded, buffer.quantized(16));

    let (_, pcm_summary) =
        encode_buffer(&buffer, info, CompressionOptions::fixed_blocks()).unwrap();

    assert!(delta_summary.compression_ratio < 1.0);
    assert!(delta_summary.compression_ratio < pcm_summary.compression_ratio);
    assert!(delta_summary.delta_blocks > 0);
}

#[test]
fn test_pcm_ratio_not_below_delta_on_periodic_sine() {
    // period 64 divides the block width
    let chan: Vec<f32> = (0..8192)
        .map(|i| ((i % 64) as f32 / 64.0 * std::f32::consts::TAU).sin() * 0.7)
        .collect();
    let buffer = SampleBuffer::from_channels(vec![chan]).unwrap();
    let info = StreamInfo::new(44100.0, 1, 16);

    let (_, pcm) =
        encode_buffer(&buffer, info.clone(), CompressionOptions::fixed_blocks()).unwrap();
    let delta_opts = CompressionOptions::delta().with_block_width(Some(512));
    let (_, delta) = encode_buffer(&buffer, info, delta_opts).unwrap();
    assert!(pcm.compression_ratio >= delta.compression_ratio);
}

#[test]
fn test_diff_on_smooth_audio() {
    let buffer =
        SampleBuffer::from_channels(vec![sine(20000, 60.0, 44100.0, 0.8, 0.0)]).unwrap();
    let info = StreamInfo::new(44100.0, 1, 16);
    let (_, diff) = encode_buffer(&buffer, info.clone(), CompressionOptions::diff()).unwrap();
    let (_, pcm) = encode_buffer(&buffer, info, CompressionOptions::fixed_blocks()).unwrap();
    assert!(diff.diff_blocks > 0);
    assert!(diff.compression_ratio < pcm.compression_ratio);
}

#[test]
fn test_empty_stream_ratio_is_one() {
    let buffer = SampleBuffer::silence(2, 0);
    let info = StreamInfo::new(44100.0, 2, 16);
    let (bytes, summary) = encode_buffer(&buffer, info, CompressionOptions::delta()).unwrap();
    assert_eq!(summary.compression_ratio, 1.0);
    let (header, decoded) = decode_bytes(&bytes).unwrap();
    assert_eq!(header.trailer.total_samples, 0);
    assert_eq!(header.trailer.compression_ratio, 1.0);
    assert_eq!(decoded.num_samples(), 0);
    assert_eq!(decoded.num_channels(), 2);
}

// ============================================================================
// Silence
// ============================================================================

#[test]
fn test_silence_delta_reuse_has_zero_width_cycles() {
    let buffer = SampleBuffer::silence(1, 8192);
    let mut enc = Encoder::new(1, 16, CompressionOptions::delta()).unwrap();
    let mut groups = enc.encode(&buffer).unwrap();
    groups.extend(enc.flush().unwrap());

    assert_eq!(groups.len(), 2);
    for group in &groups {
        let block = &group[0];
        assert_eq!(block.mode, BlockMode::Delta);
        assert!(block.payload.iter().all(|&b| b == 0));
    }
    assert_eq!(groups[0][0].cycle_length, groups[1][0].cycle_length);

    let decoded = roundtrip(&buffer, 8000.0, CompressionOptions::delta());
    assert_eq!(decoded, buffer);
}

// ============================================================================
// Metadata and depth
// ============================================================================

#[test]
fn test_metadata_survives() {
    let buffer = SampleBuffer::silence(1, 100);
    let info = StreamInfo::new(96000.0, 1, 16)
        .with_metadata("title", "Test Tone")
        .with_metadata("encoder", "hlac");
    let (bytes, _) = encode_buffer(&buffer, info.clone(), CompressionOptions::default()).unwrap();
    let (header, _) = decode_bytes(&bytes).unwrap();
    assert_eq!(header.info(), info);
}

#[test]
fn test_low_bit_depth_roundtrip() {
    for depth in [1u8, 4, 8, 12] {
        let chan = noisy(3000, depth as u32);
        let buffer = SampleBuffer::from_channels(vec![chan]).unwrap();
        let info = StreamInfo::new(8000.0, 1, depth);
        for (name, opts) in all_modes() {
            let (bytes, _) = encode_buffer(&buffer, info.clone(), opts.with_dc_removal(true))
                .unwrap();
            let (_, decoded) = decode_bytes(&bytes).unwrap();
            assert_eq!(decoded, buffer.quantized(depth), "{} at {} bits", name, depth);
        }
    }
}
