//! Stream framing tests: random access, corruption, trailer handling,
//! cancellation and configuration errors.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libhlac::{
    encode_buffer, read_header, CompressionOptions, DecoderState, Encoder, EncoderState,
    HlacError, SampleBuffer, StreamInfo, StreamReader, StreamWriter,
};

fn test_buffer(len: usize) -> SampleBuffer {
    let left = (0..len)
        .map(|i| (i as f32 * 0.031).sin() * 0.45 + 0.1)
        .collect();
    let right = (0..len)
        .map(|i| ((i * 7919) % 1000) as f32 / 2000.0 - 0.25)
        .collect();
    SampleBuffer::from_channels(vec![left, right]).unwrap()
}

fn encoded(len: usize, options: CompressionOptions) -> Vec<u8> {
    let info = StreamInfo::new(44100.0, 2, 16);
    encode_buffer(&test_buffer(len), info, options).unwrap().0
}

fn header_len(bytes: &[u8]) -> usize {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor).unwrap();
    cursor.position() as usize
}

// ============================================================================
// Random access
// ============================================================================

#[test]
fn test_read_matches_full_decode() {
    for options in [
        CompressionOptions::fixed_blocks(),
        CompressionOptions::default(),
        CompressionOptions::delta(),
        CompressionOptions::diff().with_dc_removal(true),
    ] {
        let bytes = encoded(10_000, options);
        let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
        let full = reader.read_all().unwrap();
        assert_eq!(full.num_samples(), 10_000);

        for (start, count) in [
            (0u64, 1usize),
            (0, 512),
            (511, 2),
            (1000, 3000),
            (4095, 1),
            (9990, 100),
            (3, 10_000),
        ] {
            let part = reader.read(start, count).unwrap();
            let expected = full.slice(start as usize, count);
            assert_eq!(part, expected, "read({}, {})", start, count);
        }
    }
}

#[test]
fn test_read_past_end_is_empty() {
    let bytes = encoded(1000, CompressionOptions::fixed_blocks());
    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    let part = reader.read(1000, 50).unwrap();
    assert_eq!(part.num_samples(), 0);
    assert_eq!(part.num_channels(), 2);
    assert_eq!(reader.read(5, 0).unwrap().num_samples(), 0);
}

#[test]
fn test_reader_statistics() {
    let bytes = encoded(44100, CompressionOptions::delta());
    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.total_samples().unwrap(), 44100);
    assert_eq!(reader.block_count().unwrap(), 2 * 11);
    reader.read_all().unwrap();
    assert!(reader.decompression_throughput() >= 0.0);
    assert!(reader.realtime_factor() >= 0.0);
    assert_eq!(reader.decoder().samples_decoded(), 44100);
}

#[test]
fn test_reads_finish_and_rewind_the_decoder() {
    let bytes = encoded(3000, CompressionOptions::fixed_blocks());
    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    let full = reader.read_all().unwrap();
    assert_eq!(reader.decoder().state(), DecoderState::Done);

    // the stream can be read again after reaching the end
    let part = reader.read(100, 10).unwrap();
    assert_eq!(part, full.slice(100, 10));
    assert_eq!(reader.decoder().state(), DecoderState::Decoding);
    assert_eq!(reader.decoder().samples_decoded(), 3000 + 512);

    let tail = reader.read(2990, 100).unwrap();
    assert_eq!(tail, full.slice(2990, 10));
    assert_eq!(reader.decoder().state(), DecoderState::Done);
}

// ============================================================================
// Corruption
// ============================================================================

#[test]
fn test_truncation_at_every_offset() {
    let bytes = encoded(1500, CompressionOptions::delta().with_block_width(Some(256)));
    for cut in 0..bytes.len() {
        let result = StreamReader::new(Cursor::new(&bytes[..cut])).and_then(|mut r| r.read_all());
        assert!(
            matches!(result, Err(HlacError::CorruptStream(_))),
            "cut at {} of {} gave {:?}",
            cut,
            bytes.len(),
            result.map(|b| b.num_samples())
        );
    }
}

#[test]
fn test_unknown_block_tag() {
    let mut bytes = encoded(600, CompressionOptions::fixed_blocks());
    let first_block = header_len(&bytes);
    bytes[first_block] = 3;
    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    assert!(matches!(
        reader.read_all(),
        Err(HlacError::UnsupportedMode(3))
    ));
}

#[test]
fn test_payload_size_mismatch() {
    let mut bytes = encoded(600, CompressionOptions::fixed_blocks());
    let first_block = header_len(&bytes);
    // bit width of the first block
    bytes[first_block + 1] -= 1;
    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    assert!(matches!(
        reader.read_all(),
        Err(HlacError::CorruptStream(_))
    ));
}

#[test]
fn test_garbage_after_header_is_corrupt() {
    let mut bytes = encoded(0, CompressionOptions::default());
    let end = header_len(&bytes);
    bytes.truncate(end);
    bytes.extend_from_slice(&[1, 2, 3]);
    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.read_all().is_err());
}

// ============================================================================
// Trailer
// ============================================================================

#[test]
fn test_unpatched_trailer_falls_back_to_scan() {
    let info = StreamInfo::new(44100.0, 2, 16);
    let mut writer = StreamWriter::new(Vec::new(), info, CompressionOptions::delta()).unwrap();
    writer.write(&test_buffer(5000)).unwrap();
    let (bytes, _) = writer.close().unwrap();

    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    assert!(!reader.header().trailer.is_valid());
    assert_eq!(reader.total_samples().unwrap(), 5000);
    assert_eq!(reader.read_all().unwrap(), test_buffer(5000).quantized(16));
}

#[test]
fn test_disagreeing_trailer_falls_back_to_scan() {
    let mut bytes = encoded(3000, CompressionOptions::fixed_blocks());
    let trailer_at = header_len(&bytes) - 12;
    bytes[trailer_at..trailer_at + 8].copy_from_slice(&12345u64.to_le_bytes());

    let mut reader = StreamReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().trailer.total_samples, 12345);
    assert_eq!(reader.total_samples().unwrap(), 3000);
}

#[test]
fn test_patched_trailer_at_sink_offset() {
    // the writer may start in the middle of a sink
    let mut cursor = Cursor::new(vec![0xAAu8; 7]);
    cursor.set_position(7);
    let info = StreamInfo::new(44100.0, 2, 16);
    let mut writer = StreamWriter::new(cursor, info, CompressionOptions::diff()).unwrap();
    writer.write(&test_buffer(2000)).unwrap();
    let (cursor, _) = writer.close_and_patch().unwrap();
    let bytes = cursor.into_inner();
    assert!(bytes[..7].iter().all(|&b| b == 0xAA));

    let mut reader = StreamReader::new(Cursor::new(&bytes[7..])).unwrap();
    assert!(reader.header().trailer.is_valid());
    assert_eq!(reader.total_samples().unwrap(), 2000);
}

// ============================================================================
// Sessions and cancellation
// ============================================================================

#[test]
fn test_encoding_after_flush_is_rejected() {
    let mut enc = Encoder::new(2, 16, CompressionOptions::diff()).unwrap();
    enc.encode(&test_buffer(100)).unwrap();
    enc.flush().unwrap();
    assert_eq!(enc.state(), EncoderState::Flushed);
    assert!(matches!(
        enc.encode(&test_buffer(100)),
        Err(HlacError::SessionClosed)
    ));
    enc.reset();
    assert_eq!(enc.encode(&test_buffer(2048)).unwrap().len(), 2);
}

#[test]
fn test_cancellation_keeps_whole_groups() {
    let flag = Arc::new(AtomicBool::new(false));
    let info = StreamInfo::new(44100.0, 2, 16);
    let mut writer = StreamWriter::new(Vec::new(), info, CompressionOptions::fixed_blocks())
        .unwrap()
        .with_cancel_flag(flag.clone());

    writer.write(&test_buffer(1024)).unwrap();
    let written = writer.bytes_written();

    flag.store(true, Ordering::Relaxed);
    assert!(matches!(
        writer.write(&test_buffer(4096)),
        Err(HlacError::Cancelled)
    ));
    assert_eq!(writer.bytes_written(), written);
}

#[test]
fn test_cancelled_writer_stays_cancelled() {
    let flag = Arc::new(AtomicBool::new(false));
    let info = StreamInfo::new(44100.0, 2, 16);
    let sink = Cursor::new(Vec::new());
    let mut writer = StreamWriter::new(sink, info, CompressionOptions::fixed_blocks())
        .unwrap()
        .with_cancel_flag(flag.clone());

    writer.write(&test_buffer(1024)).unwrap();
    flag.store(true, Ordering::Relaxed);
    assert!(matches!(
        writer.write(&test_buffer(2048)),
        Err(HlacError::Cancelled)
    ));
    assert!(writer.is_cancelled());

    // lowering the flag again does not revive the session
    flag.store(false, Ordering::Relaxed);
    assert!(matches!(
        writer.write(&test_buffer(512)),
        Err(HlacError::Cancelled)
    ));
    assert!(matches!(
        writer.close_and_patch(),
        Err(HlacError::Cancelled)
    ));
}

#[test]
fn test_flag_raised_before_write_keeps_stream_readable() {
    let flag = Arc::new(AtomicBool::new(false));
    let info = StreamInfo::new(44100.0, 2, 16);
    let mut writer = StreamWriter::new(Vec::new(), info, CompressionOptions::fixed_blocks())
        .unwrap()
        .with_cancel_flag(flag.clone());
    writer.write(&test_buffer(1024)).unwrap();
    let written = writer.bytes_written();

    flag.store(true, Ordering::Relaxed);
    assert!(writer.write(&test_buffer(2048)).is_err());
    assert_eq!(writer.bytes_written(), written);
    assert_eq!(writer.encoder().total_samples(), 1024);
}

#[test]
fn test_configuration_errors() {
    let mut both = CompressionOptions::delta();
    both.use_diff_encoding_with_fixed_blocks = true;
    let info = StreamInfo::new(44100.0, 1, 16);
    assert!(matches!(
        StreamWriter::new(Vec::new(), info.clone(), both),
        Err(HlacError::Configuration(_))
    ));

    let deep = StreamInfo::new(44100.0, 1, 24);
    assert!(matches!(
        StreamWriter::new(Vec::new(), deep, CompressionOptions::default()),
        Err(HlacError::Configuration(_))
    ));

    let zero_width = CompressionOptions::default().with_block_width(Some(0));
    assert!(matches!(
        StreamWriter::new(Vec::new(), info, zero_width),
        Err(HlacError::Configuration(_))
    ));
}

#[test]
fn test_channel_count_mismatch() {
    let info = StreamInfo::new(44100.0, 2, 16);
    let mut writer = StreamWriter::new(Vec::new(), info, CompressionOptions::default()).unwrap();
    assert!(matches!(
        writer.write(&SampleBuffer::silence(1, 10)),
        Err(HlacError::SizeMismatch(_))
    ));
}
