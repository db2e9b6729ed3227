use anyhow::{Context, Result};
use libhlac::SampleBuffer;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::Hint;

/// Bit depth every test file is snapped to before encoding
pub const TOOL_BIT_DEPTH: u8 = 16;

/// A decoded test file
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    /// planar samples on the 16 bit grid
    pub buffer: SampleBuffer,
    pub sample_rate: u32,
    /// e.g. "WAV", "FLAC"
    pub source_format: Option<String>,
    /// string tags, stored in the stream header
    pub metadata: BTreeMap<String, String>,
}

impl LoadedAudio {
    pub fn num_channels(&self) -> usize {
        self.buffer.num_channels()
    }

    pub fn num_samples(&self) -> usize {
        self.buffer.num_samples()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate as f64
    }
}

/// Read an audio file in any format symphonia knows
pub fn read_audio_file(path: &Path) -> Result<LoadedAudio> {
    let file = std::fs::File::open(path).context("Failed to open audio file")?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    read_from_source(mss, path.extension().and_then(|e| e.to_str()))
}

/// Read audio from in-memory file bytes
pub fn read_audio_from_bytes(bytes: &[u8]) -> Result<LoadedAudio> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());
    read_from_source(mss, None)
}

fn read_from_source(mss: MediaSourceStream, extension: Option<&str>) -> Result<LoadedAudio> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    // tags only, no cover art
    let meta_opts = MetadataOptions {
        limit_metadata_bytes: symphonia::core::meta::Limit::Maximum(1024 * 1024),
        limit_visual_bytes: symphonia::core::meta::Limit::Maximum(0),
    };

    let mut probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &meta_opts)
        .context("Unsupported audio format")?;

    let mut format = probed.format;

    let mut metadata = BTreeMap::new();
    if let Some(meta_rev) = probed.metadata.get() {
        if let Some(current) = meta_rev.current() {
            extract_metadata_tags(current, &mut metadata);
        }
    }
    if let Some(meta_rev) = format.metadata().current() {
        extract_metadata_tags(meta_rev, &mut metadata);
    }

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let source_format = extension
        .map(|ext| ext.to_uppercase())
        .or_else(|| codec_name(track.codec_params.codec).map(str::to_string));

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Unknown sample rate")?;
    let channels = track
        .codec_params
        .channels
        .context("Unknown channel count")?
        .count();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut planar = vec![Vec::new(); channels];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(e).context("Error reading packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e).context("Error decoding packet"),
        };

        append_samples(&decoded, &mut planar);
    }

    let buffer = SampleBuffer::from_channels(planar)
        .context("Decoded channels differ in length")?
        .quantized(TOOL_BIT_DEPTH);

    Ok(LoadedAudio {
        buffer,
        sample_rate,
        source_format,
        metadata,
    })
}

fn codec_name(codec: symphonia::core::codecs::CodecType) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    match codec {
        CODEC_TYPE_FLAC => Some("FLAC"),
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE | CODEC_TYPE_PCM_S24LE
        | CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_F32LE => Some("WAV"),
        CODEC_TYPE_MP3 => Some("MP3"),
        CODEC_TYPE_VORBIS => Some("OGG"),
        CODEC_TYPE_AAC => Some("AAC"),
        _ => None,
    }
}

fn extract_metadata_tags(meta: &MetadataRevision, metadata: &mut BTreeMap<String, String>) {
    for tag in meta.tags() {
        let Some(std_key) = tag.std_key else {
            continue;
        };
        let key = match std_key {
            StandardTagKey::TrackTitle => "title",
            StandardTagKey::Artist => "artist",
            StandardTagKey::Album => "album",
            StandardTagKey::AlbumArtist => "album_artist",
            StandardTagKey::Date | StandardTagKey::ReleaseDate => "date",
            StandardTagKey::Genre => "genre",
            StandardTagKey::TrackNumber => "track",
            StandardTagKey::Composer => "composer",
            StandardTagKey::Comment => "comment",
            StandardTagKey::Bpm => "bpm",
            _ => continue,
        };
        let value = match &tag.value {
            Value::String(s) => s.clone(),
            Value::UnsignedInt(n) => n.to_string(),
            Value::SignedInt(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            _ => continue,
        };
        metadata.insert(key.to_string(), value);
    }
}

fn append_samples(buffer: &AudioBufferRef, planar: &mut [Vec<f32>]) {
    match buffer {
        AudioBufferRef::F32(buf) => {
            for (ch, dst) in planar.iter_mut().enumerate() {
                dst.extend_from_slice(buf.chan(ch));
            }
        }
        AudioBufferRef::F64(buf) => {
            for (ch, dst) in planar.iter_mut().enumerate() {
                dst.extend(buf.chan(ch).iter().map(|&s| s as f32));
            }
        }
        AudioBufferRef::S16(buf) => {
            let scale = 1.0 / 32768.0;
            for (ch, dst) in planar.iter_mut().enumerate() {
                dst.extend(buf.chan(ch).iter().map(|&s| s as f32 * scale));
            }
        }
        AudioBufferRef::S24(buf) => {
            let scale = 1.0 / 8388608.0;
            for (ch, dst) in planar.iter_mut().enumerate() {
                dst.extend(buf.chan(ch).iter().map(|s| s.inner() as f32 * scale));
            }
        }
        AudioBufferRef::S32(buf) => {
            let scale = 1.0 / 2147483648.0;
            for (ch, dst) in planar.iter_mut().enumerate() {
                dst.extend(buf.chan(ch).iter().map(|&s| s as f32 * scale));
            }
        }
        AudioBufferRef::U8(buf) => {
            for (ch, dst) in planar.iter_mut().enumerate() {
                dst.extend(buf.chan(ch).iter().map(|&s| (s as f32 - 128.0) / 128.0));
            }
        }
        _ => {
            tracing::warn!("skipping packet with unsupported sample format");
        }
    }
}

/// Write a buffer to a 16 bit PCM WAV file
pub fn write_wav(path: &Path, buffer: &SampleBuffer, sample_rate: u32) -> Result<()> {
    let bytes = write_wav_to_bytes(buffer, sample_rate)?;
    std::fs::write(path, bytes).context("Failed to write WAV file")
}

/// Write a buffer to 16 bit PCM WAV in memory
pub fn write_wav_to_bytes(buffer: &SampleBuffer, sample_rate: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    let channels = buffer.num_channels();
    let bytes_per_sample = 2;
    let data_size = buffer.num_samples() * channels * bytes_per_sample;
    let file_size = 36 + data_size;

    // RIFF header
    out.write_all(b"RIFF")?;
    out.write_all(&(file_size as u32).to_le_bytes())?;
    out.write_all(b"WAVE")?;

    // fmt chunk
    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?; // integer pcm
    out.write_all(&(channels as u16).to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    out.write_all(&byte_rate.to_le_bytes())?;
    let block_align = channels as u16 * bytes_per_sample as u16;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&16u16.to_le_bytes())?;

    // data chunk
    out.write_all(b"data")?;
    out.write_all(&(data_size as u32).to_le_bytes())?;

    let per_channel: Vec<Vec<i32>> = (0..channels)
        .map(|ch| buffer.channel_to_i32(ch, TOOL_BIT_DEPTH))
        .collect();
    for i in 0..buffer.num_samples() {
        for ch in &per_channel {
            out.write_all(&(ch[i] as i16).to_le_bytes())?;
        }
    }

    Ok(out)
}
