//! hlac_tool - conformance and benchmark harness for libhlac
//!
//! Every audio file in a folder is encoded with the fixed block, delta and
//! diff presets, read back, checked sample for sample against the source and
//! measured against a reference FLAC encode.

pub mod audio;

use anyhow::{bail, Context, Result};
use libhlac::{CompressionHelpers, CompressionOptions, StreamInfo, StreamReader, StreamWriter};
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub use audio::{read_audio_file, LoadedAudio, TOOL_BIT_DEPTH};

/// Usage lines printed on a bad command line
pub const USAGE: &str = "Usage: hlac_tool [FOLDER_WITH_TEST_FILES]\n\
                         (put '_' before filename to skip samples)";

/// One encoder configuration under test
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub options: CompressionOptions,
}

/// Fixed pcm blocks of 512, adaptive delta and diff on 1024 sample blocks
pub fn presets() -> Vec<Preset> {
    vec![
        Preset {
            name: "block",
            options: CompressionOptions::fixed_blocks(),
        },
        Preset {
            name: "delta",
            options: CompressionOptions::delta(),
        },
        Preset {
            name: "diff",
            options: CompressionOptions::diff(),
        },
    ]
}

/// Settings for a comparison run
#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub presets: Vec<Preset>,
    /// also encode with FLAC
    pub reference: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            presets: presets(),
            reference: true,
        }
    }
}

/// Result of one preset on one file
#[derive(Debug, Clone, Serialize)]
pub struct ModeReport {
    pub mode: String,
    pub compression_ratio: f64,
    pub compressed_bytes: u64,
    pub pcm_blocks: u64,
    pub delta_blocks: u64,
    pub diff_blocks: u64,
    /// samples per second
    pub encode_throughput: f64,
    pub decode_throughput: f64,
    /// decoded audio seconds per wall clock second
    pub decode_realtime_factor: f64,
}

/// Reference encoder figures for one file
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceReport {
    pub compression_ratio: f64,
    pub encode_throughput: f64,
}

/// Everything measured on one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: usize,
    pub source_format: Option<String>,
    /// samples per second spent loading the source file, 0 when not timed
    pub load_throughput: f64,
    pub reference: Option<ReferenceReport>,
    pub modes: Vec<ModeReport>,
    /// the failure that stopped this file, modes after it were not run
    pub failures: Vec<String>,
}

impl FileReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn mode(&self, name: &str) -> Option<&ModeReport> {
        self.modes.iter().find(|m| m.mode == name)
    }
}

/// Averages of one mode over the files that passed
#[derive(Debug, Clone, Serialize)]
pub struct ModeAverage {
    pub mode: String,
    pub files: usize,
    pub compression_ratio: f64,
    pub decode_realtime_factor: f64,
}

/// A whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub files: Vec<FileReport>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.files.iter().all(FileReport::passed)
    }

    pub fn failure_count(&self) -> usize {
        self.files.iter().map(|f| f.failures.len()).sum()
    }

    fn passed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.passed())
    }

    /// mode averages in preset order, failed files left out
    pub fn averages(&self) -> Vec<ModeAverage> {
        let mut names: Vec<&str> = Vec::new();
        for file in self.passed_files() {
            for mode in &file.modes {
                if !names.contains(&mode.mode.as_str()) {
                    names.push(&mode.mode);
                }
            }
        }

        names
            .into_iter()
            .map(|name| {
                let runs: Vec<&ModeReport> =
                    self.passed_files().filter_map(|f| f.mode(name)).collect();
                ModeAverage {
                    mode: name.to_string(),
                    files: runs.len(),
                    compression_ratio: mean(runs.iter().map(|m| m.compression_ratio))
                        .unwrap_or(0.0),
                    decode_realtime_factor: mean(runs.iter().map(|m| m.decode_realtime_factor))
                        .unwrap_or(0.0),
                }
            })
            .collect()
    }

    /// average FLAC ratio, None when the reference never ran
    pub fn reference_average(&self) -> Option<f64> {
        mean(
            self.passed_files()
                .filter_map(|f| f.reference.as_ref().map(|r| r.compression_ratio)),
        )
    }

    /// average FLAC encode speed in samples per second
    pub fn reference_throughput(&self) -> Option<f64> {
        mean(
            self.passed_files()
                .filter_map(|f| f.reference.as_ref().map(|r| r.encode_throughput)),
        )
    }

    /// average source load speed in samples per second
    pub fn load_throughput(&self) -> Option<f64> {
        mean(self.passed_files().map(|f| f.load_throughput))
    }

    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Json<'a> {
            passed: bool,
            reference_ratio: Option<f64>,
            averages: Vec<ModeAverage>,
            files: &'a [FileReport],
        }

        serde_json::to_string_pretty(&Json {
            passed: self.passed(),
            reference_ratio: self.reference_average(),
            averages: self.averages(),
            files: &self.files,
        })
        .context("Failed to serialize report")
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// All files below `folder`, sorted, minus those whose name starts with `_`
pub fn collect_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(folder, &mut files)
        .with_context(|| format!("Failed to list {}", folder.display()))?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if !is_skipped(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_skipped(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

/// Encode, decode and verify one file with one preset
pub fn compare_mode(audio: &LoadedAudio, preset: &Preset) -> Result<ModeReport> {
    let mut info = StreamInfo::new(
        audio.sample_rate as f64,
        audio.num_channels() as u16,
        TOOL_BIT_DEPTH,
    );
    for (key, value) in &audio.metadata {
        info = info.with_metadata(key.as_str(), value.as_str());
    }

    let mut writer = StreamWriter::new(Cursor::new(Vec::new()), info, preset.options.clone())
        .context("Failed to create writer")?;
    writer.write(&audio.buffer).context("Encoding failed")?;
    let (sink, summary) = writer.close_and_patch().context("Failed to finish stream")?;

    let mut reader = StreamReader::new(Cursor::new(sink.into_inner()))
        .context("Failed to open encoded stream")?;
    let decoded = reader.read_all().context("Decoding failed")?;

    if !CompressionHelpers::buffers_equal(&audio.buffer, &decoded) {
        match CompressionHelpers::first_mismatch(&audio.buffer, &decoded) {
            Some((ch, i)) => bail!("decoded audio differs at channel {} sample {}", ch, i),
            None => bail!("decoded audio has a different channel count"),
        }
    }

    Ok(ModeReport {
        mode: preset.name.to_string(),
        compression_ratio: summary.compression_ratio,
        compressed_bytes: summary.compressed_bytes,
        pcm_blocks: summary.pcm_blocks,
        delta_blocks: summary.delta_blocks,
        diff_blocks: summary.diff_blocks,
        encode_throughput: CompressionHelpers::throughput(summary.total_samples, summary.elapsed),
        decode_throughput: reader.decompression_throughput(),
        decode_realtime_factor: reader.realtime_factor(),
    })
}

/// Ratio and speed of a FLAC encode of the same samples
pub fn compare_reference(audio: &LoadedAudio) -> Result<ReferenceReport> {
    let started = Instant::now();
    let ratio =
        CompressionHelpers::reference_ratio(&audio.buffer, audio.sample_rate, TOOL_BIT_DEPTH)
            .context("Reference encode failed")?;
    Ok(ReferenceReport {
        compression_ratio: ratio,
        encode_throughput: CompressionHelpers::throughput(
            audio.num_samples() as u64,
            started.elapsed(),
        ),
    })
}

/// Run every preset on a loaded file
///
/// The first failure is recorded and stops the file, the presets after it
/// are not run.
pub fn compare_audio(path: &Path, audio: &LoadedAudio, options: &CompareOptions) -> FileReport {
    let mut report = FileReport {
        path: path.to_path_buf(),
        sample_rate: audio.sample_rate,
        channels: audio.num_channels(),
        samples: audio.num_samples(),
        source_format: audio.source_format.clone(),
        load_throughput: 0.0,
        reference: None,
        modes: Vec::new(),
        failures: Vec::new(),
    };

    if options.reference {
        match compare_reference(audio) {
            Ok(reference) => {
                tracing::info!("FLAC ratio: {:.3}", reference.compression_ratio);
                report.reference = Some(reference);
            }
            Err(e) => {
                tracing::error!("flac failed on {}: {:#}", path.display(), e);
                report.failures.push(format!("flac: {:#}", e));
                return report;
            }
        }
    }

    for preset in &options.presets {
        match compare_mode(audio, preset) {
            Ok(mode) => {
                tracing::info!("Compressing with {}: {:.3}", preset.name, mode.compression_ratio);
                tracing::debug!(
                    "{}: {} pcm, {} delta, {} diff blocks, decode {:.1}x realtime",
                    preset.name,
                    mode.pcm_blocks,
                    mode.delta_blocks,
                    mode.diff_blocks,
                    mode.decode_realtime_factor
                );
                report.modes.push(mode);
            }
            Err(e) => {
                tracing::error!("{} failed on {}: {:#}", preset.name, path.display(), e);
                report.failures.push(format!("{}: {:#}", preset.name, e));
                break;
            }
        }
    }

    report
}

/// Load and compare every file below `folder`
///
/// A file that cannot be loaded aborts the run.
pub fn run(folder: &Path, options: &CompareOptions) -> Result<Report> {
    let mut report = Report::default();
    for path in collect_files(folder)? {
        tracing::info!("Checking {}", path.display());
        let started = Instant::now();
        let audio = read_audio_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let load_time = started.elapsed();

        let mut file = compare_audio(&path, &audio, options);
        file.load_throughput =
            CompressionHelpers::throughput(audio.num_samples() as u64, load_time);
        report.files.push(file);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libhlac::SampleBuffer;

    fn loaded(len: usize) -> LoadedAudio {
        let chan = (0..len).map(|i| (i as f32 * 0.0627).sin() * 0.5).collect();
        LoadedAudio {
            buffer: SampleBuffer::from_channels(vec![chan])
                .unwrap()
                .quantized(TOOL_BIT_DEPTH),
            sample_rate: 44100,
            source_format: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_presets() {
        let names: Vec<&str> = presets().iter().map(|p| p.name).collect();
        assert_eq!(names, ["block", "delta", "diff"]);
        for preset in presets() {
            preset.options.validate().unwrap();
        }
    }

    #[test]
    fn test_compare_mode_is_exact() {
        let audio = loaded(5000);
        for preset in presets() {
            let mode = compare_mode(&audio, &preset).unwrap();
            assert!(mode.compression_ratio > 0.0);
            assert!(mode.pcm_blocks + mode.delta_blocks + mode.diff_blocks > 0);
        }
    }

    #[test]
    fn test_averages() {
        let audio = loaded(2000);
        let options = CompareOptions {
            presets: presets(),
            reference: false,
        };
        let a = compare_audio(Path::new("a.wav"), &audio, &options);
        let b = compare_audio(Path::new("b.wav"), &audio, &options);
        let block_ratio = a.mode("block").unwrap().compression_ratio;

        let report = Report { files: vec![a, b] };
        assert!(report.passed());
        assert_eq!(report.reference_average(), None);
        let averages = report.averages();
        assert_eq!(averages.len(), 3);
        assert_eq!(averages[0].mode, "block");
        assert_eq!(averages[0].files, 2);
        assert!((averages[0].compression_ratio - block_ratio).abs() < 1e-12);
    }

    #[test]
    fn test_failed_preset_stops_the_file() {
        let audio = loaded(2000);
        let broken = Preset {
            name: "broken",
            options: CompressionOptions::fixed_blocks().with_block_width(Some(0)),
        };
        let options = CompareOptions {
            presets: vec![presets()[0].clone(), broken, presets()[2].clone()],
            reference: false,
        };

        let failed = compare_audio(Path::new("a.wav"), &audio, &options);
        assert!(!failed.passed());
        assert_eq!(failed.failures.len(), 1);
        assert!(failed.failures[0].starts_with("broken:"));
        assert!(failed.mode("diff").is_none());

        let good = CompareOptions {
            presets: presets(),
            reference: false,
        };
        let passed = compare_audio(Path::new("b.wav"), &audio, &good);
        let block_ratio = passed.mode("block").unwrap().compression_ratio;

        let report = Report {
            files: vec![failed, passed],
        };
        assert!(!report.passed());
        assert_eq!(report.failure_count(), 1);
        let averages = report.averages();
        assert_eq!(averages[0].mode, "block");
        assert_eq!(averages[0].files, 1);
        assert!((averages[0].compression_ratio - block_ratio).abs() < 1e-12);
    }

    #[test]
    fn test_speed_averages() {
        let audio = loaded(2000);
        let mut file = compare_audio(Path::new("a.wav"), &audio, &CompareOptions::default());
        file.load_throughput = 1000.0;
        let report = Report { files: vec![file] };
        assert_eq!(report.load_throughput(), Some(1000.0));
        assert!(report.reference_throughput().unwrap() >= 0.0);
        assert_eq!(Report::default().load_throughput(), None);
    }

    #[test]
    fn test_skip_prefix() {
        assert!(is_skipped(Path::new("dir/_quiet.wav")));
        assert!(!is_skipped(Path::new("_dir/loud.wav")));
    }
}
