use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use hlac_tool::{CompareOptions, Report, USAGE};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hlac_tool")]
#[command(version)]
#[command(about = "Checks HLAC block, delta and diff modes against FLAC", long_about = None)]
struct Cli {
    /// Folder with test files, searched recursively (put '_' before a file name to skip it)
    folder: PathBuf,
    /// Write a JSON summary to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Skip the reference FLAC encode
    #[arg(long)]
    no_reference: bool,
    /// Log per-block statistics
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            println!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if !cli.folder.is_dir() {
        println!("{}", USAGE);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Ok(false) when some file failed a mode
fn run(cli: &Cli) -> Result<bool> {
    let options = CompareOptions {
        reference: !cli.no_reference,
        ..Default::default()
    };

    let report = hlac_tool::run(&cli.folder, &options)?;
    print_summary(&report);

    if let Some(path) = &cli.report {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    if !report.passed() {
        tracing::error!("{} mode failures", report.failure_count());
    }
    Ok(report.passed())
}

fn print_summary(report: &Report) {
    let averages = report.averages();

    tracing::info!("=====================================================");
    tracing::info!("Files checked:\t{}", report.files.len());
    if let Some(ratio) = report.reference_average() {
        tracing::info!("FLAC ratio:\t{:.3}", ratio);
    }
    for avg in &averages {
        tracing::info!("{} ratio:\t{:.3}", capitalize(&avg.mode), avg.compression_ratio);
    }
    tracing::info!("=====================================================");
    if let Some(speed) = report.load_throughput() {
        tracing::info!("PCM speed:\t{:.1} samples/s", speed);
    }
    if let Some(speed) = report.reference_throughput() {
        tracing::info!("FLAC speed:\t{:.1} samples/s", speed);
    }
    for avg in &averages {
        tracing::info!(
            "{} speed:\t{:.1}x realtime",
            capitalize(&avg.mode),
            avg.decode_realtime_factor
        );
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
