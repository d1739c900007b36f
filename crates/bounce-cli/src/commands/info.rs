//! Display WAV and AIFF file metadata.

use bounce_io::{read_audio_file, read_audio_info};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// Display audio file information.
#[derive(Args)]
pub struct InfoArgs {
    /// Path to the WAV or AIFF file
    pub file: PathBuf,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,

    /// Decode the sample data and report its peak level
    #[arg(long)]
    pub decode: bool,

    /// Zero-fill sample data that ends early instead of failing (with --decode)
    #[arg(long, requires = "decode")]
    pub tolerate_truncation: bool,
}

#[derive(Serialize)]
struct InfoReport {
    file: String,
    format: String,
    channels: usize,
    bits: u16,
    sample_rate: u32,
    frames: u64,
    duration_secs: f64,
    file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    peak: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    truncated: Option<bool>,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let info = read_audio_info(&args.file)?;
    let file_size = std::fs::metadata(&args.file)?.len();

    let (peak, truncated) = if args.decode {
        let decoded = read_audio_file(&args.file, args.tolerate_truncation)?;
        let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        (Some(peak), Some(decoded.truncated))
    } else {
        (None, None)
    };

    let report = InfoReport {
        file: args.file.display().to_string(),
        format: info.format.to_string(),
        channels: info.spec.channels.count(),
        bits: info.spec.bits.bits(),
        sample_rate: info.spec.sample_rate,
        frames: info.frames,
        duration_secs: info.duration_secs(),
        file_size,
        peak,
        truncated,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File:        {}", report.file);
    println!("Format:      {} PCM {}-bit", report.format, report.bits);
    println!("Channels:    {}", report.channels);
    println!("Sample Rate: {} Hz", report.sample_rate);
    println!(
        "Duration:    {:.3}s ({} frames)",
        report.duration_secs, report.frames
    );
    println!("File Size:   {}", format_bytes(report.file_size));
    if let Some(peak) = report.peak {
        let db = 20.0 * peak.max(1e-10).log10();
        println!("Peak:        {peak:.4} ({db:.1} dBFS)");
    }
    if report.truncated == Some(true) {
        println!("Warning:     sample data truncated, missing frames zero-filled");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
