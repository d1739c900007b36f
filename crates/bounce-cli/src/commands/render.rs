//! Render command: drive a test signal through the pipeline.

use crate::generators::{Signal, SignalGenerator};
use bounce_config::RenderConfig;
use bounce_core::{Channels, FileFormat};
use bounce_io::{
    DestinationTarget, IoOptions, MeteringConfig, ProgressConfig, RenderOutcome, RenderRequest,
    Renderer,
};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Args)]
pub struct RenderArgs {
    /// Output file (.wav or .aiff); omit with --device
    #[arg(value_name = "OUTPUT", required_unless_present = "device")]
    output: Option<PathBuf>,

    /// Play through an output device instead of writing a file
    #[arg(long, conflicts_with = "output")]
    device: bool,

    /// Output device name filter (substring match)
    #[arg(long, requires = "device")]
    device_name: Option<String>,

    /// Signal to render
    #[arg(long, value_enum, default_value = "tone")]
    signal: Signal,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440.0")]
    freq: f32,

    /// Peak amplitude, or the constant value
    #[arg(long, default_value = "0.5")]
    amplitude: f32,

    /// Duration in seconds
    #[arg(long, default_value = "1.0")]
    duration: f32,

    /// Render settings file (defaults to the user settings)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output sample rate
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Output channels (1 or 2)
    #[arg(long)]
    channels: Option<u16>,

    /// Output bit depth (8, 16 or 24)
    #[arg(long)]
    bits: Option<u16>,

    /// Generator rate multiple
    #[arg(long)]
    oversampling: Option<usize>,

    /// Container format (wav or aiff); defaults to the file extension
    #[arg(long)]
    format: Option<String>,

    /// Dither kind (none, rectangular, triangular, noise-shaped)
    #[arg(long)]
    dither: Option<String>,

    /// Generate mono and duplicate into both output channels
    #[arg(long)]
    mono_source: bool,

    /// Mute output while the windowed peak exceeds this level
    #[arg(long, value_name = "LEVEL")]
    mute_above: Option<f32>,

    /// Hide the progress bar
    #[arg(long, short)]
    quiet: bool,
}

/// Run the render command.
pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::load_user()?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let spec = config.sample_spec()?;
    let oversampling = config.oversampling()?;
    let source_channels = if args.mono_source {
        Channels::Mono
    } else {
        spec.channels
    };

    if !args.duration.is_finite() || args.duration <= 0.0 {
        anyhow::bail!("Duration must be positive, got {}", args.duration);
    }
    let output_frames = (f64::from(args.duration) * f64::from(spec.sample_rate)).round() as u64;

    let target = if args.device {
        DestinationTarget::Device {
            name: args.device_name.clone(),
        }
    } else {
        let Some(path) = args.output.clone() else {
            anyhow::bail!("No output file given. Use OUTPUT or --device");
        };
        let format = match &args.format {
            Some(_) => config.file_format()?,
            None => path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(FileFormat::from_extension)
                .map_or_else(|| config.file_format(), Ok)?,
        };
        DestinationTarget::file(path, format)
    };

    let factor = u32::try_from(oversampling)?;
    let (Some(generator_rate), Some(generator_frames)) = (
        spec.sample_rate.checked_mul(factor),
        output_frames.checked_mul(u64::from(factor)),
    ) else {
        anyhow::bail!(
            "{} Hz at {oversampling}x oversampling is out of range",
            spec.sample_rate
        );
    };

    let generator = SignalGenerator::new(
        args.signal,
        source_channels,
        generator_rate,
        generator_frames,
    )
    .with_amplitude(args.amplitude)
    .with_frequency(args.freq);

    let io = IoOptions {
        buffer_budget_bytes: config.io.buffer_budget_bytes,
        device_queue_chunks: config.io.device_queue_chunks,
        critical_fraction: config.io.critical_fraction,
        drain_timeout: config.io.drain_timeout(),
    };

    let mut request = RenderRequest::new(spec)
        .source_channels(source_channels)
        .oversampling(oversampling)
        .dither(config.dither_kind()?)
        .io(io)
        .error_notifier(|failure| eprintln!("Render error: {failure}"));
    if let Some(metering) = &config.metering {
        request = request.metering(MeteringConfig::mute_above(
            metering.window_seconds,
            metering.mute_threshold,
        ));
    }

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(output_frames)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames {msg}")?
            .progress_chars("##-"),
    );
    let bar = pb.clone();
    request = request.progress(ProgressConfig::new(config.progress.tick(), move |snapshot| {
        bar.set_position(snapshot.frames);
        match snapshot.loading {
            Some(loading) if loading.is_critical() => bar.set_message("(buffer low)"),
            _ => bar.set_message(""),
        }
    }));

    println!(
        "Rendering {:.3}s of {:?} to {} ({} Hz, {}, {})",
        args.duration, args.signal, target, spec.sample_rate, spec.channels, spec.bits
    );

    let Some(session) = Renderer::start(generator, move || Some(target), request)? else {
        return Ok(());
    };

    let cancel = session.cancel_token();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        cancel.cancel();
    })?;

    let outcome = session.wait();
    pb.finish_and_clear();
    report(&outcome, spec.sample_rate)
}

fn apply_overrides(config: &mut RenderConfig, args: &RenderArgs) {
    if let Some(rate) = args.sample_rate {
        config.output.sample_rate = rate;
    }
    if let Some(channels) = args.channels {
        config.output.channels = channels;
    }
    if let Some(bits) = args.bits {
        config.output.bits = bits;
    }
    if let Some(factor) = args.oversampling {
        config.output.oversampling = factor;
    }
    if let Some(format) = &args.format {
        config.output.format.clone_from(format);
    }
    if let Some(kind) = &args.dither {
        config.dither.kind.clone_from(kind);
    }
    if let Some(threshold) = args.mute_above {
        let mut metering = config.metering.clone().unwrap_or_default();
        metering.mute_threshold = threshold;
        config.metering = Some(metering);
    }
}

fn report(outcome: &RenderOutcome, sample_rate: u32) -> anyhow::Result<()> {
    let seconds = outcome.frames as f64 / f64::from(sample_rate);
    println!(
        "Rendered {} frames ({:.3}s) in {:.2?}",
        outcome.frames, seconds, outcome.elapsed
    );

    let clip = outcome.clip;
    if clip.has_clipping() {
        eprintln!(
            "Warning: {} of {} samples clipped ({:.2}%), peak {:.3}. Suggested gain: {:.3}",
            clip.clipped_samples,
            clip.total_samples,
            clip.clipped_ratio() * 100.0,
            clip.max_clip_extent,
            clip.suggested_gain()
        );
    }

    if let Some(failure) = &outcome.failure {
        anyhow::bail!("Render failed: {failure}");
    }
    if outcome.cancelled {
        println!("Render cancelled");
    }
    Ok(())
}
