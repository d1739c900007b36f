//! Destination handlers: where processed render output goes.
//!
//! A render session owns exactly one [`Destination`], built on the worker
//! thread by [`Destination::create`] from a caller-chosen
//! [`DestinationTarget`]. Every destination implements
//! [`DestinationHandler`]; live devices additionally expose queue fullness
//! through a [`LoadingProbe`].

use crate::{AiffWriter, DeviceSink, Result, WavWriter};
use bounce_core::{FileFormat, SampleSpec};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Sink contract for processed, interleaved output points.
///
/// `finish` is called exactly once by the render worker; implementations
/// treat later calls as no-ops. Resources are released on drop.
pub trait DestinationHandler: Send {
    /// Accept a chunk of processed points in the session's output layout.
    fn post(&mut self, points: &[f32]) -> Result<()>;

    /// Flush and finalize. `aborted` is set when the render was cancelled or
    /// failed; file writers still produce a valid (shorter) file.
    fn finish(&mut self, aborted: bool) -> Result<()>;

    /// Buffer fullness telemetry, for destinations that have a queue.
    fn loading_probe(&self) -> Option<LoadingProbe> {
        None
    }
}

/// Queue fullness of a live destination, in chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLoading {
    /// Chunks queued and not yet played.
    pub level: usize,
    /// Queue capacity.
    pub maximum: usize,
    /// Level at or below which the device is about to underrun.
    pub critical_threshold: usize,
}

impl BufferLoading {
    /// Whether playback is close to running dry.
    pub fn is_critical(&self) -> bool {
        self.level <= self.critical_threshold
    }

    /// Fill ratio in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.maximum == 0 {
            0.0
        } else {
            self.level as f32 / self.maximum as f32
        }
    }
}

/// Shareable read handle onto a destination's queue level.
#[derive(Debug, Clone)]
pub struct LoadingProbe {
    level: Arc<AtomicUsize>,
    maximum: usize,
    critical_threshold: usize,
}

impl LoadingProbe {
    pub(crate) fn new(level: Arc<AtomicUsize>, maximum: usize, critical_threshold: usize) -> Self {
        Self {
            level,
            maximum,
            critical_threshold,
        }
    }

    /// Current loading.
    pub fn snapshot(&self) -> BufferLoading {
        BufferLoading {
            level: self.level.load(Ordering::Relaxed).min(self.maximum),
            maximum: self.maximum,
            critical_threshold: self.critical_threshold,
        }
    }
}

/// Tunables for destination construction.
#[derive(Debug, Clone, PartialEq)]
pub struct IoOptions {
    /// Bytes of packed samples buffered before each file write.
    pub buffer_budget_bytes: usize,
    /// Chunks a device destination may queue ahead of playback.
    pub device_queue_chunks: usize,
    /// Fraction of the device queue below which loading is critical.
    pub critical_fraction: f32,
    /// How long a device destination waits for queued audio to play out on
    /// a normal finish.
    pub drain_timeout: Duration,
}

impl Default for IoOptions {
    fn default() -> Self {
        Self {
            buffer_budget_bytes: 64 * 1024,
            device_queue_chunks: 16,
            critical_fraction: 0.25,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    points: Vec<f32>,
    finished: bool,
    aborted: bool,
}

/// In-memory destination collecting processed points.
///
/// Clones share the same buffer, so the caller keeps one handle and passes
/// another to the render as [`DestinationTarget::Memory`].
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every point posted so far.
    pub fn points(&self) -> Vec<f32> {
        self.lock().points.clone()
    }

    /// Number of points posted so far.
    pub fn len(&self) -> usize {
        self.lock().points.len()
    }

    /// Whether nothing has been posted.
    pub fn is_empty(&self) -> bool {
        self.lock().points.is_empty()
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Whether the render finished with `aborted = true`.
    pub fn was_aborted(&self) -> bool {
        self.lock().aborted
    }
}

impl DestinationHandler for MemorySink {
    fn post(&mut self, points: &[f32]) -> Result<()> {
        self.lock().points.extend_from_slice(points);
        Ok(())
    }

    fn finish(&mut self, aborted: bool) -> Result<()> {
        let mut state = self.lock();
        if !state.finished {
            state.finished = true;
            state.aborted = aborted;
        }
        Ok(())
    }
}

impl<W: Write + Seek + Send> DestinationHandler for WavWriter<W> {
    fn post(&mut self, points: &[f32]) -> Result<()> {
        self.write_points(points)
    }

    fn finish(&mut self, _aborted: bool) -> Result<()> {
        WavWriter::finish(self)
    }
}

impl<W: Write + Seek + Send> DestinationHandler for AiffWriter<W> {
    fn post(&mut self, points: &[f32]) -> Result<()> {
        self.write_points(points)
    }

    fn finish(&mut self, _aborted: bool) -> Result<()> {
        AiffWriter::finish(self)
    }
}

/// What the destination selector picked.
#[derive(Debug, Clone)]
pub enum DestinationTarget {
    /// Encode to a file.
    File {
        /// Output path (created or truncated).
        path: PathBuf,
        /// Container format.
        format: FileFormat,
    },
    /// Play on an output device. `None` picks the system default; otherwise
    /// the first device whose name contains the string (case-insensitive).
    Device {
        /// Device name filter.
        name: Option<String>,
    },
    /// Collect into memory.
    Memory(MemorySink),
}

impl DestinationTarget {
    /// File target with an explicit format.
    pub fn file<P: AsRef<Path>>(path: P, format: FileFormat) -> Self {
        DestinationTarget::File {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }

    /// File target with the format taken from the path's extension.
    pub fn file_by_extension<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(FileFormat::from_extension)?;
        Some(Self::file(path, format))
    }

    /// Default output device.
    pub fn default_device() -> Self {
        DestinationTarget::Device { name: None }
    }
}

impl fmt::Display for DestinationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationTarget::File { path, format } => {
                write!(f, "{} file {}", format, path.display())
            }
            DestinationTarget::Device { name: Some(name) } => write!(f, "device '{name}'"),
            DestinationTarget::Device { name: None } => f.write_str("default device"),
            DestinationTarget::Memory(_) => f.write_str("memory"),
        }
    }
}

/// The closed set of destinations a render can write to.
#[derive(Debug)]
pub enum Destination {
    /// WAV file.
    Wav(WavWriter<BufWriter<File>>),
    /// AIFF file.
    Aiff(AiffWriter<BufWriter<File>>),
    /// Live output device.
    Device(DeviceSink),
    /// In-memory buffer.
    Memory(MemorySink),
}

impl Destination {
    /// Build the destination for `target`.
    pub fn create(target: &DestinationTarget, spec: SampleSpec, options: &IoOptions) -> Result<Self> {
        let destination = match target {
            DestinationTarget::File {
                path,
                format: FileFormat::Wav,
            } => Destination::Wav(WavWriter::create(path, spec, options.buffer_budget_bytes)?),
            DestinationTarget::File {
                path,
                format: FileFormat::Aiff,
            } => Destination::Aiff(AiffWriter::create(path, spec, options.buffer_budget_bytes)?),
            DestinationTarget::Device { name } => {
                Destination::Device(DeviceSink::open(name.as_deref(), spec, options)?)
            }
            DestinationTarget::Memory(sink) => Destination::Memory(sink.clone()),
        };
        tracing::debug!(
            destination = %target,
            channels = %spec.channels,
            bits = %spec.bits,
            "destination opened"
        );
        Ok(destination)
    }

    fn handler(&mut self) -> &mut dyn DestinationHandler {
        match self {
            Destination::Wav(w) => w,
            Destination::Aiff(w) => w,
            Destination::Device(d) => d,
            Destination::Memory(m) => m,
        }
    }
}

impl DestinationHandler for Destination {
    fn post(&mut self, points: &[f32]) -> Result<()> {
        self.handler().post(points)
    }

    fn finish(&mut self, aborted: bool) -> Result<()> {
        self.handler().finish(aborted)
    }

    fn loading_probe(&self) -> Option<LoadingProbe> {
        match self {
            Destination::Device(d) => d.loading_probe(),
            _ => None,
        }
    }
}
