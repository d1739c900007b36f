//! Live playback destination via cpal.
//!
//! The render worker and the device callback never share a buffer directly:
//! processed chunks travel through a bounded [`playback_queue`], so `post`
//! blocks once the device is [`IoOptions::device_queue_chunks`] chunks behind
//! and the callback plays silence on underrun. The number of chunks not yet
//! played is published as [`BufferLoading`](crate::BufferLoading).

use crate::{DestinationHandler, Error, IoOptions, LoadingProbe, Result};
use bounce_core::SampleSpec;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError, sync_channel};
use std::time::{Duration, Instant};

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Output device information.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Default channel count.
    pub default_channels: u16,
    /// Whether this is the host's default output.
    pub is_default: bool,
}

fn device_name(device: &cpal::Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// List output devices on the default host.
pub fn list_output_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| device_name(&d).ok());

    let outputs = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;

    let mut devices = Vec::new();
    for device in outputs {
        let Ok(name) = device_name(&device) else {
            continue;
        };
        let (default_sample_rate, default_channels) = device
            .default_output_config()
            .map(|c| (c.sample_rate(), c.channels()))
            .unwrap_or((48000, 2));
        devices.push(AudioDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            default_sample_rate,
            default_channels,
        });
    }
    Ok(devices)
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    let Some(search) = name else {
        return host.default_output_device().ok_or(Error::NoDevice);
    };
    let search_lower = search.to_lowercase();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;
    for device in devices {
        if let Ok(dev_name) = device_name(&device)
            && dev_name.to_lowercase().contains(&search_lower)
        {
            return Ok(device);
        }
    }
    Err(Error::DeviceNotFound(format!(
        "no output device matching '{}'",
        search
    )))
}

/// Create a bounded chunk queue between a producer and a playback callback.
///
/// `capacity` is in chunks and is raised to at least 1.
pub fn playback_queue(capacity: usize) -> (PlaybackQueue, PlaybackReader) {
    let capacity = capacity.max(1);
    let (tx, rx) = sync_channel(capacity);
    let level = Arc::new(AtomicUsize::new(0));
    (
        PlaybackQueue {
            tx,
            level: Arc::clone(&level),
            capacity,
        },
        PlaybackReader {
            rx,
            level,
            pending: Vec::new(),
            pos: 0,
        },
    )
}

/// Producer half of a [`playback_queue`].
#[derive(Debug)]
pub struct PlaybackQueue {
    tx: SyncSender<Vec<f32>>,
    level: Arc<AtomicUsize>,
    capacity: usize,
}

impl PlaybackQueue {
    /// Queue a copy of `points`, blocking while the queue is full.
    ///
    /// Fails with [`Error::Stream`] once the reader is gone.
    pub fn push(&self, points: &[f32]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.level.fetch_add(1, Ordering::Relaxed);
        self.tx.send(points.to_vec()).map_err(|_| {
            self.level.fetch_sub(1, Ordering::Relaxed);
            Error::Stream("playback stream closed".into())
        })
    }

    /// Chunks queued or partially played.
    pub fn level(&self) -> usize {
        self.level.load(Ordering::Relaxed)
    }

    /// Queue capacity in chunks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Probe publishing this queue's level.
    pub fn probe(&self, critical_fraction: f32) -> LoadingProbe {
        let threshold = (self.capacity as f32 * critical_fraction.clamp(0.0, 1.0)).ceil() as usize;
        LoadingProbe::new(Arc::clone(&self.level), self.capacity, threshold)
    }
}

/// Consumer half of a [`playback_queue`], driven by the device callback.
#[derive(Debug)]
pub struct PlaybackReader {
    rx: Receiver<Vec<f32>>,
    level: Arc<AtomicUsize>,
    pending: Vec<f32>,
    pos: usize,
}

impl PlaybackReader {
    /// Fill `out` from the queue without blocking, padding with silence.
    ///
    /// Returns the number of points taken from the queue.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let mut filled = 0;
        while filled < out.len() {
            if self.pos == self.pending.len() {
                match self.rx.try_recv() {
                    Ok(chunk) => {
                        self.pending = chunk;
                        self.pos = 0;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }
            let n = (self.pending.len() - self.pos).min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
            self.pos += n;
            filled += n;
            if self.pos == self.pending.len() {
                self.level.fetch_sub(1, Ordering::Relaxed);
            }
        }
        out[filled..].fill(0.0);
        filled
    }
}

/// Output device destination.
pub struct DeviceSink {
    queue: PlaybackQueue,
    probe: LoadingProbe,
    drain_timeout: Duration,
    finished: bool,
    _stream: Box<dyn Send>,
}

impl DeviceSink {
    /// Open and start an output stream matching `spec`.
    pub fn open(name: Option<&str>, spec: SampleSpec, options: &IoOptions) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_output_device(&host, name)?;
        let device_label = device_name(&device).unwrap_or_else(|_| "unknown".into());

        let stream_config = cpal::StreamConfig {
            channels: spec.channels.count() as u16,
            sample_rate: spec.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let (queue, mut reader) = playback_queue(options.device_queue_chunks);
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    reader.fill(data);
                },
                |err| tracing::error!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;
        stream.play().map_err(|e| Error::Stream(e.to_string()))?;

        tracing::info!(
            device = %device_label,
            channels = stream_config.channels,
            sample_rate = spec.sample_rate,
            queue_chunks = queue.capacity(),
            "output stream started"
        );

        Ok(Self {
            probe: queue.probe(options.critical_fraction),
            queue,
            drain_timeout: options.drain_timeout,
            finished: false,
            _stream: Box::new(stream),
        })
    }

    fn drain(&self) {
        let deadline = Instant::now() + self.drain_timeout;
        while self.queue.level() > 0 {
            if Instant::now() >= deadline {
                tracing::warn!(
                    remaining = self.queue.level(),
                    "playback drain timed out"
                );
                return;
            }
            std::thread::sleep(DRAIN_POLL);
        }
    }
}

impl std::fmt::Debug for DeviceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSink")
            .field("queue", &self.queue)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl DestinationHandler for DeviceSink {
    fn post(&mut self, points: &[f32]) -> Result<()> {
        self.queue.push(points)
    }

    fn finish(&mut self, aborted: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if !aborted {
            self.drain();
        }
        Ok(())
    }

    fn loading_probe(&self) -> Option<LoadingProbe> {
        Some(self.probe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_drains_queue_in_order_then_plays_silence() {
        let (queue, mut reader) = playback_queue(4);
        queue.push(&[0.1, 0.2, 0.3]).unwrap();
        queue.push(&[0.4, 0.5]).unwrap();
        assert_eq!(queue.level(), 2);

        let mut out = [9.0f32; 4];
        assert_eq!(reader.fill(&mut out), 4);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(queue.level(), 1);

        assert_eq!(reader.fill(&mut out), 1);
        assert_eq!(out, [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(queue.level(), 0);
    }

    #[test]
    fn empty_chunks_are_not_queued() {
        let (queue, _reader) = playback_queue(1);
        queue.push(&[]).unwrap();
        assert_eq!(queue.level(), 0);
    }

    #[test]
    fn push_fails_after_reader_dropped() {
        let (queue, reader) = playback_queue(2);
        drop(reader);
        assert!(matches!(queue.push(&[0.5]), Err(Error::Stream(_))));
        assert_eq!(queue.level(), 0);
    }

    #[test]
    fn probe_reports_capacity_and_threshold() {
        let (queue, _reader) = playback_queue(8);
        queue.push(&[0.0; 4]).unwrap();
        let loading = queue.probe(0.25).snapshot();
        assert_eq!(loading.level, 1);
        assert_eq!(loading.maximum, 8);
        assert_eq!(loading.critical_threshold, 2);
        assert!(loading.is_critical());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let (queue, _reader) = playback_queue(0);
        assert_eq!(queue.capacity(), 1);
    }
}
