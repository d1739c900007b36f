//! Progress polling for a running render.
//!
//! The observer runs on its own thread, wakes every tick, reads the render
//! counters (relaxed atomics, no locks) and hands a [`ProgressSnapshot`] to
//! the caller's callback. It emits one last snapshot after the render
//! finishes and stops when its owning session is dropped.

use crate::{BufferLoading, LoadingProbe};
use bounce_core::RenderCounters;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Progress callback, run on the observer thread.
pub type ProgressCallback = Box<dyn FnMut(&ProgressSnapshot) + Send>;

/// Point-in-time view of a render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Frames delivered to the destination.
    pub frames: u64,
    /// Points clamped so far.
    pub clipped: u64,
    /// Largest clipped magnitude so far.
    pub max_clip_extent: f32,
    /// Time since the render started.
    pub elapsed: Duration,
    /// Queue fullness, for device destinations.
    pub loading: Option<BufferLoading>,
    /// The render has completed.
    pub finished: bool,
}

impl ProgressSnapshot {
    /// Rendered duration in seconds of output audio.
    pub fn rendered_secs(&self, sample_rate: u32) -> f64 {
        self.frames as f64 / f64::from(sample_rate.max(1))
    }
}

/// Progress observer settings.
pub struct ProgressConfig {
    /// Polling interval.
    pub tick: Duration,
    callback: ProgressCallback,
}

impl ProgressConfig {
    /// Call `callback` every `tick`.
    pub fn new(tick: Duration, callback: impl FnMut(&ProgressSnapshot) + Send + 'static) -> Self {
        Self {
            tick,
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for ProgressConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressConfig")
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

/// Shared state the observer and the session read snapshots from.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotSource {
    pub(crate) counters: Arc<RenderCounters>,
    pub(crate) probe: Arc<OnceLock<LoadingProbe>>,
    pub(crate) finished: Arc<AtomicBool>,
    pub(crate) started: Instant,
}

impl SnapshotSource {
    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        // Read the flag first so a finished snapshot carries final counts.
        let finished = self.finished.load(Ordering::Acquire);
        ProgressSnapshot {
            frames: self.counters.frames(),
            clipped: self.counters.clipped(),
            max_clip_extent: self.counters.max_clip_extent(),
            elapsed: self.started.elapsed(),
            loading: self.probe.get().map(LoadingProbe::snapshot),
            finished,
        }
    }
}

/// Background thread polling render progress.
///
/// Dropping it stops the thread and joins it; the render itself is not
/// affected.
#[derive(Debug)]
pub struct ProgressObserver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressObserver {
    pub(crate) fn spawn(config: ProgressConfig, source: SnapshotSource) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let ProgressConfig { tick, mut callback } = config;
        let tick = tick.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("bounce-progress".into())
            .spawn(move || {
                loop {
                    thread::park_timeout(tick);
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    let snapshot = source.snapshot();
                    callback(&snapshot);
                    if snapshot.finished {
                        break;
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop polling and wait for the observer thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Wait for the observer to deliver its final snapshot and exit.
    ///
    /// Only valid once the render has finished.
    pub(crate) fn join_finished(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("progress callback panicked");
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("progress callback panicked");
            }
        }
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
