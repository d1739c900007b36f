//! Render orchestration: one worker thread per session.
//!
//! [`Renderer::start`] validates a [`RenderRequest`], asks the caller's
//! selector for a [`DestinationTarget`], builds all per-render state and
//! moves it into a named worker thread. The worker:
//!
//! 1. opens the [`Destination`]
//! 2. drives the [`Generator`], whose sink runs the [`RenderStage`] chain and
//!    posts each processed chunk
//! 3. finishes the destination (`aborted` on cancel or failure) and drops it
//! 4. sends the [`RenderOutcome`] from a drop guard, so completion fires even
//!    if the worker unwinds
//!
//! The caller talks to the worker only through the [`CancelToken`], the
//! shared [`RenderCounters`], and the one-shot completion channel held by
//! [`RenderSession`].

use crate::progress::SnapshotSource;
use crate::{
    Destination, DestinationHandler, DestinationTarget, Error, IoOptions, LoadingProbe,
    ProgressConfig, ProgressObserver, ProgressSnapshot, Result,
};
use bounce_core::{
    BitDepth, Channels, ClipInfo, Dither, DitherKind, MAX_WINDOW_SECONDS, MeterCallback, PeakWindow,
    RenderCounters, RenderStage, SampleSpec,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError, sync_channel};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared between a session and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe from any thread, idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Returned by [`FrameSink::write`] once the render can accept no more data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("render sink closed")]
pub struct SinkClosed;

/// Where a generator delivers interleaved frames.
pub trait FrameSink {
    /// Process and deliver one chunk. The chunk is used as scratch space.
    ///
    /// Fails once the render is cancelled or the destination has failed; the
    /// generator should then return.
    fn write(&mut self, points: &mut [f32]) -> std::result::Result<(), SinkClosed>;
}

/// Generator result. Errors become [`RenderFailure::Synthesis`].
pub type GeneratorResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A sample source driven on the render worker.
///
/// Produces interleaved frames in `[-1, 1]` at `sample_rate × oversampling`
/// in the request's source channel layout, and returns when exhausted or when
/// `cancel` is set.
pub trait Generator: Send {
    /// Run to completion, writing every chunk to `sink`.
    fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancelToken) -> GeneratorResult;
}

impl<F> Generator for F
where
    F: FnMut(&mut dyn FrameSink, &CancelToken) -> GeneratorResult + Send,
{
    fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancelToken) -> GeneratorResult {
        self(sink, cancel)
    }
}

/// Why a render stopped early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderFailure {
    /// The generator returned an error or panicked.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The destination could not be opened, written or finalized.
    #[error("destination failed: {0}")]
    Destination(String),
}

/// Completion report of a render session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    /// Clipping statistics over everything delivered.
    pub clip: ClipInfo,
    /// Frames delivered to the destination.
    pub frames: u64,
    /// Cancellation was requested before the worker finished.
    pub cancelled: bool,
    /// Set when the render failed.
    pub failure: Option<RenderFailure>,
    /// Wall time from start to completion.
    pub elapsed: Duration,
}

impl RenderOutcome {
    /// Ran to the generator's end without failure or cancellation.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

/// Blocking error notifier, called once on the worker thread before
/// completion fires.
pub type ErrorNotifier = Box<dyn FnOnce(&RenderFailure) + Send>;

/// Completion callback, called on the worker thread after the destination
/// has been released.
pub type CompletionCallback = Box<dyn FnOnce(&RenderOutcome) + Send>;

/// Peak metering with auto-mute.
pub struct MeteringConfig {
    /// Sliding window length in seconds of output audio.
    pub window_seconds: f32,
    callback: MeterCallback,
}

impl MeteringConfig {
    /// Meter with a custom `(short_max, long_max) -> mute` decision.
    pub fn new(window_seconds: f32, callback: impl FnMut(f32, f32) -> bool + Send + 'static) -> Self {
        Self {
            window_seconds,
            callback: Box::new(callback),
        }
    }

    /// Mute while the window's loudest peak exceeds `threshold`.
    pub fn mute_above(window_seconds: f32, threshold: f32) -> Self {
        Self::new(window_seconds, move |_, long_max| long_max > threshold)
    }
}

impl std::fmt::Debug for MeteringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteringConfig")
            .field("window_seconds", &self.window_seconds)
            .finish_non_exhaustive()
    }
}

/// Everything a render needs besides the generator and destination.
pub struct RenderRequest {
    spec: SampleSpec,
    source_channels: Channels,
    oversampling: usize,
    dither: DitherKind,
    metering: Option<MeteringConfig>,
    io: IoOptions,
    progress: Option<ProgressConfig>,
    error_notifier: Option<ErrorNotifier>,
    on_complete: Option<CompletionCallback>,
}

impl RenderRequest {
    /// Render `spec` output from a generator with the same channel layout,
    /// no oversampling, triangular dither and no metering.
    pub fn new(spec: SampleSpec) -> Self {
        Self {
            spec,
            source_channels: spec.channels,
            oversampling: 1,
            dither: DitherKind::default(),
            metering: None,
            io: IoOptions::default(),
            progress: None,
            error_notifier: None,
            on_complete: None,
        }
    }

    /// Build from raw header-style values, rejecting unsupported ones.
    pub fn from_raw(channels: u16, bits: u16, sample_rate: u32) -> Result<Self> {
        let channels = Channels::from_count(channels)
            .ok_or_else(|| Error::Config(format!("unsupported channel count {channels}")))?;
        let bits = BitDepth::from_bits(bits)
            .ok_or_else(|| Error::Config(format!("unsupported bit depth {bits}")))?;
        Ok(Self::new(SampleSpec::new(channels, bits, sample_rate)))
    }

    /// Output format.
    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    /// Channel layout the generator produces. Stereo into mono output is
    /// downmixed; mono into stereo output is duplicated into both channels.
    pub fn source_channels(mut self, channels: Channels) -> Self {
        self.source_channels = channels;
        self
    }

    /// Generator rate multiple of the output rate.
    pub fn oversampling(mut self, factor: usize) -> Self {
        self.oversampling = factor;
        self
    }

    /// Dither algorithm for 8/16-bit output.
    pub fn dither(mut self, kind: DitherKind) -> Self {
        self.dither = kind;
        self
    }

    /// Enable metering and auto-mute.
    pub fn metering(mut self, metering: MeteringConfig) -> Self {
        self.metering = Some(metering);
        self
    }

    /// Destination tunables.
    pub fn io(mut self, io: IoOptions) -> Self {
        self.io = io;
        self
    }

    /// Poll progress on an observer thread.
    pub fn progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Notify failures on the worker thread.
    pub fn error_notifier(mut self, notifier: impl FnOnce(&RenderFailure) + Send + 'static) -> Self {
        self.error_notifier = Some(Box::new(notifier));
        self
    }

    /// Run `callback` on the worker thread once the render is done.
    pub fn on_complete(mut self, callback: impl FnOnce(&RenderOutcome) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.oversampling == 0 {
            return Err(Error::Config("oversampling factor must be at least 1".into()));
        }
        if self.spec.sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".into()));
        }
        let generator_rate = u32::try_from(self.oversampling)
            .ok()
            .and_then(|factor| self.spec.sample_rate.checked_mul(factor));
        if generator_rate.is_none() {
            return Err(Error::Config(format!(
                "generator rate {} Hz x {} does not fit in 32 bits",
                self.spec.sample_rate, self.oversampling
            )));
        }
        if let Some(metering) = &self.metering
            && PeakWindow::duration_len(self.spec.sample_rate, metering.window_seconds).is_none()
        {
            return Err(Error::Config(format!(
                "invalid metering window {}s (must be in (0, {MAX_WINDOW_SECONDS}])",
                metering.window_seconds
            )));
        }
        if !(0.0..=1.0).contains(&self.io.critical_fraction) {
            return Err(Error::Config(format!(
                "critical fraction {} outside [0, 1]",
                self.io.critical_fraction
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRequest")
            .field("spec", &self.spec)
            .field("source_channels", &self.source_channels)
            .field("oversampling", &self.oversampling)
            .field("dither", &self.dither)
            .field("metering", &self.metering)
            .field("io", &self.io)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

/// Entry point for starting renders.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer;

impl Renderer {
    /// Start a render.
    ///
    /// Configuration errors are returned before anything else happens. The
    /// selector then runs on the calling thread; if it returns `None` no
    /// session is created and `Ok(None)` is returned. Otherwise the worker is
    /// spawned and the running session returned.
    pub fn start<G, S>(generator: G, select: S, request: RenderRequest) -> Result<Option<RenderSession>>
    where
        G: Generator + 'static,
        S: FnOnce() -> Option<DestinationTarget>,
    {
        request.validate()?;
        let Some(target) = select() else {
            tracing::debug!("destination selection declined");
            return Ok(None);
        };

        let RenderRequest {
            spec,
            source_channels,
            oversampling,
            dither,
            metering,
            io,
            progress,
            error_notifier,
            on_complete,
        } = request;

        let counters = Arc::new(RenderCounters::new());
        let mut stage = RenderStage::new(source_channels, spec.channels, oversampling)
            .with_counters(Arc::clone(&counters))
            .with_dither(Dither::new(dither, spec.bits));
        if let Some(MeteringConfig {
            window_seconds,
            callback,
        }) = metering
        {
            let window = PeakWindow::for_duration(spec.sample_rate, window_seconds)
                .ok_or_else(|| Error::Config(format!("invalid metering window {window_seconds}s")))?;
            stage = stage.with_metering(window, callback);
        }

        let cancel = CancelToken::new();
        let source = SnapshotSource {
            counters: Arc::clone(&counters),
            probe: Arc::new(OnceLock::new()),
            finished: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
        };
        let observer = progress
            .map(|config| ProgressObserver::spawn(config, source.clone()))
            .transpose()?;

        let (done_tx, done_rx) = sync_channel(1);
        let completion = Completion {
            tx: done_tx,
            source: source.clone(),
            cancel: cancel.clone(),
            on_complete,
        };
        let worker = Worker {
            generator,
            target,
            spec,
            io,
            stage,
            cancel: cancel.clone(),
            probe: Arc::clone(&source.probe),
            notifier: error_notifier,
        };

        tracing::info!(
            destination = %worker.target,
            channels = %spec.channels,
            bits = %spec.bits,
            sample_rate = spec.sample_rate,
            oversampling,
            dither = dither.name(),
            "render started"
        );

        let handle = thread::Builder::new()
            .name("bounce-render".into())
            .spawn(worker_entry(worker, completion))?;

        Ok(Some(RenderSession {
            spec,
            cancel,
            source,
            done: done_rx,
            outcome: None,
            worker: Some(handle),
            observer,
        }))
    }
}

/// Handle to a running render.
///
/// Modal use: [`wait`](Self::wait). Non-modal use: poll
/// [`try_outcome`](Self::try_outcome) and drop the session when done.
/// Dropping stops the progress observer; it never blocks on the worker,
/// which runs on to completion in the background.
#[derive(Debug)]
pub struct RenderSession {
    spec: SampleSpec,
    cancel: CancelToken,
    source: SnapshotSource,
    done: Receiver<RenderOutcome>,
    outcome: Option<RenderOutcome>,
    worker: Option<JoinHandle<()>>,
    observer: Option<ProgressObserver>,
}

impl RenderSession {
    /// Output format.
    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this render, for use from other threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current counters.
    pub fn progress(&self) -> ProgressSnapshot {
        self.source.snapshot()
    }

    /// Buffer loading of a device destination, once it is open.
    pub fn loading_probe(&self) -> Option<LoadingProbe> {
        self.source.probe.get().cloned()
    }

    /// Whether the completion signal has fired.
    pub fn is_finished(&mut self) -> bool {
        self.try_outcome().is_some()
    }

    /// The outcome, if the render has completed.
    pub fn try_outcome(&mut self) -> Option<&RenderOutcome> {
        if self.outcome.is_none() {
            match self.done.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.outcome = Some(self.lost_worker()),
            }
        }
        self.outcome.as_ref()
    }

    /// Block until the render completes and dispose of the session.
    pub fn wait(mut self) -> RenderOutcome {
        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            None => self.done.recv().unwrap_or_else(|_| self.lost_worker()),
        };
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            tracing::warn!("render worker panicked after completion");
        }
        if let Some(observer) = self.observer.take() {
            observer.join_finished();
        }
        outcome
    }

    fn lost_worker(&self) -> RenderOutcome {
        let snapshot = self.source.snapshot();
        RenderOutcome {
            clip: self.source.counters.clip_info(),
            frames: snapshot.frames,
            cancelled: self.cancel.is_cancelled(),
            failure: Some(RenderFailure::Synthesis(
                "render worker exited without reporting".into(),
            )),
            elapsed: snapshot.elapsed,
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.stop();
        }
    }
}

/// Thread body for a render worker.
///
/// The completion guard is armed only once the thread runs, so a closure
/// dropped by a failed spawn never reports an outcome.
fn worker_entry<G: Generator + 'static>(
    worker: Worker<G>,
    completion: Completion,
) -> impl FnOnce() + Send + 'static {
    move || worker.run(completion.arm())
}

struct Worker<G> {
    generator: G,
    target: DestinationTarget,
    spec: SampleSpec,
    io: IoOptions,
    stage: RenderStage,
    cancel: CancelToken,
    probe: Arc<OnceLock<LoadingProbe>>,
    notifier: Option<ErrorNotifier>,
}

impl<G: Generator> Worker<G> {
    fn run(self, mut guard: CompletionGuard) {
        let Worker {
            mut generator,
            target,
            spec,
            io,
            stage,
            cancel,
            probe,
            notifier,
        } = self;

        let failure = match Destination::create(&target, spec, &io) {
            Err(e) => Some(RenderFailure::Destination(e.to_string())),
            Ok(mut destination) => {
                if let Some(p) = destination.loading_probe() {
                    let _ = probe.set(p);
                }
                let mut failure = drive(&mut generator, stage, &mut destination, &cancel);
                let aborted = failure.is_some() || cancel.is_cancelled();
                if let Err(e) = destination.finish(aborted) {
                    failure.get_or_insert(RenderFailure::Destination(e.to_string()));
                }
                drop(destination);
                failure
            }
        };

        if let Some(failure) = &failure {
            tracing::error!(error = %failure, destination = %target, "render failed");
            if let Some(notify) = notifier {
                notify(failure);
            }
        }
        guard.failure = failure;
    }
}

/// Run the generator against the stage and destination, catching panics.
fn drive<G: Generator>(
    generator: &mut G,
    stage: RenderStage,
    destination: &mut Destination,
    cancel: &CancelToken,
) -> Option<RenderFailure> {
    let mut sink = StageSink {
        stage,
        destination,
        cancel,
        error: None,
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| generator.run(&mut sink, cancel)));

    if let Some(e) = sink.error.take() {
        return Some(RenderFailure::Destination(e.to_string()));
    }
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) if e.is::<SinkClosed>() && cancel.is_cancelled() => None,
        Ok(Err(e)) => Some(RenderFailure::Synthesis(e.to_string())),
        Err(payload) => Some(RenderFailure::Synthesis(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("generator panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("generator panicked: {s}")
    } else {
        "generator panicked".into()
    }
}

/// The generator's view of the pipeline: DSP stage, then destination.
struct StageSink<'a> {
    stage: RenderStage,
    destination: &'a mut Destination,
    cancel: &'a CancelToken,
    error: Option<Error>,
}

impl FrameSink for StageSink<'_> {
    fn write(&mut self, points: &mut [f32]) -> std::result::Result<(), SinkClosed> {
        if self.error.is_some() || self.cancel.is_cancelled() {
            return Err(SinkClosed);
        }
        let width = self.stage.output_channels().count();
        let out = self.stage.process(points);
        if out.is_empty() {
            return Ok(());
        }
        let delivered = out.len();
        match self.destination.post(out) {
            Ok(()) => {
                self.stage
                    .counters()
                    .add_delivered((delivered / width) as u64, delivered as u64);
                Ok(())
            }
            Err(e) => {
                self.error = Some(e);
                Err(SinkClosed)
            }
        }
    }
}

/// Completion wiring, inert until [`arm`](Self::arm)ed on the worker thread.
struct Completion {
    tx: SyncSender<RenderOutcome>,
    source: SnapshotSource,
    cancel: CancelToken,
    on_complete: Option<CompletionCallback>,
}

impl Completion {
    fn arm(self) -> CompletionGuard {
        CompletionGuard {
            tx: self.tx,
            source: self.source,
            cancel: self.cancel,
            on_complete: self.on_complete,
            failure: None,
        }
    }
}

/// Sends the outcome when the worker exits, however it exits.
struct CompletionGuard {
    tx: SyncSender<RenderOutcome>,
    source: SnapshotSource,
    cancel: CancelToken,
    on_complete: Option<CompletionCallback>,
    failure: Option<RenderFailure>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let mut failure = self.failure.take();
        if failure.is_none() && thread::panicking() {
            failure = Some(RenderFailure::Synthesis("render worker panicked".into()));
        }
        let outcome = RenderOutcome {
            clip: self.source.counters.clip_info(),
            frames: self.source.counters.frames(),
            cancelled: self.cancel.is_cancelled(),
            failure,
            elapsed: self.source.started.elapsed(),
        };
        self.source.finished.store(true, Ordering::Release);

        tracing::info!(
            frames = outcome.frames,
            clipped = outcome.clip.clipped_samples,
            cancelled = outcome.cancelled,
            failed = outcome.failure.is_some(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "render finished"
        );
        if outcome.clip.has_clipping() {
            tracing::warn!(
                clipped = outcome.clip.clipped_samples,
                max_extent = outcome.clip.max_clip_extent,
                suggested_gain = outcome.clip.suggested_gain(),
                "output clipped"
            );
        }

        if let Some(callback) = self.on_complete.take()
            && !thread::panicking()
        {
            callback(&outcome);
        }
        let _ = self.tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;

    fn mono16() -> SampleSpec {
        SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 1000)
    }

    fn constant(value: f32, frames: usize, width: usize) -> impl Generator {
        let mut left = frames;
        move |sink: &mut dyn FrameSink, cancel: &CancelToken| -> GeneratorResult {
            let mut block = vec![0.0f32; 64 * width];
            while left > 0 && !cancel.is_cancelled() {
                let n = left.min(64);
                block[..n * width].fill(value);
                sink.write(&mut block[..n * width])?;
                left -= n;
            }
            Ok(())
        }
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let zero = RenderRequest::new(mono16()).oversampling(0);
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        let rate = RenderRequest::new(SampleSpec::new(Channels::Mono, BitDepth::Eight, 0));
        assert!(matches!(rate.validate(), Err(Error::Config(_))));

        let window = RenderRequest::new(mono16()).metering(MeteringConfig::mute_above(0.0, 0.9));
        assert!(matches!(window.validate(), Err(Error::Config(_))));

        let huge = RenderRequest::new(mono16()).metering(MeteringConfig::mute_above(1.0e9, 0.9));
        assert!(matches!(huge.validate(), Err(Error::Config(_))));

        let fast = RenderRequest::new(SampleSpec::new(Channels::Mono, BitDepth::Eight, u32::MAX / 2))
            .oversampling(4);
        assert!(matches!(fast.validate(), Err(Error::Config(_))));

        assert!(matches!(
            RenderRequest::from_raw(3, 16, 44100),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RenderRequest::from_raw(2, 20, 44100),
            Err(Error::Config(_))
        ));
        assert!(RenderRequest::from_raw(2, 24, 44100).is_ok());
    }

    #[test]
    fn config_error_never_calls_selector() {
        let mut asked = false;
        let result = Renderer::start(
            constant(0.0, 10, 1),
            || {
                asked = true;
                None
            },
            RenderRequest::new(mono16()).oversampling(0),
        );
        assert!(result.is_err());
        assert!(!asked);
    }

    #[test]
    fn renders_into_memory() {
        let sink = MemorySink::new();
        let target = DestinationTarget::Memory(sink.clone());
        let session = Renderer::start(
            constant(0.25, 300, 2),
            || Some(target),
            RenderRequest::new(mono16())
                .source_channels(Channels::Stereo)
                .oversampling(3)
                .dither(DitherKind::None),
        )
        .unwrap()
        .unwrap();
        let outcome = session.wait();

        assert!(outcome.is_complete());
        assert_eq!(outcome.frames, 100);
        assert_eq!(outcome.clip.total_samples, 100);
        assert!(sink.is_finished());
        assert!(!sink.was_aborted());
        assert!(sink.points().iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn mono_source_fills_both_output_channels() {
        let sink = MemorySink::new();
        let target = DestinationTarget::Memory(sink.clone());
        let spec = SampleSpec::new(Channels::Stereo, BitDepth::Sixteen, 1000);
        let outcome = Renderer::start(
            constant(0.5, 200, 1),
            || Some(target),
            RenderRequest::new(spec)
                .source_channels(Channels::Mono)
                .dither(DitherKind::None),
        )
        .unwrap()
        .unwrap()
        .wait();

        assert!(outcome.is_complete());
        assert_eq!(outcome.frames, 200);
        assert_eq!(outcome.clip.total_samples, 400);
        let points = sink.points();
        assert_eq!(points.len(), 400);
        assert!(points.iter().all(|&v| v == 0.5));
    }

    #[test]
    fn unstarted_worker_never_completes() {
        let (tx, rx) = sync_channel(1);
        let (called_tx, called_rx) = std::sync::mpsc::channel();
        let source = SnapshotSource {
            counters: Arc::new(RenderCounters::new()),
            probe: Arc::new(OnceLock::new()),
            finished: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
        };
        let cancel = CancelToken::new();
        let completion = Completion {
            tx,
            source: source.clone(),
            cancel: cancel.clone(),
            on_complete: Some(Box::new(move |_: &RenderOutcome| {
                called_tx.send(()).unwrap();
            })),
        };
        let worker = Worker {
            generator: constant(0.1, 10, 1),
            target: DestinationTarget::Memory(MemorySink::new()),
            spec: mono16(),
            io: IoOptions::default(),
            stage: RenderStage::new(Channels::Mono, Channels::Mono, 1),
            cancel,
            probe: Arc::clone(&source.probe),
            notifier: None,
        };

        drop(worker_entry(worker, completion));

        assert!(called_rx.try_recv().is_err());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
        assert!(!source.finished.load(Ordering::Acquire));
    }

    #[test]
    fn sink_closes_after_cancel() {
        let sink = MemorySink::new();
        let target = DestinationTarget::Memory(sink.clone());
        let generator = |sink: &mut dyn FrameSink, cancel: &CancelToken| -> GeneratorResult {
            let mut block = [0.1f32; 16];
            sink.write(&mut block)?;
            cancel.cancel();
            sink.write(&mut block)?;
            Err("unreachable after cancel".into())
        };
        let outcome = Renderer::start(generator, || Some(target), RenderRequest::new(mono16()))
            .unwrap()
            .unwrap()
            .wait();

        assert!(outcome.cancelled);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.frames, 16);
        assert!(sink.was_aborted());
    }

    #[test]
    fn on_complete_and_notifier_run_on_worker() {
        let (tx, rx) = std::sync::mpsc::channel();
        let notified = tx.clone();
        let generator = |_: &mut dyn FrameSink, _: &CancelToken| -> GeneratorResult {
            Err("voice table missing".into())
        };
        let session = Renderer::start(
            generator,
            || Some(DestinationTarget::Memory(MemorySink::new())),
            RenderRequest::new(mono16())
                .error_notifier(move |f| notified.send(format!("notify {f}")).unwrap())
                .on_complete(move |o| tx.send(format!("done {}", o.failure.is_some())).unwrap()),
        )
        .unwrap()
        .unwrap();
        let outcome = session.wait();

        assert_eq!(
            outcome.failure,
            Some(RenderFailure::Synthesis("voice table missing".into()))
        );
        let messages: Vec<String> = rx.try_iter().collect();
        assert_eq!(
            messages,
            vec![
                "notify synthesis failed: voice table missing".to_string(),
                "done true".to_string()
            ]
        );
    }

    #[test]
    fn panic_message_extracts_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "generator panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "generator panicked: bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "generator panicked");
    }
}
