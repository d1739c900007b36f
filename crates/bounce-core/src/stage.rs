//! Per-chunk render DSP chain.
//!
//! [`RenderStage`] transforms each chunk a generator hands over, in place,
//! before it reaches the destination:
//!
//! ```text
//! decimate (factor > 1) → meter + auto-mute → down/upmix → clip → dither (8/16-bit)
//! ```
//!
//! Stereo sources feeding mono output are averaged; mono sources feeding
//! stereo output are duplicated into both channels through a scratch buffer
//! owned by the stage.
//!
//! The stage is stateful across chunks: the decimation phase (`carry`), the
//! peak window, the dither error memory and the running clip counters all
//! persist from one call to the next, so splitting a stream into chunks of any
//! size yields the same output as processing it in one pass.

use crate::{Channels, ClipInfo, Dither, PeakWindow, RenderCounters, clamp_points, sanitize_peak};
use std::sync::Arc;

/// Metering decision callback: `(short_max, long_max) -> mute`.
///
/// `short_max` is the loudest frame peak in the current chunk, `long_max` the
/// loudest in the whole trailing window.
pub type MeterCallback = Box<dyn FnMut(f32, f32) -> bool + Send>;

struct Metering {
    window: PeakWindow,
    callback: MeterCallback,
    muted: bool,
}

/// Streaming decimation / metering / downmix / clip / dither chain.
pub struct RenderStage {
    source_channels: Channels,
    output_channels: Channels,
    oversampling: usize,
    carry: usize,
    metering: Option<Metering>,
    dither: Option<Dither>,
    counters: Arc<RenderCounters>,
    upmix: Vec<f32>,
}

impl RenderStage {
    /// Create a stage converting `source_channels` frames at `oversampling`×
    /// the output rate into `output_channels` frames.
    ///
    /// `oversampling` must be at least 1; zero is treated as 1.
    pub fn new(source_channels: Channels, output_channels: Channels, oversampling: usize) -> Self {
        debug_assert!(oversampling >= 1, "oversampling factor must be >= 1");
        Self {
            source_channels,
            output_channels,
            oversampling: oversampling.max(1),
            carry: 0,
            metering: None,
            dither: None,
            counters: Arc::new(RenderCounters::new()),
            upmix: Vec::new(),
        }
    }

    /// Enable metering with the given window and mute callback.
    pub fn with_metering(mut self, window: PeakWindow, callback: MeterCallback) -> Self {
        self.metering = Some(Metering {
            window,
            callback,
            muted: false,
        });
        self
    }

    /// Enable dither. `None` leaves dither off.
    pub fn with_dither(mut self, dither: Option<Dither>) -> Self {
        self.dither = dither;
        self
    }

    /// Share an existing counter block instead of the stage's own.
    pub fn with_counters(mut self, counters: Arc<RenderCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Counters written by this stage.
    pub fn counters(&self) -> &Arc<RenderCounters> {
        &self.counters
    }

    /// Decimation phase carried into the next chunk, in `0..oversampling`.
    pub fn carry(&self) -> usize {
        self.carry
    }

    /// Whether the last metered chunk was muted.
    pub fn is_muted(&self) -> bool {
        self.metering.as_ref().is_some_and(|m| m.muted)
    }

    /// Channel layout of the processed output.
    pub fn output_channels(&self) -> Channels {
        self.output_channels
    }

    /// Whether the stage dithers its output.
    pub fn is_dithered(&self) -> bool {
        self.dither.is_some()
    }

    /// Clip statistics accumulated so far.
    pub fn clip_info(&self) -> ClipInfo {
        self.counters.clip_info()
    }

    /// Run the chain over one chunk of interleaved source points.
    ///
    /// Returns the processed points laid out as
    /// [`output_channels`](Self::output_channels): a prefix of `points`, or
    /// the stage's scratch buffer when a mono source is widened to stereo. It
    /// may be empty when decimation keeps no frame from this chunk. A trailing
    /// partial frame is ignored.
    pub fn process<'a>(&'a mut self, points: &'a mut [f32]) -> &'a mut [f32] {
        let source_width = self.source_channels.count();
        debug_assert_eq!(points.len() % source_width, 0, "partial frame in chunk");

        let frames = self.decimate(points);
        if frames == 0 {
            return &mut points[..0];
        }
        let source = &mut points[..frames * source_width];

        self.meter(source);

        let out = match (self.source_channels, self.output_channels) {
            (Channels::Stereo, Channels::Mono) => downmix(source),
            (Channels::Mono, Channels::Stereo) => upmix(source, &mut self.upmix),
            _ => source,
        };

        let (clipped, extent) = clamp_points(out);
        self.counters.add_clipped(clipped, extent);

        if let Some(dither) = self.dither.as_mut() {
            dither.apply(self.output_channels, out);
        }
        out
    }

    /// Keep every `oversampling`-th frame, carrying the phase across calls.
    ///
    /// Frame `i` survives when `(carry + i + 1) % factor == 0`, so over any
    /// split of the stream the kept count is `⌊(n + carry_in) / factor⌋`.
    fn decimate(&mut self, points: &mut [f32]) -> usize {
        let width = self.source_channels.count();
        let frames = points.len() / width;
        let factor = self.oversampling;
        if factor == 1 {
            return frames;
        }

        let mut kept = 0;
        let first = factor - 1 - self.carry;
        for i in (first..frames).step_by(factor) {
            points.copy_within(i * width..(i + 1) * width, kept * width);
            kept += 1;
        }
        self.carry = (self.carry + frames) % factor;
        kept
    }

    fn meter(&mut self, source: &mut [f32]) {
        let Some(metering) = self.metering.as_mut() else {
            return;
        };
        let width = self.source_channels.count();

        let mut short_max = 0.0f32;
        for frame in source.chunks_exact(width) {
            let peak = frame
                .iter()
                .fold(0.0f32, |acc, &v| acc.max(sanitize_peak(v)));
            metering.window.push(peak);
            short_max = short_max.max(peak);
        }
        let long_max = metering.window.max();

        let mute = (metering.callback)(short_max, long_max);
        if mute != metering.muted {
            #[cfg(feature = "tracing")]
            tracing::debug!(mute, short_max, long_max, "metering mute state changed");
            metering.muted = mute;
        }
        if mute {
            source.fill(0.0);
        }
    }
}

impl std::fmt::Debug for RenderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStage")
            .field("source_channels", &self.source_channels)
            .field("output_channels", &self.output_channels)
            .field("oversampling", &self.oversampling)
            .field("carry", &self.carry)
            .field("metering", &self.metering.is_some())
            .field("dither", &self.dither.as_ref().map(Dither::kind))
            .finish_non_exhaustive()
    }
}

/// Average interleaved stereo pairs into mono points at the front of the slice.
fn downmix(points: &mut [f32]) -> &mut [f32] {
    let frames = points.len() / 2;
    for i in 0..frames {
        points[i] = 0.5 * (points[2 * i] + points[2 * i + 1]);
    }
    &mut points[..frames]
}

/// Duplicate mono points into interleaved stereo pairs in `scratch`.
fn upmix<'a>(points: &[f32], scratch: &'a mut Vec<f32>) -> &'a mut [f32] {
    scratch.clear();
    scratch.extend(points.iter().flat_map(|&v| [v, v]));
    scratch.as_mut_slice()
}
