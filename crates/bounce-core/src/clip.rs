//! Clipping statistics and live render counters.
//!
//! The worker thread owns all writes. [`RenderCounters`] uses relaxed atomics
//! so a progress observer can read them from any thread without locking; a
//! reader may see `frames` and `clipped` from different chunks, which is fine
//! for advisory progress display.

use crate::NON_FINITE_PEAK;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Final clipping report for a finished render.
///
/// Built once when the session completes and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipInfo {
    /// Points written to the destination.
    pub total_samples: u64,
    /// Points whose magnitude exceeded 1.0 before clamping.
    pub clipped_samples: u64,
    /// Largest magnitude seen among clipped points (0.0 if none clipped).
    pub max_clip_extent: f32,
}

impl ClipInfo {
    /// Whether any point was clamped.
    pub fn has_clipping(&self) -> bool {
        self.clipped_samples > 0
    }

    /// Volume scale that would have kept the loudest point within full scale.
    ///
    /// Returns 1.0 when nothing clipped.
    pub fn suggested_gain(&self) -> f32 {
        if self.max_clip_extent > 1.0 {
            1.0 / self.max_clip_extent
        } else {
            1.0
        }
    }

    /// Fraction of points that clipped, in `[0, 1]`.
    pub fn clipped_ratio(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.clipped_samples as f64 / self.total_samples as f64
        }
    }
}

/// Counters updated by the render worker and polled by progress observers.
#[derive(Debug, Default)]
pub struct RenderCounters {
    frames: AtomicU64,
    points: AtomicU64,
    clipped: AtomicU64,
    max_clip_extent: AtomicU32,
}

impl RenderCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames delivered to the destination so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Points delivered to the destination so far.
    pub fn points(&self) -> u64 {
        self.points.load(Ordering::Relaxed)
    }

    /// Points clamped so far.
    pub fn clipped(&self) -> u64 {
        self.clipped.load(Ordering::Relaxed)
    }

    /// Largest clipped magnitude so far.
    pub fn max_clip_extent(&self) -> f32 {
        f32::from_bits(self.max_clip_extent.load(Ordering::Relaxed))
    }

    /// Record a delivered chunk.
    pub fn add_delivered(&self, frames: u64, points: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
        self.points.fetch_add(points, Ordering::Relaxed);
    }

    /// Record clipping found in one chunk.
    pub fn add_clipped(&self, count: u64, extent: f32) {
        if count == 0 {
            return;
        }
        self.clipped.fetch_add(count, Ordering::Relaxed);
        // Single writer, so load-compare-store is race free.
        if extent > self.max_clip_extent() {
            self.max_clip_extent
                .store(extent.to_bits(), Ordering::Relaxed);
        }
    }

    /// Snapshot the counters into a [`ClipInfo`].
    pub fn clip_info(&self) -> ClipInfo {
        ClipInfo {
            total_samples: self.points(),
            clipped_samples: self.clipped(),
            max_clip_extent: self.max_clip_extent(),
        }
    }
}

/// Clamp every point to `[-1, 1]`, returning `(clipped_count, max_extent)`.
///
/// Non-finite points count as clipped with extent [`NON_FINITE_PEAK`];
/// infinities clamp to their sign and `NaN` becomes silence.
pub fn clamp_points(points: &mut [f32]) -> (u64, f32) {
    let mut count = 0u64;
    let mut extent = 0.0f32;
    for point in points.iter_mut() {
        let value = *point;
        if value.is_nan() {
            count += 1;
            extent = extent.max(NON_FINITE_PEAK);
            *point = 0.0;
        } else if value.abs() > 1.0 {
            count += 1;
            let magnitude = if value.is_finite() {
                value.abs()
            } else {
                NON_FINITE_PEAK
            };
            extent = extent.max(magnitude);
            *point = value.signum();
        }
    }
    (count, extent)
}
