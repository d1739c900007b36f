//! Bounce Core - streaming render DSP for offline audio export
//!
//! This crate holds the sample-format model and the per-chunk processing chain
//! that sits between a sample generator and a file or device destination.
//!
//! # Core Abstractions
//!
//! ## Format model
//!
//! - [`Channels`], [`BitDepth`], [`SampleSpec`] - supported output layouts
//! - [`FileFormat`] - WAV or AIFF container selection
//! - [`quantize`] / [`dequantize`] - shared float ↔ integer code rule
//!
//! ## Render chain
//!
//! - [`RenderStage`] - decimation → metering/auto-mute → downmix → clip → dither
//! - [`PeakWindow`] - sliding-window peak tracker with O(log n) max
//! - [`Dither`] / [`DitherKind`] - bit-depth reduction dither
//!
//! ## Statistics
//!
//! - [`RenderCounters`] - lock-free counters shared with progress observers
//! - [`ClipInfo`] - immutable clipping report produced at completion
//!
//! # Example
//!
//! ```rust
//! use bounce_core::{BitDepth, Channels, Dither, DitherKind, RenderStage};
//!
//! let mut stage = RenderStage::new(Channels::Stereo, Channels::Mono, 2)
//!     .with_dither(Dither::new(DitherKind::None, BitDepth::Sixteen));
//!
//! // Four stereo frames at 2x oversampling become two mono frames.
//! let mut chunk = [0.5, 0.5, 0.1, 0.3, 2.0, 2.0, 0.2, 0.4];
//! let out = stage.process(&mut chunk);
//! assert_eq!(out.len(), 2);
//! assert!((out[0] - 0.2).abs() < 1e-6);
//! assert!((out[1] - 0.3).abs() < 1e-6);
//! assert_eq!(stage.clip_info().clipped_samples, 0);
//! ```

pub mod clip;
pub mod dither;
pub mod format;
pub mod meter;
pub mod quantize;
pub mod stage;

pub use clip::{ClipInfo, RenderCounters, clamp_points};
pub use dither::{Dither, DitherKind};
pub use format::{BitDepth, Channels, FileFormat, SampleSpec};
pub use meter::{MAX_WINDOW_LEN, MAX_WINDOW_SECONDS, NON_FINITE_PEAK, PeakWindow, sanitize_peak};
pub use quantize::{dequantize, quantize};
pub use stage::{MeterCallback, RenderStage};
