//! Bit-depth reduction dither.
//!
//! Dither runs on normalized floats just before the codec packs them, and
//! only for 8- and 16-bit output. The algorithm is picked once per render
//! from the closed [`DitherKind`] set; the codec's quantizer does the final
//! rounding, so every variant here only has to shape the value it hands on.
//!
//! | Kind          | Noise added                         | Error feedback |
//! |---------------|-------------------------------------|----------------|
//! | `None`        | none                                | no             |
//! | `Rectangular` | uniform, ±½ LSB                     | no             |
//! | `Triangular`  | TPDF (difference of two uniforms), ±1 LSB | no       |
//! | `NoiseShaped` | TPDF                                | first-order    |
//!
//! Noise-shaped dither subtracts the previous quantization error of the same
//! channel before adding noise, pushing the error spectrum upwards. Its output
//! is already quantized (returned as the exact normalized code value), so the
//! codec's rounding reproduces the same code.

use crate::{BitDepth, Channels, dequantize, quantize};

/// Dither algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherKind {
    /// Pass samples through untouched.
    None,
    /// Rectangular (flat) dither, ±½ LSB.
    Rectangular,
    /// Triangular (TPDF) dither, ±1 LSB.
    #[default]
    Triangular,
    /// TPDF dither with first-order error-feedback noise shaping.
    NoiseShaped,
}

impl DitherKind {
    /// Parse a kind from its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "off" => Some(DitherKind::None),
            "rectangular" | "rect" => Some(DitherKind::Rectangular),
            "triangular" | "tpdf" => Some(DitherKind::Triangular),
            "noise-shaped" | "noiseshaped" | "shaped" => Some(DitherKind::NoiseShaped),
            _ => None,
        }
    }

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            DitherKind::None => "none",
            DitherKind::Rectangular => "rectangular",
            DitherKind::Triangular => "triangular",
            DitherKind::NoiseShaped => "noise-shaped",
        }
    }
}

const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Per-render dither state.
#[derive(Debug, Clone)]
pub struct Dither {
    kind: DitherKind,
    bits: BitDepth,
    lsb: f32,
    rng: u64,
    error: [f32; 2],
}

impl Dither {
    /// Create dither state for `bits`, or `None` when no dither applies
    /// (24-bit output or [`DitherKind::None`]).
    pub fn new(kind: DitherKind, bits: BitDepth) -> Option<Self> {
        Self::with_seed(kind, bits, DEFAULT_SEED)
    }

    /// Like [`Dither::new`] with an explicit noise seed.
    pub fn with_seed(kind: DitherKind, bits: BitDepth, seed: u64) -> Option<Self> {
        if kind == DitherKind::None || !bits.is_dithered() {
            return None;
        }
        Some(Self {
            kind,
            bits,
            lsb: 1.0 / bits.expander() as f32,
            rng: seed.max(1),
            error: [0.0; 2],
        })
    }

    /// Selected algorithm.
    pub fn kind(&self) -> DitherKind {
        self.kind
    }

    /// Dither an interleaved chunk laid out as `channels`.
    pub fn apply(&mut self, channels: Channels, points: &mut [f32]) {
        match channels {
            Channels::Mono => self.apply_mono(points),
            Channels::Stereo => self.apply_stereo(points),
        }
    }

    /// Dither a mono chunk in place.
    pub fn apply_mono(&mut self, points: &mut [f32]) {
        for point in points.iter_mut() {
            *point = self.process(*point, 0);
        }
    }

    /// Dither an interleaved stereo chunk in place.
    pub fn apply_stereo(&mut self, points: &mut [f32]) {
        for frame in points.chunks_exact_mut(2) {
            frame[0] = self.process(frame[0], 0);
            frame[1] = self.process(frame[1], 1);
        }
    }

    fn process(&mut self, sample: f32, channel: usize) -> f32 {
        match self.kind {
            DitherKind::None => sample,
            DitherKind::Rectangular => sample + (self.next_unit() - 0.5) * self.lsb,
            DitherKind::Triangular => sample + self.tpdf(),
            DitherKind::NoiseShaped => {
                let shaped = sample - self.error[channel] + self.tpdf();
                let quantized = dequantize(quantize(shaped, self.bits), self.bits);
                self.error[channel] = quantized - shaped;
                quantized
            }
        }
    }

    fn tpdf(&mut self) -> f32 {
        (self.next_unit() - self.next_unit()) * self.lsb
    }

    /// Uniform value in `[0, 1)` from a xorshift64 generator.
    fn next_unit(&mut self) -> f32 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        (self.rng >> 40) as f32 / (1u64 << 24) as f32
    }
}
