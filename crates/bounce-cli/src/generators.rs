//! Built-in test signal generators.

use bounce_core::Channels;
use bounce_io::{CancelToken, FrameSink, Generator, GeneratorResult};
use clap::ValueEnum;
use std::f32::consts::TAU;

/// Frames produced per sink write.
const CHUNK_FRAMES: usize = 1024;

/// Signal shapes for the `render` command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Signal {
    /// Sine tone at `--freq`.
    #[default]
    Tone,
    /// Every point equal to `--amplitude`.
    Constant,
    /// All zeros.
    Silence,
    /// Uniform white noise.
    Noise,
}

/// Finite signal source driven on the render worker.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    signal: Signal,
    channels: usize,
    rate: f32,
    remaining: u64,
    amplitude: f32,
    frequency: f32,
    phase: f32,
    rng: u64,
}

impl SignalGenerator {
    /// `frames` frames of `signal` at `rate` Hz in the given layout.
    pub fn new(signal: Signal, channels: Channels, rate: u32, frames: u64) -> Self {
        Self {
            signal,
            channels: channels.count(),
            rate: rate as f32,
            remaining: frames,
            amplitude: 0.5,
            frequency: 440.0,
            phase: 0.0,
            rng: 0x2545_F491_4F6C_DD1D,
        }
    }

    /// Peak level (or the constant value).
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Tone frequency in Hz.
    pub fn with_frequency(mut self, frequency: f32) -> Self {
        self.frequency = frequency;
        self
    }

    fn next_value(&mut self) -> f32 {
        match self.signal {
            Signal::Tone => {
                let value = (self.phase * TAU).sin() * self.amplitude;
                self.phase = (self.phase + self.frequency / self.rate).fract();
                value
            }
            Signal::Constant => self.amplitude,
            Signal::Silence => 0.0,
            Signal::Noise => {
                // xorshift64*
                self.rng ^= self.rng >> 12;
                self.rng ^= self.rng << 25;
                self.rng ^= self.rng >> 27;
                let bits = self.rng.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40;
                let unit = bits as f32 / (1u64 << 24) as f32;
                (unit * 2.0 - 1.0) * self.amplitude
            }
        }
    }
}

impl Generator for SignalGenerator {
    fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancelToken) -> GeneratorResult {
        let mut chunk = Vec::with_capacity(CHUNK_FRAMES * self.channels);
        while self.remaining > 0 && !cancel.is_cancelled() {
            let frames = self.remaining.min(CHUNK_FRAMES as u64) as usize;
            chunk.clear();
            for _ in 0..frames {
                let value = self.next_value();
                for _ in 0..self.channels {
                    chunk.push(value);
                }
            }
            sink.write(&mut chunk)?;
            self.remaining -= frames as u64;
        }
        Ok(())
    }
}
