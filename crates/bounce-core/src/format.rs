//! Output sample format model.
//!
//! The render pipeline supports exactly two channel layouts and three integer
//! bit depths. Representing them as enums keeps invalid configurations out of
//! the DSP stage and codec layers entirely; raw integers are only accepted at
//! the edges through [`Channels::from_count`] and [`BitDepth::from_bits`].

use core::fmt;

/// Channel layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    /// One point per frame.
    Mono,
    /// Two interleaved points per frame: `[L, R]`.
    Stereo,
}

impl Channels {
    /// Parse a channel count, returning `None` for anything other than 1 or 2.
    pub fn from_count(count: u16) -> Option<Self> {
        match count {
            1 => Some(Channels::Mono),
            2 => Some(Channels::Stereo),
            _ => None,
        }
    }

    /// Number of points per frame.
    #[inline]
    pub fn count(self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channels::Mono => f.write_str("mono"),
            Channels::Stereo => f.write_str("stereo"),
        }
    }
}

/// Integer bit depth of the rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    /// 8-bit samples.
    Eight,
    /// 16-bit samples.
    Sixteen,
    /// 24-bit samples.
    TwentyFour,
}

impl BitDepth {
    /// Parse a bit count, returning `None` for anything other than 8, 16 or 24.
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            24 => Some(BitDepth::TwentyFour),
            _ => None,
        }
    }

    /// Number of bits per point.
    #[inline]
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
        }
    }

    /// Number of bytes per point in a packed PCM stream.
    #[inline]
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Scale mapping a normalized `[-1, 1]` value onto integer sample codes.
    ///
    /// Full scale is symmetric, so the most negative two's-complement code is
    /// never produced by the quantizer.
    #[inline]
    pub fn expander(self) -> i32 {
        match self {
            BitDepth::Eight => 127,
            BitDepth::Sixteen => 32767,
            BitDepth::TwentyFour => 8_388_607,
        }
    }

    /// Whether output at this depth passes through the dither step.
    ///
    /// 24-bit output is never dithered.
    #[inline]
    pub fn is_dithered(self) -> bool {
        !matches!(self, BitDepth::TwentyFour)
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Complete description of a rendered PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Channel layout.
    pub channels: Channels,
    /// Bit depth.
    pub bits: BitDepth,
    /// Sample rate in Hz (at the destination, after decimation).
    pub sample_rate: u32,
}

impl SampleSpec {
    /// Create a new spec.
    pub fn new(channels: Channels, bits: BitDepth, sample_rate: u32) -> Self {
        Self {
            channels,
            bits,
            sample_rate,
        }
    }

    /// Bytes per frame in a packed PCM stream.
    #[inline]
    pub fn block_align(&self) -> usize {
        self.channels.count() * self.bits.bytes()
    }
}

/// Container format for file destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// RIFF/WAVE, little-endian.
    Wav,
    /// Audio Interchange File Format, big-endian.
    Aiff,
}

impl FileFormat {
    /// Guess a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(FileFormat::Wav),
            "aif" | "aiff" => Some(FileFormat::Aiff),
            _ => None,
        }
    }

    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Wav => "wav",
            FileFormat::Aiff => "aiff",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Wav => f.write_str("WAV"),
            FileFormat::Aiff => f.write_str("AIFF"),
        }
    }
}
