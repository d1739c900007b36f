//! Integer PCM packing shared by the WAV and AIFF codecs.
//!
//! The two containers differ in exactly two ways at the sample level:
//!
//! | Layout | 8-bit                       | 16/24-bit     |
//! |--------|-----------------------------|---------------|
//! | AIFF   | signed two's complement     | big-endian    |
//! | WAV    | unsigned, biased by +128    | little-endian |
//!
//! Everything else (quantization, block buffering) is common.

use crate::{Error, FormatError, Result};
use bounce_core::{BitDepth, quantize};
use std::io::{self, Read, Write};

/// Points per block in debug builds, small enough that unit tests cross many
/// block boundaries.
const DEBUG_BLOCK_POINTS: usize = 16;

/// Most sample bytes reserved up front; headers can declare far more data
/// than the stream holds.
const MAX_RESERVE_BYTES: usize = 1 << 20;

/// Sample byte layout of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PcmLayout {
    /// Signed 8-bit, big-endian wider samples.
    Aiff,
    /// Biased unsigned 8-bit, little-endian wider samples.
    Wav,
}

impl PcmLayout {
    /// Pack one integer code into `out`.
    pub(crate) fn pack(self, code: i32, bits: BitDepth, out: &mut Vec<u8>) {
        match (self, bits) {
            (PcmLayout::Aiff, BitDepth::Eight) => out.push(code as i8 as u8),
            (PcmLayout::Wav, BitDepth::Eight) => out.push((code + 128) as u8),
            (PcmLayout::Aiff, BitDepth::Sixteen) => {
                out.extend_from_slice(&(code as i16).to_be_bytes());
            }
            (PcmLayout::Wav, BitDepth::Sixteen) => {
                out.extend_from_slice(&(code as i16).to_le_bytes());
            }
            (PcmLayout::Aiff, BitDepth::TwentyFour) => {
                out.extend_from_slice(&code.to_be_bytes()[1..]);
            }
            (PcmLayout::Wav, BitDepth::TwentyFour) => {
                out.extend_from_slice(&code.to_le_bytes()[..3]);
            }
        }
    }

    /// Unpack one integer code from exactly `bits.bytes()` bytes.
    pub(crate) fn unpack(self, bytes: &[u8], bits: BitDepth) -> i32 {
        match (self, bits) {
            (PcmLayout::Aiff, BitDepth::Eight) => i32::from(bytes[0] as i8),
            (PcmLayout::Wav, BitDepth::Eight) => i32::from(bytes[0]) - 128,
            (PcmLayout::Aiff, BitDepth::Sixteen) => {
                i32::from(i16::from_be_bytes([bytes[0], bytes[1]]))
            }
            (PcmLayout::Wav, BitDepth::Sixteen) => {
                i32::from(i16::from_le_bytes([bytes[0], bytes[1]]))
            }
            (PcmLayout::Aiff, BitDepth::TwentyFour) => {
                i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
            }
            (PcmLayout::Wav, BitDepth::TwentyFour) => {
                i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8
            }
        }
    }
}

/// Number of points buffered per block for a byte budget.
pub(crate) fn block_points(buffer_budget_bytes: usize, bits: BitDepth) -> usize {
    if cfg!(debug_assertions) {
        DEBUG_BLOCK_POINTS
    } else {
        (buffer_budget_bytes / bits.bytes()).max(1)
    }
}

/// Quantizes points into fixed-size byte blocks and streams them out.
#[derive(Debug)]
pub(crate) struct BlockEncoder {
    layout: PcmLayout,
    bits: BitDepth,
    block: Vec<u8>,
    block_bytes: usize,
    points_written: u64,
}

impl BlockEncoder {
    pub(crate) fn new(layout: PcmLayout, bits: BitDepth, buffer_budget_bytes: usize) -> Self {
        let block_bytes = block_points(buffer_budget_bytes, bits) * bits.bytes();
        Self {
            layout,
            bits,
            block: Vec::with_capacity(block_bytes),
            block_bytes,
            points_written: 0,
        }
    }

    /// Encode `points`, writing every block that fills up.
    pub(crate) fn encode<W: Write>(&mut self, out: &mut W, points: &[f32]) -> io::Result<()> {
        for &point in points {
            self.layout
                .pack(quantize(point, self.bits), self.bits, &mut self.block);
            if self.block.len() >= self.block_bytes {
                out.write_all(&self.block)?;
                self.block.clear();
            }
        }
        self.points_written += points.len() as u64;
        Ok(())
    }

    /// Write any partially filled block.
    pub(crate) fn flush<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.block.is_empty() {
            out.write_all(&self.block)?;
            self.block.clear();
        }
        Ok(())
    }

    /// Total points accepted so far.
    pub(crate) fn points_written(&self) -> u64 {
        self.points_written
    }

    /// Total sample bytes accepted so far.
    pub(crate) fn data_bytes(&self) -> u64 {
        self.points_written * self.bits.bytes() as u64
    }
}

/// Convert a byte count to a 32-bit container length field.
pub(crate) fn length_field(bytes: u64) -> Result<u32> {
    u32::try_from(bytes).map_err(|_| Error::FileTooLarge)
}

/// `read_exact` that reports a short header as [`FormatError::Truncated`].
pub(crate) fn read_header<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Format(FormatError::Truncated),
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

/// Read up to `len` sample bytes.
///
/// A short read fails with [`FormatError::Truncated`] unless `tolerate` is
/// set, in which case the missing tail is zero-filled. Returns the bytes and
/// whether truncation occurred.
pub(crate) fn read_sample_bytes<R: Read>(
    reader: &mut R,
    len: usize,
    tolerate: bool,
) -> Result<(Vec<u8>, bool)> {
    let mut data = Vec::with_capacity(len.min(MAX_RESERVE_BYTES));
    reader.take(len as u64).read_to_end(&mut data)?;
    if data.len() == len {
        return Ok((data, false));
    }
    if !tolerate {
        return Err(FormatError::Truncated.into());
    }
    tracing::warn!(
        expected = len,
        available = data.len(),
        "sample data truncated, zero-filling"
    );
    data.resize(len, 0);
    Ok((data, true))
}

/// Decode packed sample bytes into normalized floats.
pub(crate) fn decode_points(layout: PcmLayout, bits: BitDepth, data: &[u8]) -> Vec<f32> {
    data.chunks_exact(bits.bytes())
        .map(|bytes| bounce_core::dequantize(layout.unpack(bytes, bits), bits))
        .collect()
}
