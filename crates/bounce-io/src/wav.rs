//! RIFF/WAVE streaming writer and strict reader.
//!
//! ## Layout
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  riff length  = 36 + data length        (LE, patched on finish)
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  16
//!     20     2  format tag = 1 (PCM)
//!     22     2  channels
//!     24     4  sample rate
//!     28     4  byte rate   = rate × block align
//!     32     2  block align = channels × bytes per point
//!     34     2  bits per point
//!     36     4  "data"
//!     40     4  data length                            (LE, patched on finish)
//!     44     …  samples, then one pad byte if the data length is odd
//! ```
//!
//! The pad byte is not counted in either length field.

use crate::pcm::{
    BlockEncoder, PcmLayout, decode_points, length_field, read_header, read_sample_bytes,
};
use crate::{DecodedAudio, FormatError, Result, import::AudioInfo};
use bounce_core::{BitDepth, Channels, FileFormat, SampleSpec};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const HEADER_LEN: u64 = 44;
const RIFF_LENGTH_OFFSET: u64 = 4;
const DATA_LENGTH_OFFSET: u64 = 40;
const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

/// Streaming WAV encoder.
///
/// Length fields are written as zero up front and patched by
/// [`finish`](Self::finish), so the writer never needs to know the frame
/// count in advance.
#[derive(Debug)]
pub struct WavWriter<W: Write + Seek> {
    out: W,
    spec: SampleSpec,
    encoder: BlockEncoder,
    start: u64,
    finished: bool,
}

impl WavWriter<BufWriter<File>> {
    /// Create (or truncate) a WAV file at `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        spec: SampleSpec,
        buffer_budget_bytes: usize,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), spec, buffer_budget_bytes)
    }
}

impl<W: Write + Seek> WavWriter<W> {
    /// Start a WAV stream on `out` at its current position.
    pub fn new(mut out: W, spec: SampleSpec, buffer_budget_bytes: usize) -> Result<Self> {
        let start = out.stream_position()?;
        write_header(&mut out, spec, 0)?;
        Ok(Self {
            out,
            spec,
            encoder: BlockEncoder::new(PcmLayout::Wav, spec.bits, buffer_budget_bytes),
            start,
            finished: false,
        })
    }

    /// Stream format.
    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    /// Frames accepted so far.
    pub fn frames_written(&self) -> u64 {
        self.encoder.points_written() / self.spec.channels.count() as u64
    }

    /// Quantize and append interleaved points.
    pub fn write_points(&mut self, points: &[f32]) -> Result<()> {
        self.encoder.encode(&mut self.out, points)?;
        Ok(())
    }

    /// Flush buffered samples, pad, and patch the length fields.
    ///
    /// Leaves the stream positioned at end of file. Calling it again is a
    /// no-op.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder.flush(&mut self.out)?;
        let data_len = self.encoder.data_bytes();
        if data_len % 2 == 1 {
            self.out.write_all(&[0])?;
        }

        let data_field = length_field(data_len)?;
        let riff_field = length_field(data_len + HEADER_LEN - 8)?;
        let end = self.out.stream_position()?;
        self.out.seek(SeekFrom::Start(self.start + RIFF_LENGTH_OFFSET))?;
        self.out.write_all(&riff_field.to_le_bytes())?;
        self.out.seek(SeekFrom::Start(self.start + DATA_LENGTH_OFFSET))?;
        self.out.write_all(&data_field.to_le_bytes())?;
        self.out.seek(SeekFrom::Start(end))?;
        self.out.flush()?;

        tracing::debug!(
            frames = self.frames_written(),
            bytes = data_len,
            "WAV header finalized"
        );
        Ok(())
    }

    /// Consume the writer, returning the underlying stream.
    ///
    /// Does not finish the stream; call [`finish`](Self::finish) first.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn write_header<W: Write>(out: &mut W, spec: SampleSpec, data_len: u32) -> Result<()> {
    let channels = spec.channels.count() as u16;
    let block_align = spec.block_align() as u16;
    let byte_rate = spec.sample_rate * u32::from(block_align);

    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(data_len + HEADER_LEN as u32 - 8).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    header.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&spec.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&spec.bits.bits().to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    out.write_all(&header)?;
    Ok(())
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Parse and validate the canonical 44-byte header.
pub(crate) fn parse_header<R: Read>(reader: &mut R) -> Result<AudioInfo> {
    let riff: [u8; 12] = read_header(reader)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(FormatError::UnrecognizedFileFormat.into());
    }

    let fmt: [u8; 24] = read_header(reader)?;
    if &fmt[0..4] != b"fmt " {
        return Err(FormatError::InvalidData("expected fmt chunk after WAVE").into());
    }
    if le_u32(&fmt[4..8]) != FMT_CHUNK_LEN || le_u16(&fmt[8..10]) != FORMAT_PCM {
        return Err(FormatError::NotUncompressedPcm.into());
    }
    let channel_count = le_u16(&fmt[10..12]);
    let sample_rate = le_u32(&fmt[12..16]);
    let byte_rate = le_u32(&fmt[16..20]);
    let block_align = le_u16(&fmt[20..22]);
    let bit_count = le_u16(&fmt[22..24]);

    let channels = Channels::from_count(channel_count)
        .ok_or(FormatError::UnsupportedNumberOfChannels(channel_count))?;
    let bits =
        BitDepth::from_bits(bit_count).ok_or(FormatError::UnsupportedNumberOfBits(bit_count))?;
    let spec = SampleSpec::new(channels, bits, sample_rate);
    if sample_rate == 0 {
        return Err(FormatError::InvalidData("sample rate is zero").into());
    }
    if usize::from(block_align) != spec.block_align()
        || u64::from(byte_rate) != u64::from(sample_rate) * u64::from(block_align)
    {
        return Err(FormatError::InvalidData("inconsistent block align or byte rate").into());
    }

    let data: [u8; 8] = read_header(reader)?;
    if &data[0..4] != b"data" {
        return Err(FormatError::InvalidData("expected data chunk after fmt").into());
    }
    let data_len = le_u32(&data[4..8]);
    if data_len as usize % spec.block_align() != 0 {
        return Err(FormatError::InvalidData("data length is not a whole number of frames").into());
    }

    Ok(AudioInfo {
        format: FileFormat::Wav,
        spec,
        frames: u64::from(data_len) / spec.block_align() as u64,
    })
}

/// Read a canonical PCM WAV stream.
///
/// With `tolerate_truncation`, a file that ends inside the sample data is
/// zero-filled to its declared length and reported via
/// [`DecodedAudio::truncated`]; otherwise it fails with
/// [`FormatError::Truncated`].
pub fn read_wav<R: Read>(mut reader: R, tolerate_truncation: bool) -> Result<DecodedAudio> {
    let info = parse_header(&mut reader)?;
    let len = info.frames as usize * info.spec.block_align();
    let (data, truncated) = read_sample_bytes(&mut reader, len, tolerate_truncation)?;
    Ok(DecodedAudio {
        info,
        samples: decode_points(PcmLayout::Wav, info.spec.bits, &data),
        truncated,
    })
}

/// Read only the header of a WAV file.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<AudioInfo> {
    let mut reader = BufReader::new(File::open(path)?);
    parse_header(&mut reader)
}
