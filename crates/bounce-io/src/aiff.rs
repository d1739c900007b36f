//! AIFF streaming writer and strict reader.
//!
//! Writes the canonical 54-byte header: `FORM`/`AIFF`, an 18-byte `COMM`
//! chunk, and an `SSND` chunk with zero offset and block size. All integers
//! are big-endian and the sample rate is an 80-bit IEEE extended float.
//! The frame count and the two chunk lengths are patched by
//! [`AiffWriter::finish`].

use crate::pcm::{
    BlockEncoder, PcmLayout, decode_points, length_field, read_header, read_sample_bytes,
};
use crate::{DecodedAudio, FormatError, Result, import::AudioInfo};
use bounce_core::{BitDepth, Channels, FileFormat, SampleSpec};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const HEADER_LEN: u64 = 54;
const FORM_LENGTH_OFFSET: u64 = 4;
const FRAME_COUNT_OFFSET: u64 = 22;
const SSND_LENGTH_OFFSET: u64 = 42;
const COMM_CHUNK_LEN: u32 = 18;
/// `SSND` length beyond the sample bytes: the offset and block size words.
const SSND_PREAMBLE: u64 = 8;

/// Encode a sample rate as an 80-bit IEEE 754 extended float.
fn encode_extended(rate: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    if rate == 0 {
        return out;
    }
    let value = u64::from(rate);
    let shift = value.leading_zeros();
    let mantissa = value << shift;
    let exponent = (16383 + 63 - shift) as u16;
    out[0..2].copy_from_slice(&exponent.to_be_bytes());
    out[2..10].copy_from_slice(&mantissa.to_be_bytes());
    out
}

/// Decode an 80-bit IEEE 754 extended float.
fn decode_extended(bytes: &[u8; 10]) -> f64 {
    let sign_exp = u16::from_be_bytes([bytes[0], bytes[1]]);
    let mut mantissa_bytes = [0u8; 8];
    mantissa_bytes.copy_from_slice(&bytes[2..10]);
    let mantissa = u64::from_be_bytes(mantissa_bytes);

    let exponent = i32::from(sign_exp & 0x7FFF);
    let sign = if sign_exp & 0x8000 != 0 { -1.0 } else { 1.0 };
    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    if exponent == 0x7FFF {
        return f64::NAN;
    }
    sign * mantissa as f64 * 2f64.powi(exponent - 16383 - 63)
}

/// Streaming AIFF encoder.
///
/// The header goes out with zeroed frame count and lengths; everything the
/// writer cannot know up front is patched on [`finish`](Self::finish).
#[derive(Debug)]
pub struct AiffWriter<W: Write + Seek> {
    out: W,
    spec: SampleSpec,
    encoder: BlockEncoder,
    start: u64,
    finished: bool,
}

impl AiffWriter<BufWriter<File>> {
    /// Create (or truncate) an AIFF file at `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        spec: SampleSpec,
        buffer_budget_bytes: usize,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), spec, buffer_budget_bytes)
    }
}

impl<W: Write + Seek> AiffWriter<W> {
    /// Start an AIFF stream on `out` at its current position.
    pub fn new(mut out: W, spec: SampleSpec, buffer_budget_bytes: usize) -> Result<Self> {
        let start = out.stream_position()?;
        write_header(&mut out, spec)?;
        Ok(Self {
            out,
            spec,
            encoder: BlockEncoder::new(PcmLayout::Aiff, spec.bits, buffer_budget_bytes),
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

    /// Flush buffered samples, pad, and patch frame count and lengths.
    ///
    /// Idempotent. Neither the `FORM` nor the `SSND` length counts the pad
    /// byte.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder.flush(&mut self.out)?;
        let data_len = self.encoder.data_bytes();
        let pad = data_len % 2;
        if pad == 1 {
            self.out.write_all(&[0])?;
        }

        let frames = length_field(self.frames_written())?;
        let ssnd_field = length_field(SSND_PREAMBLE + data_len)?;
        let form_field = length_field(HEADER_LEN - 8 + data_len)?;

        let end = self.out.stream_position()?;
        self.out.seek(SeekFrom::Start(self.start + FORM_LENGTH_OFFSET))?;
        self.out.write_all(&form_field.to_be_bytes())?;
        self.out.seek(SeekFrom::Start(self.start + FRAME_COUNT_OFFSET))?;
        self.out.write_all(&frames.to_be_bytes())?;
        self.out.seek(SeekFrom::Start(self.start + SSND_LENGTH_OFFSET))?;
        self.out.write_all(&ssnd_field.to_be_bytes())?;
        self.out.seek(SeekFrom::Start(end))?;
        self.out.flush()?;

        tracing::debug!(frames, bytes = data_len, "AIFF header finalized");
        Ok(())
    }

    /// Consume the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn write_header<W: Write>(out: &mut W, spec: SampleSpec) -> Result<()> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(b"FORM");
    header.extend_from_slice(&((HEADER_LEN - 8) as u32).to_be_bytes());
    header.extend_from_slice(b"AIFF");
    header.extend_from_slice(b"COMM");
    header.extend_from_slice(&COMM_CHUNK_LEN.to_be_bytes());
    header.extend_from_slice(&(spec.channels.count() as u16).to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());
    header.extend_from_slice(&spec.bits.bits().to_be_bytes());
    header.extend_from_slice(&encode_extended(spec.sample_rate));
    header.extend_from_slice(b"SSND");
    header.extend_from_slice(&(SSND_PREAMBLE as u32).to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());
    out.write_all(&header)?;
    Ok(())
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

pub(crate) fn parse_header<R: Read>(reader: &mut R) -> Result<AudioInfo> {
    let form: [u8; 12] = read_header(reader)?;
    if &form[0..4] != b"FORM" {
        return Err(FormatError::UnrecognizedFileFormat.into());
    }
    match &form[8..12] {
        b"AIFF" => {}
        b"AIFC" => return Err(FormatError::NotUncompressedPcm.into()),
        _ => return Err(FormatError::UnrecognizedFileFormat.into()),
    }

    let comm: [u8; 26] = read_header(reader)?;
    if &comm[0..4] != b"COMM" {
        return Err(FormatError::InvalidData("expected COMM chunk after AIFF").into());
    }
    if be_u32(&comm[4..8]) != COMM_CHUNK_LEN {
        return Err(FormatError::InvalidData("unexpected COMM chunk length").into());
    }
    let channel_count = be_u16(&comm[8..10]);
    let frames = be_u32(&comm[10..14]);
    let bit_count = be_u16(&comm[14..16]);
    let mut rate_bytes = [0u8; 10];
    rate_bytes.copy_from_slice(&comm[16..26]);

    let channels = Channels::from_count(channel_count)
        .ok_or(FormatError::UnsupportedNumberOfChannels(channel_count))?;
    let bits =
        BitDepth::from_bits(bit_count).ok_or(FormatError::UnsupportedNumberOfBits(bit_count))?;
    let rate = decode_extended(&rate_bytes).round();
    if !rate.is_finite() || rate < 1.0 || rate > f64::from(u32::MAX) {
        return Err(FormatError::InvalidData("sample rate out of range").into());
    }
    let spec = SampleSpec::new(channels, bits, rate as u32);

    let ssnd: [u8; 16] = read_header(reader)?;
    if &ssnd[0..4] != b"SSND" {
        return Err(FormatError::InvalidData("expected SSND chunk after COMM").into());
    }
    if be_u32(&ssnd[8..12]) != 0 || be_u32(&ssnd[12..16]) != 0 {
        return Err(FormatError::InvalidData("SSND offset and block size must be zero").into());
    }
    let data_len = u64::from(frames) * spec.block_align() as u64;
    if u64::from(be_u32(&ssnd[4..8])) != SSND_PREAMBLE + data_len {
        return Err(FormatError::InvalidData("SSND length disagrees with frame count").into());
    }

    Ok(AudioInfo {
        format: FileFormat::Aiff,
        spec,
        frames: u64::from(frames),
    })
}

/// Read a canonical PCM AIFF stream.
///
/// Truncation handling matches [`read_wav`](crate::read_wav).
pub fn read_aiff<R: Read>(mut reader: R, tolerate_truncation: bool) -> Result<DecodedAudio> {
    let info = parse_header(&mut reader)?;
    let len = info.frames as usize * info.spec.block_align();
    let (data, truncated) = read_sample_bytes(&mut reader, len, tolerate_truncation)?;
    Ok(DecodedAudio {
        info,
        samples: decode_points(PcmLayout::Aiff, info.spec.bits, &data),
        truncated,
    })
}

/// Read only the header of an AIFF file.
pub fn read_aiff_info<P: AsRef<Path>>(path: P) -> Result<AudioInfo> {
    let mut reader = BufReader::new(File::open(path)?);
    parse_header(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Cursor;

    fn render(spec: SampleSpec, points: &[f32]) -> Vec<u8> {
        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), spec, 4096).unwrap();
        writer.write_points(points).unwrap();
        writer.finish().unwrap();
        writer.into_inner().into_inner()
    }

    #[test]
    fn extended_encodes_common_rates() {
        assert_eq!(
            encode_extended(44100),
            [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            encode_extended(48000),
            [0x40, 0x0E, 0xBB, 0x80, 0, 0, 0, 0, 0, 0]
        );
        for rate in [1, 8000, 22050, 96000, 192_000, u32::MAX] {
            assert_eq!(decode_extended(&encode_extended(rate)), f64::from(rate));
        }
    }

    #[test]
    fn header_fields_are_patched() {
        let spec = SampleSpec::new(Channels::Stereo, BitDepth::Sixteen, 44100);
        let bytes = render(spec, &[0.0; 20]);
        assert_eq!(bytes.len(), 54 + 40);
        assert_eq!(&bytes[0..4], b"FORM");
        assert_eq!(be_u32(&bytes[4..8]), 46 + 40);
        assert_eq!(&bytes[8..16], b"AIFFCOMM");
        assert_eq!(be_u32(&bytes[16..20]), 18);
        assert_eq!(be_u16(&bytes[20..22]), 2);
        assert_eq!(be_u32(&bytes[22..26]), 10);
        assert_eq!(be_u16(&bytes[26..28]), 16);
        assert_eq!(&bytes[38..42], b"SSND");
        assert_eq!(be_u32(&bytes[42..46]), 8 + 40);
        assert_eq!(&bytes[46..54], &[0; 8]);
    }

    #[test]
    fn eight_bit_is_signed_and_odd_data_padded() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::Eight, 8000);
        let bytes = render(spec, &[0.0, 1.0, -1.0]);
        assert_eq!(bytes.len(), 54 + 4);
        assert_eq!(&bytes[54..58], &[0, 127, 0x81, 0]);
        assert_eq!(be_u32(&bytes[42..46]), 8 + 3);
        assert_eq!(be_u32(&bytes[4..8]), 46 + 3);
    }

    #[test]
    fn form_length_leaves_out_pad_byte() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::Eight, 8000);
        let bytes = render(spec, &[0.1, 0.2, 0.3]);
        let pad = 1;
        assert_eq!(bytes.len(), 58);
        assert_eq!(be_u32(&bytes[4..8]) as usize, bytes.len() - 8 - pad);
        assert_eq!(be_u32(&bytes[42..46]) as usize, bytes.len() - 46 - pad);
        let decoded = read_aiff(Cursor::new(bytes), false).unwrap();
        assert_eq!(decoded.info.frames, 3);
        assert!(!decoded.truncated);
    }

    #[test]
    fn sixteen_bit_is_big_endian() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
        let bytes = render(spec, &[1.0, -1.0]);
        assert_eq!(&bytes[54..58], &[0x7F, 0xFF, 0x80, 0x01]);
    }

    #[test]
    fn roundtrip_preserves_codes() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 22050);
        let points: Vec<f32> = (0..300).map(|i| ((i as f32) * 0.01).cos() * 0.7).collect();
        let decoded = read_aiff(Cursor::new(render(spec, &points)), false).unwrap();
        assert_eq!(decoded.info.spec, spec);
        assert_eq!(decoded.info.frames, 300);
        for (a, b) in points.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() <= 1.0 / 32767.0);
        }
    }

    #[test]
    fn aifc_is_not_uncompressed_pcm() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
        let mut bytes = render(spec, &[0.0; 4]);
        bytes[11] = b'C';
        let err = read_aiff(Cursor::new(bytes), false).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::NotUncompressedPcm)));
    }

    #[test]
    fn wav_is_unrecognized() {
        let err = read_aiff(Cursor::new(b"RIFF\0\0\0\0WAVE".to_vec()), false).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::UnrecognizedFileFormat)));
    }

    #[test]
    fn rejects_bad_header_fields() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
        let good = render(spec, &[0.0; 4]);

        let mut bytes = good.clone();
        bytes[21] = 3;
        assert!(matches!(
            read_aiff(Cursor::new(bytes), false).unwrap_err(),
            Error::Format(FormatError::UnsupportedNumberOfChannels(3))
        ));

        let mut bytes = good.clone();
        bytes[27] = 12;
        assert!(matches!(
            read_aiff(Cursor::new(bytes), false).unwrap_err(),
            Error::Format(FormatError::UnsupportedNumberOfBits(12))
        ));

        let mut bytes = good.clone();
        bytes[28..38].copy_from_slice(&[0; 10]);
        assert!(matches!(
            read_aiff(Cursor::new(bytes), false).unwrap_err(),
            Error::Format(FormatError::InvalidData(_))
        ));

        let mut bytes = good;
        bytes[49] = 4;
        assert!(matches!(
            read_aiff(Cursor::new(bytes), false).unwrap_err(),
            Error::Format(FormatError::InvalidData(_))
        ));
    }

    #[test]
    fn truncated_samples() {
        let spec = SampleSpec::new(Channels::Mono, BitDepth::TwentyFour, 8000);
        let mut bytes = render(spec, &[0.25; 10]);
        bytes.truncate(54 + 12);

        assert!(matches!(
            read_aiff(Cursor::new(bytes.clone()), false).unwrap_err(),
            Error::Format(FormatError::Truncated)
        ));
        let decoded = read_aiff(Cursor::new(bytes), true).unwrap();
        assert!(decoded.truncated);
        assert_eq!(decoded.samples.len(), 10);
        assert!((decoded.samples[3] - 0.25).abs() < 1e-6);
        assert_eq!(decoded.samples[4], 0.0);
    }
}
