//! Format-sniffing entry points over the WAV and AIFF readers.

use crate::{FormatError, Result, aiff, wav};
use bounce_core::{FileFormat, SampleSpec};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Header summary of a PCM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    /// Container format.
    pub format: FileFormat,
    /// Channels, bit depth and sample rate.
    pub spec: SampleSpec,
    /// Frame count declared by the header.
    pub frames: u64,
}

impl AudioInfo {
    /// Declared duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / f64::from(self.spec.sample_rate)
    }
}

/// A fully decoded PCM file.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Header summary.
    pub info: AudioInfo,
    /// Interleaved points normalized to `[-1, 1]`.
    pub samples: Vec<f32>,
    /// Sample data ended early and was zero-filled.
    pub truncated: bool,
}

/// Identify the container from its first 12 bytes.
///
/// Returns `None` for anything that is not RIFF/WAVE or FORM/AIFF(-C).
pub fn sniff_format(magic: &[u8]) -> Option<FileFormat> {
    if magic.len() < 12 {
        return None;
    }
    match (&magic[0..4], &magic[8..12]) {
        (b"RIFF", b"WAVE") => Some(FileFormat::Wav),
        (b"FORM", b"AIFF" | b"AIFC") => Some(FileFormat::Aiff),
        _ => None,
    }
}

fn open_sniffed(path: &Path) -> Result<(FileFormat, impl Read)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 12];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    let format = sniff_format(&magic[..filled]).ok_or(FormatError::UnrecognizedFileFormat)?;
    Ok((format, std::io::Cursor::new(magic).chain(reader)))
}

/// Decode a WAV or AIFF file, choosing the reader from the file's magic bytes.
pub fn read_audio_file<P: AsRef<Path>>(path: P, tolerate_truncation: bool) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let (format, reader) = open_sniffed(path)?;
    let decoded = match format {
        FileFormat::Wav => wav::read_wav(reader, tolerate_truncation)?,
        FileFormat::Aiff => aiff::read_aiff(reader, tolerate_truncation)?,
    };
    tracing::debug!(
        path = %path.display(),
        format = %format,
        frames = decoded.info.frames,
        truncated = decoded.truncated,
        "decoded audio file"
    );
    Ok(decoded)
}

/// Read the header of a WAV or AIFF file without decoding samples.
pub fn read_audio_info<P: AsRef<Path>>(path: P) -> Result<AudioInfo> {
    let (format, mut reader) = open_sniffed(path.as_ref())?;
    match format {
        FileFormat::Wav => wav::parse_header(&mut reader),
        FileFormat::Aiff => aiff::parse_header(&mut reader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_both_containers() {
        assert_eq!(sniff_format(b"RIFF\x24\0\0\0WAVEfmt "), Some(FileFormat::Wav));
        assert_eq!(sniff_format(b"FORM\0\0\0\x2eAIFFCOMM"), Some(FileFormat::Aiff));
        assert_eq!(sniff_format(b"FORM\0\0\0\x2eAIFC"), Some(FileFormat::Aiff));
        assert_eq!(sniff_format(b"OggS\0\0\0\0\0\0\0\0"), None);
        assert_eq!(sniff_format(b"RIFF"), None);
    }

    #[test]
    fn duration_uses_declared_frames() {
        let info = AudioInfo {
            format: FileFormat::Wav,
            spec: SampleSpec::new(
                bounce_core::Channels::Mono,
                bounce_core::BitDepth::Sixteen,
                8000,
            ),
            frames: 4000,
        };
        assert!((info.duration_secs() - 0.5).abs() < 1e-12);
    }
}
