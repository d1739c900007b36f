//! Audio I/O and render orchestration for bounce.
//!
//! This crate provides:
//!
//! - **Codecs**: bit-exact streaming [`WavWriter`] / [`AiffWriter`] and strict
//!   readers ([`read_wav`], [`read_aiff`], [`read_audio_file`])
//! - **Destinations**: the [`DestinationHandler`] contract and the closed
//!   [`Destination`] set (WAV file, AIFF file, live device, memory)
//! - **Rendering**: [`Renderer`] runs a [`Generator`] on a worker thread
//!   through the `bounce-core` DSP chain into a destination, with
//!   cooperative cancellation and progress polling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bounce_core::{BitDepth, Channels, FileFormat, SampleSpec};
//! use bounce_io::{
//!     CancelToken, DestinationTarget, FrameSink, GeneratorResult, RenderRequest, Renderer,
//! };
//!
//! let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 44100);
//! let mut remaining = 44100usize;
//! let generator = move |sink: &mut dyn FrameSink, cancel: &CancelToken| -> GeneratorResult {
//!     let mut block = [0.0f32; 512];
//!     while remaining > 0 && !cancel.is_cancelled() {
//!         let n = remaining.min(block.len());
//!         block[..n].fill(0.5);
//!         sink.write(&mut block[..n])?;
//!         remaining -= n;
//!     }
//!     Ok(())
//! };
//!
//! let target = DestinationTarget::file("out.wav", FileFormat::Wav);
//! let session = Renderer::start(generator, || Some(target), RenderRequest::new(spec))?;
//! if let Some(session) = session {
//!     let outcome = session.wait();
//!     println!("{} frames, {} clipped", outcome.frames, outcome.clip.clipped_samples);
//! }
//! # Ok::<(), bounce_io::Error>(())
//! ```

mod aiff;
mod destination;
mod device;
mod import;
mod pcm;
mod progress;
mod render;
mod wav;

pub use aiff::{AiffWriter, read_aiff, read_aiff_info};
pub use destination::{
    BufferLoading, Destination, DestinationHandler, DestinationTarget, IoOptions, LoadingProbe,
    MemorySink,
};
pub use device::{
    AudioDevice, DeviceSink, PlaybackQueue, PlaybackReader, list_output_devices, playback_queue,
};
pub use import::{AudioInfo, DecodedAudio, read_audio_file, read_audio_info, sniff_format};
pub use progress::{ProgressCallback, ProgressConfig, ProgressObserver, ProgressSnapshot};
pub use render::{
    CancelToken, CompletionCallback, ErrorNotifier, FrameSink, Generator, GeneratorResult,
    MeteringConfig, RenderFailure, RenderOutcome, RenderRequest, RenderSession, Renderer,
    SinkClosed,
};
pub use wav::{WavWriter, read_wav, read_wav_info};

/// Import-side format rejection codes.
///
/// Readers only accept the canonical layouts the writers produce; anything
/// else is rejected with one of these codes rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Not a RIFF/WAVE or FORM/AIFF container.
    #[error("unrecognized file format")]
    UnrecognizedFileFormat,

    /// Compressed, floating-point or extensible sample encoding.
    #[error("file is not uncompressed PCM")]
    NotUncompressedPcm,

    /// Channel count other than 1 or 2.
    #[error("unsupported number of channels: {0}")]
    UnsupportedNumberOfChannels(u16),

    /// Bit depth other than 8, 16 or 24.
    #[error("unsupported number of bits: {0}")]
    UnsupportedNumberOfBits(u16),

    /// The file ends before the header or the declared sample data.
    #[error("file is truncated")]
    Truncated,

    /// Header fields are inconsistent or out of range.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
}

/// Error types for audio I/O and rendering.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File header or sample data rejected on import.
    #[error("Audio format error: {0}")]
    Format(#[from] FormatError),

    /// Rendered data no longer fits the container's 32-bit length fields.
    #[error("Output exceeds the 4 GiB container limit")]
    FileTooLarge,

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Render request rejected before any thread was started.
    #[error("Invalid render configuration: {0}")]
    Config(String),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
