//! Integration tests for bounce-io codecs and render sessions.

use bounce_core::{BitDepth, Channels, DitherKind, FileFormat, SampleSpec, quantize};
use bounce_io::{
    AiffWriter, CancelToken, DestinationTarget, Error, FormatError, FrameSink, GeneratorResult,
    MemorySink, MeteringConfig, ProgressConfig, ProgressSnapshot, RenderFailure, RenderRequest,
    Renderer, WavWriter, read_audio_file, read_audio_info,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

const DEPTHS: [BitDepth; 3] = [BitDepth::Eight, BitDepth::Sixteen, BitDepth::TwentyFour];

fn sine(frames: usize, width: usize) -> Vec<f32> {
    (0..frames * width)
        .map(|i| ((i / width) as f32 * 0.031).sin() * 0.8)
        .collect()
}

fn write_wav(path: &Path, spec: SampleSpec, points: &[f32]) {
    let mut writer = WavWriter::create(path, spec, 4096).unwrap();
    writer.write_points(points).unwrap();
    writer.finish().unwrap();
}

fn write_aiff(path: &Path, spec: SampleSpec, points: &[f32]) {
    let mut writer = AiffWriter::create(path, spec, 4096).unwrap();
    writer.write_points(points).unwrap();
    writer.finish().unwrap();
}

/// Generator emitting `frames` frames of `value` in blocks of 256.
fn constant(
    value: f32,
    frames: usize,
    width: usize,
) -> impl FnMut(&mut dyn FrameSink, &CancelToken) -> GeneratorResult + Send + 'static {
    let mut left = frames;
    move |sink: &mut dyn FrameSink, cancel: &CancelToken| -> GeneratorResult {
        let mut block = vec![value; 256 * width];
        while left > 0 && !cancel.is_cancelled() {
            let n = left.min(256);
            sink.write(&mut block[..n * width])?;
            block.fill(value);
            left -= n;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Codec round trips
// ---------------------------------------------------------------------------

#[test]
fn silence_roundtrips_exactly_through_both_containers() {
    let dir = TempDir::new().unwrap();
    for channels in [Channels::Mono, Channels::Stereo] {
        for bits in DEPTHS {
            let spec = SampleSpec::new(channels, bits, 22050);
            let silence = vec![0.0f32; 333 * channels.count()];

            let wav = dir.path().join(format!("{channels}-{}.wav", bits.bits()));
            write_wav(&wav, spec, &silence);
            let decoded = read_audio_file(&wav, false).unwrap();
            assert_eq!(decoded.info.format, FileFormat::Wav);
            assert_eq!(decoded.info.spec, spec);
            assert_eq!(decoded.info.frames, 333);
            assert_eq!(decoded.samples, silence);

            let aiff = dir.path().join(format!("{channels}-{}.aiff", bits.bits()));
            write_aiff(&aiff, spec, &silence);
            let decoded = read_audio_file(&aiff, false).unwrap();
            assert_eq!(decoded.info.format, FileFormat::Aiff);
            assert_eq!(decoded.info.spec, spec);
            assert_eq!(decoded.samples, silence);
        }
    }
}

#[test]
fn eight_bit_data_differs_by_128_between_containers() {
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Eight, 8000);
    let points: Vec<f32> = (-127..=127).map(|c| c as f32 / 127.0).collect();
    let wav = NamedTempFile::new().unwrap();
    let aiff = NamedTempFile::new().unwrap();
    write_wav(wav.path(), spec, &points);
    write_aiff(aiff.path(), spec, &points);

    let wav_bytes = std::fs::read(wav.path()).unwrap();
    let aiff_bytes = std::fs::read(aiff.path()).unwrap();
    let wav_data = &wav_bytes[44..44 + points.len()];
    let aiff_data = &aiff_bytes[54..54 + points.len()];
    for (w, a) in wav_data.iter().zip(aiff_data) {
        assert_eq!(w.wrapping_sub(*a), 128);
    }
}

#[test]
fn hound_reads_sixteen_bit_wav() {
    let spec = SampleSpec::new(Channels::Stereo, BitDepth::Sixteen, 44100);
    let points = sine(1000, 2);
    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), spec, &points);

    let mut reader = hound::WavReader::open(file.path()).unwrap();
    let hspec = reader.spec();
    assert_eq!(hspec.channels, 2);
    assert_eq!(hspec.sample_rate, 44100);
    assert_eq!(hspec.bits_per_sample, 16);
    assert_eq!(hspec.sample_format, hound::SampleFormat::Int);

    let codes: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(codes.len(), points.len());
    for (code, point) in codes.iter().zip(&points) {
        assert_eq!(i32::from(*code), quantize(*point, BitDepth::Sixteen));
    }
}

#[test]
fn hound_reads_twenty_four_bit_wav() {
    let spec = SampleSpec::new(Channels::Mono, BitDepth::TwentyFour, 96000);
    let points = sine(500, 1);
    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), spec, &points);

    let mut reader = hound::WavReader::open(file.path()).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 24);
    let codes: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
    for (code, point) in codes.iter().zip(&points) {
        assert_eq!(*code, quantize(*point, BitDepth::TwentyFour));
    }
}

#[test]
fn info_reads_header_only() {
    let spec = SampleSpec::new(Channels::Stereo, BitDepth::Sixteen, 48000);
    let file = NamedTempFile::new().unwrap();
    write_aiff(file.path(), spec, &sine(4800, 2));
    let info = read_audio_info(file.path()).unwrap();
    assert_eq!(info.format, FileFormat::Aiff);
    assert_eq!(info.spec, spec);
    assert_eq!(info.frames, 4800);
    assert!((info.duration_secs() - 0.1).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Strict import
// ---------------------------------------------------------------------------

#[test]
fn unknown_container_is_unrecognized() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"OggS this is not a pcm file").unwrap();
    let err = read_audio_file(file.path(), false).unwrap_err();
    assert!(matches!(
        err,
        Error::Format(FormatError::UnrecognizedFileFormat)
    ));
}

#[test]
fn float_wav_is_not_uncompressed_pcm() {
    let file = NamedTempFile::new().unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
    for i in 0..64 {
        writer.write_sample(i as f32 / 64.0).unwrap();
    }
    writer.finalize().unwrap();

    let err = read_audio_file(file.path(), false).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::NotUncompressedPcm)));
}

#[test]
fn truncated_file_fails_or_zero_fills() {
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), spec, &[0.5; 100]);
    let bytes = std::fs::read(file.path()).unwrap();
    std::fs::write(file.path(), &bytes[..44 + 120]).unwrap();

    let err = read_audio_file(file.path(), false).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::Truncated)));

    let decoded = read_audio_file(file.path(), true).unwrap();
    assert!(decoded.truncated);
    assert_eq!(decoded.samples.len(), 100);
    assert!(decoded.samples[..60].iter().all(|&v| (v - 0.5).abs() < 1e-4));
    assert!(decoded.samples[60..].iter().all(|&v| v == 0.0));
}

// ---------------------------------------------------------------------------
// Render sessions
// ---------------------------------------------------------------------------

#[test]
fn one_second_of_half_scale_renders_exactly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("half.wav");
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 44100);

    let target = DestinationTarget::file(&path, FileFormat::Wav);
    let session = Renderer::start(
        constant(0.5, 44100, 1),
        || Some(target),
        RenderRequest::new(spec).dither(DitherKind::None),
    )
    .unwrap()
    .expect("selector accepted");
    let outcome = session.wait();

    assert!(outcome.is_complete(), "{outcome:?}");
    assert_eq!(outcome.frames, 44100);
    assert_eq!(outcome.clip.total_samples, 44100);
    assert_eq!(outcome.clip.clipped_samples, 0);

    let bytes = std::fs::read(&path).unwrap();
    let data_len = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
    assert_eq!(data_len, 88200);
    assert_eq!(bytes.len(), 44 + 88200);
}

#[test]
fn over_full_scale_clips_every_point() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hot.wav");
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 44100);

    let target = DestinationTarget::file(&path, FileFormat::Wav);
    let outcome = Renderer::start(
        constant(2.0, 44100, 1),
        || Some(target),
        RenderRequest::new(spec).dither(DitherKind::None),
    )
    .unwrap()
    .unwrap()
    .wait();

    assert_eq!(outcome.clip.clipped_samples, outcome.clip.total_samples);
    assert_eq!(outcome.clip.clipped_samples, 44100);
    assert!((outcome.clip.max_clip_extent - 2.0).abs() < 1e-6);
    assert!((outcome.clip.suggested_gain() - 0.5).abs() < 1e-6);

    let bytes = std::fs::read(&path).unwrap();
    assert!(
        bytes[44..]
            .chunks_exact(2)
            .all(|b| i16::from_le_bytes([b[0], b[1]]) == 32767)
    );
}

#[test]
fn oversampled_stereo_renders_decimated_aiff() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("os.aiff");
    let spec = SampleSpec::new(Channels::Stereo, BitDepth::TwentyFour, 48000);

    let target = DestinationTarget::file(&path, FileFormat::Aiff);
    let outcome = Renderer::start(
        constant(0.25, 4 * 1001, 2),
        || Some(target),
        RenderRequest::new(spec).oversampling(4),
    )
    .unwrap()
    .unwrap()
    .wait();

    assert_eq!(outcome.frames, 1001);
    let decoded = read_audio_file(&path, false).unwrap();
    assert_eq!(decoded.info.frames, 1001);
    assert!(decoded.samples.iter().all(|&v| (v - 0.25).abs() < 1e-6));
}

#[test]
fn metering_mutes_loud_output() {
    let sink = MemorySink::new();
    let target = DestinationTarget::Memory(sink.clone());
    let spec = SampleSpec::new(Channels::Mono, BitDepth::TwentyFour, 1000);
    let outcome = Renderer::start(
        constant(0.8, 500, 1),
        || Some(target),
        RenderRequest::new(spec).metering(MeteringConfig::mute_above(0.05, 0.5)),
    )
    .unwrap()
    .unwrap()
    .wait();

    assert_eq!(outcome.frames, 500);
    assert_eq!(sink.len(), 500);
    assert!(sink.points().iter().all(|&v| v == 0.0));
}

#[test]
fn declined_selection_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 44100);
    let session = Renderer::start(constant(0.5, 100, 1), || None, RenderRequest::new(spec)).unwrap();
    assert!(session.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn cancel_stops_render_and_finalizes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cancelled.wav");
    let spec = SampleSpec::new(Channels::Stereo, BitDepth::Sixteen, 44100);
    let endless = |sink: &mut dyn FrameSink, cancel: &CancelToken| -> GeneratorResult {
        let mut block = [0.1f32; 512];
        while !cancel.is_cancelled() {
            sink.write(&mut block)?;
        }
        Ok(())
    };

    let target = DestinationTarget::file(&path, FileFormat::Wav);
    let session = Renderer::start(endless, || Some(target), RenderRequest::new(spec))
        .unwrap()
        .unwrap();
    let token = session.cancel_token();
    while session.progress().frames == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
    token.cancel();
    let outcome = session.wait();

    assert!(outcome.cancelled);
    assert!(outcome.failure.is_none());
    assert!(outcome.frames > 0);
    let info = read_audio_info(&path).unwrap();
    assert_eq!(info.frames, outcome.frames);
}

#[test]
fn generator_error_is_reported_as_synthesis_failure() {
    let sink = MemorySink::new();
    let target = DestinationTarget::Memory(sink.clone());
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
    let failing = |sink: &mut dyn FrameSink, _: &CancelToken| -> GeneratorResult {
        sink.write(&mut [0.1; 64])?;
        Err("instrument compile error".into())
    };

    let outcome = Renderer::start(failing, || Some(target), RenderRequest::new(spec))
        .unwrap()
        .unwrap()
        .wait();

    assert_eq!(
        outcome.failure,
        Some(RenderFailure::Synthesis("instrument compile error".into()))
    );
    assert_eq!(outcome.frames, 64);
    assert!(sink.is_finished());
    assert!(sink.was_aborted());
}

#[test]
fn generator_panic_is_caught() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("panic.aiff");
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
    let panicking = |sink: &mut dyn FrameSink, _: &CancelToken| -> GeneratorResult {
        sink.write(&mut [0.2; 100])?;
        panic!("voice index out of range");
    };

    let target = DestinationTarget::file(&path, FileFormat::Aiff);
    let outcome = Renderer::start(panicking, || Some(target), RenderRequest::new(spec))
        .unwrap()
        .unwrap()
        .wait();

    match outcome.failure {
        Some(RenderFailure::Synthesis(msg)) => assert!(msg.contains("voice index out of range")),
        other => panic!("unexpected failure: {other:?}"),
    }
    // The partial file is still finalized.
    assert_eq!(read_audio_info(&path).unwrap().frames, 100);
}

#[test]
fn unwritable_destination_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no-such-dir").join("out.wav");
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);
    let notified = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&notified);

    let target = DestinationTarget::file(&path, FileFormat::Wav);
    let outcome = Renderer::start(
        constant(0.1, 100, 1),
        || Some(target),
        RenderRequest::new(spec).error_notifier(move |f| *slot.lock().unwrap() = Some(f.clone())),
    )
    .unwrap()
    .unwrap()
    .wait();

    assert!(matches!(outcome.failure, Some(RenderFailure::Destination(_))));
    assert_eq!(outcome.frames, 0);
    assert_eq!(*notified.lock().unwrap(), outcome.failure);
}

#[test]
fn progress_reports_final_snapshot() {
    let snapshots: Arc<Mutex<Vec<ProgressSnapshot>>> = Arc::default();
    let log = Arc::clone(&snapshots);
    let spec = SampleSpec::new(Channels::Mono, BitDepth::Sixteen, 8000);

    let outcome = Renderer::start(
        constant(0.3, 8000, 1),
        || Some(DestinationTarget::Memory(MemorySink::new())),
        RenderRequest::new(spec).progress(ProgressConfig::new(Duration::from_millis(1), move |s| {
            log.lock().unwrap().push(*s);
        })),
    )
    .unwrap()
    .unwrap()
    .wait();

    let snapshots = snapshots.lock().unwrap();
    let last = snapshots.last().expect("at least the final snapshot");
    assert!(last.finished);
    assert_eq!(last.frames, outcome.frames);
    assert!(snapshots.windows(2).all(|w| w[0].frames <= w[1].frames));
}

#[test]
fn non_modal_session_can_be_polled() {
    let spec = SampleSpec::new(Channels::Stereo, BitDepth::Eight, 8000);
    let mut session = Renderer::start(
        constant(0.1, 2000, 2),
        || Some(DestinationTarget::Memory(MemorySink::new())),
        RenderRequest::new(spec),
    )
    .unwrap()
    .unwrap();

    while !session.is_finished() {
        std::thread::sleep(Duration::from_millis(1));
    }
    let outcome = session.try_outcome().cloned().unwrap();
    assert_eq!(outcome.frames, 2000);
    drop(session);
}
