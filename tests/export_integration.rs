//! Recording a running pipeline to WAV through the recorder stage.

mod helpers;

use cadenza::dsp::scale;
use cadenza::export::BitDepth;
use cadenza::prelude::*;
use helpers::tolerances::{FLOAT_EPSILON, INT16_EPSILON};
use helpers::*;

const FRAGMENTS: usize = 50;

fn options(engine: &Engine, bit_depth: BitDepth) -> RecordingOptions {
    RecordingOptions {
        bit_depth,
        ..RecordingOptions::for_engine(engine.config())
    }
}

fn stereo_sine(frames: usize) -> Vec<f32> {
    generate_sine(440.0, TEST_SAMPLE_RATE, frames)
        .into_iter()
        .flat_map(|x| [x, x * 0.25])
        .collect()
}

fn read_wav_f32(path: &std::path::Path) -> (hound::WavSpec, Vec<f32>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().map(Result::unwrap).collect(),
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.unwrap() as f32 / i16::MAX as f32)
            .collect(),
    };
    (spec, samples)
}

#[test]
fn records_pipeline_output_to_wav() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");

    let mut engine = test_engine(2);
    let options = options(&engine, BitDepth::Float32);
    assert_eq!(options.channels, 2);
    assert_eq!(options.queue_capacity, engine.config().queue_capacity);
    let (session, recorder) = RecordingSession::wav(&path, &options).unwrap();
    recorder.register(engine.registry(), "recorder");
    engine
        .load_stages([
            StageSpec::with_params("gain", params! { "gain" => 0.5 }),
            StageSpec::from("recorder"),
        ])
        .unwrap();
    engine.start().unwrap();

    let signal = stereo_sine(TEST_FRAGMENT_LEN * FRAGMENTS);
    for chunk in signal.chunks_exact(TEST_FRAGMENT_LEN * 2) {
        let input = fragment(2, chunk);
        let outcome = engine.process(&input);
        assert!(outcome.is_ready());
    }
    engine.shutdown().unwrap();

    let (summary, report) = session.finish().unwrap();
    assert_eq!(report.dropped, 0);
    assert_eq!(report.samples, signal.len() as u64);
    assert_eq!(report.frames, (TEST_FRAGMENT_LEN * FRAGMENTS) as u64);
    assert_eq!(summary.frames, report.frames);
    assert_eq!(summary.path, path);

    let (spec, recorded) = read_wav_f32(&path);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, TEST_SAMPLE_RATE as u32);
    assert_eq!(spec.bits_per_sample, 32);
    assert_signals_close(&recorded, &scale(&signal, 0.5), FLOAT_EPSILON);
}

#[test]
fn disarmed_recorder_passes_audio_without_capturing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("armed.wav");

    let mut engine = test_engine(2);
    let (session, recorder) =
        RecordingSession::wav(&path, &options(&engine, BitDepth::Int16)).unwrap();
    recorder.register(engine.registry(), "recorder");
    engine.load_stages(["recorder"]).unwrap();
    engine.start().unwrap();

    let signal = stereo_sine(TEST_FRAGMENT_LEN * 2);
    let (first, second) = signal.split_at(TEST_FRAGMENT_LEN * 2);

    assert!(engine.process(&fragment(2, first)).is_ready());
    engine
        .set_params("recorder", &params! { "armed" => false })
        .unwrap();
    let output = engine.process(&fragment(2, second)).signal().unwrap().clone();
    assert_signals_close(output.as_time().unwrap().samples(), second, FLOAT_EPSILON);

    // The queue has one producer, so the recorder cannot be built twice.
    let err = engine.load_stages(["recorder"]).unwrap_err();
    assert!(matches!(
        err,
        cadenza::Error::Core(cadenza::core::Error::Registry(
            cadenza::core::RegistryError::ConstructionFailed(_)
        ))
    ));
    drop(engine);

    let (summary, report) = session.finish().unwrap();
    assert_eq!(report.frames, TEST_FRAGMENT_LEN as u64);
    assert_eq!(summary.samples, first.len() as u64);

    let (spec, recorded) = read_wav_f32(&path);
    assert_eq!(spec.bits_per_sample, 16);
    assert_signals_close(&recorded, first, INT16_EPSILON);
}
