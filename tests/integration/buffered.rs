//! Buffered mode integration tests
//!
//! The whole chain runs on the background worker one buffer behind the
//! audio thread, trading one buffer of latency for headroom.

use amprack::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::tolerances::*;
use helpers::*;

fn buffered_engine(max_buffer_size: usize) -> (Engine, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let engine = mock_builder(&probe)
        .mode(ProcessingMode::Buffered)
        .max_buffer_size(max_buffer_size)
        .build()
        .expect("Failed to create buffered engine");
    (engine, probe)
}

/// Give the background worker a callback period to finish.
fn next_callback() {
    thread::sleep(Duration::from_millis(10));
}

#[test]
fn test_output_is_one_buffer_late() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let (mut engine, _probe) = buffered_engine(TEST_BUFFER_SIZE);
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp);
    let events = handle.events();

    let first = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
    let mut buffer = first.clone();
    engine.process(&mut buffer);
    assert_silence(&buffer, SILENCE_THRESHOLD);
    assert_eq!(engine.latency(), TEST_BUFFER_SIZE);

    next_callback();
    let mut buffer = vec![0.0; TEST_BUFFER_SIZE];
    engine.process(&mut buffer);
    let expected: Vec<f32> = first.iter().map(|s| s * 0.5).collect();
    assert!(signals_approx_equal(&buffer, &expected, FLOAT_EPSILON));
    assert_eq!(engine.xrun_count(), 0);

    let latencies: Vec<_> = events
        .try_iter()
        .filter(|event| matches!(event, EngineEvent::LatencyChanged { .. }))
        .collect();
    assert_eq!(
        latencies,
        vec![EngineEvent::LatencyChanged {
            samples: TEST_BUFFER_SIZE
        }]
    );
}

#[test]
fn test_steady_stream_has_no_gaps() {
    let (mut engine, _probe) = buffered_engine(TEST_BUFFER_SIZE);

    let input = generate_sine(220.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE * 6);
    let mut output = Vec::new();
    for block in input.chunks(TEST_BUFFER_SIZE) {
        let mut buffer = block.to_vec();
        engine.process(&mut buffer);
        output.extend_from_slice(&buffer);
        next_callback();
    }

    // Empty chain: the input, delayed by exactly one buffer
    assert_silence(&output[..TEST_BUFFER_SIZE], SILENCE_THRESHOLD);
    assert!(signals_approx_equal(
        &output[TEST_BUFFER_SIZE..],
        &input[..input.len() - TEST_BUFFER_SIZE],
        FLOAT_EPSILON
    ));
}

/// A host buffer above capacity falls back to latency-free processing until
/// the reconfiguration worker has grown the buffers.
#[test]
fn test_oversize_buffer_reallocates() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let (mut engine, _probe) = buffered_engine(128);
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp);
    let events = handle.events();

    let frames = 256;
    let mut buffer = vec![1.0; frames];
    engine.process(&mut buffer);
    assert!(buffer.iter().all(|&s| (s - 0.5).abs() < FLOAT_EPSILON));

    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));
    assert_eq!(handle.stats().capacity, frames);
    assert!(events
        .try_iter()
        .any(|event| event == EngineEvent::BufferReallocated { frames }));

    // Buffered again, starting over with one silent buffer
    let mut buffer = vec![1.0; frames];
    engine.process(&mut buffer);
    assert_silence(&buffer, SILENCE_THRESHOLD);

    next_callback();
    let mut buffer = vec![0.0; frames];
    engine.process(&mut buffer);
    assert!(buffer.iter().all(|&s| (s - 0.5).abs() < FLOAT_EPSILON));
}

#[test]
fn test_latency_free_reports_zero_latency() {
    let (mut engine, _probe) = test_engine();
    run_blocks(&mut engine, &vec![0.0; TEST_BUFFER_SIZE], TEST_BUFFER_SIZE);
    assert_eq!(engine.latency(), 0);
    assert_eq!(engine.handle().latency(), 0);
}

/// A chain far slower than the period costs xruns, never a late callback.
#[test]
fn test_slow_chain_keeps_callback_inside_period() {
    let presets = Presets::new();
    let amp = presets.write("fuzz.nam", "gain=0.5\nprocess_us=30000");
    let (mut engine, _probe) = buffered_engine(TEST_BUFFER_SIZE);
    load(&engine.handle(), SlotId::ModelA, &amp);

    let period = Duration::from_secs_f64(TEST_BUFFER_SIZE as f64 / TEST_SAMPLE_RATE as f64);
    let input = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
    let mut worst = Duration::ZERO;
    for _ in 0..10 {
        let mut buffer = input.clone();
        let started = Instant::now();
        engine.process(&mut buffer);
        worst = worst.max(started.elapsed());
        assert!(buffer.iter().all(|s| s.is_finite()));
    }

    assert!(worst < period, "process took {worst:?}");
    assert!(engine.xrun_count() > 0);
}
