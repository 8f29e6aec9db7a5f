//! Real-time behaviour integration tests
//!
//! The audio thread must never wait longer than its bounded protocols allow,
//! never touch a resource that is being dropped, and degrade to the
//! primary-only signal when a helper misses its deadline.

use amprack::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::tolerances::*;
use helpers::*;

fn period() -> Duration {
    Duration::from_secs_f64(TEST_BUFFER_SIZE as f64 / TEST_SAMPLE_RATE as f64)
}

/// Reloading every slot over and over while another thread processes audio.
#[test]
fn test_no_resource_dropped_mid_process() {
    let presets = Presets::new();
    let amps = [
        presets.write("a.nam", "gain=0.5\nprocess_us=200"),
        presets.write("b.nam", "gain=0.7\nload_us=2000\nlatency=4"),
    ];
    let cabs = [
        presets.write("a.wav", "gain=0.5\nprocess_us=200"),
        presets.write("b.wav", "gain=0.9\nload_us=2000"),
    ];
    let (mut engine, probe) = test_engine();
    let handle = engine.handle();
    let stop = Arc::new(AtomicBool::new(false));

    let audio = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let input = generate_sine(110.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
            while !stop.load(Ordering::Relaxed) {
                let mut buffer = input.clone();
                engine.process(&mut buffer);
                assert!(buffer.iter().all(|s| s.is_finite()));
                thread::sleep(Duration::from_millis(1));
            }
            engine
        })
    };

    for round in 0..20 {
        let pick = round % 2;
        handle.request_reload(SlotId::ModelA, &amps[pick]);
        handle.request_reload(SlotId::ModelB, &amps[1 - pick]);
        handle.request_reload(SlotId::Ir1, &cabs[pick]);
        handle.request_reload(SlotId::Ir2, &cabs[1 - pick]);
        thread::sleep(Duration::from_millis(5));
    }
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));

    stop.store(true, Ordering::Relaxed);
    let engine = audio.join().expect("audio thread panicked");

    assert_eq!(probe.violations(), 0);
    assert_eq!(probe.alive(), 4);
    for slot in SlotId::ALL {
        assert!(handle.is_slot_active(slot), "{slot} not active");
    }
    drop(engine);
    assert_eq!(probe.alive(), 0);
}

/// A 50ms impulse response build never shows up in the audio callback.
#[test]
fn test_slow_build_does_not_block_audio() {
    let presets = Presets::new();
    let fast = presets.write("fast.wav", "gain=0.5");
    let slow = presets.write("slow.wav", "gain=0.25\nload_us=50000");
    let (mut engine, _probe) = test_engine();
    let handle = engine.handle();
    load(&handle, SlotId::Ir1, &fast);

    let input = vec![1.0; TEST_BUFFER_SIZE];
    let mut buffer = input.clone();
    engine.process(&mut buffer);

    handle.request_reload(SlotId::Ir1, &slow);

    let deadline = Instant::now() + RELOAD_TIMEOUT;
    let mut worst = Duration::ZERO;
    let mut outputs = Vec::new();
    let slow_label = slow.display().to_string();
    while !(handle.is_slot_active(SlotId::Ir1) && handle.slot_path(SlotId::Ir1) == slow_label) {
        assert!(Instant::now() < deadline, "reload never finished");
        let mut buffer = input.clone();
        let started = Instant::now();
        engine.process(&mut buffer);
        worst = worst.max(started.elapsed());
        outputs.push(buffer[0]);
        thread::sleep(Duration::from_millis(1));
    }

    assert!(worst < period(), "process took {worst:?}");
    assert_eq!(engine.xrun_count(), 0);
    // Old IR, then the dry signal while the new one builds
    assert!(outputs
        .iter()
        .all(|&s| (s - 0.5).abs() < FLOAT_EPSILON || (s - 1.0).abs() < FLOAT_EPSILON));

    let mut buffer = input.clone();
    engine.process(&mut buffer);
    assert!(buffer.iter().all(|&s| (s - 0.25).abs() < FLOAT_EPSILON));
}

/// Model B takes far longer than a buffer: every cycle is an xrun and the
/// output is exactly the model-A-only output.
#[test]
fn test_starved_helper_degrades_to_primary() {
    let presets = Presets::new();
    let amp = presets.write("a.nam", "gain=0.5");
    let starved = presets.write("b.nam", "gain=1.0\nprocess_us=20000");

    let (mut engine, _probe) = test_engine();
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp);
    load(&handle, SlotId::ModelB, &starved);

    let (mut reference, _ref_probe) = test_engine();
    load(&reference.handle(), SlotId::ModelA, &amp);

    let cycles = 20;
    let input = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE * cycles);
    let mut last_xruns = 0;
    let mut worst = Duration::ZERO;

    for block in input.chunks(TEST_BUFFER_SIZE) {
        let mut buffer = block.to_vec();
        let started = Instant::now();
        engine.process(&mut buffer);
        worst = worst.max(started.elapsed());

        let mut expected = block.to_vec();
        reference.process(&mut expected);
        assert_eq!(buffer, expected);

        let xruns = engine.xrun_count();
        assert!(xruns >= last_xruns);
        last_xruns = xruns;
    }

    assert!(last_xruns >= cycles as u64 / 2, "only {last_xruns} xruns");
    assert!(worst < period(), "process took {worst:?}");
    assert_eq!(reference.xrun_count(), 0);

    let reported = handle
        .events()
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::Xrun { count } => Some(count),
            _ => None,
        })
        .last();
    assert!(reported.is_some());
}

/// Helper threads and inline execution produce the same samples.
#[test]
fn test_parallel_matches_inline() {
    let presets = Presets::new();
    let amp_a = presets.write("a.nam", "gain=0.5\nlatency=3");
    let amp_b = presets.write("b.nam", "gain=0.8");
    let cab_1 = presets.write("1.wav", "gain=0.9");
    let cab_2 = presets.write("2.wav", "gain=0.6");

    let run = |parallel: bool| {
        let probe = Arc::new(Probe::default());
        let mut engine = relaxed_builder(&probe).parallel(parallel).build().unwrap();
        let handle = engine.handle();
        load(&handle, SlotId::ModelA, &amp_a);
        load(&handle, SlotId::ModelB, &amp_b);
        load(&handle, SlotId::Ir1, &cab_1);
        load(&handle, SlotId::Ir2, &cab_2);

        let params = engine.params();
        params.set_blend(0.3);
        params.set_mix(0.7);
        params.set_delay(5);

        let input = generate_sine(330.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE * 8);
        let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);
        assert_eq!(engine.xrun_count(), 0);
        output
    };

    assert_eq!(run(true), run(false));
}

#[test]
fn test_blend_weights_models() {
    let presets = Presets::new();
    let amp_a = presets.write("a.nam", "gain=0.5");
    let amp_b = presets.write("b.nam", "gain=1.0");
    let probe = Arc::new(Probe::default());
    let mut engine = relaxed_builder(&probe).build().unwrap();
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp_a);
    load(&handle, SlotId::ModelB, &amp_b);

    engine.params().set_blend(0.25);
    let output = run_blocks(&mut engine, &vec![1.0; TEST_BUFFER_SIZE], TEST_BUFFER_SIZE);

    assert!(output.iter().all(|&s| (s - 0.625).abs() < FLOAT_EPSILON));
    assert_eq!(engine.xrun_count(), 0);
}

/// Engine with both models loaded from `a` and `b` presets.
fn two_models(a: &str, b: &str) -> (Engine, Presets) {
    let presets = Presets::new();
    let amp_a = presets.write("a.nam", a);
    let amp_b = presets.write("b.nam", b);
    let probe = Arc::new(Probe::default());
    let engine = relaxed_builder(&probe).build().unwrap();
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp_a);
    load(&handle, SlotId::ModelB, &amp_b);
    (engine, presets)
}

/// Model B is delayed by the latency difference so both paths line up.
#[test]
fn test_secondary_model_is_aligned() {
    let presets = Presets::new();
    let amp_a = presets.write("a.nam", "gain=1.0\nlatency=10");
    let amp_b = presets.write("b.nam", "gain=1.0");
    let probe = Arc::new(Probe::default());
    let mut engine = relaxed_builder(&probe).build().unwrap();
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp_a);
    load(&handle, SlotId::ModelB, &amp_b);
    assert_eq!(handle.slot_latency(SlotId::ModelA), 10);
    assert_eq!(handle.slot_latency(SlotId::ModelB), 0);

    engine.params().set_blend(0.5);
    let input = generate_impulse(TEST_BUFFER_SIZE, 0);
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    assert!((output[10] - 1.0).abs() < FLOAT_EPSILON);
    output[..10]
        .iter()
        .chain(&output[11..])
        .for_each(|&s| assert!(s.abs() < SILENCE_THRESHOLD));
}

#[test]
fn test_delay_parameter_offsets_secondary() {
    let presets = Presets::new();
    let amp_b = presets.write("b.nam", "gain=1.0");
    let probe = Arc::new(Probe::default());
    let mut engine = relaxed_builder(&probe).build().unwrap();
    load(&engine.handle(), SlotId::ModelB, &amp_b);

    engine.params().set_delay(7);
    let input = generate_impulse(TEST_BUFFER_SIZE, 0);
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    assert!((output[7] - 1.0).abs() < FLOAT_EPSILON);
    assert_silence(&output[..7], SILENCE_THRESHOLD);
}

/// The primary path is delayed when model B is the slower one.
#[test]
fn test_primary_model_is_aligned() {
    let (mut engine, _presets) = two_models("gain=1.0", "gain=1.0\nlatency=10");
    assert_eq!(engine.handle().slot_latency(SlotId::ModelB), 10);

    let input = generate_impulse(TEST_BUFFER_SIZE, 0);
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    assert!((output[10] - 1.0).abs() < FLOAT_EPSILON);
    output[..10]
        .iter()
        .chain(&output[11..])
        .for_each(|&s| assert!(s.abs() < SILENCE_THRESHOLD));
}

#[test]
fn test_phase_correction_can_be_disabled() {
    let (mut engine, _presets) = two_models("gain=1.0", "gain=1.0\nlatency=10");
    engine.params().set_phase_correction(false);

    let input = generate_impulse(TEST_BUFFER_SIZE, 0);
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    assert!((output[0] - 0.5).abs() < FLOAT_EPSILON);
    assert!((output[10] - 0.5).abs() < FLOAT_EPSILON);
}

#[test]
fn test_negative_delay_offsets_primary() {
    let presets = Presets::new();
    let amp_a = presets.write("a.nam", "gain=1.0");
    let probe = Arc::new(Probe::default());
    let mut engine = relaxed_builder(&probe).build().unwrap();
    load(&engine.handle(), SlotId::ModelA, &amp_a);

    engine.params().set_delay(-6);
    let input = generate_impulse(TEST_BUFFER_SIZE, 0);
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    assert!((output[6] - 1.0).abs() < FLOAT_EPSILON);
    assert_silence(&output[..6], SILENCE_THRESHOLD);
}

/// Latency difference and the full user delay stack beyond one buffer.
#[test]
fn test_large_offset_is_not_clamped() {
    let (mut engine, _presets) = two_models("gain=1.0\nlatency=300", "gain=1.0");
    let max_delay = amprack::engine::params::MAX_DELAY;
    engine.params().set_delay(max_delay as isize);

    let mut input = vec![0.0; TEST_BUFFER_SIZE * 18];
    input[0] = 1.0;
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    let b_at = 300 + max_delay;
    assert!((output[300] - 0.5).abs() < FLOAT_EPSILON);
    assert!((output[b_at] - 0.5).abs() < FLOAT_EPSILON);
    assert_silence(&output[b_at - 100..b_at], SILENCE_THRESHOLD);
}

#[test]
fn test_model_input_gains_are_per_model() {
    let (mut engine, _presets) = two_models("gain=1.0", "gain=1.0");
    let params = engine.params();
    params.set_blend(0.5);
    params.set_model_a_input_gain_db(-6.0);

    let input = vec![1.0; TEST_BUFFER_SIZE * 4];
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    // Both 10ms ramps have settled by the last buffer
    let expected = 0.5 * db_to_gain(-6.0) + 0.5;
    let tail = &output[output.len() - TEST_BUFFER_SIZE..];
    assert!(tail.iter().all(|&s| (s - expected).abs() < DSP_EPSILON));
}

#[test]
fn test_dc_blocker_removes_model_offset() {
    let presets = Presets::new();
    let amp = presets.write("a.nam", "gain=1.0");
    let probe = Arc::new(Probe::default());
    let mut engine = relaxed_builder(&probe).build().unwrap();
    load(&engine.handle(), SlotId::ModelA, &amp);

    engine.params().set_dc_block(true);
    let input = vec![1.0; TEST_BUFFER_SIZE * 20];
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    assert!((output[0] - 1.0).abs() < FLOAT_EPSILON);
    assert_silence(&output[output.len() - TEST_BUFFER_SIZE..], SILENCE_THRESHOLD);
}
