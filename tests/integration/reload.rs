//! Reload protocol integration tests
//!
//! Requests go through the GUI-side handle; the reconfiguration worker
//! builds, publishes and drops resources while the audio thread may or may
//! not be running.

use amprack::prelude::*;
use std::time::Duration;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::tolerances::*;
use helpers::*;

fn slot_events(events: &crossbeam_channel::Receiver<EngineEvent>) -> Vec<(SlotId, String)> {
    events
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::SlotChanged { slot, path } => Some((slot, path)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_reload_publishes_path_and_event() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let (mut engine, probe) = test_engine();
    let handle = engine.handle();
    let events = handle.events();

    load(&handle, SlotId::ModelA, &amp);

    assert!(handle.is_slot_active(SlotId::ModelA));
    assert_eq!(handle.slot_path(SlotId::ModelA), amp.display().to_string());
    assert_eq!(probe.alive(), 1);
    assert_eq!(
        slot_events(&events),
        vec![(SlotId::ModelA, amp.display().to_string())]
    );

    let output = run_blocks(&mut engine, &vec![1.0; TEST_BUFFER_SIZE], TEST_BUFFER_SIZE);
    assert!(output.iter().all(|&s| (s - 0.5).abs() < FLOAT_EPSILON));
}

/// Requesting the path that is already requested queues nothing.
#[test]
fn test_identical_reload_is_skipped() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let (engine, probe) = test_engine();
    let handle = engine.handle();

    load(&handle, SlotId::ModelA, &amp);
    assert!(!handle.request_reload(SlotId::ModelA, &amp));
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));

    assert_eq!(handle.reconfig_runs(), 1);
    assert_eq!(probe.loads_of(&amp), 1);
}

#[test]
fn test_force_reload_rebuilds_same_path() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let (engine, probe) = test_engine();
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp);

    handle.force_reload(SlotId::ModelA);
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));

    assert_eq!(probe.loads_of(&amp), 2);
    assert_eq!(probe.alive(), 1);
    assert!(handle.is_slot_active(SlotId::ModelA));
}

/// Two requests while the first build is still running: the slot ends up
/// with the second path and the first resource is not leaked.
#[test]
fn test_latest_request_wins() {
    let presets = Presets::new();
    let first = presets.write("first.nam", "gain=0.5\nload_us=100000");
    let second = presets.write("second.nam", "gain=0.25");
    let (engine, probe) = test_engine();
    let handle = engine.handle();

    assert!(handle.request_reload(SlotId::ModelB, &first));
    std::thread::sleep(Duration::from_millis(20));
    assert!(handle.request_reload(SlotId::ModelB, &second));
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));

    assert_eq!(handle.slot_path(SlotId::ModelB), second.display().to_string());
    assert_eq!(probe.loads_of(&second), 1);
    assert_eq!(probe.alive(), 1);
}

#[test]
fn test_failed_load_resets_slot() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let missing = presets.missing("gone.nam");
    let (mut engine, probe) = test_engine();
    let handle = engine.handle();
    let events = handle.events();

    load(&handle, SlotId::ModelA, &amp);
    load(&handle, SlotId::ModelA, &missing);

    assert!(!handle.is_slot_active(SlotId::ModelA));
    assert_eq!(handle.slot_path(SlotId::ModelA), NONE_LABEL);
    assert_eq!(probe.alive(), 0);
    assert_eq!(
        slot_events(&events).last(),
        Some(&(SlotId::ModelA, NONE_LABEL.to_string()))
    );

    // Empty slot: dry signal
    let input = vec![1.0; TEST_BUFFER_SIZE];
    assert_eq!(run_blocks(&mut engine, &input, TEST_BUFFER_SIZE), input);

    // The failed path can be requested again
    assert!(handle.request_reload(SlotId::ModelA, &missing));
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));
}

#[test]
fn test_malformed_preset_is_rejected() {
    let presets = Presets::new();
    let broken = presets.write("broken.wav", "gain=abc");
    let (engine, _probe) = test_engine();
    let handle = engine.handle();

    load(&handle, SlotId::Ir1, &broken);

    assert!(!handle.is_slot_active(SlotId::Ir1));
    assert_eq!(handle.slot_path(SlotId::Ir1), NONE_LABEL);
}

#[test]
fn test_unload_drops_resource() {
    let presets = Presets::new();
    let cab = presets.write("v30.wav", "gain=0.5");
    let (engine, probe) = test_engine();
    let handle = engine.handle();

    load(&handle, SlotId::Ir1, &cab);
    assert_eq!(probe.alive(), 1);

    assert!(handle.request_unload(SlotId::Ir1));
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));

    assert_eq!(probe.alive(), 0);
    assert_eq!(handle.slot_path(SlotId::Ir1), NONE_LABEL);
    assert!(!handle.request_unload(SlotId::Ir1));
}

#[test]
fn test_slots_reload_independently() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let cab = presets.write("v30.wav", "gain=0.5");
    let (mut engine, probe) = test_engine();
    let handle = engine.handle();

    handle.request_reload(SlotId::ModelA, &amp);
    handle.request_reload(SlotId::Ir1, &cab);
    assert!(handle.wait_for_reconfiguration(RELOAD_TIMEOUT));

    assert_eq!(probe.alive(), 2);
    let output = run_blocks(&mut engine, &vec![1.0; TEST_BUFFER_SIZE], TEST_BUFFER_SIZE);
    assert!(output.iter().all(|&s| (s - 0.25).abs() < FLOAT_EPSILON));
}

#[test]
fn test_warmup_measures_latency() {
    let presets = Presets::new();
    let amp = presets.write("slow.nam", "gain=1.0\nlatency=32");
    let (engine, _probe) = test_engine();
    let handle = engine.handle();

    load(&handle, SlotId::ModelA, &amp);
    assert_eq!(handle.slot_latency(SlotId::ModelA), 32);
}

#[test]
fn test_resampled_model_is_loaded() {
    let presets = Presets::new();
    let amp = presets.write("vintage.nam", "gain=0.5\nrate=44100");
    let (mut engine, _probe) = test_engine();
    load(&engine.handle(), SlotId::ModelA, &amp);

    let input = vec![1.0; TEST_BUFFER_SIZE * 4];
    let output = run_blocks(&mut engine, &input, TEST_BUFFER_SIZE);

    // Linear interpolation of a constant settles on the constant
    let tail = &output[output.len() - TEST_BUFFER_SIZE..];
    assert!(tail.iter().all(|&s| (s - 0.5).abs() < DSP_EPSILON));
}

/// Dropping the engine drops every loaded resource.
#[test]
fn test_drop_releases_resources() {
    let presets = Presets::new();
    let amp = presets.write("plexi.nam", "gain=0.5");
    let cab = presets.write("v30.wav", "gain=0.5");
    let (engine, probe) = test_engine();
    let handle = engine.handle();
    load(&handle, SlotId::ModelA, &amp);
    load(&handle, SlotId::Ir2, &cab);
    assert_eq!(probe.alive(), 2);

    drop(engine);
    drop(handle);
    assert_eq!(probe.alive(), 0);
}
