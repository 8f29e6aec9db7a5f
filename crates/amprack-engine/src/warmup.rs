//! Synthetic warm-up pass run on freshly built resources.
//!
//! An impulse followed by silence is pushed through the resource in
//! engine-sized blocks. Internal filters settle, and the position of the
//! strongest output sample gives the resource's latency in frames.

/// Push an impulse through `process` and return the index of the output peak.
///
/// `frames` is the length of the pass and `block` the chunk size handed to
/// `process`. Returns 0 for a silent resource.
pub fn measure_latency(frames: usize, block: usize, mut process: impl FnMut(&mut [f32])) -> usize {
    if frames == 0 {
        return 0;
    }

    let mut signal = vec![0.0f32; frames];
    signal[0] = 1.0;

    for chunk in signal.chunks_mut(block.max(1)) {
        process(chunk);
    }

    peak_index(&signal)
}

fn peak_index(signal: &[f32]) -> usize {
    let mut best = 0;
    let mut peak = 0.0f32;
    for (i, &s) in signal.iter().enumerate() {
        let magnitude = s.abs();
        if magnitude > peak {
            peak = magnitude;
            best = i;
        }
    }
    best
}
