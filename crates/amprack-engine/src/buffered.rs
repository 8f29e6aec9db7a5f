//! Double buffer for buffered mode.
//!
//! The background worker processes the previous callback's input while the
//! audio thread plays back the result of the one before. Output is one buffer
//! late; the very first buffer is silence.

/// Input and output halves of the exchange between the audio thread and the
/// background worker. Both halves hold `capacity` frames.
#[derive(Debug)]
pub struct DoubleBuffer {
    /// Filled by the audio thread, consumed by the next background cycle.
    input: Vec<f32>,
    /// Filled by the background cycle, consumed by the next callback.
    output: Vec<f32>,
    frames_in: usize,
    frames_out: usize,
}

impl DoubleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            input: vec![0.0; capacity],
            output: vec![0.0; capacity],
            frames_in: 0,
            frames_out: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.input.len()
    }

    /// Grow both halves. Anything in flight is discarded.
    pub fn ensure_capacity(&mut self, frames: usize) {
        if frames <= self.capacity() {
            return;
        }
        self.input.resize(frames, 0.0);
        self.output.resize(frames, 0.0);
        self.frames_in = 0;
        self.frames_out = 0;
    }

    /// Audio thread: stash `io` for the next background cycle and replace it
    /// with the previous cycle's result.
    ///
    /// Writes silence and returns `false` if no result of the same length is
    /// available (first cycle, a skipped cycle, or a buffer size change).
    pub fn exchange(&mut self, io: &mut [f32]) -> bool {
        let frames = io.len();
        if frames > self.capacity() {
            io.fill(0.0);
            return false;
        }

        self.input[..frames].copy_from_slice(io);
        self.frames_in = frames;

        let ready = self.frames_out == frames;
        if ready {
            io.copy_from_slice(&self.output[..frames]);
        } else {
            io.fill(0.0);
        }
        self.frames_out = 0;
        ready
    }

    /// Background worker: move the stashed input to the output half and run
    /// `process` on it in place. Returns `false` if nothing was stashed.
    pub fn process_pending(&mut self, process: impl FnOnce(&mut [f32])) -> bool {
        let frames = self.frames_in;
        if frames == 0 {
            return false;
        }

        std::mem::swap(&mut self.input, &mut self.output);
        self.frames_in = 0;
        process(&mut self.output[..frames]);
        self.frames_out = frames;
        true
    }
}
