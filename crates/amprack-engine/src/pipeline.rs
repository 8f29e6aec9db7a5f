//! Latency-free processing of one buffer.
//!
//! ```text
//! input gain ─┬─> gain A ─> model A (inline) ─────> delay ───┐
//!             └─> gain B ─> model B (helper 0) ─> delay ─────┴─> blend ─> DC block ─┐
//!                                                                                   │
//!          ┌────────────────────────────────────────────────────────────────────────┘
//!          ├─> IR 1 (inline) ───┐
//!          └─> IR 2 (helper 1) ─┴─> mix ─> output gain
//! ```
//!
//! Only one of the two model delays is ever non-zero: the signed offset of
//! model B against model A picks the path that is ahead.
//!
//! Secondary stages are handed to a real-time helper through a
//! [`SecondaryJob`] while the primary stage runs on the calling thread. If
//! the helper cannot be acquired or misses its completion deadline, the
//! secondary result is dropped for that buffer and an xrun is counted; the
//! output is then exactly what it would be with the secondary slot empty.

use crate::params::{EngineParams, MAX_DELAY};
use crate::slot::{SlotId, Slots};
use crate::stage::{DcBlocker, DelayLine};
use amprack_core::{db_to_gain, SmoothedValue, WorkerHandle};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Gain ramp length.
const GAIN_SMOOTH_SECS: f32 = 0.010;

/// Which secondary stage a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobKind {
    /// Model B, followed by the alignment delay.
    Model,
    /// IR 2.
    Convolver,
}

/// Scratch buffer and instructions shared with one helper.
pub(crate) struct SecondaryJob {
    kind: JobKind,
    buffer: Vec<f32>,
    len: usize,
    /// Dispatch this job belongs to.
    ticket: u64,
    /// Ticket of the last run that produced output.
    done: u64,
    normalize_to: Option<f32>,
    input_gain: SmoothedValue,
    delay: DelayLine,
    /// Clear the delay history before the next run.
    clear_delay: bool,
}

/// Longest alignment delay a model path can need: any measurable latency
/// difference (below `warmup_frames`) plus the user offset.
pub(crate) fn alignment_span(warmup_frames: usize) -> usize {
    MAX_DELAY + warmup_frames
}

impl SecondaryJob {
    pub fn new(kind: JobKind, capacity: usize, warmup_frames: usize, sample_rate: u32) -> Self {
        let max_delay = match kind {
            JobKind::Model => alignment_span(warmup_frames),
            JobKind::Convolver => 0,
        };
        Self {
            kind,
            buffer: vec![0.0; capacity],
            len: 0,
            ticket: 0,
            done: 0,
            normalize_to: None,
            input_gain: SmoothedValue::new(1.0, GAIN_SMOOTH_SECS, sample_rate as f32),
            delay: DelayLine::new(max_delay),
            clear_delay: false,
        }
    }

    fn prepare(&mut self, input: &[f32], ticket: u64) {
        self.len = input.len();
        self.buffer[..self.len].copy_from_slice(input);
        self.ticket = ticket;
    }

    /// Process the prepared buffer with the secondary slot.
    pub fn run(&mut self, slots: &Slots) {
        let len = self.len;
        let normalize_to = self.normalize_to;
        let buffer = &mut self.buffer[..len];

        let input_gain = &mut self.input_gain;
        let produced = match self.kind {
            JobKind::Model => slots
                .model_b
                .with_resource(|stage| {
                    input_gain.apply_gain(buffer);
                    stage.process(buffer, normalize_to)
                })
                .is_some(),
            JobKind::Convolver => slots
                .ir2
                .with_resource(|stage| stage.process(buffer))
                .is_some(),
        };

        if produced {
            if self.kind == JobKind::Model {
                if std::mem::take(&mut self.clear_delay) {
                    self.delay.clear();
                }
                self.delay.process(&mut self.buffer[..len]);
            }
            self.done = self.ticket;
        }
    }

    fn output(&self) -> &[f32] {
        &self.buffer[..self.len]
    }

    fn ensure_capacity(&mut self, frames: usize) {
        if self.buffer.len() < frames {
            self.buffer.resize(frames, 0.0);
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.input_gain
            .set_smooth_time(GAIN_SMOOTH_SECS, sample_rate as f32);
    }
}

pub(crate) type SharedJob = Arc<Mutex<SecondaryJob>>;

enum Dispatch {
    /// Secondary slot empty or bypassed.
    Off,
    /// Handed to the helper.
    Queued(u64),
    /// Already ran on the calling thread.
    Inline(u64),
    /// Helper unavailable in time.
    Missed,
}

pub(crate) struct Pipeline {
    input_gain: SmoothedValue,
    output_gain: SmoothedValue,
    model_a_gain: SmoothedValue,
    /// Alignment delay after model A.
    primary_delay: DelayLine,
    /// Phase correction state of the previous cycle.
    phase_correction: bool,
    dc_blocker: DcBlocker,
    dc_block: bool,
    /// `[model B, IR 2]`
    jobs: [SharedJob; 2],
    helpers: [WorkerHandle; 2],
    parallel: bool,
    ticket: u64,
    capacity: usize,
}

impl Pipeline {
    pub fn new(
        jobs: [SharedJob; 2],
        helpers: [WorkerHandle; 2],
        capacity: usize,
        warmup_frames: usize,
        sample_rate: u32,
        parallel: bool,
    ) -> Self {
        Self {
            input_gain: SmoothedValue::new(1.0, GAIN_SMOOTH_SECS, sample_rate as f32),
            output_gain: SmoothedValue::new(1.0, GAIN_SMOOTH_SECS, sample_rate as f32),
            model_a_gain: SmoothedValue::new(1.0, GAIN_SMOOTH_SECS, sample_rate as f32),
            primary_delay: DelayLine::new(alignment_span(warmup_frames)),
            phase_correction: true,
            dc_blocker: DcBlocker::new(),
            dc_block: false,
            jobs,
            helpers,
            parallel,
            ticket: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        for gain in [
            &mut self.input_gain,
            &mut self.output_gain,
            &mut self.model_a_gain,
        ] {
            gain.set_smooth_time(GAIN_SMOOTH_SECS, sample_rate as f32);
        }
        self.jobs[0].lock().set_sample_rate(sample_rate);
    }

    /// Grow every scratch buffer to `frames`. Waits for running helpers.
    pub fn ensure_capacity(&mut self, frames: usize) {
        if frames <= self.capacity {
            return;
        }
        for job in &self.jobs {
            job.lock().ensure_capacity(frames);
        }
        self.capacity = frames;
    }

    /// Process `buffer` in place, returning the number of deadline misses.
    ///
    /// `buffer` must not exceed [`capacity`](Self::capacity).
    pub fn process(
        &mut self,
        buffer: &mut [f32],
        slots: &Slots,
        params: &EngineParams,
        normalize_target_db: f32,
    ) -> u64 {
        if params.bypass() || buffer.len() > self.capacity {
            return 0;
        }

        let mut xruns = 0;

        self.input_gain
            .set_target(db_to_gain(params.input_gain_db()));
        self.input_gain.apply_gain(buffer);

        self.run_models(buffer, slots, params, normalize_target_db, &mut xruns);
        self.run_convolvers(buffer, slots, params, &mut xruns);

        self.output_gain
            .set_target(db_to_gain(params.output_gain_db()));
        self.output_gain.apply_gain(buffer);

        xruns
    }

    fn run_models(
        &mut self,
        buffer: &mut [f32],
        slots: &Slots,
        params: &EngineParams,
        normalize_target_db: f32,
        xruns: &mut u64,
    ) {
        let normalize_to = params.normalize().then_some(normalize_target_db);
        let a_on = !params.slot_bypassed(SlotId::ModelA) && slots.model_a.is_active();
        let b_on = !params.slot_bypassed(SlotId::ModelB) && slots.model_b.is_active();

        let phase_correction = params.phase_correction();
        let toggled = phase_correction != self.phase_correction;
        self.phase_correction = phase_correction;
        if toggled {
            self.primary_delay.clear();
        }

        // Positive: model B is ahead and gets delayed; negative: model A
        let correction = if phase_correction && a_on && b_on {
            slots.model_a.latency() as isize - slots.model_b.latency() as isize
        } else {
            0
        };
        let offset = correction + params.delay();
        let (delay_a, delay_b) = if offset < 0 {
            (offset.unsigned_abs(), 0)
        } else {
            (0, offset.unsigned_abs())
        };

        let dispatch = if b_on {
            let gain_b = db_to_gain(params.model_b_input_gain_db());
            self.dispatch(0, buffer, slots, |job| {
                job.normalize_to = normalize_to;
                job.input_gain.set_target(gain_b);
                job.delay.set_delay(delay_b);
                job.clear_delay |= toggled;
            })
        } else {
            Dispatch::Off
        };

        self.model_a_gain
            .set_target(db_to_gain(params.model_a_input_gain_db()));
        let model_a_gain = &mut self.model_a_gain;
        let a_ran = a_on
            && slots
                .model_a
                .with_resource(|stage| {
                    model_a_gain.apply_gain(buffer);
                    stage.process(buffer, normalize_to)
                })
                .is_some();
        if a_ran {
            self.primary_delay.set_delay(delay_a);
            self.primary_delay.process(buffer);
        }

        let secondary = self.collect(0, dispatch, xruns);
        combine(
            buffer,
            a_ran,
            secondary.as_deref().map(SecondaryJob::output),
            params.blend(),
        );
        drop(secondary);

        let dc_block = params.dc_block();
        if dc_block && !self.dc_block {
            self.dc_blocker.reset();
        }
        self.dc_block = dc_block;
        if dc_block {
            self.dc_blocker.process(buffer);
        }
    }

    fn run_convolvers(
        &mut self,
        buffer: &mut [f32],
        slots: &Slots,
        params: &EngineParams,
        xruns: &mut u64,
    ) {
        let ir1_on = !params.slot_bypassed(SlotId::Ir1) && slots.ir1.is_active();
        let ir2_on = !params.slot_bypassed(SlotId::Ir2) && slots.ir2.is_active();

        let dispatch = if ir2_on {
            self.dispatch(1, buffer, slots, |_| {})
        } else {
            Dispatch::Off
        };

        let ir1_ran = ir1_on
            && slots
                .ir1
                .with_resource(|stage| stage.process(buffer))
                .is_some();

        let secondary = self.collect(1, dispatch, xruns);
        combine(
            buffer,
            ir1_ran,
            secondary.as_deref().map(SecondaryJob::output),
            params.mix(),
        );
    }

    fn dispatch(
        &mut self,
        index: usize,
        input: &[f32],
        slots: &Slots,
        configure: impl FnOnce(&mut SecondaryJob),
    ) -> Dispatch {
        if self.parallel && !self.helpers[index].try_acquire_for_run() {
            return Dispatch::Missed;
        }

        // Held by the helper only while it runs, and it is idle now
        let Some(mut job) = self.jobs[index].try_lock() else {
            return Dispatch::Missed;
        };
        self.ticket += 1;
        job.prepare(input, self.ticket);
        configure(&mut *job);

        if !self.parallel {
            job.run(slots);
            return Dispatch::Inline(self.ticket);
        }

        drop(job);
        if self.helpers[index].request_run() {
            Dispatch::Queued(self.ticket)
        } else {
            Dispatch::Missed
        }
    }

    /// The job's output, if it was produced for this dispatch in time.
    fn collect(
        &self,
        index: usize,
        dispatch: Dispatch,
        xruns: &mut u64,
    ) -> Option<MutexGuard<'_, SecondaryJob>> {
        let ticket = match dispatch {
            Dispatch::Off => return None,
            Dispatch::Missed => {
                *xruns += 1;
                return None;
            }
            Dispatch::Queued(ticket) => {
                if !self.helpers[index].wait_for_completion() {
                    *xruns += 1;
                    return None;
                }
                ticket
            }
            Dispatch::Inline(ticket) => ticket,
        };

        self.jobs[index]
            .try_lock()
            .filter(|job| job.done == ticket)
    }
}

/// Merge a primary and an optional secondary result into `primary`.
///
/// Both present: weighted by `balance` (0.0 = primary only). Only one
/// present: that one. Neither: `primary` is left as the dry input.
#[inline]
fn combine(primary: &mut [f32], primary_ran: bool, secondary: Option<&[f32]>, balance: f32) {
    match (primary_ran, secondary) {
        (true, Some(secondary)) => {
            for (p, &s) in primary.iter_mut().zip(secondary) {
                *p = *p * (1.0 - balance) + s * balance;
            }
        }
        (false, Some(secondary)) => primary.copy_from_slice(secondary),
        (_, None) => {}
    }
}
