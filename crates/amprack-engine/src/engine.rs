//! The orchestrator: owns the slots, the worker threads and the per-buffer
//! processing protocol.
//!
//! Threads:
//! - the audio thread, calling [`Engine::process`];
//! - two real-time helpers (`amprack-helper-0`, `amprack-helper-1`) running
//!   the secondary model and the secondary IR;
//! - the reconfiguration worker (`amprack-reconfig`), the only thread that
//!   builds or drops resources;
//! - in buffered mode, the background worker (`amprack-buffered`) running the
//!   whole chain one buffer behind.
//!
//! The audio thread only ever waits inside the bounded worker protocols and
//! calls [`Rendezvous::arrive`] at the end of every buffer.

use crate::buffered::DoubleBuffer;
use crate::event::{EngineEvent, Notifier};
use crate::params::EngineParams;
use crate::pipeline::{JobKind, Pipeline, SecondaryJob, SharedJob};
use crate::reload;
use crate::slot::{SlotId, Slots};
use crate::stage::{BuildContext, Factories};
use crate::state::{EngineState, EngineStats, REALLOCATE};
use crate::Result;
use amprack_core::{
    BoundedWorker, EngineConfig, LoadMeter, ProcessingMode, Rendezvous, SchedPolicy, WorkerHandle,
    WorkerState,
};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const HELPER_THREADS: [&str; 2] = ["amprack-helper-0", "amprack-helper-1"];
pub const RECONFIG_THREAD: &str = "amprack-reconfig";
pub const BUFFERED_THREAD: &str = "amprack-buffered";

/// State reachable from every engine thread.
pub(crate) struct Shared {
    pub config: EngineConfig,
    pub factories: Factories,
    pub slots: Arc<Slots>,
    pub state: EngineState,
    pub params: Arc<EngineParams>,
    pub rendezvous: Rendezvous,
    pub notifier: Notifier,
    pub meter: LoadMeter,
    /// Latency-free chain. The audio thread only `try_lock`s it.
    pub pipeline: Mutex<Pipeline>,
    /// Buffered-mode exchange. The audio thread only `try_lock`s it.
    pub buffers: Mutex<DoubleBuffer>,
}

impl Shared {
    pub fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            factories: &self.factories,
            sample_rate: self.state.sample_rate(),
            buffer_size: self.state.buffer_size(),
            capacity: self.state.capacity(),
            warmup_frames: self.config.warmup_frames,
            ir_normalize: self.params.ir_normalize(),
        }
    }

    #[inline]
    pub fn report_xruns(&self, count: u64) {
        if count == 0 {
            return;
        }
        let total = self.state.record_xruns(count);
        self.notifier.send(EngineEvent::Xrun { count: total });
    }

    /// Run the latency-free chain over `buffer`, at most `capacity` frames at
    /// a time. Returns deadline misses.
    fn run_chain(&self, pipeline: &mut Pipeline, buffer: &mut [f32]) -> u64 {
        let chunk = pipeline.capacity().max(1);
        buffer
            .chunks_mut(chunk)
            .map(|block| {
                pipeline.process(
                    block,
                    &self.slots,
                    &self.params,
                    self.config.normalize_target_db,
                )
            })
            .sum()
    }
}

/// Cloneable control surface for the GUI/host side.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    reconfig: WorkerHandle,
}

impl EngineHandle {
    /// Ask for `path` to be loaded into `slot`. Returns `false` if that path
    /// is already the requested one, in which case nothing is queued.
    pub fn request_reload(&self, slot: SlotId, path: impl AsRef<Path>) -> bool {
        self.request(slot, Some(path.as_ref()))
    }

    /// Empty `slot`.
    pub fn request_unload(&self, slot: SlotId) -> bool {
        self.request(slot, None)
    }

    /// Rebuild `slot` from its requested path even if it is unchanged.
    pub fn force_reload(&self, slot: SlotId) {
        self.shared.state.request_forced(slot.bit());
        self.reconfig.request_run();
    }

    fn request(&self, slot: SlotId, path: Option<&Path>) -> bool {
        if !self.shared.slots.status(slot).set_requested(path) {
            tracing::debug!(slot = %slot, "reload skipped, path unchanged");
            return false;
        }
        self.shared.state.request_slot(slot);
        self.reconfig.request_run();
        true
    }

    /// Toggle IR normalisation and rebuild the loaded impulse responses.
    pub fn set_ir_normalize(&self, enabled: bool) {
        self.shared.params.set_ir_normalize(enabled);
        let bits = self
            .shared
            .slots
            .occupied_bits(SlotId::Ir1.bit() | SlotId::Ir2.bit());
        if bits != 0 {
            self.shared.state.request_forced(bits);
            self.reconfig.request_run();
        }
    }

    /// Display path of `slot`, `"None"` when empty.
    pub fn slot_path(&self, slot: SlotId) -> String {
        self.shared.slots.status(slot).display_path()
    }

    pub fn is_slot_active(&self, slot: SlotId) -> bool {
        self.shared.slots.status(slot).is_active()
    }

    /// Latency measured for `slot` during warm-up.
    pub fn slot_latency(&self, slot: SlotId) -> usize {
        self.shared.slots.status(slot).latency()
    }

    /// Reported processing latency in samples.
    pub fn latency(&self) -> usize {
        self.shared.state.latency()
    }

    pub fn xrun_count(&self) -> u64 {
        self.shared.state.xruns()
    }

    pub fn params(&self) -> &EngineParams {
        &self.shared.params
    }

    /// Receiver for UI notifications. All clones share one queue.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.shared.notifier.receiver()
    }

    /// Completed runs of the reconfiguration worker.
    pub fn reconfig_runs(&self) -> u64 {
        self.reconfig.completed_runs()
    }

    pub fn stats(&self) -> EngineStats {
        let state = &self.shared.state;
        EngineStats {
            xruns: state.xruns(),
            reconfigurations: state.reconfigurations(),
            builds: self.shared.slots.builds(),
            buffer_size: state.buffer_size(),
            capacity: state.capacity(),
            latency: state.latency(),
            load: self.shared.meter.metrics(),
        }
    }

    /// Wait until every queued reconfiguration has been applied.
    ///
    /// Returns `false` on timeout or if the reconfiguration worker is stopped.
    pub fn wait_for_reconfiguration(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.reconfig.wait_for_completion_within(remaining) {
                return false;
            }
            if !self.shared.state.execute_requested() {
                return true;
            }
            if remaining.is_zero() || self.reconfig.state() == WorkerState::Stopped {
                return false;
            }
            std::thread::yield_now();
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("slots", &self.shared.slots)
            .field("xruns", &self.shared.state.xruns())
            .finish()
    }
}

/// Real-time engine. Owned by the audio thread.
pub struct Engine {
    shared: Arc<Shared>,
    handle: EngineHandle,
    config: EngineConfig,
    helpers: [BoundedWorker; 2],
    reconfig: BoundedWorker,
    background: BoundedWorker,
    running: bool,
}

impl Engine {
    /// Create a stopped engine. Call [`init`](Self::init) before processing.
    pub fn new(config: EngineConfig, factories: Factories) -> Result<Self> {
        config.validate()?;

        let capacity = config.max_buffer_size;
        let slots = Arc::new(Slots::new());
        let (warmup, rate) = (config.warmup_frames, config.sample_rate);
        let jobs: [SharedJob; 2] = [JobKind::Model, JobKind::Convolver]
            .map(|kind| Arc::new(Mutex::new(SecondaryJob::new(kind, capacity, warmup, rate))));

        let helper_timeout = config.helper_timeout(capacity);
        let helpers = [0, 1].map(|i| {
            let job = Arc::clone(&jobs[i]);
            let slots = Arc::clone(&slots);
            BoundedWorker::with_task(HELPER_THREADS[i], helper_timeout, move || {
                job.lock().run(&slots)
            })
        });

        let pipeline = Pipeline::new(
            jobs,
            [helpers[0].handle(), helpers[1].handle()],
            capacity,
            config.warmup_frames,
            config.sample_rate,
            config.parallel,
        );

        let shared = Arc::new(Shared {
            factories,
            slots,
            state: EngineState::new(config.sample_rate, capacity),
            params: Arc::new(EngineParams::new()),
            rendezvous: Rendezvous::new(),
            notifier: Notifier::new(config.event_capacity),
            meter: LoadMeter::new(),
            pipeline: Mutex::new(pipeline),
            buffers: Mutex::new(DoubleBuffer::new(capacity)),
            config: config.clone(),
        });

        let reconfig = {
            let shared = Arc::clone(&shared);
            BoundedWorker::with_task(RECONFIG_THREAD, config.rendezvous_timeout(), move || {
                reload::reconfigure(&shared)
            })
        };

        let background = {
            let shared = Arc::clone(&shared);
            BoundedWorker::with_task(
                BUFFERED_THREAD,
                config.buffered_timeout(capacity),
                move || run_background(&shared),
            )
        };

        let handle = EngineHandle {
            shared: Arc::clone(&shared),
            reconfig: reconfig.handle(),
        };

        Ok(Self {
            shared,
            handle,
            config,
            helpers,
            reconfig,
            background,
            running: false,
        })
    }

    /// (Re)start the worker threads for `sample_rate`.
    ///
    /// `priority`/`policy` are applied, best effort, to the real-time helpers
    /// and the background worker. Loaded resources are rebuilt when the rate
    /// changes.
    pub fn init(&mut self, sample_rate: u32, priority: u8, policy: SchedPolicy) -> Result<()> {
        let config = EngineConfig {
            sample_rate,
            priority,
            policy,
            ..self.config.clone()
        };
        config.validate()?;

        self.stop_workers();

        let state = &self.shared.state;
        let rate_changed = state.sample_rate() != sample_rate;
        state.set_sample_rate(sample_rate);
        self.shared.pipeline.lock().set_sample_rate(sample_rate);
        self.config = config;

        let frames = match state.buffer_size() {
            0 => state.capacity(),
            frames => frames,
        };
        self.apply_timeouts(frames);

        for helper in &mut self.helpers {
            helper.set_priority(priority, policy);
            helper.start()?;
        }
        self.reconfig.start()?;
        if self.config.mode == ProcessingMode::Buffered {
            self.background.set_priority(priority, policy);
            self.background.start()?;
        }
        self.running = true;

        if rate_changed {
            let bits = self.shared.slots.requested_bits();
            if bits != 0 {
                state.request_forced(bits);
            }
        }
        if state.execute_requested() {
            self.reconfig.request_run();
        }

        tracing::info!(
            sample_rate,
            priority,
            ?policy,
            mode = ?self.config.mode,
            parallel = self.config.parallel,
            "engine initialised"
        );
        Ok(())
    }

    /// Process one host buffer in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        let started = Instant::now();
        let frames = buffer.len();

        if self.running && frames > 0 {
            self.track_buffer_size(frames);

            let state = &self.shared.state;
            let buffered = self.config.mode == ProcessingMode::Buffered
                && frames <= state.capacity()
                && state.buffer_ready();

            if buffered {
                self.process_buffered(buffer);
            } else {
                self.process_immediate(buffer);
            }
        }

        // Unconditional: the reconfiguration worker waits on this
        self.shared.rendezvous.arrive();

        if frames > 0 {
            self.shared
                .meter
                .record(started.elapsed(), self.config.buffer_period(frames));
        }
    }

    fn process_immediate(&self, buffer: &mut [f32]) {
        // Locked only while buffers are reallocated or a late buffered cycle
        // is still running: pass the input through
        let Some(mut pipeline) = self.shared.pipeline.try_lock() else {
            return;
        };
        let xruns = self.shared.run_chain(&mut pipeline, buffer);
        drop(pipeline);
        self.shared.report_xruns(xruns);
    }

    fn process_buffered(&self, buffer: &mut [f32]) {
        let shared = &*self.shared;

        if !self.background.wait_for_completion() {
            shared.report_xruns(1);
            buffer.fill(0.0);
            return;
        }

        let Some(mut buffers) = shared.buffers.try_lock() else {
            shared.report_xruns(1);
            buffer.fill(0.0);
            return;
        };
        buffers.exchange(buffer);
        drop(buffers);

        if self.background.try_acquire_for_run() {
            self.background.request_run();
        } else {
            shared.report_xruns(1);
        }
    }

    fn track_buffer_size(&self, frames: usize) {
        let shared = &*self.shared;
        let previous = shared.state.swap_buffer_size(frames);
        if previous == frames {
            return;
        }

        self.apply_timeouts(frames);

        let capacity = shared.state.capacity();
        let mut wake = false;
        if frames > capacity {
            shared.state.set_buffer_ready(false);
            shared.state.request(REALLOCATE);
            wake = true;
        }

        // Convolvers are partitioned for the block they were built with,
        // which is the capacity until the first buffer arrives
        let built_for = match previous {
            0 => capacity,
            previous => previous.min(capacity),
        };
        let irs = shared
            .slots
            .occupied_bits(SlotId::Ir1.bit() | SlotId::Ir2.bit());
        if irs != 0 && built_for != frames {
            shared.state.request_forced(irs);
            wake = true;
        }

        if wake {
            self.reconfig.request_run();
        }

        let latency = match self.config.mode {
            ProcessingMode::Buffered => frames,
            ProcessingMode::LatencyFree => 0,
        };
        if shared.state.set_latency(latency) {
            shared
                .notifier
                .send(EngineEvent::LatencyChanged { samples: latency });
        }
    }

    fn apply_timeouts(&self, frames: usize) {
        let helper_timeout = self.config.helper_timeout(frames);
        for helper in &self.helpers {
            helper.set_timeout(helper_timeout);
        }
        self.background
            .set_timeout(self.config.buffered_timeout(frames));
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn request_reload(&self, slot: SlotId, path: impl AsRef<Path>) -> bool {
        self.handle.request_reload(slot, path)
    }

    pub fn request_unload(&self, slot: SlotId) -> bool {
        self.handle.request_unload(slot)
    }

    /// Reported processing latency in samples: one buffer in buffered mode,
    /// zero otherwise.
    pub fn latency(&self) -> usize {
        self.handle.latency()
    }

    pub fn xrun_count(&self) -> u64 {
        self.handle.xrun_count()
    }

    pub fn params(&self) -> &EngineParams {
        &self.shared.params
    }

    /// Stop every worker. Loaded resources stay in their slots. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.running && !self.reconfig.is_started() {
            return;
        }
        self.stop_workers();
        tracing::info!("engine shut down");
    }

    fn stop_workers(&mut self) {
        self.running = false;
        // In-flight loads finish before the thread exits
        self.reconfig.stop();
        self.background.stop();
        for helper in &mut self.helpers {
            helper.stop();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

/// Background task for buffered mode: process the stashed input.
fn run_background(shared: &Shared) {
    let mut buffers = shared.buffers.lock();
    buffers.process_pending(|block| {
        let mut pipeline = shared.pipeline.lock();
        let xruns = shared.run_chain(&mut pipeline, block);
        drop(pipeline);
        shared.report_xruns(xruns);
    });
}
