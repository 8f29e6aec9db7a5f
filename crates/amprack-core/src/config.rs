//! Engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the engine schedules one audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Process inside the callback, fanning independent stages out to helpers.
    #[default]
    LatencyFree,
    /// Run the whole chain one buffer behind on a background worker.
    Buffered,
}

/// Scheduling policy hint for worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    #[default]
    Normal,
    Fifo,
    RoundRobin,
}

/// Configuration for the audio engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Capacity of scratch and double buffers, in frames.
    pub max_buffer_size: usize,
    pub mode: ProcessingMode,
    /// Fan secondary stages out to helper threads. When false they run inline.
    pub parallel: bool,
    /// Overrides the helper timeout derived from the buffer period.
    pub helper_timeout_us: Option<u64>,
    pub rendezvous_timeout_ms: u64,
    pub warmup_frames: usize,
    pub priority: u8,
    pub policy: SchedPolicy,
    pub normalize_target_db: f32,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            max_buffer_size: 1024,
            mode: ProcessingMode::LatencyFree,
            parallel: true,
            helper_timeout_us: None,
            rendezvous_timeout_ms: 40,
            warmup_frames: 2048,
            priority: 0,
            policy: SchedPolicy::Normal,
            normalize_target_db: -18.0,
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if !(1..=8192).contains(&self.max_buffer_size) {
            return Err(Error::InvalidConfig(format!(
                "max_buffer_size {} out of range (1-8192)",
                self.max_buffer_size
            )));
        }
        if self.priority > 99 {
            return Err(Error::InvalidConfig(format!(
                "priority {} out of range (0-99)",
                self.priority
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Wall-clock duration of one buffer of `frames` samples.
    pub fn buffer_period(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Base timeout of the real-time helpers.
    ///
    /// A full acquire (2x) plus a completion wait (5x) stays inside 70% of the
    /// buffer period.
    pub fn helper_timeout(&self, frames: usize) -> Duration {
        match self.helper_timeout_us {
            Some(us) => Duration::from_micros(us.max(1)),
            None => (self.buffer_period(frames) / 10).max(Duration::from_micros(50)),
        }
    }

    /// Base timeout of the buffered-mode background worker.
    ///
    /// A buffered callback waits at most 5x for the previous cycle and 2x to
    /// hand over the next one, so one tenth keeps both inside 70% of the
    /// period.
    pub fn buffered_timeout(&self, frames: usize) -> Duration {
        (self.buffer_period(frames) / 10).max(Duration::from_micros(50))
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_millis(self.rendezvous_timeout_ms)
    }
}
