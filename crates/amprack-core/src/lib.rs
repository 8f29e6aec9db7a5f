//! Threading and lock-free building blocks for a real-time audio engine.
//!
//! # Primary API
//!
//! - [`BoundedWorker`] / [`WorkerHandle`]: a task thread with bounded-wait
//!   acquire and completion protocols
//! - [`Rendezvous`]: per-cycle broadcast from the audio thread to workers
//! - [`AtomicFlag`] / [`AtomicFloat`]: acquire/release atomics for flags and parameters
//! - [`EngineConfig`]: engine timing and scheduling configuration
//!
//! # Example
//!
//! ```
//! use amprack_core::BoundedWorker;
//! use std::time::Duration;
//!
//! let mut worker = BoundedWorker::with_task("helper", Duration::from_micros(500), || {
//!     // secondary DSP stage
//! });
//! worker.start()?;
//!
//! if worker.try_acquire_for_run() {
//!     worker.request_run();
//!     // ... primary path runs inline here ...
//!     if !worker.wait_for_completion() {
//!         // deadline miss: drop the secondary result for this buffer
//!     }
//! }
//! worker.stop();
//! # Ok::<(), amprack_core::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{EngineConfig, ProcessingMode, SchedPolicy};

pub mod worker;
pub use worker::{BoundedWorker, PriorityHint, Task, WorkerHandle, WorkerState};

mod sync;
pub use sync::Rendezvous;

mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

mod metering;
pub use metering::{LoadMeter, LoadMetrics};

pub mod smooth;
pub use smooth::{db_to_gain, SmoothedValue};
