//! Hot-swappable neural amp models and cabinet impulse responses on a
//! real-time audio thread.
//!
//! # Primary API
//!
//! - [`Engine`]: owned by the audio callback; [`Engine::process`] runs one
//!   buffer in place
//! - [`EngineHandle`]: cloneable GUI/host surface for reload requests,
//!   parameters, display paths, latency and xrun counts
//! - [`Model`] / [`Convolver`] / [`Resampler`]: the collaborators the engine
//!   drives, created through [`Factories`]
//!
//! # Example
//!
//! ```ignore
//! use amprack_engine::{Engine, Factories, SlotId};
//! use amprack_core::{EngineConfig, SchedPolicy};
//!
//! let mut engine = Engine::new(EngineConfig::default(), factories)?;
//! engine.init(48000, 0, SchedPolicy::Normal)?;
//!
//! let handle = engine.handle();
//! handle.request_reload(SlotId::ModelA, "/presets/plexi.nam");
//!
//! // audio callback
//! engine.process(&mut buffer);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod traits;
pub use traits::{Convolver, ConvolverFactory, Model, ModelFactory, Resampler, ResamplerFactory};

mod resample;
pub use resample::LinearResampler;

pub mod slot;
pub use slot::{ResourceSlot, SlotId, SlotStatus, Slots, NONE_LABEL};

mod stage;
pub use stage::{
    BuildContext, ConvolverStage, DcBlocker, DelayLine, Factories, ModelStage, Stage, IR_GAIN,
};

mod warmup;
pub use warmup::measure_latency;

pub mod state;
pub use state::{EngineState, EngineStats, REALLOCATE};

pub mod params;
pub use params::EngineParams;

mod event;
pub use event::EngineEvent;

mod buffered;
pub use buffered::DoubleBuffer;

mod pipeline;
mod reload;

mod engine;
pub use engine::{Engine, EngineHandle, BUFFERED_THREAD, HELPER_THREADS, RECONFIG_THREAD};
