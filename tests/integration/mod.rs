//! Integration test modules for amprack
//!
//! - engine: lifecycle, pass-through, bypass, IR mix
//! - reload: slot reloads, failed loads, unloads
//! - realtime: deadlines, xruns, parallel helpers
//! - buffered: double-buffered mode

pub mod buffered;
pub mod realtime;
pub mod reload;
