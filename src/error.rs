//! Centralized error type for the amprack umbrella crate.
//!
//! Wraps both subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] amprack_core::Error),

    #[error("Engine: {0}")]
    Engine(#[from] amprack_engine::Error),

    #[error("Builder: {0}")]
    Builder(String),
}

pub type Result<T> = std::result::Result<T, Error>;
