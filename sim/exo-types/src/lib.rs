//! Shared leaf types for the exo simulation stack.
//!
//! This crate has no simulation logic. It provides the pieces every other
//! crate agrees on:
//!
//! - [`SimError`] / [`Result`] — the error surface of the whole stack
//! - [`EngineOptions`] and its sub-structs — validated engine configuration
//! - [`Wrench`] — a 6D spatial force (linear force + angular moment)

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod wrench;

pub use config::{
    ContactOptions, EngineOptions, JointBoundOptions, StepperOptions, TelemetryOptions,
    WorldOptions,
};
pub use error::{Result, SimError};
pub use wrench::Wrench;
