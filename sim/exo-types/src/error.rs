//! Error types for the simulation stack.

use thiserror::Error;

/// Errors surfaced by the engine and its collaborators.
///
/// All public operations return an explicit status; no error escapes the
/// engine boundary as a panic. Failures raised by user code (controllers,
/// callbacks, force profiles) are caught at the dynamics boundary and
/// converted to [`SimError::Generic`].
#[derive(Debug, Error)]
pub enum SimError {
    /// Model or controller not initialized, or an initialization invariant
    /// does not hold.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// A caller-provided value has the wrong size, range, or name.
    #[error("bad input: {0}")]
    BadInput(String),

    /// The adaptive stepper rejected too many consecutive steps.
    #[error("stepper failed at t = {t}: {rejections} consecutive rejected steps")]
    StepperFailed {
        /// Simulation time at which the stepper gave up.
        t: f64,
        /// Number of consecutive rejections when the limit tripped.
        rejections: u32,
    },

    /// A controller, callback, or force profile raised an unexpected failure.
    #[error("{0}")]
    Generic(String),
}

impl SimError {
    /// Creates an initialization error.
    #[must_use]
    pub fn init_failed(reason: impl Into<String>) -> Self {
        Self::InitFailed(reason.into())
    }

    /// Creates a bad-input error.
    #[must_use]
    pub fn bad_input(reason: impl Into<String>) -> Self {
        Self::BadInput(reason.into())
    }

    /// Creates a generic error.
    #[must_use]
    pub fn generic(reason: impl Into<String>) -> Self {
        Self::Generic(reason.into())
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, SimError>;
