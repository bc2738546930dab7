//! Adaptive-step rigid-body simulation engine.
//!
//! The engine couples four rate domains — the adaptive integrator, the
//! sensor sampling schedule, the controller command schedule, and telemetry
//! snapshotting — around a compliant-contact forward dynamics:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │  per outer iteration:                                       │
//! │    telemetry snapshot → termination check → sensor refresh  │
//! │    → command refresh → inner adaptive loop to breakpoint    │
//! │    → post-step effort/energy → iteration count              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The dynamics right-hand side composes ground contact wrenches, joint
//! position-bound penalties, registered external forces, controller command
//! and internal dynamics, then solves forward dynamics and retracts the
//! velocity onto the configuration manifold so a plain vector-space
//! embedded Runge–Kutta stepper can consume it.
//!
//! # Quick start
//!
//! ```no_run
//! use exo_engine::{Engine, ZeroController};
//! use exo_multibody::{factories, SensorRegistry};
//! use exo_types::EngineOptions;
//! use nalgebra::DVector;
//!
//! let model = factories::free_body(1.0, nalgebra::Vector3::new(0.1, 0.1, 0.1));
//! let mut engine = Engine::new(EngineOptions::default());
//! engine
//!     .initialize(model, SensorRegistry::new(), Box::new(ZeroController))
//!     .unwrap();
//! let mut x0 = DVector::zeros(13);
//! x0[3] = 1.0; // identity quaternion
//! engine.simulate(&x0, 1.0).unwrap();
//! let log = engine.get_log().unwrap();
//! assert_eq!(log.timestamps.len() as u64, engine.stepper_state().unwrap().iter + 1);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

pub mod contact;
pub mod controller;
pub mod dopri;
pub mod engine;
pub mod forces;
pub mod joint_limits;
mod rhs;
pub mod schedule;
pub mod stepper;
pub mod telemetry;

pub use contact::contact_dynamics;
pub use controller::{Controller, FnController, ZeroController};
pub use dopri::{ControlledStepper, StepOutcome};
pub use engine::{Engine, EnginePhase};
pub use forces::ForceRegistry;
pub use joint_limits::bounds_dynamics;
pub use schedule::Schedule;
pub use stepper::StepperState;
pub use telemetry::{LogData, TelemetryRecorder};
