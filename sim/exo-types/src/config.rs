//! Engine configuration.
//!
//! Option structs mirror the engine's option tree: stepper, contacts, joint
//! bounds, world, telemetry. Every struct has sane defaults and a
//! `validate()` that rejects non-physical values before a simulation starts.

use crate::error::{Result, SimError};
use crate::wrench::Wrench;
use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineOptions {
    /// Integrator and scheduling options.
    pub stepper: StepperOptions,
    /// Ground contact force model options.
    pub contacts: ContactOptions,
    /// Joint position-bound penalty options.
    pub joints: JointBoundOptions,
    /// World-level options (gravity).
    pub world: WorldOptions,
    /// Telemetry switches.
    pub telemetry: TelemetryOptions,
}

impl EngineOptions {
    /// Validate the whole option tree.
    pub fn validate(&self) -> Result<()> {
        self.stepper.validate()?;
        self.contacts.validate()?;
        self.joints.validate()
    }

    /// Set both update periods at once (seconds; 0 = continuous).
    #[must_use]
    pub fn with_update_period(mut self, period: f64) -> Self {
        self.stepper.sensors_update_period = period;
        self.stepper.controller_update_period = period;
        self
    }

    /// Set integrator tolerances.
    #[must_use]
    pub fn with_tolerances(mut self, tol_abs: f64, tol_rel: f64) -> Self {
        self.stepper.tol_abs = tol_abs;
        self.stepper.tol_rel = tol_rel;
        self
    }
}

/// Adaptive-stepper and sampling-schedule options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperOptions {
    /// Absolute integration tolerance.
    pub tol_abs: f64,
    /// Relative integration tolerance.
    pub tol_rel: f64,
    /// Sensor sampling period (seconds). Zero means continuous: sensors are
    /// refreshed inside every dynamics evaluation.
    pub sensors_update_period: f64,
    /// Controller command period (seconds). Zero means continuous.
    pub controller_update_period: f64,
    /// Seed for the per-simulation random generator (sensor noise).
    pub random_seed: u64,
    /// Hard cap on accepted outer iterations per simulation.
    pub iter_max: u64,
}

impl Default for StepperOptions {
    fn default() -> Self {
        Self {
            tol_abs: 1e-5,
            tol_rel: 1e-4,
            sensors_update_period: 0.0,
            controller_update_period: 0.0,
            random_seed: 0,
            iter_max: 100_000,
        }
    }
}

impl StepperOptions {
    /// Validate stepper options.
    pub fn validate(&self) -> Result<()> {
        if !(self.tol_abs > 0.0) || !(self.tol_rel > 0.0) {
            return Err(SimError::bad_input(
                "stepper tolerances must be strictly positive",
            ));
        }
        if self.sensors_update_period < 0.0 || self.controller_update_period < 0.0 {
            return Err(SimError::bad_input("update periods cannot be negative"));
        }
        if self.iter_max == 0 {
            return Err(SimError::bad_input("iter_max must be at least 1"));
        }
        Ok(())
    }
}

/// Compliant ground contact model parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactOptions {
    /// Normal spring stiffness (N/m).
    pub stiffness: f64,
    /// Normal damping (N·s/m), applied only while penetrating deeper.
    pub damping: f64,
    /// Dry friction coefficient.
    pub friction_dry: f64,
    /// Viscous friction coefficient.
    pub friction_viscous: f64,
    /// Tangential velocity (m/s) below which dry friction is regularized.
    pub dry_friction_vel_eps: f64,
    /// Penetration depth (m) over which the whole wrench blends in.
    pub transition_eps: f64,
}

impl Default for ContactOptions {
    fn default() -> Self {
        Self {
            stiffness: 1e6,
            damping: 2e3,
            friction_dry: 1.0,
            friction_viscous: 0.8,
            dry_friction_vel_eps: 1e-2,
            transition_eps: 1e-3,
        }
    }
}

impl ContactOptions {
    /// Validate contact options.
    pub fn validate(&self) -> Result<()> {
        if self.stiffness < 0.0 || self.damping < 0.0 {
            return Err(SimError::bad_input(
                "contact stiffness and damping cannot be negative",
            ));
        }
        if !(self.dry_friction_vel_eps > 0.0) || !(self.transition_eps > 0.0) {
            return Err(SimError::bad_input(
                "contact regularization widths must be strictly positive",
            ));
        }
        Ok(())
    }
}

/// Joint position-bound penalty parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointBoundOptions {
    /// Penalty spring stiffness (N·m/rad).
    pub bound_stiffness: f64,
    /// Penalty damping (N·m·s/rad), applied only against outward motion.
    pub bound_damping: f64,
    /// Bound violation (rad) over which the penalty blends in.
    pub bound_transition_eps: f64,
}

impl Default for JointBoundOptions {
    fn default() -> Self {
        Self {
            bound_stiffness: 1e5,
            bound_damping: 1e3,
            bound_transition_eps: 1e-2,
        }
    }
}

impl JointBoundOptions {
    /// Validate joint bound options.
    pub fn validate(&self) -> Result<()> {
        if self.bound_stiffness < 0.0 || self.bound_damping < 0.0 {
            return Err(SimError::bad_input(
                "bound stiffness and damping cannot be negative",
            ));
        }
        if !(self.bound_transition_eps > 0.0) {
            return Err(SimError::bad_input(
                "bound transition width must be strictly positive",
            ));
        }
        Ok(())
    }
}

/// World-level options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldOptions {
    /// Spatial gravity. Only the linear part acts on the multibody model.
    pub gravity: Wrench,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            gravity: Wrench::from_linear(Vector3::new(0.0, 0.0, -9.81)),
        }
    }
}

/// Telemetry recording switches.
///
/// Energy is always recorded; these control the per-coordinate vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetryOptions {
    /// Record the configuration vector.
    pub log_configuration: bool,
    /// Record the velocity vector.
    pub log_velocity: bool,
    /// Record the acceleration vector.
    pub log_acceleration: bool,
    /// Record the clipped motor command.
    pub log_command: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            log_configuration: true,
            log_velocity: true,
            log_acceleration: true,
            log_command: true,
        }
    }
}
