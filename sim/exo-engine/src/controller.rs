//! Controller contract.
//!
//! The engine requires exactly two operations from a controller: a motor
//! command and an internal (passive) dynamics contribution. Sensor readings
//! are passed alongside the model as a read-only registry that is replaced
//! only at sensor-refresh points.

use exo_multibody::{Model, SensorRegistry};
use exo_types::Result;
use nalgebra::DVector;

/// A controller driving the model's motors.
pub trait Controller {
    /// Compute the motor command, one entry per motor in declaration order.
    ///
    /// The engine clamps each entry to the motor's effort limit before it
    /// enters the dynamics.
    fn compute_command(
        &mut self,
        model: &Model,
        sensors: &SensorRegistry,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>>;

    /// Compute internal dynamics torques in velocity space (`nv` entries):
    /// transmission friction, flexibility, spring returns.
    fn internal_dynamics(
        &mut self,
        model: &Model,
        sensors: &SensorRegistry,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>>;

    /// Reset any internal controller state. Called at every simulation
    /// start and engine reset.
    fn reset(&mut self) {}
}

/// A controller that outputs zero command and zero internal dynamics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroController;

impl Controller for ZeroController {
    fn compute_command(
        &mut self,
        model: &Model,
        _sensors: &SensorRegistry,
        _t: f64,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        Ok(DVector::zeros(model.n_motors()))
    }

    fn internal_dynamics(
        &mut self,
        model: &Model,
        _sensors: &SensorRegistry,
        _t: f64,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        Ok(DVector::zeros(model.nv))
    }
}

/// Adapter building a controller from two closures.
///
/// Handy in tests and scripts; both closures are infallible and their
/// outputs are size-checked by the engine like any other controller's.
pub struct FnController<C, I>
where
    C: FnMut(&Model, &SensorRegistry, f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>,
    I: FnMut(&Model, &SensorRegistry, f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>,
{
    command: C,
    internal: I,
}

impl<C, I> FnController<C, I>
where
    C: FnMut(&Model, &SensorRegistry, f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>,
    I: FnMut(&Model, &SensorRegistry, f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>,
{
    /// Build from a command closure and an internal-dynamics closure.
    pub fn new(command: C, internal: I) -> Self {
        Self { command, internal }
    }
}

impl<C, I> Controller for FnController<C, I>
where
    C: FnMut(&Model, &SensorRegistry, f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>,
    I: FnMut(&Model, &SensorRegistry, f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>,
{
    fn compute_command(
        &mut self,
        model: &Model,
        sensors: &SensorRegistry,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        Ok((self.command)(model, sensors, t, q, v))
    }

    fn internal_dynamics(
        &mut self,
        model: &Model,
        sensors: &SensorRegistry,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        Ok((self.internal)(model, sensors, t, q, v))
    }
}
