//! Mutable integrator state.
//!
//! [`StepperState`] is the record the outer loop advances: the packed state
//! vector `x = [q; v]` with its derivative, plus snapshots of the last
//! accepted step (configuration, velocity, acceleration, efforts, external
//! wrenches, energy) that telemetry, sensors, and breakpoint refreshes read
//! between steps.

use exo_multibody::Model;
use exo_types::Wrench;
use nalgebra::DVector;

/// Integrator and last-accepted-step state.
#[derive(Debug, Clone)]
pub struct StepperState {
    /// Time of the last accepted step.
    pub t: f64,
    /// Current learned integrator step size.
    pub dt: f64,
    /// Packed state vector `[q; v]`, advanced in place by the stepper.
    pub x: DVector<f64>,
    /// State derivative at `(t, x)` — FSAL keeps it consistent.
    pub dxdt: DVector<f64>,
    /// Accepted outer iterations so far.
    pub iter: u64,

    /// Configuration at the last accepted step.
    pub q: DVector<f64>,
    /// Velocity at the last accepted step.
    pub v: DVector<f64>,
    /// Acceleration at the last accepted step.
    pub a: DVector<f64>,
    /// Full generalized effort at the last accepted step (inverse dynamics).
    pub u: DVector<f64>,
    /// Clipped motor command, pre-mapping (`n_motors`).
    pub u_command: DVector<f64>,
    /// Command scattered into velocity space; zero outside motor indices.
    pub u_control: DVector<f64>,
    /// Internal dynamics torques from the controller.
    pub u_internal: DVector<f64>,
    /// Joint position-bound penalty torques.
    pub u_bounds: DVector<f64>,
    /// External wrenches per body, local joint frame (index 0 unused).
    pub f_external: Vec<Wrench>,
    /// Total mechanical energy at the last accepted step.
    pub energy: f64,

    /// Names parallel to `q`.
    pub q_names: Vec<String>,
    /// Names parallel to `v` (and `a`, `u`).
    pub v_names: Vec<String>,
    /// Names parallel to `u_command`.
    pub u_command_names: Vec<String>,
}

impl StepperState {
    /// Allocate a state sized for `model`, everything zeroed.
    #[must_use]
    pub fn new(model: &Model) -> Self {
        Self {
            t: 0.0,
            dt: 0.0,
            x: DVector::zeros(model.nx()),
            dxdt: DVector::zeros(model.nx()),
            iter: 0,
            q: DVector::zeros(model.nq),
            v: DVector::zeros(model.nv),
            a: DVector::zeros(model.nv),
            u: DVector::zeros(model.nv),
            u_command: DVector::zeros(model.n_motors()),
            u_control: DVector::zeros(model.nv),
            u_internal: DVector::zeros(model.nv),
            u_bounds: DVector::zeros(model.nv),
            f_external: vec![Wrench::zero(); model.nbody],
            energy: 0.0,
            q_names: model.position_names(),
            v_names: model.velocity_names(),
            u_command_names: model.motor_names(),
        }
    }

    /// Re-arm for a new simulation from `x_init`.
    ///
    /// The state vector is taken exactly as given; the last-accepted
    /// snapshots start from its split.
    pub fn initialize(&mut self, model: &Model, x_init: &DVector<f64>) {
        self.t = 0.0;
        self.dt = 0.0;
        self.x.copy_from(x_init);
        self.dxdt.fill(0.0);
        self.iter = 0;
        self.q.copy_from(&x_init.rows(0, model.nq));
        self.v.copy_from(&x_init.rows(model.nq, model.nv));
        self.a.fill(0.0);
        self.u.fill(0.0);
        self.u_command.fill(0.0);
        self.u_control.fill(0.0);
        self.u_internal.fill(0.0);
        self.u_bounds.fill(0.0);
        for w in &mut self.f_external {
            *w = Wrench::zero();
        }
        self.energy = 0.0;
    }
}
