//! Engine facade: lifecycle, outer loop, telemetry wiring.
//!
//! One `Engine` instance is advanced by exactly one caller; there is no
//! internal threading and no reentrancy. Lifecycle:
//!
//! ```text
//! Uninitialized → Initialized ⇄ Running → Completed
//!      new()      initialize()  start()    stop()/simulate end
//!                      ↑  reset()  │
//!                      └───────────┘
//! ```
//!
//! Within one outer iteration the ordering is fixed: telemetry snapshot of
//! the previous accepted step, termination check, sensor refresh (if due),
//! controller refresh (if due, with a dynamics re-evaluation since the
//! vector field just changed), inner adaptive loop to the next breakpoint,
//! post-step inverse dynamics and energy, iteration count.

use crate::controller::Controller;
use crate::dopri::{ControlledStepper, StepFailChecker, StepOutcome};
use crate::forces::ForceRegistry;
use crate::rhs::{clamp_and_scatter, system_dynamics, RhsContext};
use crate::schedule::Schedule;
use crate::stepper::StepperState;
use crate::telemetry::{LogData, TelemetryRecorder};
use exo_multibody::{
    forward_kinematics, frames_forward_kinematics, inverse_dynamics, kinetic_energy,
    normalize_configuration, potential_energy, Data, Model, SensorContext, SensorRegistry,
};
use exo_types::{EngineOptions, Result, SimError, TelemetryOptions, Wrench};
use nalgebra::{DVector, Vector3};
use std::path::Path;

/// Shortest allowed simulation duration (seconds).
const MIN_SIMULATION_DURATION: f64 = 0.05;

/// Initial integrator step size in free-running mode.
const FREE_RUNNING_DT_INIT: f64 = 5e-4;

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// No model attached yet.
    Uninitialized,
    /// Ready to start a simulation.
    Initialized,
    /// A simulation is in progress (incremental stepping).
    Running,
    /// The last simulation ran to completion or was stopped.
    Completed,
}

/// Termination callback: return `false` to stop the simulation.
pub type Callback = Box<dyn FnMut(f64, &DVector<f64>) -> bool>;

/// Starting offsets of each registered telemetry block.
#[derive(Debug, Clone, Copy, Default)]
struct TelemetryLayout {
    q: Option<usize>,
    v: Option<usize>,
    a: Option<usize>,
    command: Option<usize>,
    energy: usize,
    sensors: usize,
    n_sensor_values: usize,
}

struct Inner {
    model: Model,
    data: Data,
    sensors: SensorRegistry,
    controller: Box<dyn Controller>,
    callback: Option<Callback>,
    forces: ForceRegistry,
    telemetry: TelemetryRecorder,
    layout: TelemetryLayout,
    state: StepperState,
    stepper: ControlledStepper,
    fail: StepFailChecker,
    /// Breakpoint targeted by the current outer iteration.
    next_time: f64,
}

/// The simulation engine.
pub struct Engine {
    options: EngineOptions,
    phase: EnginePhase,
    inner: Option<Inner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("phase", &self.phase)
            .field("initialized", &self.inner.is_some())
            .finish()
    }
}

impl Engine {
    /// Create an engine with the given options, no model attached.
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            phase: EnginePhase::Uninitialized,
            inner: None,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Attach a model, its sensors, and a controller.
    ///
    /// Validates the controller's output sizes at a zero probe point,
    /// writes gravity into the model, and registers the telemetry layout.
    /// The sensor set is frozen from here on — re-initialize to change it.
    pub fn initialize(
        &mut self,
        mut model: Model,
        sensors: SensorRegistry,
        mut controller: Box<dyn Controller>,
    ) -> Result<()> {
        if !model.is_initialized() {
            return Err(SimError::init_failed("model has no bodies"));
        }
        self.options.validate()?;

        // Probe the controller at a zero point; wrong sizes are caller bugs,
        // failures inside the controller are its own.
        let q_probe = DVector::zeros(model.nq);
        let v_probe = DVector::zeros(model.nv);
        let command = controller
            .compute_command(&model, &sensors, 0.0, &q_probe, &v_probe)
            .map_err(|e| SimError::generic(format!("controller probe failed: {e}")))?;
        if command.len() != model.n_motors() {
            return Err(SimError::bad_input(format!(
                "controller command has {} entries, expected {} motors",
                command.len(),
                model.n_motors()
            )));
        }
        let internal = controller
            .internal_dynamics(&model, &sensors, 0.0, &q_probe, &v_probe)
            .map_err(|e| SimError::generic(format!("controller probe failed: {e}")))?;
        if internal.len() != model.nv {
            return Err(SimError::bad_input(format!(
                "controller internal dynamics has {} entries, expected nv = {}",
                internal.len(),
                model.nv
            )));
        }

        model.gravity = self.options.world.gravity.linear;

        let state = StepperState::new(&model);
        let mut telemetry = TelemetryRecorder::new();
        let layout =
            register_telemetry_fields(&mut telemetry, &self.options.telemetry, &state, &sensors)?;

        let data = model.make_data();
        self.inner = Some(Inner {
            model,
            data,
            sensors,
            controller,
            callback: None,
            forces: ForceRegistry::new(),
            telemetry,
            layout,
            state,
            stepper: ControlledStepper::new(
                self.options.stepper.tol_abs,
                self.options.stepper.tol_rel,
            ),
            fail: StepFailChecker::default(),
            next_time: 0.0,
        });
        self.phase = EnginePhase::Initialized;
        tracing::debug!("engine initialized");
        Ok(())
    }

    /// Replace the engine options.
    ///
    /// Gravity and integrator tolerances are re-applied immediately; other
    /// values take effect at the next simulation start.
    pub fn set_options(&mut self, options: EngineOptions) -> Result<()> {
        options.validate()?;
        self.options = options;
        if let Some(inner) = &mut self.inner {
            inner.model.gravity = self.options.world.gravity.linear;
            inner.stepper = ControlledStepper::new(
                self.options.stepper.tol_abs,
                self.options.stepper.tol_rel,
            );
        }
        Ok(())
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Install a termination callback: returning `false` stops `simulate`.
    pub fn set_callback(
        &mut self,
        callback: impl FnMut(f64, &DVector<f64>) -> bool + 'static,
    ) -> Result<()> {
        self.inner_mut()?.callback = Some(Box::new(callback));
        Ok(())
    }

    /// The attached model, if initialized.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.inner.as_ref().map(|i| &i.model)
    }

    /// The sensor registry, if initialized.
    #[must_use]
    pub fn sensors(&self) -> Option<&SensorRegistry> {
        self.inner.as_ref().map(|i| &i.sensors)
    }

    /// The integrator state, if initialized.
    #[must_use]
    pub fn stepper_state(&self) -> Option<&StepperState> {
        self.inner.as_ref().map(|i| &i.state)
    }

    /// Register a timed impulse wrench at a named frame (world frame,
    /// active over `[t0, t0 + duration)`).
    pub fn register_force_impulse(
        &mut self,
        frame_name: &str,
        t0: f64,
        duration: f64,
        wrench: Wrench,
    ) -> Result<()> {
        let inner = self.inner_mut()?;
        inner
            .forces
            .register_impulse(&inner.model, frame_name, t0, duration, wrench)
    }

    /// Register a force profile at a named frame (world-frame linear force,
    /// evaluated on every dynamics call).
    pub fn register_force_profile(
        &mut self,
        frame_name: &str,
        profile: impl Fn(f64, &DVector<f64>) -> Vector3<f64> + 'static,
    ) -> Result<()> {
        let inner = self.inner_mut()?;
        inner
            .forces
            .register_profile(&inner.model, frame_name, profile)
    }

    /// Run a full simulation from `x_init` to `end_time`.
    ///
    /// Terminates at the end time, when the callback returns `false`, or at
    /// the iteration cap. Telemetry holds one row per accepted outer
    /// iteration plus the initial state.
    pub fn simulate(&mut self, x_init: &DVector<f64>, end_time: f64) -> Result<()> {
        if end_time < MIN_SIMULATION_DURATION {
            return Err(SimError::bad_input(format!(
                "simulation duration must be at least {MIN_SIMULATION_DURATION} s, got {end_time}"
            )));
        }
        self.start(x_init)?;
        let iter_max = self.options.stepper.iter_max;

        loop {
            self.snapshot()?;

            let inner = self.inner_mut()?;
            let t = inner.state.t;
            if reached(t, end_time) || inner.state.iter >= iter_max {
                break;
            }
            let x_view = &inner.state.x;
            if let Some(callback) = &mut inner.callback {
                if !callback(t, x_view) {
                    break;
                }
            }

            self.advance_one(end_time)?;
        }

        self.phase = EnginePhase::Completed;
        Ok(())
    }

    /// Arm a simulation at `x_init` without advancing it.
    ///
    /// Resets controller, sensors (reseeded), data scratch, stepper state,
    /// and telemetry rows, evaluates the dynamics once at `t = 0`, and
    /// transitions to `Running`. The state vector is taken exactly as
    /// given.
    pub fn start(&mut self, x_init: &DVector<f64>) -> Result<()> {
        let Self { options, inner, .. } = self;
        let inner = inner
            .as_mut()
            .ok_or_else(|| SimError::init_failed("engine not initialized"))?;
        if x_init.len() != inner.model.nx() {
            return Err(SimError::bad_input(format!(
                "x_init has {} entries, model state dimension is {}",
                x_init.len(),
                inner.model.nx()
            )));
        }

        inner.sensors.reseed(options.stepper.random_seed);
        inner.controller.reset();
        inner.data.reset();
        inner.telemetry.reset();
        inner.state.initialize(&inner.model, x_init);
        inner.fail = StepFailChecker::default();
        inner.next_time = 0.0;

        let schedule = schedule_of(options);
        inner.state.dt = if schedule.free_running() {
            FREE_RUNNING_DT_INIT
        } else {
            schedule.update_period()
        };

        eval_rhs(inner, options, 0.0)?;
        refresh_accepted(inner, 0.0);

        self.phase = EnginePhase::Running;
        Ok(())
    }

    /// Advance one outer breakpoint of an armed simulation.
    ///
    /// `dt_desired` defaults to the update period (scheduled mode) or the
    /// current learned step size (free-running). Snapshots the previous
    /// accepted step first, mirroring one `simulate` loop iteration.
    pub fn step(&mut self, dt_desired: Option<f64>) -> Result<()> {
        if self.phase != EnginePhase::Running {
            return Err(SimError::init_failed(
                "no active simulation: call start() before step()",
            ));
        }
        let schedule = schedule_of(&self.options);
        let inner = self.inner_mut()?;
        let dt = dt_desired.unwrap_or(if schedule.free_running() {
            inner.state.dt
        } else {
            schedule.update_period()
        });
        if !(dt > 0.0) {
            return Err(SimError::bad_input(format!(
                "step size must be strictly positive, got {dt}"
            )));
        }

        self.snapshot()?;
        let iter_max = self.options.stepper.iter_max;
        let (iter, t) = {
            let inner = self.inner_ref()?;
            (inner.state.iter, inner.state.t)
        };
        if iter >= iter_max {
            self.phase = EnginePhase::Completed;
            return Ok(());
        }
        self.advance_one(t + dt)
    }

    /// Finish an incremental simulation: snapshot the final state and
    /// transition to `Completed`.
    pub fn stop(&mut self) -> Result<()> {
        if self.phase == EnginePhase::Running {
            self.snapshot()?;
            self.phase = EnginePhase::Completed;
        }
        Ok(())
    }

    /// Reset to `Initialized`: clears stepper state and telemetry rows,
    /// reseeds the sensor generator, optionally clears the force registry.
    pub fn reset(&mut self, clear_forces: bool) -> Result<()> {
        let Self { options, inner, .. } = self;
        let inner = inner
            .as_mut()
            .ok_or_else(|| SimError::init_failed("engine not initialized"))?;
        let zeros = DVector::zeros(inner.model.nx());
        inner.state.initialize(&inner.model, &zeros);
        inner.data.reset();
        inner.sensors.reseed(options.stepper.random_seed);
        inner.controller.reset();
        inner.telemetry.reset();
        inner.fail = StepFailChecker::default();
        inner.next_time = 0.0;
        if clear_forces {
            inner.forces.clear();
        }
        self.phase = EnginePhase::Initialized;
        Ok(())
    }

    /// Decode the recorded telemetry.
    pub fn get_log(&self) -> Result<LogData> {
        Ok(self.inner_ref()?.telemetry.get_log())
    }

    /// Write the log to disk, tabular CSV or binary.
    pub fn write_log(&self, path: impl AsRef<Path>, binary: bool) -> Result<()> {
        let telemetry = &self.inner_ref()?.telemetry;
        if binary {
            telemetry.write_log_binary(path)
        } else {
            telemetry.write_log_csv(path)
        }
    }

    /// Parse a binary log produced by [`Engine::write_log`].
    pub fn parse_log_binary(path: impl AsRef<Path>) -> Result<LogData> {
        TelemetryRecorder::parse_log_binary(path)
    }

    fn inner_ref(&self) -> Result<&Inner> {
        self.inner
            .as_ref()
            .ok_or_else(|| SimError::init_failed("engine not initialized"))
    }

    fn inner_mut(&mut self) -> Result<&mut Inner> {
        self.inner
            .as_mut()
            .ok_or_else(|| SimError::init_failed("engine not initialized"))
    }

    /// One outer iteration: breakpoint refreshes, inner adaptive loop, and
    /// the post-step update.
    fn advance_one(&mut self, end_time: f64) -> Result<()> {
        let Self { options, inner, .. } = self;
        let inner = inner
            .as_mut()
            .ok_or_else(|| SimError::init_failed("engine not initialized"))?;
        let schedule = schedule_of(options);

        if schedule.free_running() {
            let mut t_cur = inner.state.t;
            inner.state.dt = inner.state.dt.min(end_time - t_cur);
            loop {
                let mut h = inner.state.dt;
                let outcome = attempt_step(inner, options, &mut t_cur, &mut h)?;
                inner.state.dt = h;
                match outcome {
                    StepOutcome::Accepted => {
                        inner.fail.reset();
                        break;
                    }
                    StepOutcome::Rejected => inner.fail.record(t_cur)?,
                }
            }
            finish_iteration(inner, t_cur);
        } else {
            let current = inner.next_time;
            let next = current + schedule.update_period().min(end_time - current);
            inner.next_time = next;

            // Sensors first, then the controller: the command may depend on
            // the fresh readings.
            if schedule.sensors_due(current) {
                let Inner {
                    model,
                    data,
                    sensors,
                    state,
                    ..
                } = inner;
                sensors.set_sensors_data(&SensorContext {
                    model,
                    data,
                    t: state.t,
                    q: &state.q,
                    v: &state.v,
                    a: &state.a,
                    u: &state.u,
                });
            }
            if schedule.controller_due(current) {
                {
                    let Inner {
                        model,
                        sensors,
                        controller,
                        state,
                        ..
                    } = inner;
                    let command =
                        controller.compute_command(model, sensors, state.t, &state.q, &state.v)?;
                    clamp_and_scatter(model, &command, &mut state.u_command, &mut state.u_control)?;
                }
                // The vector field just changed discontinuously.
                eval_rhs(inner, options, current)?;
            }

            let mut t_cur = current;
            while t_cur < next && !reached(t_cur, next) {
                let mut h = inner.state.dt.min(next - t_cur);
                match attempt_step(inner, options, &mut t_cur, &mut h)? {
                    StepOutcome::Accepted => {
                        inner.fail.reset();
                        // Restore the learned step after shrinking at a
                        // breakpoint.
                        inner.state.dt = inner.state.dt.max(h);
                    }
                    StepOutcome::Rejected => {
                        inner.fail.record(t_cur)?;
                        inner.state.dt = h;
                    }
                }
            }
            finish_iteration(inner, next);
        }
        Ok(())
    }

    /// Copy the last accepted step into the telemetry row and append it.
    fn snapshot(&mut self) -> Result<()> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| SimError::init_failed("engine not initialized"))?;
        let Inner {
            telemetry,
            layout,
            state,
            sensors,
            ..
        } = inner;

        if let Some(start) = layout.q {
            telemetry.set_floats(start, state.q.iter().copied());
        }
        if let Some(start) = layout.v {
            telemetry.set_floats(start, state.v.iter().copied());
        }
        if let Some(start) = layout.a {
            telemetry.set_floats(start, state.a.iter().copied());
        }
        if let Some(start) = layout.command {
            telemetry.set_floats(start, state.u_command.iter().copied());
        }
        telemetry.set_float(layout.energy, state.energy);
        if layout.n_sensor_values > 0 {
            let values = sensors.telemetry_values();
            if values.len() != layout.n_sensor_values {
                return Err(SimError::bad_input(
                    "sensor set changed after initialization: telemetry layout mismatch",
                ));
            }
            telemetry.set_floats(layout.sensors, values);
        }
        telemetry.flush_snapshot(state.t);
        Ok(())
    }
}

/// Has `t` reached `target`, up to accumulated floating-point slack?
fn reached(t: f64, target: f64) -> bool {
    (target - t).abs() < 8.0 * f64::EPSILON * target.abs().max(1.0)
}

fn schedule_of(options: &EngineOptions) -> Schedule {
    Schedule::new(
        options.stepper.sensors_update_period,
        options.stepper.controller_update_period,
    )
}

/// Evaluate the dynamics at `(t, state.x)` into `state.dxdt`.
fn eval_rhs(inner: &mut Inner, options: &EngineOptions, t: f64) -> Result<()> {
    let Inner {
        model,
        data,
        sensors,
        controller,
        forces,
        state,
        ..
    } = inner;
    let StepperState {
        x,
        dxdt,
        t: t_last,
        a,
        u,
        u_command,
        u_control,
        u_internal,
        u_bounds,
        f_external,
        ..
    } = state;
    let mut ctx = RhsContext {
        model,
        data,
        sensors,
        controller: controller.as_mut(),
        forces,
        options,
        t_last: *t_last,
        a_last: &*a,
        u_last: &*u,
        u_command,
        u_control,
        u_internal,
        u_bounds,
        f_external,
    };
    system_dynamics(&mut ctx, t, x, dxdt)
}

/// One `try_step` attempt with the engine's right-hand side.
fn attempt_step(
    inner: &mut Inner,
    options: &EngineOptions,
    t: &mut f64,
    dt: &mut f64,
) -> Result<StepOutcome> {
    let Inner {
        model,
        data,
        sensors,
        controller,
        forces,
        state,
        stepper,
        ..
    } = inner;
    let StepperState {
        x,
        dxdt,
        t: t_accepted,
        a,
        u,
        u_command,
        u_control,
        u_internal,
        u_bounds,
        f_external,
        ..
    } = state;
    let t_last = *t_accepted;

    let mut rhs = |t_eval: f64, x_eval: &DVector<f64>, out: &mut DVector<f64>| {
        let mut ctx = RhsContext {
            model: &*model,
            data: &mut *data,
            sensors: &mut *sensors,
            controller: controller.as_mut(),
            forces: &*forces,
            options,
            t_last,
            a_last: &*a,
            u_last: &*u,
            u_command: &mut *u_command,
            u_control: &mut *u_control,
            u_internal: &mut *u_internal,
            u_bounds: &mut *u_bounds,
            f_external: &mut *f_external,
        };
        system_dynamics(&mut ctx, t_eval, x_eval, out)
    };
    stepper.try_step(&mut rhs, x, dxdt, t, dt)
}

/// Post-step bookkeeping at `t_reached`: renormalize quaternions, split the
/// state, recompute effort (inverse dynamics) and energy, count the
/// iteration.
fn finish_iteration(inner: &mut Inner, t_reached: f64) {
    let Inner { model, state, .. } = inner;
    let nq = model.nq;
    let mut q_norm = state.x.rows(0, nq).into_owned();
    normalize_configuration(model, &mut q_norm);
    state.x.rows_mut(0, nq).copy_from(&q_norm);

    refresh_accepted(inner, t_reached);
    inner.state.iter += 1;
}

/// Recompute the last-accepted-step record from `(x, dxdt)` at `t_reached`.
fn refresh_accepted(inner: &mut Inner, t_reached: f64) {
    let Inner {
        model, data, state, ..
    } = inner;
    let nq = model.nq;
    let nv = model.nv;
    let StepperState {
        x,
        dxdt,
        t,
        q,
        v,
        a,
        u,
        energy,
        ..
    } = state;

    q.copy_from(&x.rows(0, nq));
    v.copy_from(&x.rows(nq, nv));
    a.copy_from(&dxdt.rows(nq, nv));

    forward_kinematics(model, data, q, v);
    frames_forward_kinematics(model, data);
    *u = inverse_dynamics(model, data, v, a);

    let kinetic = kinetic_energy(data, v);
    let potential = potential_energy(model, data);
    *energy = kinetic + potential;
    *t = t_reached;
}

/// Register the engine's telemetry fields; returns the block layout.
fn register_telemetry_fields(
    telemetry: &mut TelemetryRecorder,
    options: &TelemetryOptions,
    state: &StepperState,
    sensors: &SensorRegistry,
) -> Result<TelemetryLayout> {
    let mut layout = TelemetryLayout::default();

    if options.log_configuration {
        layout.q = Some(telemetry.n_float_fields());
        for name in &state.q_names {
            telemetry.register_float(format!("q.{name}"))?;
        }
    }
    if options.log_velocity {
        layout.v = Some(telemetry.n_float_fields());
        for name in &state.v_names {
            telemetry.register_float(format!("v.{name}"))?;
        }
    }
    if options.log_acceleration {
        layout.a = Some(telemetry.n_float_fields());
        for name in &state.v_names {
            telemetry.register_float(format!("a.{name}"))?;
        }
    }
    if options.log_command {
        layout.command = Some(telemetry.n_float_fields());
        for name in &state.u_command_names {
            telemetry.register_float(format!("command.{name}"))?;
        }
    }
    layout.energy = telemetry.register_float("energy")?;

    let sensor_fields = sensors.telemetry_fields();
    layout.sensors = telemetry.n_float_fields();
    layout.n_sensor_values = sensor_fields.len();
    for field in sensor_fields {
        telemetry.register_float(field)?;
    }
    Ok(layout)
}
