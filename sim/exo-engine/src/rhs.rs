//! The dynamics right-hand side.
//!
//! Composes kinematics, ground contact, registered external forces,
//! continuous-mode sensor and controller refreshes, internal dynamics, and
//! joint-bound penalties into the forward-dynamics solve, then projects the
//! tangent-space velocity into configuration coordinates through the
//! manifold retraction so the result is a plain vector field.

use crate::contact::contact_dynamics;
use crate::controller::Controller;
use crate::forces::ForceRegistry;
use exo_multibody::{
    forward_dynamics, forward_kinematics, frames_forward_kinematics, integrate, Data, Model,
    SensorContext, SensorRegistry,
};
use exo_types::{EngineOptions, Result, SimError, Wrench};
use nalgebra::DVector;

/// Smallest time delta used for the configuration-derivative retraction.
/// The finite difference degenerates below this.
const RETRACTION_DT_MIN: f64 = 1e-5;

/// Split engine borrows the right-hand side needs.
pub(crate) struct RhsContext<'a> {
    pub model: &'a Model,
    pub data: &'a mut Data,
    pub sensors: &'a mut SensorRegistry,
    pub controller: &'a mut dyn Controller,
    pub forces: &'a ForceRegistry,
    pub options: &'a EngineOptions,
    /// Time of the last accepted step (for the retraction delta).
    pub t_last: f64,
    /// Acceleration at the last accepted step (continuous sensor refresh).
    pub a_last: &'a DVector<f64>,
    /// Effort at the last accepted step (continuous sensor refresh).
    pub u_last: &'a DVector<f64>,
    pub u_command: &'a mut DVector<f64>,
    pub u_control: &'a mut DVector<f64>,
    pub u_internal: &'a mut DVector<f64>,
    pub u_bounds: &'a mut DVector<f64>,
    pub f_external: &'a mut Vec<Wrench>,
}

/// Evaluate `dxdt = f(t, x)` with side effects on the engine scratch.
pub(crate) fn system_dynamics(
    ctx: &mut RhsContext<'_>,
    t: f64,
    x: &DVector<f64>,
    dxdt: &mut DVector<f64>,
) -> Result<()> {
    let model = ctx.model;
    let nq = model.nq;
    let nv = model.nv;

    let q = x.rows(0, nq).into_owned();
    let v = x.rows(nq, nv).into_owned();

    forward_kinematics(model, ctx.data, &q, &v);
    frames_forward_kinematics(model, ctx.data);

    // Ground contact at every declared contact frame.
    for w in ctx.f_external.iter_mut() {
        *w = Wrench::zero();
    }
    for &frame in &model.contact_frame_ids {
        let wrench = contact_dynamics(model, ctx.data, frame, &ctx.options.contacts);
        ctx.f_external[model.frames[frame].body] += wrench;
    }

    // Registered impulse and profile forces, re-evaluated on every call.
    ctx.forces
        .accumulate(model, ctx.data, t, x, ctx.f_external);

    // Continuous-mode sensor refresh: accelerations and efforts are only
    // available from the last accepted step.
    if ctx.options.stepper.sensors_update_period == 0.0 {
        ctx.sensors.set_sensors_data(&SensorContext {
            model,
            data: ctx.data,
            t,
            q: &q,
            v: &v,
            a: ctx.a_last,
            u: ctx.u_last,
        });
    }

    // Continuous-mode command refresh.
    if ctx.options.stepper.controller_update_period == 0.0 {
        let command = ctx
            .controller
            .compute_command(model, ctx.sensors, t, &q, &v)?;
        clamp_and_scatter(model, &command, ctx.u_command, ctx.u_control)?;
    }

    let internal = ctx
        .controller
        .internal_dynamics(model, ctx.sensors, t, &q, &v)?;
    if internal.len() != nv {
        return Err(SimError::generic(format!(
            "controller internal dynamics returned {} entries, expected {nv}",
            internal.len()
        )));
    }
    ctx.u_internal.copy_from(&internal);

    crate::joint_limits::bounds_dynamics(model, &q, &v, &ctx.options.joints, ctx.u_bounds);

    let u_total = &*ctx.u_bounds + &*ctx.u_internal + &*ctx.u_control;
    let a = forward_dynamics(model, ctx.data, &v, &u_total, ctx.f_external)?;

    // Configuration derivative through the manifold retraction: a finite
    // delta keeps quaternion blocks on the unit sphere to first order.
    let delta = (t - ctx.t_last).max(RETRACTION_DT_MIN);
    let q_next = integrate(model, &q, &(&v * delta));
    let q_dot = (q_next - &q) / delta;

    dxdt.rows_mut(0, nq).copy_from(&q_dot);
    dxdt.rows_mut(nq, nv).copy_from(&a);
    Ok(())
}

/// Clamp a motor command to the effort limits and scatter it into velocity
/// space. Writes both the clipped command and the scattered control vector.
pub(crate) fn clamp_and_scatter(
    model: &Model,
    command: &DVector<f64>,
    u_command: &mut DVector<f64>,
    u_control: &mut DVector<f64>,
) -> Result<()> {
    if command.len() != model.n_motors() {
        return Err(SimError::generic(format!(
            "controller command has {} entries, expected {}",
            command.len(),
            model.n_motors()
        )));
    }
    for (motor, &jnt) in model.motor_jnt.iter().enumerate() {
        let dof = model.jnt_dof_adr[jnt];
        let limit = model.effort_limit[dof];
        let clipped = command[motor].clamp(-limit, limit);
        u_command[motor] = clipped;
        u_control[dof] = clipped;
    }
    Ok(())
}
