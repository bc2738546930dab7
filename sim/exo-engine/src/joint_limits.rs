//! Joint position-bound penalty torques.
//!
//! Bounded 1-DOF coordinates outside their range get a spring-damper
//! penalty driving them back in, blended in smoothly with the violation so
//! the vector field stays well-behaved for the adaptive stepper. Damping
//! only resists outward motion — recovery is never slowed down.

use exo_multibody::Model;
use exo_types::JointBoundOptions;
use nalgebra::DVector;

/// Accumulate bound penalty torques into `u_bounds` (velocity-space layout).
///
/// `u_bounds` is zeroed first; unbounded coordinates stay zero.
pub fn bounds_dynamics(
    model: &Model,
    q: &DVector<f64>,
    v: &DVector<f64>,
    options: &JointBoundOptions,
    u_bounds: &mut DVector<f64>,
) {
    u_bounds.fill(0.0);

    for jnt in 0..model.njnt {
        if !model.jnt_bounded[jnt] {
            continue;
        }
        let q_joint = q[model.jnt_qpos_adr[jnt]];
        let v_joint = v[model.jnt_dof_adr[jnt]];
        let (q_min, q_max) = model.jnt_range[jnt];

        let mut torque = 0.0;
        let mut violation = 0.0;
        if q_joint > q_max {
            violation = q_joint - q_max;
            torque = -options.bound_stiffness * violation
                - options.bound_damping * v_joint.max(0.0);
        } else if q_joint < q_min {
            violation = q_min - q_joint;
            torque = options.bound_stiffness * violation
                - options.bound_damping * v_joint.min(0.0);
        }

        let blending = (2.0 * violation / options.bound_transition_eps).tanh();
        u_bounds[model.jnt_dof_adr[jnt]] += torque * blending;
    }
}
