//! Compliant ground contact model.
//!
//! Each contact frame is tested against the ground plane `z = 0`. A
//! penetrating frame produces a spring-damper normal force, a regularized
//! dry/viscous tangential friction force, and the whole wrench is blended
//! in smoothly with penetration depth so contact onset does not trigger
//! step-rejection storms in the adaptive integrator. The returned wrench is
//! expressed in the parent joint frame at the joint origin, ready for the
//! forward-dynamics external force slot.

use exo_multibody::{frame_linear_velocity, Data, Model};
use exo_types::{ContactOptions, Wrench};
use nalgebra::Vector3;

/// Tangential force saturation, per component. Keeps near-zero penetration
/// with large sliding velocities from blowing up the ODE.
const TANGENTIAL_FORCE_MAX: f64 = 1e5;

/// Ground reaction wrench of one contact frame, in the parent joint frame.
///
/// Pure function of the kinematic state: requires forward kinematics and
/// frame placements to be up to date. Returns zero when the frame is on or
/// above the ground.
#[must_use]
pub fn contact_dynamics(
    model: &Model,
    data: &Data,
    frame_id: usize,
    options: &ContactOptions,
) -> Wrench {
    let z = data.frame_xpos[frame_id].z;
    if z >= 0.0 {
        return Wrench::zero();
    }

    let v_world = frame_linear_velocity(model, data, frame_id);

    // Normal force: spring, plus damping only while penetrating deeper.
    let damping = if v_world.z < 0.0 {
        -options.damping * v_world.z
    } else {
        0.0
    };
    let f_normal = -options.stiffness * z + damping;

    // Regularized friction coefficient as a function of sliding speed.
    let v_tangent = Vector3::new(v_world.x, v_world.y, 0.0);
    let v_norm = v_tangent.norm();
    let eps = options.dry_friction_vel_eps;
    let friction_coeff = if v_norm <= eps {
        v_norm * options.friction_dry / eps
    } else if v_norm <= 1.5 * eps {
        -2.0 * v_norm * (options.friction_dry - options.friction_viscous) / eps
            + 3.0 * options.friction_dry
            - 2.0 * options.friction_viscous
    } else {
        options.friction_viscous
    };

    let mut f_world = -v_tangent * friction_coeff * f_normal;
    f_world.x = f_world.x.clamp(-TANGENTIAL_FORCE_MAX, TANGENTIAL_FORCE_MAX);
    f_world.y = f_world.y.clamp(-TANGENTIAL_FORCE_MAX, TANGENTIAL_FORCE_MAX);
    f_world.z = f_normal;

    // Express at the parent joint origin: rotate into the joint frame and
    // add the moment of the frame offset.
    let frame = &model.frames[frame_id];
    let f_local = data.xquat[frame.body].inverse() * f_world;
    let moment = frame.pos.cross(&f_local);

    // Smooth blend-in over the transition depth.
    let blending = (2.0 * (-z) / options.transition_eps).tanh();
    Wrench::new(f_local, moment) * blending
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use exo_multibody::{
        forward_kinematics, frames_forward_kinematics, model::JointSpec, Model,
    };
    use nalgebra::DVector;

    fn contact_model() -> (Model, usize) {
        let mut model = Model::new();
        let body = model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let frame = model.add_contact_frame("sole", body, Vector3::zeros()).unwrap();
        (model, frame)
    }

    fn kinematics_at(model: &Model, z: f64, v: &DVector<f64>) -> Data {
        let mut data = model.make_data();
        let mut q = model.neutral_configuration();
        q[2] = z;
        forward_kinematics(model, &mut data, &q, v);
        frames_forward_kinematics(model, &mut data);
        data
    }

    fn options() -> ContactOptions {
        ContactOptions {
            stiffness: 1e5,
            damping: 1e3,
            friction_dry: 1.0,
            friction_viscous: 0.5,
            dry_friction_vel_eps: 1e-2,
            transition_eps: 1e-3,
        }
    }

    #[test]
    fn test_above_ground_is_zero() {
        let (model, frame) = contact_model();
        let data = kinematics_at(&model, 0.5, &DVector::zeros(6));
        assert!(contact_dynamics(&model, &data, frame, &options()).is_zero());
        let data = kinematics_at(&model, 0.0, &DVector::zeros(6));
        assert!(contact_dynamics(&model, &data, frame, &options()).is_zero());
    }

    #[test]
    fn test_normal_spring_force_with_blending() {
        let (model, frame) = contact_model();
        let opts = options();
        // Deep enough (≫ transition_eps) for the blend to saturate.
        let z = -0.01;
        let data = kinematics_at(&model, z, &DVector::zeros(6));
        let w = contact_dynamics(&model, &data, frame, &opts);

        let expected = -opts.stiffness * z * (2.0 * (-z) / opts.transition_eps).tanh();
        assert_relative_eq!(w.linear.z, expected, epsilon = 1e-9);
        assert_relative_eq!(w.linear.z, 1000.0, epsilon = 1.0);
        assert_relative_eq!(w.angular.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_damping_only_while_penetrating() {
        let (model, frame) = contact_model();
        let opts = options();
        let z = -0.01;

        let mut v_down = DVector::zeros(6);
        v_down[2] = -0.1;
        let data = kinematics_at(&model, z, &v_down);
        let w_down = contact_dynamics(&model, &data, frame, &opts);

        let mut v_up = DVector::zeros(6);
        v_up[2] = 0.1;
        let data = kinematics_at(&model, z, &v_up);
        let w_up = contact_dynamics(&model, &data, frame, &opts);

        // Downward motion adds damping to the normal force; upward does not.
        assert!(w_down.linear.z > w_up.linear.z);
        let blend = (2.0 * (-z) / opts.transition_eps).tanh();
        assert_relative_eq!(
            w_up.linear.z,
            -opts.stiffness * z * blend,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_friction_branches() {
        let (model, frame) = contact_model();
        let opts = options();
        let z = -0.01;
        let blend = (2.0 * (-z) / opts.transition_eps).tanh();
        let f_n = -opts.stiffness * z;

        // Regularized branch: v = ε/2 → μ = μd/2.
        let mut v = DVector::zeros(6);
        v[0] = 0.5 * opts.dry_friction_vel_eps;
        let data = kinematics_at(&model, z, &v);
        let w = contact_dynamics(&model, &data, frame, &opts);
        assert_relative_eq!(
            w.linear.x,
            -v[0] * 0.5 * opts.friction_dry * f_n * blend,
            epsilon = 1e-9
        );

        // Viscous branch: v = 10·ε → μ = μv.
        let mut v = DVector::zeros(6);
        v[0] = 10.0 * opts.dry_friction_vel_eps;
        let data = kinematics_at(&model, z, &v);
        let w = contact_dynamics(&model, &data, frame, &opts);
        assert_relative_eq!(
            w.linear.x,
            -v[0] * opts.friction_viscous * f_n * blend,
            epsilon = 1e-9
        );
        // Friction opposes motion.
        assert!(w.linear.x < 0.0);
    }

    #[test]
    fn test_friction_transition_is_continuous() {
        let (model, frame) = contact_model();
        let opts = options();
        let z = -0.01;

        let force_at = |vx: f64| {
            let mut v = DVector::zeros(6);
            v[0] = vx;
            let data = kinematics_at(&model, z, &v);
            contact_dynamics(&model, &data, frame, &opts).linear.x
        };

        let eps = opts.dry_friction_vel_eps;
        for boundary in [eps, 1.5 * eps] {
            let below = force_at(boundary * (1.0 - 1e-9));
            let above = force_at(boundary * (1.0 + 1e-9));
            assert_relative_eq!(below, above, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_offset_frame_produces_moment() {
        let mut model = Model::new();
        let body = model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let frame = model
            .add_contact_frame("toe", body, Vector3::new(0.2, 0.0, 0.0))
            .unwrap();
        let data = kinematics_at(&model, -0.01, &DVector::zeros(6));
        let w = contact_dynamics(&model, &data, frame, &options());

        // Moment = r × f = (0.2,0,0) × (0,0,fz) → -0.2·fz about y.
        assert_relative_eq!(w.angular.y, -0.2 * w.linear.z, epsilon = 1e-9);
    }
}
