//! Newton–Euler pass: bias forces (gravity + Coriolis/centrifugal).
//!
//! World-origin recursion: velocities come from forward kinematics, the
//! acceleration forward pass propagates the velocity-product term with
//! gravity folded in as a base acceleration, and the force backward pass
//! projects through the motion subspace. With everything referenced about
//! the world origin the passes are shift-free.

use crate::data::Data;
use crate::model::{JointType, Model};
use crate::spatial::{cross_force, cross_motion, spatial, SpatialVector};
use exo_types::Wrench;
use nalgebra::{DVector, Vector3};

/// Compute bias torques into `data.qfrc_bias`.
///
/// `bias = C(q, v)·v + g(q) − τ_ext` — external wrenches (one per body, in
/// the local joint frame at the body origin) are folded in when `fext` is
/// given, so forward dynamics is a single solve against `τ − bias`.
///
/// Requires [`crate::forward_kinematics`] to be up to date.
pub fn rnea_bias(model: &Model, data: &mut Data, v: &DVector<f64>, fext: Option<&[Wrench]>) {
    data.qfrc_bias.fill(0.0);
    if model.nv == 0 {
        return;
    }

    // Gravity enters as a fictitious base acceleration of −g.
    data.cacc[0] = spatial(Vector3::zeros(), -model.gravity);
    data.cfrc[0].fill(0.0);

    // Forward pass: bias accelerations and per-body spatial forces.
    for body in 1..model.nbody {
        let jnt = body - 1;
        let parent = model.body_parent[body];
        let dof = model.jnt_dof_adr[jnt];

        // Velocity-product term Ṡq̇ = v ×ₘ w, where w is the part of the
        // joint velocity whose subspace moves with the child body. For free
        // joints the translation columns are inertial-fixed (their
        // derivative vanishes), so only the angular columns contribute.
        let w: SpatialVector = match model.jnt_type[jnt] {
            JointType::Free => {
                data.cdof[dof + 3] * v[dof + 3]
                    + data.cdof[dof + 4] * v[dof + 4]
                    + data.cdof[dof + 5] * v[dof + 5]
            }
            _ => data.cvel[body] - data.cvel[parent],
        };

        let acc = data.cacc[parent] + cross_motion(&data.cvel[body], &w);
        data.cacc[body] = acc;

        let momentum = data.cinert[body] * data.cvel[body];
        let mut f = data.cinert[body] * acc + cross_force(&data.cvel[body], &momentum);

        if let Some(fext) = fext {
            let wrench = &fext[body];
            if !wrench.is_zero() {
                let lin = data.xquat[body] * wrench.linear;
                let ang = data.xquat[body] * wrench.angular + data.xpos[body].cross(&lin);
                f -= spatial(ang, lin);
            }
        }
        data.cfrc[body] = f;
    }

    // Backward pass: project onto the motion subspace, accumulate to parent.
    for body in (1..model.nbody).rev() {
        let jnt = body - 1;
        let dof = model.jnt_dof_adr[jnt];
        for k in 0..model.jnt_type[jnt].nv() {
            data.qfrc_bias[dof + k] = data.cdof[dof + k].dot(&data.cfrc[body]);
        }
        let parent = model.body_parent[body];
        let f = data.cfrc[body];
        data.cfrc[parent] += f;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::kinematics::forward_kinematics;
    use crate::model::JointSpec;
    use approx::assert_relative_eq;

    #[test]
    fn test_free_body_gravity_bias() {
        let mut model = Model::new();
        model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                2.5,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let mut data = model.make_data();
        let q = model.neutral_configuration();
        let v = DVector::zeros(6);
        forward_kinematics(&model, &mut data, &q, &v);
        rnea_bias(&model, &mut data, &v, None);

        // bias_z = −m·g_z = +2.5·9.81; no angular bias at rest.
        assert_relative_eq!(data.qfrc_bias[2], 2.5 * 9.81, epsilon = 1e-10);
        assert_relative_eq!(data.qfrc_bias.rows(3, 3).norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_external_wrench_cancels_gravity() {
        let mut model = Model::new();
        model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let mut data = model.make_data();
        let q = model.neutral_configuration();
        let v = DVector::zeros(6);
        forward_kinematics(&model, &mut data, &q, &v);

        let mut fext = vec![Wrench::zero(); model.nbody];
        fext[1] = Wrench::from_linear(Vector3::new(0.0, 0.0, 9.81));
        rnea_bias(&model, &mut data, &v, Some(&fext));

        assert_relative_eq!(data.qfrc_bias.norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_centrifugal_term_on_spinning_pendulum() {
        // Horizontal pendulum spinning about the vertical axis: the
        // centrifugal term appears in the hinge bias through C(q,v)·v.
        let mut model = Model::new();
        model.gravity = Vector3::zeros();
        let shoulder = model
            .add_body(
                "yaw",
                0,
                JointSpec::hinge(Vector3::z()),
                1e-6,
                Vector3::zeros(),
                Vector3::new(1e-8, 1e-8, 1e-8),
            )
            .unwrap();
        model
            .add_body(
                "pitch",
                shoulder,
                JointSpec::hinge(Vector3::y()),
                1.0,
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::zeros(),
            )
            .unwrap();
        let mut data = model.make_data();
        let q = DVector::zeros(2);
        let v = DVector::from_vec(vec![2.0, 0.0]); // spinning about z
        forward_kinematics(&model, &mut data, &q, &v);
        rnea_bias(&model, &mut data, &v, None);

        // Point mass at radius 0.5 spinning at ω=2: centripetal force pulls
        // inward; holding the pitch hinge still requires no torque about y
        // (force is radial), but the yaw bias must vanish too (constant ω).
        assert_relative_eq!(data.qfrc_bias[0], 0.0, epsilon = 1e-9);
        // Pitch hinge at the same anchor sees r × F_centripetal along -y:
        // F = -m ω² r x̂ = -2 N x̂ at (0.5,0,0): τ_y = r_z F_x - r_x F_z = 0.
        assert_relative_eq!(data.qfrc_bias[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gyroscopic_bias_on_spinning_free_body() {
        // Asymmetric body spinning about a non-principal axis: Euler's
        // equations give ω × (I·ω) ≠ 0, which must appear in the bias.
        let mut model = Model::new();
        model.gravity = Vector3::zeros();
        model
            .add_body(
                "rotor",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.2, 0.3),
            )
            .unwrap();
        let mut data = model.make_data();
        let q = model.neutral_configuration();
        let mut v = DVector::zeros(6);
        v[3] = 1.0;
        v[4] = 2.0;
        forward_kinematics(&model, &mut data, &q, &v);
        rnea_bias(&model, &mut data, &v, None);

        // ω × (I·ω) = (1,2,0) × (0.1,0.4,0) = (0, 0, 0.4·1 − 0.1·2) = (0,0,0.2)
        assert_relative_eq!(data.qfrc_bias[3], 0.0, epsilon = 1e-12);
        assert_relative_eq!(data.qfrc_bias[4], 0.0, epsilon = 1e-12);
        assert_relative_eq!(data.qfrc_bias[5], 0.2, epsilon = 1e-12);
        // Linear bias vanishes: the COM is at the origin.
        assert_relative_eq!(data.qfrc_bias.rows(0, 3).norm(), 0.0, epsilon = 1e-12);
    }
}
