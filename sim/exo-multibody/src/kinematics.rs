//! Forward kinematics: body poses, spatial velocities, motion subspace.
//!
//! One pass over the tree fills `xpos`/`xquat`/`xcom`, the per-DOF motion
//! subspace columns `cdof`, the body spatial velocities `cvel`, and the
//! body spatial inertias `cinert`. Everything downstream (CRBA, Newton–
//! Euler, contact queries) reads these without touching `q` again.

use crate::data::Data;
use crate::model::{JointType, Model};
use crate::spatial::{angular, body_spatial_inertia, linear, spatial};
use nalgebra::{DVector, Quaternion, UnitQuaternion, Vector3};

/// Read a `[w x y z]` quaternion block out of a configuration vector.
///
/// Degenerate (near-zero norm) blocks fall back to the identity rotation so
/// an uninitialized state cannot poison the kinematics with NaNs.
#[must_use]
pub(crate) fn read_quaternion(q: &DVector<f64>, adr: usize) -> UnitQuaternion<f64> {
    let raw = Quaternion::new(q[adr], q[adr + 1], q[adr + 2], q[adr + 3]);
    if raw.norm() < 1e-10 {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::from_quaternion(raw)
    }
}

/// Compute body poses, motion subspace columns, spatial velocities, and
/// spatial inertias from `(q, v)`.
#[allow(clippy::similar_names)]
pub fn forward_kinematics(model: &Model, data: &mut Data, q: &DVector<f64>, v: &DVector<f64>) {
    data.xpos[0] = Vector3::zeros();
    data.xquat[0] = UnitQuaternion::identity();
    data.cvel[0].fill(0.0);

    for body in 1..model.nbody {
        let jnt = body - 1;
        let parent = model.body_parent[body];
        let qadr = model.jnt_qpos_adr[jnt];
        let dof = model.jnt_dof_adr[jnt];

        // Joint base placement: anchor and orientation before joint motion.
        let anchor = data.xpos[parent] + data.xquat[parent] * model.body_pos[body];
        let base_quat = data.xquat[parent] * model.body_quat[body];

        match model.jnt_type[jnt] {
            JointType::Hinge => {
                let axis = model.jnt_axis[jnt];
                let axis_world = base_quat * axis;
                data.xpos[body] = anchor;
                data.xquat[body] = base_quat
                    * UnitQuaternion::from_axis_angle(
                        &nalgebra::Unit::new_normalize(axis),
                        q[qadr],
                    );
                data.cdof[dof] = spatial(axis_world, anchor.cross(&axis_world));
            }
            JointType::Slide => {
                let axis_world = base_quat * model.jnt_axis[jnt];
                data.xpos[body] = anchor + axis_world * q[qadr];
                data.xquat[body] = base_quat;
                data.cdof[dof] = spatial(Vector3::zeros(), axis_world);
            }
            JointType::Ball => {
                data.xpos[body] = anchor;
                data.xquat[body] = base_quat * read_quaternion(q, qadr);
                // Angular velocity is expressed in the child joint frame.
                for k in 0..3 {
                    let mut e = Vector3::zeros();
                    e[k] = 1.0;
                    let u = data.xquat[body] * e;
                    data.cdof[dof + k] = spatial(u, anchor.cross(&u));
                }
            }
            JointType::Free => {
                let pos = Vector3::new(q[qadr], q[qadr + 1], q[qadr + 2]);
                data.xpos[body] = anchor + base_quat * pos;
                data.xquat[body] = base_quat * read_quaternion(q, qadr + 3);
                // Linear velocity in the joint base frame (inertial — free
                // joints attach to the world), angular in the child frame.
                for k in 0..3 {
                    let mut e = Vector3::zeros();
                    e[k] = 1.0;
                    data.cdof[dof + k] = spatial(Vector3::zeros(), base_quat * e);
                    let u = data.xquat[body] * e;
                    data.cdof[dof + 3 + k] = spatial(u, data.xpos[body].cross(&u));
                }
            }
        }

        // Spatial velocity: parent plus this joint's contribution.
        let mut vel = data.cvel[parent];
        let jtype = model.jnt_type[jnt];
        for k in 0..jtype.nv() {
            vel += data.cdof[dof + k] * v[dof + k];
        }
        data.cvel[body] = vel;

        data.xcom[body] = data.xpos[body] + data.xquat[body] * model.body_ipos[body];
        data.cinert[body] = body_spatial_inertia(
            model.body_mass[body],
            model.body_inertia[body],
            data.xquat[body].to_rotation_matrix().matrix(),
            data.xcom[body],
        );
    }
}

/// Compute operational frame placements from body poses.
pub fn frames_forward_kinematics(model: &Model, data: &mut Data) {
    for (id, frame) in model.frames.iter().enumerate() {
        data.frame_xpos[id] = data.xpos[frame.body] + data.xquat[frame.body] * frame.pos;
        data.frame_xquat[id] = data.xquat[frame.body] * frame.quat;
    }
}

/// World-frame linear velocity of a frame origin.
#[must_use]
pub fn frame_linear_velocity(model: &Model, data: &Data, frame_id: usize) -> Vector3<f64> {
    let body = model.frames[frame_id].body;
    let vel = &data.cvel[body];
    linear(vel) + angular(vel).cross(&data.frame_xpos[frame_id])
}

/// World-frame angular velocity of a frame (its body's angular velocity).
#[must_use]
pub fn frame_angular_velocity(model: &Model, data: &Data, frame_id: usize) -> Vector3<f64> {
    angular(&data.cvel[model.frames[frame_id].body])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::JointSpec;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn pendulum() -> Model {
        let mut model = Model::new();
        model
            .add_body(
                "link",
                0,
                JointSpec::hinge(Vector3::y()),
                1.0,
                Vector3::new(0.0, 0.0, -0.5),
                Vector3::new(0.01, 0.01, 0.01),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_pendulum_at_rest_hangs_down() {
        let model = pendulum();
        let mut data = model.make_data();
        let q = DVector::zeros(1);
        let v = DVector::zeros(1);
        forward_kinematics(&model, &mut data, &q, &v);

        assert_relative_eq!(data.xpos[1], Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(data.xcom[1], Vector3::new(0.0, 0.0, -0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_pendulum_quarter_turn_swings_com() {
        let model = pendulum();
        let mut data = model.make_data();
        let q = DVector::from_element(1, FRAC_PI_2);
        let v = DVector::zeros(1);
        forward_kinematics(&model, &mut data, &q, &v);

        // Rotation of +π/2 about +y maps (0,0,-0.5) to (-0.5,0,0).
        assert_relative_eq!(data.xcom[1], Vector3::new(-0.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_pendulum_tip_velocity() {
        let model = pendulum();
        let mut data = model.make_data();
        let q = DVector::zeros(1);
        let v = DVector::from_element(1, 2.0);
        forward_kinematics(&model, &mut data, &q, &v);

        // ω = 2 rad/s about y; point at (0,0,-0.5) moves with ω × r.
        let vel = &data.cvel[1];
        assert_relative_eq!(angular(vel), Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        let r = Vector3::new(0.0, 0.0, -0.5);
        let v_com = linear(vel) + angular(vel).cross(&r);
        assert_relative_eq!(v_com, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_free_body_pose_from_configuration() {
        let mut model = Model::new();
        model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                2.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let mut data = model.make_data();
        let mut q = model.neutral_configuration();
        q[0] = 1.0;
        q[2] = -3.0;
        let v = DVector::zeros(6);
        forward_kinematics(&model, &mut data, &q, &v);

        assert_relative_eq!(data.xpos[1], Vector3::new(1.0, 0.0, -3.0), epsilon = 1e-12);
        assert_relative_eq!(data.xquat[1].angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_frame_placement_and_velocity() {
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
        let mut data = model.make_data();
        let q = model.neutral_configuration();
        let mut v = DVector::zeros(6);
        v[2] = -1.0; // falling
        v[4] = 3.0; // spinning about y
        forward_kinematics(&model, &mut data, &q, &v);
        frames_forward_kinematics(&model, &mut data);

        assert_relative_eq!(
            data.frame_xpos[frame],
            Vector3::new(0.2, 0.0, 0.0),
            epsilon = 1e-12
        );
        // v_frame = v_body + ω × r = (0,0,-1) + (0,3,0) × (0.2,0,0)
        let vel = frame_linear_velocity(&model, &data, frame);
        assert_relative_eq!(vel, Vector3::new(0.0, 0.0, -1.6), epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_quaternion_reads_identity() {
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
        let q = DVector::zeros(7); // all-zero quaternion block
        let v = DVector::zeros(6);
        forward_kinematics(&model, &mut data, &q, &v);
        assert_relative_eq!(data.xquat[1].angle(), 0.0, epsilon = 1e-12);
    }
}
