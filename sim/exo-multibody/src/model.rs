//! Static model definition: tree topology, joints, inertias, motors, frames.
//!
//! [`Model`] follows the struct-of-arrays layout: parallel `body_*`, `jnt_*`
//! and `dof_*` vectors indexed by body, joint, and DOF. It is immutable once
//! a simulation starts; all per-simulation state lives in [`crate::Data`].
//!
//! Topology is restricted to a tree with exactly one joint per non-world
//! body: body `0` is the world, and body `i` (`i ≥ 1`) attaches to its
//! parent through joint `i − 1`. Parents always precede children, so a plain
//! index loop is a topological traversal.

use crate::data::Data;
use exo_types::{Result, SimError};
use hashbrown::HashMap;
use nalgebra::{DVector, UnitQuaternion, Vector3};

/// Joint type of a body's attachment to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// 6-DOF floating base: world-frame translation plus quaternion.
    Free,
    /// 3-DOF spherical joint, quaternion parameterized.
    Ball,
    /// 1-DOF revolute joint about a fixed axis.
    Hinge,
    /// 1-DOF prismatic joint along a fixed axis.
    Slide,
}

impl JointType {
    /// Number of configuration coordinates contributed by this joint type.
    #[must_use]
    pub const fn nq(self) -> usize {
        match self {
            Self::Free => 7,
            Self::Ball => 4,
            Self::Hinge | Self::Slide => 1,
        }
    }

    /// Number of velocity coordinates contributed by this joint type.
    #[must_use]
    pub const fn nv(self) -> usize {
        match self {
            Self::Free => 6,
            Self::Ball => 3,
            Self::Hinge | Self::Slide => 1,
        }
    }
}

/// How a body attaches to its parent.
#[derive(Debug, Clone)]
pub struct JointSpec {
    /// Joint type.
    pub joint_type: JointType,
    /// Motion axis in the joint frame (hinge and slide only).
    pub axis: Vector3<f64>,
    /// Joint anchor in the parent body frame.
    pub pos: Vector3<f64>,
    /// Fixed rotation from the parent body frame to the joint frame.
    pub quat: UnitQuaternion<f64>,
}

impl JointSpec {
    /// A floating base joint (parent must be the world).
    #[must_use]
    pub fn free() -> Self {
        Self {
            joint_type: JointType::Free,
            axis: Vector3::z(),
            pos: Vector3::zeros(),
            quat: UnitQuaternion::identity(),
        }
    }

    /// A spherical joint.
    #[must_use]
    pub fn ball() -> Self {
        Self {
            joint_type: JointType::Ball,
            axis: Vector3::z(),
            pos: Vector3::zeros(),
            quat: UnitQuaternion::identity(),
        }
    }

    /// A revolute joint about `axis`.
    #[must_use]
    pub fn hinge(axis: Vector3<f64>) -> Self {
        Self {
            joint_type: JointType::Hinge,
            axis,
            pos: Vector3::zeros(),
            quat: UnitQuaternion::identity(),
        }
    }

    /// A prismatic joint along `axis`.
    #[must_use]
    pub fn slide(axis: Vector3<f64>) -> Self {
        Self {
            joint_type: JointType::Slide,
            axis,
            pos: Vector3::zeros(),
            quat: UnitQuaternion::identity(),
        }
    }

    /// Place the joint anchor in the parent body frame.
    #[must_use]
    pub fn at(mut self, pos: Vector3<f64>) -> Self {
        self.pos = pos;
        self
    }
}

/// A named operational frame rigidly attached to a body.
///
/// Contact queries and external forces address the model through frames.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique frame name.
    pub name: String,
    /// Body the frame is attached to.
    pub body: usize,
    /// Frame origin in the body frame.
    pub pos: Vector3<f64>,
    /// Frame orientation relative to the body frame.
    pub quat: UnitQuaternion<f64>,
}

/// Static kinematic-tree model.
///
/// Construct with [`Model::new`] + [`Model::add_body`] (or a factory from
/// [`crate::factories`]), then declare motors, bounds, and frames. All
/// arrays are public for read access; mutate only through the builder
/// methods so the address arrays stay consistent.
#[derive(Debug, Clone)]
pub struct Model {
    /// Number of bodies, including the world body 0.
    pub nbody: usize,
    /// Number of joints (`nbody − 1`).
    pub njnt: usize,
    /// Configuration vector dimension.
    pub nq: usize,
    /// Velocity vector dimension.
    pub nv: usize,

    /// Gravity acceleration, world frame. Written by the engine.
    pub gravity: Vector3<f64>,

    /// Parent body index (body 0 is its own parent).
    pub body_parent: Vec<usize>,
    /// Joint anchor in the parent body frame.
    pub body_pos: Vec<Vector3<f64>>,
    /// Fixed rotation from parent body frame to joint frame.
    pub body_quat: Vec<UnitQuaternion<f64>>,
    /// Center of mass offset in the body frame.
    pub body_ipos: Vec<Vector3<f64>>,
    /// Body mass.
    pub body_mass: Vec<f64>,
    /// Diagonal rotational inertia about the COM, body-frame axes.
    pub body_inertia: Vec<Vector3<f64>>,
    /// Body (and joint) name.
    pub body_name: Vec<String>,

    /// Joint type, indexed by joint (`jnt_id = body − 1`).
    pub jnt_type: Vec<JointType>,
    /// Body moved by each joint.
    pub jnt_body: Vec<usize>,
    /// Motion axis in the joint frame (hinge/slide).
    pub jnt_axis: Vec<Vector3<f64>>,
    /// First configuration coordinate of each joint.
    pub jnt_qpos_adr: Vec<usize>,
    /// First velocity coordinate of each joint.
    pub jnt_dof_adr: Vec<usize>,
    /// Whether the joint has position bounds (1-DOF joints only).
    pub jnt_bounded: Vec<bool>,
    /// Position bounds `(min, max)` for bounded joints.
    pub jnt_range: Vec<(f64, f64)>,

    /// Joint owning each DOF.
    pub dof_jnt: Vec<usize>,
    /// Body owning each DOF.
    pub dof_body: Vec<usize>,
    /// Preceding DOF in the kinematic chain, `None` at tree roots.
    pub dof_parent: Vec<Option<usize>>,

    /// Torque saturation per velocity coordinate; `+∞` where unlimited.
    pub effort_limit: DVector<f64>,

    /// Motorized joints, in motor declaration order (1-DOF joints only).
    pub motor_jnt: Vec<usize>,

    /// Operational frames.
    pub frames: Vec<Frame>,
    /// Frames participating in ground contact, in declaration order.
    pub contact_frame_ids: Vec<usize>,

    frame_lookup: HashMap<String, usize>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Create an empty model containing only the world body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nbody: 1,
            njnt: 0,
            nq: 0,
            nv: 0,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            body_parent: vec![0],
            body_pos: vec![Vector3::zeros()],
            body_quat: vec![UnitQuaternion::identity()],
            body_ipos: vec![Vector3::zeros()],
            body_mass: vec![0.0],
            body_inertia: vec![Vector3::zeros()],
            body_name: vec!["world".to_string()],
            jnt_type: Vec::new(),
            jnt_body: Vec::new(),
            jnt_axis: Vec::new(),
            jnt_qpos_adr: Vec::new(),
            jnt_dof_adr: Vec::new(),
            jnt_bounded: Vec::new(),
            jnt_range: Vec::new(),
            dof_jnt: Vec::new(),
            dof_body: Vec::new(),
            dof_parent: Vec::new(),
            effort_limit: DVector::zeros(0),
            motor_jnt: Vec::new(),
            frames: Vec::new(),
            contact_frame_ids: Vec::new(),
            frame_lookup: HashMap::new(),
        }
    }

    /// True once the model has at least one non-world body.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.nbody > 1
    }

    /// State vector dimension `nq + nv`.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.nq + self.nv
    }

    /// Number of declared motors.
    #[must_use]
    pub fn n_motors(&self) -> usize {
        self.motor_jnt.len()
    }

    /// Append a body attached to `parent` through `joint`.
    ///
    /// Returns the new body index. Parents must already exist, so bodies are
    /// always added in topological order.
    pub fn add_body(
        &mut self,
        name: impl Into<String>,
        parent: usize,
        joint: JointSpec,
        mass: f64,
        com: Vector3<f64>,
        inertia_diag: Vector3<f64>,
    ) -> Result<usize> {
        let name = name.into();
        if parent >= self.nbody {
            return Err(SimError::bad_input(format!(
                "parent body {parent} does not exist"
            )));
        }
        if joint.joint_type == JointType::Free && parent != 0 {
            return Err(SimError::bad_input(
                "free joints must attach to the world body",
            ));
        }
        if mass <= 0.0 {
            return Err(SimError::bad_input(format!(
                "body '{name}' must have positive mass, got {mass}"
            )));
        }
        if self.body_name.iter().any(|n| *n == name) {
            return Err(SimError::bad_input(format!("duplicate body name '{name}'")));
        }

        let body = self.nbody;
        let jnt = self.njnt;
        let jtype = joint.joint_type;

        self.body_parent.push(parent);
        self.body_pos.push(joint.pos);
        self.body_quat.push(joint.quat);
        self.body_ipos.push(com);
        self.body_mass.push(mass);
        self.body_inertia.push(inertia_diag);
        self.body_name.push(name);

        self.jnt_type.push(jtype);
        self.jnt_body.push(body);
        self.jnt_axis.push(joint.axis.normalize());
        self.jnt_qpos_adr.push(self.nq);
        self.jnt_dof_adr.push(self.nv);
        self.jnt_bounded.push(false);
        self.jnt_range.push((f64::NEG_INFINITY, f64::INFINITY));

        // DOF chain: first DOF of this joint continues from the last DOF of
        // the parent body's joint; further DOFs chain within the joint.
        let parent_last_dof = if parent == 0 {
            None
        } else {
            let pj = parent - 1;
            Some(self.jnt_dof_adr[pj] + self.jnt_type[pj].nv() - 1)
        };
        for k in 0..jtype.nv() {
            self.dof_jnt.push(jnt);
            self.dof_body.push(body);
            self.dof_parent.push(if k == 0 {
                parent_last_dof
            } else {
                Some(self.nv + k - 1)
            });
        }

        self.nq += jtype.nq();
        self.nv += jtype.nv();
        self.nbody += 1;
        self.njnt += 1;
        self.effort_limit = {
            let mut limits = DVector::from_element(self.nv, f64::INFINITY);
            limits
                .rows_mut(0, self.nv - jtype.nv())
                .copy_from(&self.effort_limit);
            limits
        };

        Ok(body)
    }

    /// Declare position bounds on a 1-DOF joint.
    pub fn set_joint_bounds(&mut self, body: usize, min: f64, max: f64) -> Result<()> {
        let jnt = self.joint_of(body)?;
        if self.jnt_type[jnt].nv() != 1 {
            return Err(SimError::bad_input(
                "position bounds are only supported on 1-DOF joints",
            ));
        }
        if min >= max {
            return Err(SimError::bad_input(format!(
                "joint bounds must satisfy min < max, got [{min}, {max}]"
            )));
        }
        self.jnt_bounded[jnt] = true;
        self.jnt_range[jnt] = (min, max);
        Ok(())
    }

    /// Declare a motor on a 1-DOF joint with the given effort limit.
    ///
    /// Returns the motor index. Motor order defines the command vector
    /// layout.
    pub fn add_motor(&mut self, body: usize, effort_limit: f64) -> Result<usize> {
        let jnt = self.joint_of(body)?;
        if self.jnt_type[jnt].nv() != 1 {
            return Err(SimError::bad_input(
                "motors are only supported on 1-DOF joints",
            ));
        }
        if self.motor_jnt.contains(&jnt) {
            return Err(SimError::bad_input(format!(
                "joint of body '{}' already has a motor",
                self.body_name[body]
            )));
        }
        if !(effort_limit > 0.0) {
            return Err(SimError::bad_input(
                "motor effort limit must be strictly positive",
            ));
        }
        self.effort_limit[self.jnt_dof_adr[jnt]] = effort_limit;
        self.motor_jnt.push(jnt);
        Ok(self.motor_jnt.len() - 1)
    }

    /// Attach a named operational frame to a body.
    pub fn add_frame(
        &mut self,
        name: impl Into<String>,
        body: usize,
        pos: Vector3<f64>,
        quat: UnitQuaternion<f64>,
    ) -> Result<usize> {
        let name = name.into();
        if body == 0 || body >= self.nbody {
            return Err(SimError::bad_input(format!(
                "cannot attach frame '{name}' to body {body}"
            )));
        }
        if self.frame_lookup.contains_key(&name) {
            return Err(SimError::bad_input(format!(
                "duplicate frame name '{name}'"
            )));
        }
        let id = self.frames.len();
        self.frame_lookup.insert(name.clone(), id);
        self.frames.push(Frame {
            name,
            body,
            pos,
            quat,
        });
        Ok(id)
    }

    /// Attach a frame and register it as a ground-contact point.
    pub fn add_contact_frame(
        &mut self,
        name: impl Into<String>,
        body: usize,
        pos: Vector3<f64>,
    ) -> Result<usize> {
        let id = self.add_frame(name, body, pos, UnitQuaternion::identity())?;
        self.contact_frame_ids.push(id);
        Ok(id)
    }

    /// Look up a frame index by name.
    #[must_use]
    pub fn frame_id(&self, name: &str) -> Option<usize> {
        self.frame_lookup.get(name).copied()
    }

    /// Velocity-space index of each motor, in motor order.
    #[must_use]
    pub fn motor_velocity_indices(&self) -> Vec<usize> {
        self.motor_jnt.iter().map(|&j| self.jnt_dof_adr[j]).collect()
    }

    /// Configuration-space index of each motor, in motor order.
    #[must_use]
    pub fn motor_position_indices(&self) -> Vec<usize> {
        self.motor_jnt
            .iter()
            .map(|&j| self.jnt_qpos_adr[j])
            .collect()
    }

    /// Motor names, in motor order (the motorized body's name).
    #[must_use]
    pub fn motor_names(&self) -> Vec<String> {
        self.motor_jnt
            .iter()
            .map(|&j| self.body_name[self.jnt_body[j]].clone())
            .collect()
    }

    /// One name per configuration coordinate.
    #[must_use]
    pub fn position_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.nq);
        for jnt in 0..self.njnt {
            let base = &self.body_name[self.jnt_body[jnt]];
            match self.jnt_type[jnt] {
                JointType::Hinge | JointType::Slide => names.push(base.clone()),
                JointType::Ball => {
                    for c in ["qw", "qx", "qy", "qz"] {
                        names.push(format!("{base}.{c}"));
                    }
                }
                JointType::Free => {
                    for c in ["x", "y", "z", "qw", "qx", "qy", "qz"] {
                        names.push(format!("{base}.{c}"));
                    }
                }
            }
        }
        names
    }

    /// One name per velocity coordinate (also used for accelerations and
    /// generalized torques).
    #[must_use]
    pub fn velocity_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.nv);
        for jnt in 0..self.njnt {
            let base = &self.body_name[self.jnt_body[jnt]];
            match self.jnt_type[jnt] {
                JointType::Hinge | JointType::Slide => names.push(base.clone()),
                JointType::Ball => {
                    for c in ["wx", "wy", "wz"] {
                        names.push(format!("{base}.{c}"));
                    }
                }
                JointType::Free => {
                    for c in ["vx", "vy", "vz", "wx", "wy", "wz"] {
                        names.push(format!("{base}.{c}"));
                    }
                }
            }
        }
        names
    }

    /// The neutral configuration: zeros with identity quaternions.
    #[must_use]
    pub fn neutral_configuration(&self) -> DVector<f64> {
        let mut q = DVector::zeros(self.nq);
        for jnt in 0..self.njnt {
            let adr = self.jnt_qpos_adr[jnt];
            match self.jnt_type[jnt] {
                JointType::Ball => q[adr] = 1.0,
                JointType::Free => q[adr + 3] = 1.0,
                JointType::Hinge | JointType::Slide => {}
            }
        }
        q
    }

    /// Allocate the per-simulation scratch for this model.
    #[must_use]
    pub fn make_data(&self) -> Data {
        Data::new(self)
    }

    fn joint_of(&self, body: usize) -> Result<usize> {
        if body == 0 || body >= self.nbody {
            return Err(SimError::bad_input(format!("body {body} does not exist")));
        }
        Ok(body - 1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_accumulate() {
        let mut model = Model::new();
        let base = model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let link = model
            .add_body(
                "link",
                base,
                JointSpec::hinge(Vector3::y()),
                0.5,
                Vector3::new(0.0, 0.0, -0.2),
                Vector3::new(0.01, 0.01, 0.01),
            )
            .unwrap();

        assert_eq!(model.nq, 8);
        assert_eq!(model.nv, 7);
        assert_eq!(model.nx(), 15);
        assert_eq!(model.jnt_qpos_adr, vec![0, 7]);
        assert_eq!(model.jnt_dof_adr, vec![0, 6]);
        assert_eq!(model.dof_parent[6], Some(5));
        assert_eq!(link, 2);
    }

    #[test]
    fn test_free_joint_requires_world_parent() {
        let mut model = Model::new();
        let base = model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        let err = model.add_body(
            "floating-child",
            base,
            JointSpec::free(),
            1.0,
            Vector3::zeros(),
            Vector3::new(0.1, 0.1, 0.1),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_motor_mapping_and_limits() {
        let mut model = Model::new();
        let b1 = model
            .add_body(
                "shoulder",
                0,
                JointSpec::hinge(Vector3::y()),
                1.0,
                Vector3::new(0.0, 0.0, -0.5),
                Vector3::new(0.05, 0.05, 0.05),
            )
            .unwrap();
        let b2 = model
            .add_body(
                "elbow",
                b1,
                JointSpec::hinge(Vector3::y()).at(Vector3::new(0.0, 0.0, -1.0)),
                1.0,
                Vector3::new(0.0, 0.0, -0.5),
                Vector3::new(0.05, 0.05, 0.05),
            )
            .unwrap();

        model.add_motor(b2, 20.0).unwrap();
        model.add_motor(b1, 40.0).unwrap();

        assert_eq!(model.motor_velocity_indices(), vec![1, 0]);
        assert_eq!(model.motor_position_indices(), vec![1, 0]);
        assert_eq!(model.effort_limit[0], 40.0);
        assert_eq!(model.effort_limit[1], 20.0);
        assert!(model.add_motor(b1, 10.0).is_err());
    }

    #[test]
    fn test_frame_lookup_and_duplicates() {
        let mut model = Model::new();
        let body = model
            .add_body(
                "foot",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        model
            .add_contact_frame("heel", body, Vector3::new(-0.1, 0.0, 0.0))
            .unwrap();
        assert_eq!(model.frame_id("heel"), Some(0));
        assert_eq!(model.frame_id("toe"), None);
        assert!(model
            .add_frame("heel", body, Vector3::zeros(), UnitQuaternion::identity())
            .is_err());
        assert_eq!(model.contact_frame_ids, vec![0]);
    }

    #[test]
    fn test_neutral_configuration_quaternions() {
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
        let q = model.neutral_configuration();
        assert_eq!(q[3], 1.0);
        assert_eq!(q.iter().filter(|&&x| x != 0.0).count(), 1);
    }

    #[test]
    fn test_name_vectors_parallel_to_coordinates() {
        let mut model = Model::new();
        let base = model
            .add_body(
                "base",
                0,
                JointSpec::free(),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.1, 0.1, 0.1),
            )
            .unwrap();
        model
            .add_body(
                "knee",
                base,
                JointSpec::hinge(Vector3::y()),
                1.0,
                Vector3::zeros(),
                Vector3::new(0.01, 0.01, 0.01),
            )
            .unwrap();
        assert_eq!(model.position_names().len(), model.nq);
        assert_eq!(model.velocity_names().len(), model.nv);
        assert_eq!(model.position_names()[7], "knee");
        assert_eq!(model.velocity_names()[6], "knee");
    }
}
