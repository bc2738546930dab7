//! Per-simulation scratch state.
//!
//! [`Data`] is the mutable counterpart to [`Model`]: everything here is
//! computed from `(q, v)` by the kinematics and dynamics passes. One `Data`
//! is created per simulation via [`Model::make_data`] and reset wholesale at
//! simulation entry.

use crate::model::Model;
use crate::spatial::SpatialVector;
use nalgebra::{DMatrix, DVector, Matrix6, UnitQuaternion, Vector3};

/// Dynamic simulation scratch.
///
/// All arrays are pre-allocated at construction; the dynamics passes never
/// allocate. `q` and `v` themselves live with the caller — `Data` only
/// holds quantities derived from them.
#[derive(Debug, Clone)]
#[allow(non_snake_case)] // qM follows the conventional mass-matrix name
pub struct Data {
    /// Body origin positions in the world frame (length `nbody`).
    pub xpos: Vec<Vector3<f64>>,
    /// Body orientations in the world frame (length `nbody`).
    pub xquat: Vec<UnitQuaternion<f64>>,
    /// Body centers of mass in the world frame (length `nbody`).
    pub xcom: Vec<Vector3<f64>>,

    /// Body spatial velocities, world axes about the world origin
    /// (length `nbody`).
    pub cvel: Vec<SpatialVector>,
    /// Per-DOF motion subspace columns, world axes about the world origin
    /// (length `nv`).
    pub cdof: Vec<SpatialVector>,
    /// Body spatial inertias about the world origin (length `nbody`).
    pub cinert: Vec<Matrix6<f64>>,
    /// Composite (subtree) spatial inertias, filled by CRBA (length `nbody`).
    pub crb_inertia: Vec<Matrix6<f64>>,

    /// Joint-space mass matrix (`nv × nv`), filled by CRBA.
    pub qM: DMatrix<f64>,
    /// Bias torques (gravity + Coriolis/centrifugal, minus external
    /// contributions when requested), filled by the Newton–Euler pass.
    pub qfrc_bias: DVector<f64>,

    /// Operational frame positions in the world frame (length `nframes`).
    pub frame_xpos: Vec<Vector3<f64>>,
    /// Operational frame orientations in the world frame (length `nframes`).
    pub frame_xquat: Vec<UnitQuaternion<f64>>,

    /// Kinetic energy at the last energy evaluation.
    pub energy_kinetic: f64,
    /// Potential energy at the last energy evaluation.
    pub energy_potential: f64,

    // Newton-Euler recursion buffers
    pub(crate) cacc: Vec<SpatialVector>,
    pub(crate) cfrc: Vec<SpatialVector>,
}

impl Data {
    /// Allocate scratch sized for `model`.
    #[must_use]
    pub fn new(model: &Model) -> Self {
        Self {
            xpos: vec![Vector3::zeros(); model.nbody],
            xquat: vec![UnitQuaternion::identity(); model.nbody],
            xcom: vec![Vector3::zeros(); model.nbody],
            cvel: vec![SpatialVector::zeros(); model.nbody],
            cdof: vec![SpatialVector::zeros(); model.nv],
            cinert: vec![Matrix6::zeros(); model.nbody],
            crb_inertia: vec![Matrix6::zeros(); model.nbody],
            qM: DMatrix::zeros(model.nv, model.nv),
            qfrc_bias: DVector::zeros(model.nv),
            frame_xpos: vec![Vector3::zeros(); model.frames.len()],
            frame_xquat: vec![UnitQuaternion::identity(); model.frames.len()],
            energy_kinetic: 0.0,
            energy_potential: 0.0,
            cacc: vec![SpatialVector::zeros(); model.nbody],
            cfrc: vec![SpatialVector::zeros(); model.nbody],
        }
    }

    /// Zero all computed quantities.
    pub fn reset(&mut self) {
        for p in &mut self.xpos {
            *p = Vector3::zeros();
        }
        for r in &mut self.xquat {
            *r = UnitQuaternion::identity();
        }
        for c in &mut self.xcom {
            *c = Vector3::zeros();
        }
        for v in &mut self.cvel {
            *v = SpatialVector::zeros();
        }
        for d in &mut self.cdof {
            *d = SpatialVector::zeros();
        }
        for i in &mut self.cinert {
            *i = Matrix6::zeros();
        }
        for i in &mut self.crb_inertia {
            *i = Matrix6::zeros();
        }
        self.qM.fill(0.0);
        self.qfrc_bias.fill(0.0);
        for p in &mut self.frame_xpos {
            *p = Vector3::zeros();
        }
        for r in &mut self.frame_xquat {
            *r = UnitQuaternion::identity();
        }
        self.energy_kinetic = 0.0;
        self.energy_potential = 0.0;
    }

    /// Total mechanical energy from the last energy evaluation.
    #[must_use]
    pub fn total_energy(&self) -> f64 {
        self.energy_kinetic + self.energy_potential
    }
}
