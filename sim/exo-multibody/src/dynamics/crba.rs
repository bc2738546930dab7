//! Composite Rigid Body Algorithm: joint-space mass matrix.
//!
//! Backward pass accumulates subtree spatial inertias, then
//! `qM[i][j] = cdofᵢᵀ · I_c · cdofⱼ` over ancestor DOF pairs. All spatial
//! quantities are referenced about the world origin, so no inertia or force
//! shifting is needed between bodies.

use crate::data::Data;
use crate::model::Model;

/// Build the joint-space mass matrix `data.qM` from body spatial inertias.
///
/// Requires [`crate::forward_kinematics`] to be up to date.
pub fn crba(model: &Model, data: &mut Data) {
    data.qM.fill(0.0);
    if model.nv == 0 {
        return;
    }

    // Composite inertias: subtree inertia of each body about the origin.
    for body in 0..model.nbody {
        data.crb_inertia[body] = data.cinert[body];
    }
    for body in (1..model.nbody).rev() {
        let parent = model.body_parent[body];
        if parent != 0 {
            let child = data.crb_inertia[body];
            data.crb_inertia[parent] += child;
        }
    }

    // qM entries along each DOF's ancestor chain.
    for i in 0..model.nv {
        let body_i = model.dof_body[i];
        let f = data.crb_inertia[body_i] * data.cdof[i];

        data.qM[(i, i)] = data.cdof[i].dot(&f);

        let mut j = model.dof_parent[i];
        while let Some(dof_j) = j {
            let m_ij = data.cdof[dof_j].dot(&f);
            data.qM[(dof_j, i)] = m_ij;
            data.qM[(i, dof_j)] = m_ij;
            j = model.dof_parent[dof_j];
        }
    }
}
