//! Configuration-manifold integration and quaternion normalization.
//!
//! Hinge and slide coordinates integrate by scalar addition; ball and free
//! quaternions integrate by the exponential map so unit norm is preserved.
//! The engine leans on this retraction to turn the tangent-space velocity
//! into a configuration derivative its vector-space integrator can consume.

use crate::kinematics::read_quaternion;
use crate::model::Model;
use crate::visitor::{JointContext, JointVisitor};
use nalgebra::{DVector, UnitQuaternion, Vector3};

/// Integrate a configuration by a tangent-space displacement.
///
/// `dq` has velocity-space layout (`nv`); typically `v·Δt`. Returns the
/// retracted configuration: `q ⊞ dq`.
#[must_use]
pub fn integrate(model: &Model, q: &DVector<f64>, dq: &DVector<f64>) -> DVector<f64> {
    let mut out = q.clone();
    let mut visitor = IntegrateVisitor { q, dq, out: &mut out };
    model.visit_joints(&mut visitor);
    out
}

struct IntegrateVisitor<'a> {
    q: &'a DVector<f64>,
    dq: &'a DVector<f64>,
    out: &'a mut DVector<f64>,
}

impl IntegrateVisitor<'_> {
    /// Right-multiply the quaternion block at `qpos_adr` by `exp(ω̂)`.
    ///
    /// The angular displacement is expressed in the child joint frame, so
    /// the increment composes on the right.
    fn integrate_quaternion(&mut self, qpos_adr: usize, omega: Vector3<f64>) {
        let angle = omega.norm();
        if angle < 1e-12 {
            return;
        }
        let dq_rot = UnitQuaternion::from_scaled_axis(omega);
        let q_new = read_quaternion(self.q, qpos_adr) * dq_rot;
        self.out[qpos_adr] = q_new.w;
        self.out[qpos_adr + 1] = q_new.i;
        self.out[qpos_adr + 2] = q_new.j;
        self.out[qpos_adr + 3] = q_new.k;
    }
}

impl JointVisitor for IntegrateVisitor<'_> {
    fn visit_hinge(&mut self, ctx: JointContext) {
        self.out[ctx.qpos_adr] = self.q[ctx.qpos_adr] + self.dq[ctx.dof_adr];
    }

    fn visit_slide(&mut self, ctx: JointContext) {
        self.out[ctx.qpos_adr] = self.q[ctx.qpos_adr] + self.dq[ctx.dof_adr];
    }

    fn visit_ball(&mut self, ctx: JointContext) {
        let omega = Vector3::new(
            self.dq[ctx.dof_adr],
            self.dq[ctx.dof_adr + 1],
            self.dq[ctx.dof_adr + 2],
        );
        self.integrate_quaternion(ctx.qpos_adr, omega);
    }

    fn visit_free(&mut self, ctx: JointContext) {
        for k in 0..3 {
            self.out[ctx.qpos_adr + k] = self.q[ctx.qpos_adr + k] + self.dq[ctx.dof_adr + k];
        }
        let omega = Vector3::new(
            self.dq[ctx.dof_adr + 3],
            self.dq[ctx.dof_adr + 4],
            self.dq[ctx.dof_adr + 5],
        );
        self.integrate_quaternion(ctx.qpos_adr + 3, omega);
    }
}

/// Renormalize every quaternion block of `q` in place.
///
/// Degenerate blocks (norm below 1e−10) are reset to identity with a
/// warning — they can only come from an uninitialized state vector.
pub fn normalize_configuration(model: &Model, q: &mut DVector<f64>) {
    let mut visitor = NormalizeVisitor { q };
    model.visit_joints(&mut visitor);
}

struct NormalizeVisitor<'a> {
    q: &'a mut DVector<f64>,
}

impl NormalizeVisitor<'_> {
    fn normalize(&mut self, adr: usize) {
        let norm = (self.q[adr] * self.q[adr]
            + self.q[adr + 1] * self.q[adr + 1]
            + self.q[adr + 2] * self.q[adr + 2]
            + self.q[adr + 3] * self.q[adr + 3])
            .sqrt();
        if norm > 1e-10 {
            for k in 0..4 {
                self.q[adr + k] /= norm;
            }
        } else {
            tracing::warn!("degenerate quaternion at q[{adr}..{}], reset to identity", adr + 4);
            self.q[adr] = 1.0;
            self.q[adr + 1] = 0.0;
            self.q[adr + 2] = 0.0;
            self.q[adr + 3] = 0.0;
        }
    }
}

impl JointVisitor for NormalizeVisitor<'_> {
    fn visit_ball(&mut self, ctx: JointContext) {
        self.normalize(ctx.qpos_adr);
    }

    fn visit_free(&mut self, ctx: JointContext) {
        self.normalize(ctx.qpos_adr + 3);
    }
}
