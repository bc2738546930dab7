//! Joint visitor: the single source of truth for per-joint-type dispatch.
//!
//! Position integration, quaternion normalization, and the kinematics
//! passes all iterate joints through [`Model::visit_joints`], so address
//! computation lives in exactly one place and adding a joint type is a
//! compile error everywhere it matters.

use crate::model::{JointType, Model};

/// Pre-computed joint metadata passed to visitors.
#[derive(Debug, Clone, Copy)]
pub struct JointContext {
    /// Joint index.
    pub jnt_id: usize,
    /// Joint type.
    pub jnt_type: JointType,
    /// First configuration coordinate of this joint.
    pub qpos_adr: usize,
    /// First velocity coordinate of this joint.
    pub dof_adr: usize,
    /// Body moved by this joint.
    pub body: usize,
}

/// Visitor over the model's joints, dispatched by joint type.
///
/// Default methods are no-ops; implement only the types a pass cares about.
pub trait JointVisitor {
    /// Called for each hinge joint.
    #[inline]
    fn visit_hinge(&mut self, _ctx: JointContext) {}

    /// Called for each slide joint.
    #[inline]
    fn visit_slide(&mut self, _ctx: JointContext) {}

    /// Called for each ball joint.
    #[inline]
    fn visit_ball(&mut self, _ctx: JointContext) {}

    /// Called for each free joint.
    #[inline]
    fn visit_free(&mut self, _ctx: JointContext) {}
}

impl Model {
    /// Iterate all joints in index (topological) order.
    #[inline]
    pub fn visit_joints<V: JointVisitor>(&self, visitor: &mut V) {
        for jnt_id in 0..self.njnt {
            let ctx = JointContext {
                jnt_id,
                jnt_type: self.jnt_type[jnt_id],
                qpos_adr: self.jnt_qpos_adr[jnt_id],
                dof_adr: self.jnt_dof_adr[jnt_id],
                body: self.jnt_body[jnt_id],
            };
            match ctx.jnt_type {
                JointType::Hinge => visitor.visit_hinge(ctx),
                JointType::Slide => visitor.visit_slide(ctx),
                JointType::Ball => visitor.visit_ball(ctx),
                JointType::Free => visitor.visit_free(ctx),
            }
        }
    }
}
