//! Joint-space dynamics: mass matrix, bias forces, forward and inverse
//! dynamics.
//!
//! The equation of motion is `qM·a + bias(q, v) = τ + τ_ext`. CRBA builds
//! `qM`, the Newton–Euler pass builds `bias` (optionally folding external
//! wrenches in), and the forward solve is a dense Cholesky factorization —
//! the trees this crate targets are small enough that sparsity buys
//! nothing.

mod crba;
mod rnea;

pub use crba::crba;
pub use rnea::rnea_bias;

use crate::data::Data;
use crate::model::Model;
use exo_types::{Result, SimError, Wrench};
use nalgebra::{Cholesky, DVector};

/// Forward dynamics: joint accelerations from torques and external wrenches.
///
/// `fext` holds one wrench per body (index 0, the world, is ignored),
/// expressed in the local joint frame at the body origin. Requires
/// [`crate::forward_kinematics`] to be up to date for `(q, v)`.
pub fn forward_dynamics(
    model: &Model,
    data: &mut Data,
    v: &DVector<f64>,
    tau: &DVector<f64>,
    fext: &[Wrench],
) -> Result<DVector<f64>> {
    crba(model, data);
    rnea_bias(model, data, v, Some(fext));

    let rhs = tau - &data.qfrc_bias;
    let chol = Cholesky::new(data.qM.clone()).ok_or_else(|| {
        SimError::generic("forward dynamics failed: mass matrix is not positive definite")
    })?;
    Ok(chol.solve(&rhs))
}

/// Inverse dynamics: generalized torques that produce `a` at `(q, v)`,
/// without external wrenches.
///
/// Requires [`crate::forward_kinematics`] to be up to date for `(q, v)`.
#[must_use]
pub fn inverse_dynamics(
    model: &Model,
    data: &mut Data,
    v: &DVector<f64>,
    a: &DVector<f64>,
) -> DVector<f64> {
    crba(model, data);
    rnea_bias(model, data, v, None);
    &data.qM * a + &data.qfrc_bias
}
