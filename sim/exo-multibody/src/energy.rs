//! Energy queries.
//!
//! Kinetic energy comes from the mass matrix (`½ vᵀ qM v`), potential
//! energy from gravity against the body centers of mass. Both read
//! quantities already computed by forward kinematics and CRBA.

use crate::data::Data;
use crate::model::Model;
use nalgebra::DVector;

/// Kinetic energy `½ vᵀ qM v`.
///
/// Requires [`crate::crba`] to be up to date; stores the result in
/// `data.energy_kinetic` and returns it.
pub fn kinetic_energy(data: &mut Data, v: &DVector<f64>) -> f64 {
    let m_v = &data.qM * v;
    let energy = 0.5 * v.dot(&m_v);
    data.energy_kinetic = energy;
    energy
}

/// Gravitational potential energy `−Σ mᵢ g·comᵢ`.
///
/// Requires [`crate::forward_kinematics`] to be up to date; stores the
/// result in `data.energy_potential` and returns it.
pub fn potential_energy(model: &Model, data: &mut Data) -> f64 {
    let mut potential = 0.0;
    for body in 1..model.nbody {
        potential -= model.body_mass[body] * model.gravity.dot(&data.xcom[body]);
    }
    data.energy_potential = potential;
    potential
}
