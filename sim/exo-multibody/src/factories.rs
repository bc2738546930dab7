//! Canonical test models.
//!
//! Small factories used across the workspace's tests: a floating body, a
//! planar n-link pendulum chain, and a single hinge. Real robots are built
//! through the [`Model`] builder by the application.

use crate::model::{JointSpec, Model};
use nalgebra::Vector3;

/// A single free-floating body with COM at its origin.
#[must_use]
pub fn free_body(mass: f64, inertia_diag: Vector3<f64>) -> Model {
    let mut model = Model::new();
    // Infallible: fresh model, world parent, positive mass enforced by caller.
    let _ = model.add_body("base", 0, JointSpec::free(), mass, Vector3::zeros(), inertia_diag);
    model
}

/// An n-link pendulum chain hanging along −z, hinged about +y.
///
/// Each link is a uniform rod of the given mass and length; link `k+1`
/// hangs from the tip of link `k`.
#[must_use]
pub fn n_link_pendulum(n: usize, mass: f64, length: f64) -> Model {
    let mut model = Model::new();
    let rod_inertia = mass * length * length / 12.0;
    let mut parent = 0;
    for k in 0..n {
        let spec = if k == 0 {
            JointSpec::hinge(Vector3::y())
        } else {
            JointSpec::hinge(Vector3::y()).at(Vector3::new(0.0, 0.0, -length))
        };
        // Infallible by construction: unique names, existing parents.
        if let Ok(body) = model.add_body(
            format!("link{}", k + 1),
            parent,
            spec,
            mass,
            Vector3::new(0.0, 0.0, -0.5 * length),
            Vector3::new(rod_inertia, rod_inertia, 1e-8),
        ) {
            parent = body;
        }
    }
    model
}

/// A single hinge joint about +y with a point-mass bob at distance `length`.
#[must_use]
pub fn single_hinge(mass: f64, length: f64) -> Model {
    let mut model = Model::new();
    let _ = model.add_body(
        "link",
        0,
        JointSpec::hinge(Vector3::y()),
        mass,
        Vector3::new(0.0, 0.0, -length),
        Vector3::new(1e-8, 1e-8, 1e-8),
    );
    model
}
