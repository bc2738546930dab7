//! Spatial algebra for 6D motion and force vectors.
//!
//! Featherstone's spatial vector algebra, used by the kinematics and
//! dynamics passes. All spatial quantities in this crate are expressed in
//! world axes about the world origin; referencing everything to one common
//! point removes the frame-shift bookkeeping from CRBA and Newton–Euler.
//!
//! Layout: `[angular (3), linear (3)]` for both motion and force vectors.

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

/// 6D spatial vector: `[angular (3), linear (3)]`.
pub type SpatialVector = Vector6<f64>;

/// Build a spatial vector from its angular and linear parts.
#[inline]
#[must_use]
pub fn spatial(ang: Vector3<f64>, lin: Vector3<f64>) -> SpatialVector {
    SpatialVector::new(ang.x, ang.y, ang.z, lin.x, lin.y, lin.z)
}

/// Angular part of a spatial vector.
#[inline]
#[must_use]
pub fn angular(s: &SpatialVector) -> Vector3<f64> {
    Vector3::new(s[0], s[1], s[2])
}

/// Linear part of a spatial vector.
#[inline]
#[must_use]
pub fn linear(s: &SpatialVector) -> Vector3<f64> {
    Vector3::new(s[3], s[4], s[5])
}

/// Spatial cross product for motion vectors: `v ×ₘ s`.
#[inline]
#[must_use]
pub fn cross_motion(v: &SpatialVector, s: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let v_lin = linear(v);
    let s_ang = angular(s);
    let s_lin = linear(s);

    spatial(w.cross(&s_ang), w.cross(&s_lin) + v_lin.cross(&s_ang))
}

/// Spatial cross product for force vectors: `v ×* f`.
#[inline]
#[must_use]
pub fn cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let v_lin = linear(v);
    let f_ang = angular(f);
    let f_lin = linear(f);

    spatial(w.cross(&f_ang) + v_lin.cross(&f_lin), w.cross(&f_lin))
}

/// Spatial inertia of one body about a reference point.
///
/// Built from the body mass, the diagonal inertia about the center of mass
/// in its principal frame, the rotation of that frame into world axes, and
/// `h`, the world-frame vector from the reference point to the center of
/// mass:
///
/// ```text
/// I = [ I_com + m·(h·h·1 − h⊗h)   m·[h]×  ]
///     [ m·[h]×ᵀ                   m·1     ]
/// ```
#[must_use]
pub fn body_spatial_inertia(
    mass: f64,
    inertia_diag: Vector3<f64>,
    rot: &Matrix3<f64>,
    h: Vector3<f64>,
) -> Matrix6<f64> {
    // I_com rotated into world axes: R * diag * R^T
    let mut i_rot = Matrix3::zeros();
    for row in 0..3 {
        for col in 0..3 {
            i_rot[(row, col)] = rot[(row, 0)] * inertia_diag[0] * rot[(col, 0)]
                + rot[(row, 1)] * inertia_diag[1] * rot[(col, 1)]
                + rot[(row, 2)] * inertia_diag[2] * rot[(col, 2)];
        }
    }

    let mut inertia = Matrix6::zeros();

    // Upper-left: rotational inertia about the reference point (parallel axis)
    let h_dot_h = h.dot(&h);
    for row in 0..3 {
        for col in 0..3 {
            let delta = if row == col { 1.0 } else { 0.0 };
            inertia[(row, col)] = i_rot[(row, col)] + mass * (h_dot_h * delta - h[row] * h[col]);
        }
    }

    // Lower-right: mass
    inertia[(3, 3)] = mass;
    inertia[(4, 4)] = mass;
    inertia[(5, 5)] = mass;

    // Coupling blocks: m·[h]× and its transpose
    let mh = mass * h;
    inertia[(0, 4)] = -mh.z;
    inertia[(0, 5)] = mh.y;
    inertia[(1, 3)] = mh.z;
    inertia[(1, 5)] = -mh.x;
    inertia[(2, 3)] = -mh.y;
    inertia[(2, 4)] = mh.x;
    inertia[(4, 0)] = -mh.z;
    inertia[(5, 0)] = mh.y;
    inertia[(3, 1)] = mh.z;
    inertia[(5, 1)] = -mh.x;
    inertia[(3, 2)] = -mh.y;
    inertia[(4, 2)] = mh.x;

    inertia
}
