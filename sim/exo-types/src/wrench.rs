//! 6D spatial force type.

use nalgebra::{Vector3, Vector6};
use std::ops::{Add, AddAssign, Mul, Neg};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 6D spatial force: linear force and angular moment, in one frame.
///
/// The frame of expression and the point of application are carried by
/// context, not by the type: contact and external forces are produced in
/// the world frame at a named frame's origin, then mapped into the parent
/// joint frame before entering the dynamics.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wrench {
    /// Linear force component (N).
    pub linear: Vector3<f64>,
    /// Angular moment component (N·m).
    pub angular: Vector3<f64>,
}

impl Wrench {
    /// Create a wrench from its linear and angular parts.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// The zero wrench.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// A pure force with no moment.
    #[must_use]
    pub fn from_linear(linear: Vector3<f64>) -> Self {
        Self {
            linear,
            angular: Vector3::zeros(),
        }
    }

    /// Build from a packed 6-vector `[fx fy fz, mx my mz]`.
    #[must_use]
    pub fn from_vector(v: &Vector6<f64>) -> Self {
        Self {
            linear: Vector3::new(v[0], v[1], v[2]),
            angular: Vector3::new(v[3], v[4], v[5]),
        }
    }

    /// Pack as a 6-vector `[fx fy fz, mx my mz]`.
    #[must_use]
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.linear.x,
            self.linear.y,
            self.linear.z,
            self.angular.x,
            self.angular.y,
            self.angular.z,
        )
    }

    /// True when both components are exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.linear == Vector3::zeros() && self.angular == Vector3::zeros()
    }
}

impl Default for Wrench {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Wrench {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            linear: self.linear + rhs.linear,
            angular: self.angular + rhs.angular,
        }
    }
}

impl AddAssign for Wrench {
    fn add_assign(&mut self, rhs: Self) {
        self.linear += rhs.linear;
        self.angular += rhs.angular;
    }
}

impl Mul<f64> for Wrench {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

impl Neg for Wrench {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            linear: -self.linear,
            angular: -self.angular,
        }
    }
}
