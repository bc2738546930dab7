//! Kinematic-tree rigid-body dynamics.
//!
//! This crate provides the Model/Data architecture the simulation engine is
//! built on:
//!
//! - [`Model`] is static (immutable after construction): tree topology,
//!   joints, inertias, motors, operational frames, limits.
//! - [`Data`] is dynamic scratch created per simulation via
//!   [`Model::make_data`]: world poses, spatial velocities, mass matrix,
//!   bias forces, energies.
//!
//! The generalized coordinates `(q, v)` are owned by the caller (the engine
//! keeps them inside its integrator state) and flow through free functions:
//!
//! ```text
//! forward_kinematics(model, data, q, v)   poses + spatial velocities
//! frames_forward_kinematics(model, data)  operational frame placements
//! crba(model, data)                       joint-space mass matrix
//! rnea_bias(model, data, v, fext)         gravity + Coriolis (+ ext) bias
//! forward_dynamics(...)                   qacc from torques and wrenches
//! inverse_dynamics(...)                   torques from qacc
//! integrate(model, q, dq)                 manifold retraction
//! ```
//!
//! Conventions: quaternions are stored `[w x y z]`; angular velocities of
//! ball and free joints are expressed in the child joint frame; free-joint
//! linear velocity is world-frame. Spatial vectors are `[angular; linear]`
//! about the world origin, which keeps every dynamics pass shift-free.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

pub mod data;
pub mod dynamics;
pub mod energy;
pub mod factories;
pub mod integrate;
pub mod kinematics;
pub mod model;
pub mod sensor;
pub mod spatial;
pub mod visitor;

pub use data::Data;
pub use dynamics::{crba, forward_dynamics, inverse_dynamics, rnea_bias};
pub use energy::{kinetic_energy, potential_energy};
pub use integrate::{integrate, normalize_configuration};
pub use kinematics::{forward_kinematics, frame_linear_velocity, frames_forward_kinematics};
pub use model::{Frame, JointSpec, JointType, Model};
pub use sensor::{
    EffortSensor, EncoderSensor, ImuSensor, Sensor, SensorContext, SensorNoise, SensorRegistry,
};
pub use spatial::SpatialVector;
pub use visitor::{JointContext, JointVisitor};
