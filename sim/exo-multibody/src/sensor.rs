//! Sensor registry and concrete sensors.
//!
//! Sensors form a heterogeneous registry keyed by `(kind, name)`: groups
//! are insertion-ordered per kind, and readings are exposed as one matrix
//! per kind with one row per sensor. The engine refreshes every sensor at
//! its sampling schedule through [`SensorRegistry::set_sensors_data`];
//! controllers read the registry, never the sensors directly.
//!
//! Measurement corruption is limited to optional additive bias and white
//! noise per channel, driven by the registry's seeded generator so runs
//! are reproducible.

use crate::data::Data;
use crate::model::Model;
use crate::spatial::angular;
use exo_types::{Result, SimError};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Everything a sensor may measure, passed by reference at refresh time.
#[derive(Debug, Clone, Copy)]
pub struct SensorContext<'a> {
    /// The model.
    pub model: &'a Model,
    /// Kinematic scratch, up to date for `(q, v)`.
    pub data: &'a Data,
    /// Sample time.
    pub t: f64,
    /// Configuration at the last accepted step.
    pub q: &'a DVector<f64>,
    /// Velocity at the last accepted step.
    pub v: &'a DVector<f64>,
    /// Acceleration at the last accepted step.
    pub a: &'a DVector<f64>,
    /// Generalized effort at the last accepted step.
    pub u: &'a DVector<f64>,
}

/// A sensor: something that refreshes from the simulation state and exposes
/// a flat reading vector.
pub trait Sensor {
    /// Sensor kind key (groups sensors of the same type).
    fn kind(&self) -> &'static str;

    /// Unique name within the kind.
    fn name(&self) -> &str;

    /// One label per channel of [`Sensor::value`].
    fn fieldnames(&self) -> Vec<String>;

    /// Refresh the reading from the simulation state.
    fn update(&mut self, ctx: &SensorContext<'_>, rng: &mut StdRng);

    /// Last computed reading.
    fn value(&self) -> &DVector<f64>;
}

/// Additive measurement corruption: per-channel bias and white noise.
#[derive(Debug, Clone)]
pub struct SensorNoise {
    /// Constant additive bias per channel.
    pub bias: DVector<f64>,
    /// White noise standard deviation per channel.
    pub std_dev: DVector<f64>,
}

impl SensorNoise {
    /// Zero-bias white noise with uniform standard deviation.
    #[must_use]
    pub fn white(n_channels: usize, std_dev: f64) -> Self {
        Self {
            bias: DVector::zeros(n_channels),
            std_dev: DVector::from_element(n_channels, std_dev),
        }
    }

    fn apply(&self, value: &mut DVector<f64>, rng: &mut StdRng) {
        // Unit normal; scaling per channel keeps one distribution object.
        if let Ok(normal) = Normal::new(0.0, 1.0) {
            for i in 0..value.len() {
                value[i] += self.bias[i] + self.std_dev[i] * normal.sample(rng);
            }
        }
    }
}

/// Joint encoder: position and velocity of a 1-DOF joint.
#[derive(Debug)]
pub struct EncoderSensor {
    name: String,
    body: usize,
    noise: Option<SensorNoise>,
    value: DVector<f64>,
}

impl EncoderSensor {
    /// Measure the joint moving `body`.
    #[must_use]
    pub fn new(name: impl Into<String>, body: usize) -> Self {
        Self {
            name: name.into(),
            body,
            noise: None,
            value: DVector::zeros(2),
        }
    }

    /// Attach measurement corruption.
    #[must_use]
    pub fn with_noise(mut self, noise: SensorNoise) -> Self {
        self.noise = Some(noise);
        self
    }
}

impl Sensor for EncoderSensor {
    fn kind(&self) -> &'static str {
        "encoder"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fieldnames(&self) -> Vec<String> {
        vec!["position".to_string(), "velocity".to_string()]
    }

    fn update(&mut self, ctx: &SensorContext<'_>, rng: &mut StdRng) {
        let jnt = self.body - 1;
        self.value[0] = ctx.q[ctx.model.jnt_qpos_adr[jnt]];
        self.value[1] = ctx.v[ctx.model.jnt_dof_adr[jnt]];
        if let Some(noise) = &self.noise {
            noise.apply(&mut self.value, rng);
        }
    }

    fn value(&self) -> &DVector<f64> {
        &self.value
    }
}

/// Motor effort sensor: applied torque at one motor.
#[derive(Debug)]
pub struct EffortSensor {
    name: String,
    motor: usize,
    noise: Option<SensorNoise>,
    value: DVector<f64>,
}

impl EffortSensor {
    /// Measure motor `motor` (motor declaration order).
    #[must_use]
    pub fn new(name: impl Into<String>, motor: usize) -> Self {
        Self {
            name: name.into(),
            motor,
            noise: None,
            value: DVector::zeros(1),
        }
    }

    /// Attach measurement corruption.
    #[must_use]
    pub fn with_noise(mut self, noise: SensorNoise) -> Self {
        self.noise = Some(noise);
        self
    }
}

impl Sensor for EffortSensor {
    fn kind(&self) -> &'static str {
        "effort"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fieldnames(&self) -> Vec<String> {
        vec!["effort".to_string()]
    }

    fn update(&mut self, ctx: &SensorContext<'_>, rng: &mut StdRng) {
        let jnt = ctx.model.motor_jnt[self.motor];
        self.value[0] = ctx.u[ctx.model.jnt_dof_adr[jnt]];
        if let Some(noise) = &self.noise {
            noise.apply(&mut self.value, rng);
        }
    }

    fn value(&self) -> &DVector<f64> {
        &self.value
    }
}

/// Inertial measurement unit attached to an operational frame:
/// world orientation quaternion plus frame-local angular rate.
#[derive(Debug)]
pub struct ImuSensor {
    name: String,
    frame: usize,
    noise: Option<SensorNoise>,
    value: DVector<f64>,
}

impl ImuSensor {
    /// Measure frame `frame`.
    #[must_use]
    pub fn new(name: impl Into<String>, frame: usize) -> Self {
        Self {
            name: name.into(),
            frame,
            noise: None,
            value: DVector::zeros(7),
        }
    }

    /// Attach measurement corruption.
    #[must_use]
    pub fn with_noise(mut self, noise: SensorNoise) -> Self {
        self.noise = Some(noise);
        self
    }
}

impl Sensor for ImuSensor {
    fn kind(&self) -> &'static str {
        "imu"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fieldnames(&self) -> Vec<String> {
        ["qw", "qx", "qy", "qz", "wx", "wy", "wz"]
            .iter()
            .map(|s| (*s).to_string())
            .collect()
    }

    fn update(&mut self, ctx: &SensorContext<'_>, rng: &mut StdRng) {
        let quat = ctx.data.frame_xquat[self.frame];
        let body = ctx.model.frames[self.frame].body;
        let gyro = quat.inverse() * angular(&ctx.data.cvel[body]);
        self.value[0] = quat.w;
        self.value[1] = quat.i;
        self.value[2] = quat.j;
        self.value[3] = quat.k;
        self.value[4] = gyro.x;
        self.value[5] = gyro.y;
        self.value[6] = gyro.z;
        if let Some(noise) = &self.noise {
            noise.apply(&mut self.value, rng);
        }
    }

    fn value(&self) -> &DVector<f64> {
        &self.value
    }
}

struct SensorGroup {
    kind: &'static str,
    sensors: Vec<Box<dyn Sensor>>,
}

/// Heterogeneous sensor registry keyed by `(kind, name)`.
pub struct SensorRegistry {
    groups: Vec<SensorGroup>,
    rng: StdRng,
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("SensorRegistry");
        for group in &self.groups {
            dbg.field(group.kind, &group.sensors.len());
        }
        dbg.finish()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorRegistry {
    /// An empty registry with a zero-seeded generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Number of registered sensors, all kinds included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.sensors.len()).sum()
    }

    /// True when no sensor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Reseed the noise generator (called at every simulation reset).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Register a sensor. Duplicate `(kind, name)` pairs are rejected.
    pub fn add_sensor(&mut self, sensor: Box<dyn Sensor>) -> Result<()> {
        let kind = sensor.kind();
        if self
            .sensor(kind, sensor.name())
            .is_some()
        {
            return Err(SimError::bad_input(format!(
                "duplicate sensor '{}' of kind '{kind}'",
                sensor.name()
            )));
        }
        if let Some(group) = self.groups.iter_mut().find(|g| g.kind == kind) {
            group.sensors.push(sensor);
        } else {
            self.groups.push(SensorGroup {
                kind,
                sensors: vec![sensor],
            });
        }
        Ok(())
    }

    /// Remove a sensor by `(kind, name)`.
    pub fn remove_sensor(&mut self, kind: &str, name: &str) -> Result<()> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.kind == kind)
            .ok_or_else(|| SimError::bad_input(format!("no sensors of kind '{kind}'")))?;
        let before = group.sensors.len();
        group.sensors.retain(|s| s.name() != name);
        if group.sensors.len() == before {
            return Err(SimError::bad_input(format!(
                "no sensor '{name}' of kind '{kind}'"
            )));
        }
        self.groups.retain(|g| !g.sensors.is_empty());
        Ok(())
    }

    /// Remove every sensor.
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Refresh every sensor from the simulation state.
    pub fn set_sensors_data(&mut self, ctx: &SensorContext<'_>) {
        for group in &mut self.groups {
            for sensor in &mut group.sensors {
                sensor.update(ctx, &mut self.rng);
            }
        }
    }

    /// Registered kinds, in first-registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.groups.iter().map(|g| g.kind)
    }

    /// Readings of one kind: one row per sensor, registration order.
    #[must_use]
    pub fn readings(&self, kind: &str) -> Option<DMatrix<f64>> {
        let group = self.groups.iter().find(|g| g.kind == kind)?;
        let rows = group.sensors.len();
        let cols = group.sensors.first().map_or(0, |s| s.value().len());
        let mut out = DMatrix::zeros(rows, cols);
        for (i, sensor) in group.sensors.iter().enumerate() {
            out.row_mut(i).copy_from(&sensor.value().transpose());
        }
        Some(out)
    }

    /// Borrow one sensor by `(kind, name)`.
    #[must_use]
    pub fn sensor(&self, kind: &str, name: &str) -> Option<&dyn Sensor> {
        self.groups
            .iter()
            .find(|g| g.kind == kind)?
            .sensors
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Flat telemetry labels, `kind.name.field`, in registry order.
    #[must_use]
    pub fn telemetry_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for group in &self.groups {
            for sensor in &group.sensors {
                for field in sensor.fieldnames() {
                    fields.push(format!("{}.{}.{field}", group.kind, sensor.name()));
                }
            }
        }
        fields
    }

    /// Flat reading values, parallel to [`SensorRegistry::telemetry_fields`].
    #[must_use]
    pub fn telemetry_values(&self) -> Vec<f64> {
        let mut values = Vec::new();
        for group in &self.groups {
            for sensor in &group.sensors {
                values.extend(sensor.value().iter().copied());
            }
        }
        values
    }
}
