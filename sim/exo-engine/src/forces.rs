//! External force registry: timed impulses and time-varying force profiles.
//!
//! Both variants address the model through a named frame, resolved to an
//! index once at registration. Wrenches are given in the world frame at the
//! frame origin and mapped into the parent joint frame when accumulated.
//! Every dynamics evaluation re-evaluates both variants — there is no
//! latching between breakpoints, in either scheduled or continuous mode.

use exo_multibody::{Data, Model};
use exo_types::{Result, SimError, Wrench};
use nalgebra::{DVector, Vector3};

/// A time-varying force profile: `(t, x) → linear force`, world frame.
pub type ProfileFn = Box<dyn Fn(f64, &DVector<f64>) -> Vector3<f64>>;

enum ForceSource {
    Impulse {
        frame: usize,
        t0: f64,
        duration: f64,
        wrench: Wrench,
    },
    Profile {
        frame: usize,
        profile: ProfileFn,
    },
}

/// Registry of external forces applied at named frames.
///
/// Mutated only between simulations or through the registration calls; the
/// dynamics reads it on every evaluation.
#[derive(Default)]
pub struct ForceRegistry {
    sources: Vec<ForceSource>,
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let impulses = self
            .sources
            .iter()
            .filter(|s| matches!(s, ForceSource::Impulse { .. }))
            .count();
        f.debug_struct("ForceRegistry")
            .field("impulses", &impulses)
            .field("profiles", &(self.sources.len() - impulses))
            .finish()
    }
}

impl ForceRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered force sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when no force source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Register a wrench applied over `[t0, t0 + duration)`.
    ///
    /// The wrench is world-frame at the named frame's origin. Unknown frame
    /// names and non-positive windows are rejected.
    pub fn register_impulse(
        &mut self,
        model: &Model,
        frame_name: &str,
        t0: f64,
        duration: f64,
        wrench: Wrench,
    ) -> Result<()> {
        let frame = resolve_frame(model, frame_name)?;
        if t0 < 0.0 {
            return Err(SimError::bad_input(format!(
                "impulse start time must be non-negative, got {t0}"
            )));
        }
        if !(duration > 0.0) {
            return Err(SimError::bad_input(format!(
                "impulse duration must be strictly positive, got {duration}"
            )));
        }
        self.sources.push(ForceSource::Impulse {
            frame,
            t0,
            duration,
            wrench,
        });
        Ok(())
    }

    /// Register a force profile evaluated at every dynamics call.
    ///
    /// The profile returns a world-frame linear force applied at the frame
    /// origin.
    pub fn register_profile(
        &mut self,
        model: &Model,
        frame_name: &str,
        profile: impl Fn(f64, &DVector<f64>) -> Vector3<f64> + 'static,
    ) -> Result<()> {
        let frame = resolve_frame(model, frame_name)?;
        self.sources.push(ForceSource::Profile {
            frame,
            profile: Box::new(profile),
        });
        Ok(())
    }

    /// Drop every registered source.
    pub fn clear(&mut self) {
        self.sources.clear();
    }

    /// Accumulate all active sources into per-body joint-frame wrenches.
    pub(crate) fn accumulate(
        &self,
        model: &Model,
        data: &Data,
        t: f64,
        x: &DVector<f64>,
        f_external: &mut [Wrench],
    ) {
        for source in &self.sources {
            match source {
                ForceSource::Impulse {
                    frame,
                    t0,
                    duration,
                    wrench,
                } => {
                    if t >= *t0 && t < t0 + duration {
                        let body = model.frames[*frame].body;
                        f_external[body] += world_wrench_to_joint(model, data, *frame, *wrench);
                    }
                }
                ForceSource::Profile { frame, profile } => {
                    let force = profile(t, x);
                    let body = model.frames[*frame].body;
                    f_external[body] +=
                        world_wrench_to_joint(model, data, *frame, Wrench::from_linear(force));
                }
            }
        }
    }
}

fn resolve_frame(model: &Model, frame_name: &str) -> Result<usize> {
    model
        .frame_id(frame_name)
        .ok_or_else(|| SimError::bad_input(format!("unknown frame '{frame_name}'")))
}

/// Map a world-frame wrench at a frame origin into the parent joint frame
/// at the joint origin.
fn world_wrench_to_joint(model: &Model, data: &Data, frame_id: usize, w: Wrench) -> Wrench {
    let frame = &model.frames[frame_id];
    let rot_inv = data.xquat[frame.body].inverse();
    let linear = rot_inv * w.linear;
    let angular = rot_inv * w.angular + frame.pos.cross(&linear);
    Wrench::new(linear, angular)
}
