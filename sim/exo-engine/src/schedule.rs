//! Breakpoint schedule for sensor and controller sampling.
//!
//! A zero period means continuous: the corresponding refresh happens inside
//! every dynamics evaluation instead of at breakpoints, and contributes no
//! breakpoint of its own. When both periods are zero the outer loop is
//! free-running and the integrator heads straight for the end time.

/// Absolute tolerance for "is `t` on a period multiple" tests.
const ALIGNMENT_TOL: f64 = 1e-8;

/// Resolved sampling schedule for one simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    /// Sensor sampling period; zero = continuous.
    pub sensors_period: f64,
    /// Controller command period; zero = continuous.
    pub controller_period: f64,
}

impl Schedule {
    /// Build from the two update periods.
    #[must_use]
    pub const fn new(sensors_period: f64, controller_period: f64) -> Self {
        Self {
            sensors_period,
            controller_period,
        }
    }

    /// Effective outer-loop breakpoint period: the smallest positive
    /// period, or zero when both are continuous.
    #[must_use]
    pub fn update_period(&self) -> f64 {
        match (self.sensors_period > 0.0, self.controller_period > 0.0) {
            (true, true) => self.sensors_period.min(self.controller_period),
            (true, false) => self.sensors_period,
            (false, true) => self.controller_period,
            (false, false) => 0.0,
        }
    }

    /// True when the outer loop runs without breakpoints.
    #[must_use]
    pub fn free_running(&self) -> bool {
        self.update_period() == 0.0
    }

    /// Is a scheduled sensor refresh due at `t`?
    #[must_use]
    pub fn sensors_due(&self, t: f64) -> bool {
        self.sensors_period > 0.0 && aligned(t, self.sensors_period)
    }

    /// Is a scheduled controller refresh due at `t`?
    #[must_use]
    pub fn controller_due(&self, t: f64) -> bool {
        self.controller_period > 0.0 && aligned(t, self.controller_period)
    }
}

/// Is `t` within tolerance of an integer multiple of `period`?
fn aligned(t: f64, period: f64) -> bool {
    let nearest = (t / period).round() * period;
    (t - nearest).abs() < ALIGNMENT_TOL
}
