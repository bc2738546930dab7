//! Embedded Dormand–Prince 5(4) controlled stepper.
//!
//! One `try_step` attempts a single step of the proposed size: the 5th-order
//! solution advances the state, the embedded 4th-order solution provides the
//! error estimate, and the step size is adapted either way. The last stage
//! is the first stage of the next step (FSAL), so an accepted step leaves
//! `dxdt` holding the derivative at the new state.

use exo_types::{Result, SimError};
use nalgebra::DVector;

// Dormand-Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (stage 2 weight is zero).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Error weights: 5th-order minus embedded 4th-order.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Step-size adaptation bounds and safety factor.
const SAFETY: f64 = 0.9;
const SHRINK_MIN: f64 = 0.2;
const GROW_MAX: f64 = 5.0;

/// Consecutive rejections after which the stepper gives up.
pub const MAX_CONSECUTIVE_REJECTIONS: u32 = 100;

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step was taken: `x`, `dxdt`, and `t` advanced.
    Accepted,
    /// The error estimate was too large: only `dt` changed.
    Rejected,
}

/// Embedded Dormand–Prince 5(4) stepper with error-controlled step size.
#[derive(Debug, Clone)]
pub struct ControlledStepper {
    tol_abs: f64,
    tol_rel: f64,
    k2: DVector<f64>,
    k3: DVector<f64>,
    k4: DVector<f64>,
    k5: DVector<f64>,
    k6: DVector<f64>,
    k7: DVector<f64>,
    x_tmp: DVector<f64>,
    x_new: DVector<f64>,
}

impl ControlledStepper {
    /// Create a stepper with the given tolerances.
    #[must_use]
    pub fn new(tol_abs: f64, tol_rel: f64) -> Self {
        Self {
            tol_abs,
            tol_rel,
            k2: DVector::zeros(0),
            k3: DVector::zeros(0),
            k4: DVector::zeros(0),
            k5: DVector::zeros(0),
            k6: DVector::zeros(0),
            k7: DVector::zeros(0),
            x_tmp: DVector::zeros(0),
            x_new: DVector::zeros(0),
        }
    }

    /// Attempt one step of size `*dt` from `(*t, x)` with `dxdt = f(t, x)`.
    ///
    /// On acceptance `x`, `dxdt` (FSAL), and `t` are advanced and `*dt`
    /// holds the suggested next size. On rejection only `*dt` shrinks.
    /// The right-hand side may fail; its error aborts the attempt.
    pub fn try_step<F>(
        &mut self,
        rhs: &mut F,
        x: &mut DVector<f64>,
        dxdt: &mut DVector<f64>,
        t: &mut f64,
        dt: &mut f64,
    ) -> Result<StepOutcome>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
    {
        let n = x.len();
        if self.x_tmp.len() != n {
            self.k2 = DVector::zeros(n);
            self.k3 = DVector::zeros(n);
            self.k4 = DVector::zeros(n);
            self.k5 = DVector::zeros(n);
            self.k6 = DVector::zeros(n);
            self.k7 = DVector::zeros(n);
            self.x_tmp = DVector::zeros(n);
            self.x_new = DVector::zeros(n);
        }
        let h = *dt;
        let k1 = &*dxdt;

        self.x_tmp.copy_from(x);
        self.x_tmp.axpy(h * A21, k1, 1.0);
        rhs(*t + C2 * h, &self.x_tmp, &mut self.k2)?;

        self.x_tmp.copy_from(x);
        self.x_tmp.axpy(h * A31, k1, 1.0);
        self.x_tmp.axpy(h * A32, &self.k2, 1.0);
        rhs(*t + C3 * h, &self.x_tmp, &mut self.k3)?;

        self.x_tmp.copy_from(x);
        self.x_tmp.axpy(h * A41, k1, 1.0);
        self.x_tmp.axpy(h * A42, &self.k2, 1.0);
        self.x_tmp.axpy(h * A43, &self.k3, 1.0);
        rhs(*t + C4 * h, &self.x_tmp, &mut self.k4)?;

        self.x_tmp.copy_from(x);
        self.x_tmp.axpy(h * A51, k1, 1.0);
        self.x_tmp.axpy(h * A52, &self.k2, 1.0);
        self.x_tmp.axpy(h * A53, &self.k3, 1.0);
        self.x_tmp.axpy(h * A54, &self.k4, 1.0);
        rhs(*t + C5 * h, &self.x_tmp, &mut self.k5)?;

        self.x_tmp.copy_from(x);
        self.x_tmp.axpy(h * A61, k1, 1.0);
        self.x_tmp.axpy(h * A62, &self.k2, 1.0);
        self.x_tmp.axpy(h * A63, &self.k3, 1.0);
        self.x_tmp.axpy(h * A64, &self.k4, 1.0);
        self.x_tmp.axpy(h * A65, &self.k5, 1.0);
        rhs(*t + h, &self.x_tmp, &mut self.k6)?;

        self.x_new.copy_from(x);
        self.x_new.axpy(h * B1, k1, 1.0);
        self.x_new.axpy(h * B3, &self.k3, 1.0);
        self.x_new.axpy(h * B4, &self.k4, 1.0);
        self.x_new.axpy(h * B5, &self.k5, 1.0);
        self.x_new.axpy(h * B6, &self.k6, 1.0);

        // FSAL stage, also the error estimate's last term.
        rhs(*t + h, &self.x_new, &mut self.k7)?;

        let mut err_sq = 0.0;
        for i in 0..n {
            let err_i = h
                * (E1 * k1[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]
                    + E7 * self.k7[i]);
            let scale = self.tol_abs + self.tol_rel * x[i].abs().max(self.x_new[i].abs());
            err_sq += (err_i / scale) * (err_i / scale);
        }
        #[allow(clippy::cast_precision_loss)]
        let err_norm = (err_sq / n as f64).sqrt();

        if err_norm <= 1.0 {
            x.copy_from(&self.x_new);
            dxdt.copy_from(&self.k7);
            *t += h;
            let factor = if err_norm < 1e-10 {
                GROW_MAX
            } else {
                (SAFETY * err_norm.powf(-0.2)).clamp(SHRINK_MIN, GROW_MAX)
            };
            *dt = h * factor;
            Ok(StepOutcome::Accepted)
        } else {
            *dt = h * (SAFETY * err_norm.powf(-0.2)).max(SHRINK_MIN);
            Ok(StepOutcome::Rejected)
        }
    }
}

/// Counter tripping a fatal error on too many consecutive rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepFailChecker {
    failures: u32,
}

impl StepFailChecker {
    /// Clear the streak after an accepted step.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Record a rejection at time `t`; errors out past the limit.
    pub fn record(&mut self, t: f64) -> Result<()> {
        self.failures += 1;
        if self.failures >= MAX_CONSECUTIVE_REJECTIONS {
            tracing::warn!("adaptive stepper stalled at t = {t}");
            return Err(SimError::StepperFailed {
                t,
                rejections: self.failures,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Integrate dx/dt = f from 0 to t_end, splitting at t_end.
    fn integrate_to<F>(mut rhs: F, x0: DVector<f64>, t_end: f64) -> DVector<f64>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
    {
        let mut stepper = ControlledStepper::new(1e-8, 1e-8);
        let mut x = x0;
        let mut dxdt = x.clone_owned();
        rhs(0.0, &x, &mut dxdt).unwrap();
        let mut t = 0.0;
        let mut dt: f64 = 1e-3;
        while t < t_end - 1e-12 {
            let mut h = dt.min(t_end - t);
            match stepper
                .try_step(&mut rhs, &mut x, &mut dxdt, &mut t, &mut h)
                .unwrap()
            {
                StepOutcome::Accepted => dt = dt.max(h),
                StepOutcome::Rejected => dt = h,
            }
        }
        x
    }

    #[test]
    fn test_exponential_decay_accuracy() {
        let rhs = |_t: f64, x: &DVector<f64>, out: &mut DVector<f64>| {
            out[0] = -x[0];
            Ok(())
        };
        let x = integrate_to(rhs, DVector::from_element(1, 1.0), 2.0);
        assert_relative_eq!(x[0], (-2.0f64).exp(), epsilon = 1e-7);
    }

    #[test]
    fn test_harmonic_oscillator_period() {
        // x'' = -x: one full period returns to the start.
        let rhs = |_t: f64, x: &DVector<f64>, out: &mut DVector<f64>| {
            out[0] = x[1];
            out[1] = -x[0];
            Ok(())
        };
        let x = integrate_to(rhs, DVector::from_vec(vec![1.0, 0.0]), 2.0 * std::f64::consts::PI);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fsal_derivative_matches_new_state() {
        let mut rhs = |t: f64, x: &DVector<f64>, out: &mut DVector<f64>| {
            out[0] = t - x[0];
            Ok(())
        };
        let mut stepper = ControlledStepper::new(1e-6, 1e-6);
        let mut x = DVector::from_element(1, 0.3);
        let mut dxdt = DVector::zeros(1);
        rhs(0.0, &x, &mut dxdt).unwrap();
        let mut t = 0.0;
        let mut dt = 0.01;
        loop {
            if stepper
                .try_step(&mut rhs, &mut x, &mut dxdt, &mut t, &mut dt)
                .unwrap()
                == StepOutcome::Accepted
            {
                break;
            }
        }
        assert!(t > 0.0);
        assert_relative_eq!(dxdt[0], t - x[0], epsilon = 1e-14);
    }

    #[test]
    fn test_rejection_shrinks_step() {
        // A sharp kink at x = 1 forces rejection of large steps.
        let mut rhs = |_t: f64, x: &DVector<f64>, out: &mut DVector<f64>| {
            out[0] = if x[0] < 1.0 { 1.0 } else { -1000.0 * (x[0] - 1.0) };
            Ok(())
        };
        let mut stepper = ControlledStepper::new(1e-10, 1e-10);
        let mut x = DVector::from_element(1, 0.999);
        let mut dxdt = DVector::zeros(1);
        rhs(0.0, &x, &mut dxdt).unwrap();
        let mut t = 0.0;
        let mut dt = 0.5;
        let outcome = stepper
            .try_step(&mut rhs, &mut x, &mut dxdt, &mut t, &mut dt)
            .unwrap();
        assert_eq!(outcome, StepOutcome::Rejected);
        assert!(dt < 0.5);
        assert_relative_eq!(t, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_rhs_error_propagates() {
        let mut rhs = |_t: f64, _x: &DVector<f64>, _out: &mut DVector<f64>| -> Result<()> {
            Err(SimError::generic("controller blew up"))
        };
        let mut stepper = ControlledStepper::new(1e-6, 1e-6);
        let mut x = DVector::from_element(1, 1.0);
        let mut dxdt = DVector::zeros(1);
        let mut t = 0.0;
        let mut dt = 0.1;
        assert!(stepper
            .try_step(&mut rhs, &mut x, &mut dxdt, &mut t, &mut dt)
            .is_err());
    }

    #[test]
    fn test_fail_checker_trips() {
        let mut checker = StepFailChecker::default();
        for _ in 0..MAX_CONSECUTIVE_REJECTIONS - 1 {
            checker.record(0.1).unwrap();
        }
        assert!(matches!(
            checker.record(0.1),
            Err(SimError::StepperFailed { .. })
        ));

        let mut checker = StepFailChecker::default();
        checker.record(0.1).unwrap();
        checker.reset();
        checker.record(0.1).unwrap();
    }
}
