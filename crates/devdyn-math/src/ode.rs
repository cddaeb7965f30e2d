//! Adaptive explicit Runge-Kutta integration.
//!
//! Dormand-Prince 5(4) with first-same-as-last stage reuse and elementary
//! error-per-step control. The integrator advances freely between output
//! times but shortens the step that would cross the next requested time so
//! every output is an accepted step endpoint, never an interpolant.

use devdyn_types::error::{DynError, DynResult};
use devdyn_types::state::SolverStats;

/// First-order system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Length of the state vector.
    fn dimension(&self) -> usize;
    /// Write `f(t, y)` into `dydt`. Both slices have length `dimension()`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Mixed relative/absolute local error tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub rtol: f64,
    pub atol: f64,
}

impl Tolerances {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Tolerances { rtol, atol }
    }
}

/// Step-size control settings for [`DormandPrince`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepControl {
    pub tol: Tolerances,
    /// Budget of step attempts (accepted + rejected) per call.
    pub max_steps: usize,
    pub min_step: f64,
    pub initial_step: Option<f64>,
}

impl Default for StepControl {
    fn default() -> Self {
        StepControl {
            tol: Tolerances::new(1e-10, 1e-10),
            max_steps: 100_000,
            min_step: 1e-12,
            initial_step: None,
        }
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

// Butcher tableau.
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
// Fifth-order weights, equal to row 7 of A.
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;
// Fifth minus embedded fourth order.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Dormand-Prince 5(4) integrator.
#[derive(Debug, Clone)]
pub struct DormandPrince {
    control: StepControl,
    /// Counters from the most recent call.
    pub stats: SolverStats,
}

struct Stages {
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
    err: Vec<f64>,
}

impl Stages {
    fn new(n: usize) -> Self {
        Stages {
            k: std::array::from_fn(|_| vec![0.0; n]),
            y_stage: vec![0.0; n],
            y_new: vec![0.0; n],
            err: vec![0.0; n],
        }
    }
}

impl DormandPrince {
    pub fn new(control: StepControl) -> Self {
        DormandPrince {
            control,
            stats: SolverStats::default(),
        }
    }

    /// Integrate from `(times[0], y0)` and sample at every entry of `times`.
    ///
    /// Returns the samples row-major, `times.len() * dimension` values, the
    /// first row being `y0` unchanged. `times` must be strictly increasing.
    pub fn integrate_to_grid<S: OdeSystem>(
        &mut self,
        system: &S,
        y0: &[f64],
        times: &[f64],
    ) -> DynResult<Vec<f64>> {
        let n = system.dimension();
        if y0.len() != n {
            return Err(DynError::InvalidState(format!(
                "initial state has {} entries, system expects {n}",
                y0.len()
            )));
        }
        let Some(&t0) = times.first() else {
            return Err(DynError::InvalidState(
                "output grid requires at least one time".to_string(),
            ));
        };

        self.stats = SolverStats::default();
        let mut out = Vec::with_capacity(times.len() * n);
        out.extend_from_slice(y0);
        if times.len() == 1 {
            return Ok(out);
        }

        let mut t = t0;
        let mut y = y0.to_vec();
        let mut st = Stages::new(n);
        system.rhs(t, &y, &mut st.k[0]);
        self.stats.fn_evals += 1;
        if !st.k[0].iter().all(|v| v.is_finite()) {
            return Err(DynError::divergence(
                t,
                &y,
                "derivative is not finite at the initial state",
            ));
        }

        let span = times[times.len() - 1] - t0;
        let mut h = match self.control.initial_step {
            Some(h0) => h0,
            None => self.initial_step(system, t, &y, &st.k[0]),
        }
        .min(span);
        let mut attempts = 0usize;

        for &target in &times[1..] {
            while t < target {
                if attempts >= self.control.max_steps {
                    log::warn!(
                        "Dormand-Prince step budget of {} exhausted at t={t}",
                        self.control.max_steps
                    );
                    return Err(DynError::divergence(
                        t,
                        &y,
                        format!(
                            "step budget of {} attempts exhausted before t={target}",
                            self.control.max_steps
                        ),
                    ));
                }
                attempts += 1;

                let remaining = target - t;
                let clamped = h >= remaining;
                let h_try = if clamped { remaining } else { h };
                // Steps shortened onto a closely spaced grid point are exempt.
                if !clamped && h_try < self.control.min_step {
                    log::warn!("Dormand-Prince step size collapsed at t={t}");
                    return Err(DynError::divergence(
                        t,
                        &y,
                        format!(
                            "step size {h_try:e} fell below minimum {:e}",
                            self.control.min_step
                        ),
                    ));
                }

                self.attempt(system, t, &y, h_try, &mut st);
                let err = self.error_norm(&y, &st.y_new, &st.err);

                if err.is_finite() && err <= 1.0 && st.y_new.iter().all(|v| v.is_finite()) {
                    t = if clamped { target } else { t + h_try };
                    std::mem::swap(&mut y, &mut st.y_new);
                    // FSAL: k7 at the accepted point is k1 of the next step.
                    st.k.swap(0, 6);
                    self.stats.accepted_steps += 1;

                    let factor = if err == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                    };
                    // Landing on a grid point must not shrink the working step.
                    h = if clamped {
                        h.max(h_try * factor)
                    } else {
                        h_try * factor
                    };
                } else {
                    self.stats.rejected_steps += 1;
                    let factor = if err.is_finite() {
                        (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                    } else {
                        MIN_FACTOR
                    };
                    h = h_try * factor;
                    log::trace!("rejected step at t={t}: err={err:e}, retry h={h:e}");
                }
            }
            out.extend_from_slice(&y);
        }

        log::debug!(
            "Dormand-Prince reached t={t}: {} accepted, {} rejected, {} evals",
            self.stats.accepted_steps,
            self.stats.rejected_steps,
            self.stats.fn_evals
        );
        Ok(out)
    }

    /// One trial step of size `h`. `st.k[0]` must hold `f(t, y)`.
    fn attempt<S: OdeSystem>(&mut self, system: &S, t: f64, y: &[f64], h: f64, st: &mut Stages) {
        let n = y.len();
        let Stages {
            k,
            y_stage,
            y_new,
            err,
        } = st;
        let [k1, k2, k3, k4, k5, k6, k7] = k;

        for i in 0..n {
            y_stage[i] = y[i] + h * A21 * k1[i];
        }
        system.rhs(t + C2 * h, &y_stage[..], &mut k2[..]);

        for i in 0..n {
            y_stage[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        system.rhs(t + C3 * h, &y_stage[..], &mut k3[..]);

        for i in 0..n {
            y_stage[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        system.rhs(t + C4 * h, &y_stage[..], &mut k4[..]);

        for i in 0..n {
            y_stage[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        system.rhs(t + C5 * h, &y_stage[..], &mut k5[..]);

        for i in 0..n {
            y_stage[i] = y[i]
                + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        system.rhs(t + h, &y_stage[..], &mut k6[..]);

        for i in 0..n {
            y_new[i] =
                y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
        }
        system.rhs(t + h, &y_new[..], &mut k7[..]);
        self.stats.fn_evals += 6;

        for i in 0..n {
            err[i] = h
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
        }
    }

    /// RMS of the error estimate scaled by the mixed tolerance.
    fn error_norm(&self, y: &[f64], y_new: &[f64], err: &[f64]) -> f64 {
        let Tolerances { rtol, atol } = self.control.tol;
        let sum: f64 = y
            .iter()
            .zip(y_new)
            .zip(err)
            .map(|((a, b), e)| {
                let sc = atol + rtol * a.abs().max(b.abs());
                (e / sc) * (e / sc)
            })
            .sum();
        (sum / y.len().max(1) as f64).sqrt()
    }

    /// Starting step from the size of the state, its derivative and a
    /// second-derivative probe (Hairer, Nørsett & Wanner, II.4).
    fn initial_step<S: OdeSystem>(&mut self, system: &S, t: f64, y: &[f64], f0: &[f64]) -> f64 {
        let Tolerances { rtol, atol } = self.control.tol;
        let n = y.len().max(1) as f64;
        let scale: Vec<f64> = y.iter().map(|v| atol + rtol * v.abs()).collect();
        let rms = |v: &[f64]| -> f64 {
            (v.iter()
                .zip(&scale)
                .map(|(x, s)| (x / s) * (x / s))
                .sum::<f64>()
                / n)
                .sqrt()
        };

        let d0 = rms(y);
        let d1 = rms(f0);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };

        let y1: Vec<f64> = y.iter().zip(f0).map(|(a, f)| a + h0 * f).collect();
        let mut f1 = vec![0.0; y.len()];
        system.rhs(t + h0, &y1, &mut f1);
        self.stats.fn_evals += 1;
        let diff: Vec<f64> = f1.iter().zip(f0).map(|(a, b)| a - b).collect();
        let d2 = rms(&diff) / h0;

        let dmax = d1.max(d2);
        let h1 = if !dmax.is_finite() || dmax <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / dmax).powf(0.2)
        };
        (100.0 * h0).min(h1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y' = -y
    struct Decay;

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }
        fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = -y[0];
        }
    }

    /// y' = y^2, blows up at t = 1/y0.
    struct BlowUp;

    impl OdeSystem for BlowUp {
        fn dimension(&self) -> usize {
            1
        }
        fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = y[0] * y[0];
        }
    }

    /// y' = t, exercises explicit time dependence.
    struct Ramp;

    impl OdeSystem for Ramp {
        fn dimension(&self) -> usize {
            1
        }
        fn rhs(&self, t: f64, _y: &[f64], dydt: &mut [f64]) {
            dydt[0] = t;
        }
    }

    #[test]
    fn test_exponential_decay_matches_closed_form() {
        let mut dp = DormandPrince::new(StepControl::default());
        let times: Vec<f64> = (0..=10).map(|i| i as f64 * 0.5).collect();
        let out = dp.integrate_to_grid(&Decay, &[2.0], &times).unwrap();
        assert_eq!(out.len(), times.len());
        for (y, t) in out.iter().zip(&times) {
            let exact = 2.0 * (-t).exp();
            assert!((y - exact).abs() < 1e-8, "t={t}: {y} vs {exact}");
        }
        assert!(dp.stats.accepted_steps > 0);
        assert!(dp.stats.fn_evals > 6 * dp.stats.accepted_steps);
    }

    #[test]
    fn test_first_sample_is_initial_state_exactly() {
        let mut dp = DormandPrince::new(StepControl::default());
        let out = dp.integrate_to_grid(&Decay, &[0.123456789], &[0.0, 1.0]).unwrap();
        assert_eq!(out[0], 0.123456789);
    }

    #[test]
    fn test_single_time_returns_initial_state_without_work() {
        let mut dp = DormandPrince::new(StepControl::default());
        let out = dp.integrate_to_grid(&Decay, &[4.0], &[7.0]).unwrap();
        assert_eq!(out, vec![4.0]);
        assert_eq!(dp.stats, SolverStats::default());
    }

    #[test]
    fn test_nonzero_epoch_uses_absolute_time() {
        let mut dp = DormandPrince::new(StepControl::default());
        // y(t) = y(2) + (t^2 - 4)/2
        let out = dp.integrate_to_grid(&Ramp, &[1.0], &[2.0, 3.0, 4.0]).unwrap();
        assert!((out[1] - 3.5).abs() < 1e-9);
        assert!((out[2] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch_is_invalid_state() {
        let mut dp = DormandPrince::new(StepControl::default());
        let result = dp.integrate_to_grid(&Decay, &[1.0, 2.0], &[0.0, 1.0]);
        assert!(matches!(result, Err(DynError::InvalidState(_))));
        let result = dp.integrate_to_grid(&Decay, &[1.0], &[]);
        assert!(matches!(result, Err(DynError::InvalidState(_))));
    }

    #[test]
    fn test_finite_time_blowup_reports_divergence() {
        let mut dp = DormandPrince::new(StepControl::default());
        let result = dp.integrate_to_grid(&BlowUp, &[1.0], &[0.0, 0.5, 2.0]);
        match result {
            Err(DynError::NumericalDivergence {
                time, last_state, ..
            }) => {
                assert!(time > 0.5 && time < 1.0, "diverged at t={time}");
                assert_eq!(last_state.len(), 1);
                assert!(last_state[0].is_finite());
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn test_step_budget_exhaustion_reports_divergence() {
        let control = StepControl {
            max_steps: 3,
            ..StepControl::default()
        };
        let mut dp = DormandPrince::new(control);
        let result = dp.integrate_to_grid(&Decay, &[1.0], &[0.0, 100.0]);
        match result {
            Err(DynError::NumericalDivergence { reason, .. }) => {
                assert!(reason.contains("budget"), "{reason}");
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn test_grid_spacing_below_min_step_is_not_divergence() {
        let mut dp = DormandPrince::new(StepControl::default());
        let out = dp.integrate_to_grid(&Decay, &[2.0], &[0.0, 5e-13]).unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[1] - 2.0 * (-5e-13_f64).exp()).abs() < 1e-15);
        assert_eq!(dp.stats.accepted_steps, 1);
    }

    #[test]
    fn test_close_grid_points_inside_long_run() {
        let mut dp = DormandPrince::new(StepControl::default());
        let times = [0.0, 1.0, 1.0 + 5e-13, 3.0];
        let out = dp.integrate_to_grid(&Decay, &[1.0], &times).unwrap();
        assert_eq!(out.len(), times.len());
        for (y, t) in out.iter().zip(&times) {
            assert!((y - (-t).exp()).abs() < 1e-8, "t={t}: {y}");
        }
    }
}
