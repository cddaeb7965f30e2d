//! Fixed-step integration for separable Hamiltonians `H(q, p) = T(p) + V(q)`.
//!
//! Velocity-Verlet keeps the energy error bounded over long horizons; RK4 is
//! kept as a non-symplectic reference stepper for regression comparison.

use devdyn_types::error::{DynError, DynResult};
use devdyn_types::state::SolverStats;

/// Canonical phase-space state with `n` coordinates and `n` momenta.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalState {
    pub q: Vec<f64>,
    pub p: Vec<f64>,
}

impl CanonicalState {
    /// Split a packed `[q.., p..]` vector.
    pub fn from_packed(state: &[f64]) -> Self {
        let n = state.len() / 2;
        CanonicalState {
            q: state[..n].to_vec(),
            p: state[n..2 * n].to_vec(),
        }
    }

    pub fn packed(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.q.len() + self.p.len());
        out.extend_from_slice(&self.q);
        out.extend_from_slice(&self.p);
        out
    }

    pub fn is_finite(&self) -> bool {
        self.q.iter().chain(&self.p).all(|v| v.is_finite())
    }
}

/// Separable Hamiltonian contract in canonical coordinates.
pub trait SeparableHamiltonian {
    /// Number of coordinates `n`.
    fn dimension(&self) -> usize;
    /// ∂H/∂p = ∂T/∂p, written into `out`.
    fn velocity(&self, p: &[f64], out: &mut [f64]);
    /// ∂H/∂q = ∂V/∂q, written into `out`.
    fn potential_gradient(&self, q: &[f64], out: &mut [f64]);
    /// Hamiltonian energy `H(q, p)`.
    fn hamiltonian(&self, q: &[f64], p: &[f64]) -> f64;
}

/// Fixed-step scheme selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedStepMethod {
    VelocityVerlet,
    Rk4,
}

/// Perform one velocity-Verlet (kick-drift-kick) step.
pub fn velocity_verlet_step<S: SeparableHamiltonian>(
    state: &mut CanonicalState,
    system: &S,
    dt: f64,
) {
    if !dt.is_finite() || dt == 0.0 {
        return;
    }
    let n = state.q.len();
    let mut grad = vec![0.0; n];
    let mut vel = vec![0.0; n];

    system.potential_gradient(&state.q, &mut grad);
    for i in 0..n {
        state.p[i] -= 0.5 * dt * grad[i];
    }
    system.velocity(&state.p, &mut vel);
    for i in 0..n {
        state.q[i] += dt * vel[i];
    }
    system.potential_gradient(&state.q, &mut grad);
    for i in 0..n {
        state.p[i] -= 0.5 * dt * grad[i];
    }
}

/// Perform one RK4 step on canonical equations:
/// `q_dot = ∂H/∂p`, `p_dot = -∂H/∂q`.
pub fn rk4_canonical_step<S: SeparableHamiltonian>(
    state: &mut CanonicalState,
    system: &S,
    dt: f64,
) {
    if !dt.is_finite() || dt == 0.0 {
        return;
    }
    let n = state.q.len();
    let f = |q: &[f64], p: &[f64]| -> (Vec<f64>, Vec<f64>) {
        let mut dq = vec![0.0; n];
        let mut dp = vec![0.0; n];
        system.velocity(p, &mut dq);
        system.potential_gradient(q, &mut dp);
        dp.iter_mut().for_each(|v| *v = -*v);
        (dq, dp)
    };
    let offset = |base: &[f64], k: &[f64], scale: f64| -> Vec<f64> {
        base.iter().zip(k).map(|(b, d)| b + scale * d).collect()
    };

    let (k1q, k1p) = f(&state.q, &state.p);
    let (k2q, k2p) = f(
        &offset(&state.q, &k1q, 0.5 * dt),
        &offset(&state.p, &k1p, 0.5 * dt),
    );
    let (k3q, k3p) = f(
        &offset(&state.q, &k2q, 0.5 * dt),
        &offset(&state.p, &k2p, 0.5 * dt),
    );
    let (k4q, k4p) = f(&offset(&state.q, &k3q, dt), &offset(&state.p, &k3p, dt));

    for i in 0..n {
        state.q[i] += dt * (k1q[i] + 2.0 * k2q[i] + 2.0 * k3q[i] + k4q[i]) / 6.0;
        state.p[i] += dt * (k1p[i] + 2.0 * k2p[i] + 2.0 * k3p[i] + k4p[i]) / 6.0;
    }
}

/// Sample a packed `[q.., p..]` trajectory at `times`, taking `substeps`
/// equal steps across each grid interval.
///
/// Returns the samples row-major with the first row equal to `initial`.
pub fn integrate_fixed_to_grid<S: SeparableHamiltonian>(
    method: FixedStepMethod,
    system: &S,
    initial: &[f64],
    times: &[f64],
    substeps: usize,
) -> DynResult<(Vec<f64>, SolverStats)> {
    let n = system.dimension();
    if initial.len() != 2 * n {
        return Err(DynError::InvalidState(format!(
            "initial state has {} entries, system expects {}",
            initial.len(),
            2 * n
        )));
    }
    if times.is_empty() {
        return Err(DynError::InvalidState(
            "output grid requires at least one time".to_string(),
        ));
    }
    let substeps = substeps.max(1);

    let mut out = Vec::with_capacity(times.len() * 2 * n);
    out.extend_from_slice(initial);
    let mut stats = SolverStats::default();
    let mut state = CanonicalState::from_packed(initial);
    let evals_per_step = match method {
        FixedStepMethod::VelocityVerlet => 2,
        FixedStepMethod::Rk4 => 4,
    };

    for w in times.windows(2) {
        let dt = (w[1] - w[0]) / substeps as f64;
        for s in 0..substeps {
            let before = state.clone();
            match method {
                FixedStepMethod::VelocityVerlet => velocity_verlet_step(&mut state, system, dt),
                FixedStepMethod::Rk4 => rk4_canonical_step(&mut state, system, dt),
            }
            stats.accepted_steps += 1;
            stats.fn_evals += evals_per_step;
            if !state.is_finite() {
                let t = w[0] + dt * s as f64;
                log::warn!("{method:?} produced non-finite state after t={t}");
                return Err(DynError::divergence(
                    t,
                    &before.packed(),
                    format!("{method:?} step produced non-finite values"),
                ));
            }
        }
        out.extend_from_slice(&state.q);
        out.extend_from_slice(&state.p);
    }
    Ok((out, stats))
}
