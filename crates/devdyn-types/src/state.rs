// ─────────────────────────────────────────────────────────────────────
// DevDyn Hamiltonian Process Dynamics — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{DynError, DynResult};
use ndarray::{Array1, Array2, ArrayView1};

/// Strictly increasing sample times for a trajectory.
/// The first point is the integration epoch and need not be zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    points: Array1<f64>,
}

impl TimeGrid {
    /// Validated grid from explicit points.
    pub fn new(points: Vec<f64>) -> DynResult<Self> {
        if points.is_empty() {
            return Err(DynError::InvalidState(
                "time grid requires at least one point".to_string(),
            ));
        }
        if let Some(bad) = points.iter().position(|t| !t.is_finite()) {
            return Err(DynError::InvalidState(format!(
                "time grid point {bad} is not finite"
            )));
        }
        if let Some(k) = points.windows(2).position(|w| w[1] <= w[0]) {
            return Err(DynError::InvalidState(format!(
                "time grid must be strictly increasing: t[{}]={} >= t[{}]={}",
                k,
                points[k],
                k + 1,
                points[k + 1]
            )));
        }
        Ok(TimeGrid {
            points: Array1::from(points),
        })
    }

    /// `n` evenly spaced points on `[start, end]`, endpoint included.
    /// A single point yields `[start]`.
    pub fn linspace(start: f64, end: f64, n: usize) -> DynResult<Self> {
        if n == 0 {
            return Err(DynError::InvalidState(
                "linspace requires at least one point".to_string(),
            ));
        }
        if n == 1 {
            return Self::new(vec![start]);
        }
        let step = (end - start) / (n - 1) as f64;
        let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
        // Pin the endpoint against accumulated rounding.
        points[n - 1] = end;
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.points[0]
    }

    pub fn end(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    pub fn points(&self) -> ArrayView1<'_, f64> {
        self.points.view()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.points.as_slice().unwrap_or(&[])
    }
}

/// Work counters reported by an integration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub fn_evals: usize,
}

/// Sampled phase-space history, index aligned with the time grid.
/// Each row is one state `[q_1..q_n, p_1..p_n]`.
#[derive(Debug, Clone)]
pub struct Trajectory {
    times: Array1<f64>,
    states: Array2<f64>,
    stats: SolverStats,
}

impl Trajectory {
    pub fn new(times: Array1<f64>, states: Array2<f64>, stats: SolverStats) -> DynResult<Self> {
        if states.nrows() != times.len() {
            return Err(DynError::InvalidState(format!(
                "trajectory has {} states for {} sample times",
                states.nrows(),
                times.len()
            )));
        }
        if states.ncols() == 0 || states.ncols() % 2 != 0 {
            return Err(DynError::InvalidState(format!(
                "state width must be a positive even number, got {}",
                states.ncols()
            )));
        }
        Ok(Trajectory {
            times,
            states,
            stats,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Number of generalized coordinates `n`.
    pub fn dimension(&self) -> usize {
        self.states.ncols() / 2
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn states(&self) -> &Array2<f64> {
        &self.states
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Full state at sample `k`.
    pub fn state(&self, k: usize) -> ArrayView1<'_, f64> {
        self.states.row(k)
    }

    /// Coordinates `q` at sample `k`.
    pub fn coordinates(&self, k: usize) -> ArrayView1<'_, f64> {
        let n = self.dimension();
        self.states.slice(ndarray::s![k, ..n])
    }

    /// Momenta `p` at sample `k`.
    pub fn momenta(&self, k: usize) -> ArrayView1<'_, f64> {
        let n = self.dimension();
        self.states.slice(ndarray::s![k, n..])
    }

    /// Time series of coordinate `q_i`.
    pub fn coordinate_series(&self, i: usize) -> ArrayView1<'_, f64> {
        self.states.column(i)
    }

    /// Time series of momentum `p_i`.
    pub fn momentum_series(&self, i: usize) -> ArrayView1<'_, f64> {
        self.states.column(self.dimension() + i)
    }

    pub fn first(&self) -> ArrayView1<'_, f64> {
        self.state(0)
    }

    pub fn last(&self) -> ArrayView1<'_, f64> {
        self.state(self.len() - 1)
    }
}

/// Kinetic, potential and Lagrangian series derived from a trajectory.
#[derive(Debug, Clone)]
pub struct EnergySeries {
    pub times: Array1<f64>,
    pub kinetic: Array1<f64>,
    pub potential: Array1<f64>,
    /// L = T - V
    pub lagrangian: Array1<f64>,
}

impl EnergySeries {
    pub fn new(
        times: Array1<f64>,
        kinetic: Array1<f64>,
        potential: Array1<f64>,
    ) -> DynResult<Self> {
        if kinetic.len() != times.len() || potential.len() != times.len() {
            return Err(DynError::InvalidState(format!(
                "energy series length mismatch: times={}, kinetic={}, potential={}",
                times.len(),
                kinetic.len(),
                potential.len()
            )));
        }
        let lagrangian = &kinetic - &potential;
        Ok(EnergySeries {
            times,
            kinetic,
            potential,
            lagrangian,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Total energy H = T + V per sample.
    pub fn hamiltonian(&self) -> Array1<f64> {
        &self.kinetic + &self.potential
    }

    /// Largest |H(t) - H(t0)| over the series.
    pub fn max_abs_drift(&self) -> f64 {
        let h = self.hamiltonian();
        let Some(&h0) = h.first() else {
            return 0.0;
        };
        h.iter().map(|e| (e - h0).abs()).fold(0.0_f64, f64::max)
    }

    /// Largest drift relative to |H(t0)|. Falls back to the absolute drift
    /// when the initial energy is zero.
    pub fn max_relative_drift(&self) -> f64 {
        let drift = self.max_abs_drift();
        match self.kinetic.first().zip(self.potential.first()) {
            Some((t0, v0)) if (t0 + v0).abs() > f64::EPSILON => drift / (t0 + v0).abs(),
            _ => drift,
        }
    }
}
