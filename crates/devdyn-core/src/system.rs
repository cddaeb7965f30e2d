// ─────────────────────────────────────────────────────────────────────
// DevDyn Hamiltonian Process Dynamics — Hamiltonian System
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Quadratic Hamiltonian model of coupled process metrics.
//!
//! H(q, p) = Σ c_i p_i² + ½ qᵀ K q
//!
//! with per-coordinate kinetic weights `c_i` and a symmetric coupling
//! matrix `K`. State vectors are packed `[q_1..q_n, p_1..p_n]`.

use devdyn_math::ode::OdeSystem;
use devdyn_math::symplectic::SeparableHamiltonian;
use devdyn_types::config::ModelConfig;
use devdyn_types::error::{DynError, DynResult};
use ndarray::{Array1, Array2, ArrayView1};

/// Largest |K[i][j] - K[j][i]| accepted without symmetrizing.
const SYMMETRY_TOL: f64 = 1e-12;

/// Builds a symmetric coupling matrix from diagonal stiffness and
/// pairwise coupling terms.
#[derive(Debug, Clone)]
pub struct CouplingBuilder {
    k: Array2<f64>,
}

impl CouplingBuilder {
    pub fn new(n: usize) -> Self {
        CouplingBuilder {
            k: Array2::zeros((n, n)),
        }
    }

    /// Set the diagonal entry `K[i][i]`.
    pub fn stiffness(mut self, i: usize, k: f64) -> Self {
        self.k[[i, i]] = k;
        self
    }

    /// Set `K[i][j]` and `K[j][i]`, the coefficient of `q_i q_j` in V.
    pub fn couple(mut self, i: usize, j: usize, k: f64) -> Self {
        self.k[[i, j]] = k;
        self.k[[j, i]] = k;
        self
    }

    pub fn build(self) -> Array2<f64> {
        self.k
    }
}

/// Autonomous Hamiltonian system with quadratic kinetic and potential terms.
#[derive(Debug, Clone, PartialEq)]
pub struct HamiltonianSystem {
    n: usize,
    coupling: Array2<f64>,
    kinetic_weights: Array1<f64>,
}

impl HamiltonianSystem {
    /// Validate shapes and finiteness, symmetrizing `coupling` if needed.
    pub fn new(kinetic_weights: Array1<f64>, coupling: Array2<f64>) -> DynResult<Self> {
        let n = kinetic_weights.len();
        if n == 0 {
            return Err(DynError::InvalidState(
                "Hamiltonian system requires at least one coordinate".to_string(),
            ));
        }
        if coupling.dim() != (n, n) {
            return Err(DynError::InvalidState(format!(
                "coupling matrix must be {n}x{n} to match kinetic weights, got {:?}",
                coupling.dim()
            )));
        }
        if !kinetic_weights.iter().all(|v| v.is_finite()) {
            return Err(DynError::InvalidState(
                "kinetic weights contain non-finite values".to_string(),
            ));
        }
        if !coupling.iter().all(|v| v.is_finite()) {
            return Err(DynError::InvalidState(
                "coupling matrix contains non-finite values".to_string(),
            ));
        }

        let asymmetry = (&coupling - &coupling.t())
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        let coupling = if asymmetry > SYMMETRY_TOL {
            log::warn!(
                "coupling matrix is asymmetric (max |K - Kᵀ| = {asymmetry:e}); using (K + Kᵀ)/2"
            );
            (&coupling + &coupling.t()) * 0.5
        } else {
            coupling
        };

        Ok(HamiltonianSystem {
            n,
            coupling,
            kinetic_weights,
        })
    }

    /// Build from plain slices, e.g. deserialized configuration rows.
    pub fn from_rows(kinetic_weights: &[f64], coupling: &[Vec<f64>]) -> DynResult<Self> {
        let n = kinetic_weights.len();
        if coupling.len() != n || coupling.iter().any(|row| row.len() != n) {
            return Err(DynError::InvalidState(format!(
                "coupling rows must form a {n}x{n} matrix"
            )));
        }
        let flat: Vec<f64> = coupling.iter().flatten().copied().collect();
        let k = Array2::from_shape_vec((n, n), flat)
            .map_err(|e| DynError::InvalidState(format!("coupling matrix: {e}")))?;
        Self::new(Array1::from(kinetic_weights.to_vec()), k)
    }

    pub fn from_config(config: &ModelConfig) -> DynResult<Self> {
        Self::from_rows(&config.kinetic_weights, &config.coupling)
    }

    /// Number of generalized coordinates `n`.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Length of a packed state vector, `2n`.
    pub fn state_len(&self) -> usize {
        2 * self.n
    }

    /// Effective (symmetric) coupling matrix.
    pub fn coupling(&self) -> &Array2<f64> {
        &self.coupling
    }

    pub fn kinetic_weights(&self) -> ArrayView1<'_, f64> {
        self.kinetic_weights.view()
    }

    fn check_state(&self, state: &[f64]) -> DynResult<()> {
        if state.len() != self.state_len() {
            return Err(DynError::InvalidState(format!(
                "state vector has {} entries, expected {} for n={}",
                state.len(),
                self.state_len(),
                self.n
            )));
        }
        Ok(())
    }

    /// Hamilton's equations: `q_dot = ∂H/∂p`, `p_dot = -∂H/∂q`.
    ///
    /// The model is autonomous; `t` exists for integrator uniformity.
    pub fn derivative(&self, state: &[f64], t: f64) -> DynResult<Array1<f64>> {
        self.check_state(state)?;
        let mut out = Array1::zeros(self.state_len());
        if let Some(dst) = out.as_slice_mut() {
            self.rhs(t, state, dst);
        }
        Ok(out)
    }

    /// T(p) = Σ c_i p_i²
    pub fn kinetic_energy(&self, p: &[f64]) -> f64 {
        self.kinetic_weights
            .iter()
            .zip(p)
            .map(|(c, pi)| c * pi * pi)
            .sum()
    }

    /// V(q) = ½ Σ K_ii q_i² + Σ_{i<j} K_ij q_i q_j
    pub fn potential_energy(&self, q: &[f64]) -> f64 {
        let mut v = 0.0;
        for i in 0..self.n {
            v += 0.5 * self.coupling[[i, i]] * q[i] * q[i];
            for j in (i + 1)..self.n {
                v += self.coupling[[i, j]] * q[i] * q[j];
            }
        }
        v
    }

    /// Total energy of a packed state.
    pub fn hamiltonian(&self, state: &[f64]) -> DynResult<f64> {
        self.check_state(state)?;
        let (q, p) = state.split_at(self.n);
        Ok(self.kinetic_energy(p) + self.potential_energy(q))
    }

    /// Angular frequency of coordinate `i` when it is uncoupled:
    /// `q_i'' = -2 c_i K_ii q_i`.
    pub fn angular_frequency(&self, i: usize) -> f64 {
        (2.0 * self.kinetic_weights[i] * self.coupling[[i, i]]).sqrt()
    }
}

impl OdeSystem for HamiltonianSystem {
    fn dimension(&self) -> usize {
        self.state_len()
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let n = self.n;
        let (q, p) = y.split_at(n);
        let (q_dot, p_dot) = dydt.split_at_mut(n);
        self.velocity(p, q_dot);
        self.potential_gradient(q, p_dot);
        p_dot.iter_mut().for_each(|v| *v = -*v);
    }
}

impl SeparableHamiltonian for HamiltonianSystem {
    fn dimension(&self) -> usize {
        self.n
    }

    fn velocity(&self, p: &[f64], out: &mut [f64]) {
        for i in 0..self.n {
            out[i] = 2.0 * self.kinetic_weights[i] * p[i];
        }
    }

    fn potential_gradient(&self, q: &[f64], out: &mut [f64]) {
        for i in 0..self.n {
            out[i] = (0..self.n).map(|j| self.coupling[[i, j]] * q[j]).sum();
        }
    }

    fn hamiltonian(&self, q: &[f64], p: &[f64]) -> f64 {
        self.kinetic_energy(p) + self.potential_energy(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn features_vs_bugs() -> HamiltonianSystem {
        HamiltonianSystem::new(array![0.5, 1.0 / 3.0], array![[1.0, 0.5], [0.5, 2.0]]).unwrap()
    }

    #[test]
    fn test_derivative_matches_hand_written_equations() {
        let sys = features_vs_bugs();
        let (q1, q2, p1, p2) = (5.0, 2.0, 1.0, 0.75);
        let d = sys.derivative(&[q1, q2, p1, p2], 0.0).unwrap();
        assert!((d[0] - p1).abs() < 1e-15);
        assert!((d[1] - (2.0 / 3.0) * p2).abs() < 1e-15);
        assert!((d[2] - (-q1 - 0.5 * q2)).abs() < 1e-15);
        assert!((d[3] - (-2.0 * q2 - 0.5 * q1)).abs() < 1e-15);
    }

    #[test]
    fn test_derivative_is_autonomous() {
        let sys = features_vs_bugs();
        let s = [1.0, -2.0, 0.3, 4.0];
        assert_eq!(
            sys.derivative(&s, 0.0).unwrap(),
            sys.derivative(&s, 123.4).unwrap()
        );
    }

    #[test]
    fn test_derivative_rejects_wrong_length() {
        let sys = features_vs_bugs();
        for bad in [&[1.0, 2.0, 3.0][..], &[1.0, 2.0, 3.0, 4.0, 5.0][..], &[][..]] {
            assert!(matches!(
                sys.derivative(bad, 0.0),
                Err(DynError::InvalidState(_))
            ));
        }
        assert!(sys.hamiltonian(&[1.0]).is_err());
    }

    #[test]
    fn test_energy_terms() {
        let sys = features_vs_bugs();
        // H = 0.5 p1² + (1/3) p2² + 0.5 q1² + q2² + 0.5 q1 q2
        let (q1, q2, p1, p2) = (5.0, 2.0, 1.0, 0.75);
        let t = sys.kinetic_energy(&[p1, p2]);
        let v = sys.potential_energy(&[q1, q2]);
        assert!((t - (0.5 * p1 * p1 + p2 * p2 / 3.0)).abs() < 1e-12);
        assert!((v - (0.5 * q1 * q1 + q2 * q2 + 0.5 * q1 * q2)).abs() < 1e-12);
        assert!((sys.hamiltonian(&[q1, q2, p1, p2]).unwrap() - (t + v)).abs() < 1e-12);
    }

    #[test]
    fn test_force_is_negative_potential_gradient() {
        let sys = HamiltonianSystem::new(
            array![0.5, 0.5, 0.5],
            CouplingBuilder::new(3)
                .stiffness(0, 1.0)
                .stiffness(1, 3.0)
                .stiffness(2, 2.0)
                .couple(0, 2, 0.4)
                .couple(1, 2, -0.3)
                .build(),
        )
        .unwrap();
        let q = [0.7, -1.1, 2.3];
        let d = sys.derivative(&[q[0], q[1], q[2], 0.0, 0.0, 0.0], 0.0).unwrap();
        let eps = 1e-6;
        for i in 0..3 {
            let mut plus = q;
            let mut minus = q;
            plus[i] += eps;
            minus[i] -= eps;
            let grad = (sys.potential_energy(&plus) - sys.potential_energy(&minus)) / (2.0 * eps);
            assert!((d[3 + i] + grad).abs() < 1e-8, "coordinate {i}");
        }
    }

    #[test]
    fn test_asymmetric_coupling_is_symmetrized() {
        let sys =
            HamiltonianSystem::new(array![0.5, 0.5], array![[1.0, 0.75], [0.25, 2.0]]).unwrap();
        assert_eq!(sys.coupling()[[0, 1]], 0.5);
        assert_eq!(sys.coupling()[[1, 0]], 0.5);
        assert_eq!(sys.coupling()[[0, 0]], 1.0);
    }

    #[test]
    fn test_rejects_malformed_definitions() {
        assert!(HamiltonianSystem::new(array![], Array2::zeros((0, 0))).is_err());
        assert!(HamiltonianSystem::new(array![0.5, 0.5], Array2::zeros((2, 3))).is_err());
        assert!(HamiltonianSystem::new(array![0.5], Array2::zeros((2, 2))).is_err());
        assert!(HamiltonianSystem::new(array![f64::NAN], array![[1.0]]).is_err());
        assert!(HamiltonianSystem::new(array![0.5], array![[f64::INFINITY]]).is_err());
        assert!(HamiltonianSystem::from_rows(&[0.5, 0.5], &[vec![1.0, 0.0], vec![0.0]]).is_err());
    }

    #[test]
    fn test_builder_matches_rows() {
        let built = CouplingBuilder::new(2)
            .stiffness(0, 1.0)
            .stiffness(1, 2.0)
            .couple(0, 1, 0.25)
            .build();
        let rows = HamiltonianSystem::from_rows(&[0.5, 0.5], &[vec![1.0, 0.25], vec![0.25, 2.0]])
            .unwrap();
        assert_eq!(&built, rows.coupling());
    }

    #[test]
    fn test_angular_frequency_uses_kinetic_weight() {
        let sys = features_vs_bugs();
        assert!((sys.angular_frequency(0) - 1.0).abs() < 1e-15);
        assert!((sys.angular_frequency(1) - (4.0_f64 / 3.0).sqrt()).abs() < 1e-15);
    }
}
