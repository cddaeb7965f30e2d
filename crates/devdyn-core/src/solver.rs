// ─────────────────────────────────────────────────────────────────────
// DevDyn Hamiltonian Process Dynamics — Trajectory Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Trajectory integration and energy bookkeeping.

use crate::system::HamiltonianSystem;
use devdyn_math::ode::{DormandPrince, StepControl, Tolerances};
use devdyn_math::symplectic::{integrate_fixed_to_grid, FixedStepMethod};
use devdyn_types::config::{IntegratorKind, SolverConfig};
use devdyn_types::error::{DynError, DynResult};
use devdyn_types::state::{EnergySeries, TimeGrid, Trajectory};
use ndarray::{s, Array2, Axis};
use rayon::prelude::*;

/// One independent integration request for [`TrajectorySolver::integrate_batch`].
#[derive(Debug, Clone, Copy)]
pub struct IntegrationJob<'a> {
    pub system: &'a HamiltonianSystem,
    pub initial_state: &'a [f64],
    pub grid: &'a TimeGrid,
}

/// Integrates [`HamiltonianSystem`]s over caller-supplied time grids.
///
/// Holds only configuration; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct TrajectorySolver {
    config: SolverConfig,
}

impl TrajectorySolver {
    pub fn new(config: SolverConfig) -> DynResult<Self> {
        config.validate()?;
        Ok(TrajectorySolver { config })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn step_control(&self) -> StepControl {
        StepControl {
            tol: Tolerances::new(self.config.rtol, self.config.atol),
            max_steps: self.config.max_steps,
            min_step: self.config.min_step,
            initial_step: self.config.initial_step,
        }
    }

    /// Integrate from `initial_state` at `grid.start()` and sample at every
    /// grid point. Row 0 of the result is `initial_state` unchanged.
    pub fn integrate(
        &self,
        system: &HamiltonianSystem,
        initial_state: &[f64],
        grid: &TimeGrid,
    ) -> DynResult<Trajectory> {
        let width = system.state_len();
        if initial_state.len() != width {
            return Err(DynError::InvalidState(format!(
                "initial state has {} entries, system with n={} expects {width}",
                initial_state.len(),
                system.dimension()
            )));
        }
        if let Some(i) = initial_state.iter().position(|v| !v.is_finite()) {
            return Err(DynError::InvalidState(format!(
                "initial state entry {i} is not finite"
            )));
        }

        log::debug!(
            "integrating n={} over [{}, {}] ({} samples) with {:?}",
            system.dimension(),
            grid.start(),
            grid.end(),
            grid.len(),
            self.config.method
        );

        let times = grid.as_slice();
        let (flat, stats) = match self.config.method {
            IntegratorKind::DormandPrince => {
                let mut dp = DormandPrince::new(self.step_control());
                let flat = dp.integrate_to_grid(system, initial_state, times)?;
                (flat, dp.stats)
            }
            IntegratorKind::VelocityVerlet => integrate_fixed_to_grid(
                FixedStepMethod::VelocityVerlet,
                system,
                initial_state,
                times,
                self.config.fixed_substeps,
            )?,
            IntegratorKind::Rk4 => integrate_fixed_to_grid(
                FixedStepMethod::Rk4,
                system,
                initial_state,
                times,
                self.config.fixed_substeps,
            )?,
        };

        let states = Array2::from_shape_vec((grid.len(), width), flat)
            .map_err(|e| DynError::InvalidState(format!("trajectory shape: {e}")))?;
        log::debug!(
            "integration finished: {} accepted, {} rejected, {} evals",
            stats.accepted_steps,
            stats.rejected_steps,
            stats.fn_evals
        );
        Trajectory::new(grid.points().to_owned(), states, stats)
    }

    /// Integrate independent jobs in parallel. Results keep input order.
    pub fn integrate_batch(&self, jobs: &[IntegrationJob<'_>]) -> Vec<DynResult<Trajectory>> {
        jobs.par_iter()
            .map(|job| self.integrate(job.system, job.initial_state, job.grid))
            .collect()
    }

    /// Kinetic, potential and Lagrangian series along `trajectory`.
    pub fn energies(
        &self,
        system: &HamiltonianSystem,
        trajectory: &Trajectory,
    ) -> DynResult<EnergySeries> {
        let n = system.dimension();
        if trajectory.dimension() != n {
            return Err(DynError::InvalidState(format!(
                "trajectory has n={} coordinates, system has n={n}",
                trajectory.dimension()
            )));
        }
        let states = trajectory.states();
        let q = states.slice(s![.., ..n]);
        let p = states.slice(s![.., n..]);

        let kinetic = p.mapv(|v| v * v).dot(&system.kinetic_weights());
        let potential = (&q.dot(system.coupling()) * &q).sum_axis(Axis(1)) * 0.5;
        EnergySeries::new(trajectory.times().to_owned(), kinetic, potential)
    }
}
