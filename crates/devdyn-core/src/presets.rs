//! Named process-dynamics models with their reference initial conditions.
//!
//! Data only; rendering the resulting trajectories is left to consumers.

use crate::solver::TrajectorySolver;
use crate::system::{CouplingBuilder, HamiltonianSystem};
use devdyn_types::config::ModelConfig;
use devdyn_types::error::{DynError, DynResult};
use devdyn_types::state::{EnergySeries, TimeGrid, Trajectory};
use ndarray::array;

/// A model together with the state and grid it is run from.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    /// One label per coordinate.
    pub labels: Vec<String>,
    pub system: HamiltonianSystem,
    pub initial_state: Vec<f64>,
    pub grid: TimeGrid,
}

impl Scenario {
    pub fn new(
        name: &str,
        labels: &[&str],
        system: HamiltonianSystem,
        initial_state: Vec<f64>,
        grid: TimeGrid,
    ) -> DynResult<Self> {
        if labels.len() != system.dimension() {
            return Err(DynError::InvalidState(format!(
                "scenario '{name}': {} labels for n={}",
                labels.len(),
                system.dimension()
            )));
        }
        if initial_state.len() != system.state_len() {
            return Err(DynError::InvalidState(format!(
                "scenario '{name}': initial state has {} entries, expected {}",
                initial_state.len(),
                system.state_len()
            )));
        }
        Ok(Scenario {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            system,
            initial_state,
            grid,
        })
    }

    pub fn from_config(config: &ModelConfig) -> DynResult<Self> {
        config.validate()?;
        let system = HamiltonianSystem::from_config(config)?;
        let labels: Vec<String> = if config.labels.is_empty() {
            (1..=system.dimension()).map(|i| format!("q{i}")).collect()
        } else {
            config.labels.clone()
        };
        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        Self::new(
            &config.name,
            &label_refs,
            system,
            config.initial_state.clone(),
            config.time_grid()?,
        )
    }

    /// Integrate and derive the energy series in one call.
    pub fn run(&self, solver: &TrajectorySolver) -> DynResult<(Trajectory, EnergySeries)> {
        let trajectory = solver.integrate(&self.system, &self.initial_state, &self.grid)?;
        let energies = solver.energies(&self.system, &trajectory)?;
        log::debug!(
            "scenario '{}': relative energy drift {:e}",
            self.name,
            energies.max_relative_drift()
        );
        Ok((trajectory, energies))
    }
}

/// Features (q1) against bugs (q2) over ten weeks.
///
/// H = ½p1² + ⅓p2² + ½q1² + q2² + ½q1q2
pub fn features_vs_bugs() -> DynResult<Scenario> {
    let system = HamiltonianSystem::new(
        array![0.5, 1.0 / 3.0],
        CouplingBuilder::new(2)
            .stiffness(0, 1.0)
            .stiffness(1, 2.0)
            .couple(0, 1, 0.5)
            .build(),
    )?;
    Scenario::new(
        "features-vs-bugs",
        &["features", "bugs"],
        system,
        vec![5.0, 2.0, 1.0, 0.75],
        TimeGrid::linspace(0.0, 10.0, 100)?,
    )
}

/// Cumulative deployments (q1) against cumulative resolution time (q2)
/// over one week.
///
/// H = ½p1² + ½p2² + ½q1² + q2² + ¼q1q2
pub fn deployment_resolution() -> DynResult<Scenario> {
    let system = HamiltonianSystem::new(
        array![0.5, 0.5],
        CouplingBuilder::new(2)
            .stiffness(0, 1.0)
            .stiffness(1, 2.0)
            .couple(0, 1, 0.25)
            .build(),
    )?;
    Scenario::new(
        "deployment-resolution",
        &["deployments", "resolution_time"],
        system,
        vec![50.0, 100.0, 5.0, 20.0],
        TimeGrid::linspace(0.0, 1.0, 100)?,
    )
}

pub const PLATFORM_LABELS: [&str; 5] = [
    "deployments",
    "toil",
    "incidents",
    "resource_price",
    "downtime",
];

/// Five-metric platform model.
///
/// V = ½q1² + q2² + 2q3² + ½q4² + 5q5² + ½q1q2 + ¾q1q3 + ¼q3q5
pub fn platform_metrics_system() -> DynResult<HamiltonianSystem> {
    HamiltonianSystem::new(
        array![0.5, 0.5, 0.5, 0.5, 0.5],
        CouplingBuilder::new(5)
            .stiffness(0, 1.0)
            .stiffness(1, 2.0)
            .stiffness(2, 4.0)
            .stiffness(3, 1.0)
            .stiffness(4, 10.0)
            .couple(0, 1, 0.5)
            .couple(0, 2, 0.75)
            .couple(2, 4, 0.25)
            .build(),
    )
}

/// Healthy platform: automation pulls toil down, incidents trend negative.
pub fn positive_outcome() -> DynResult<Scenario> {
    Scenario::new(
        "positive-outcome",
        &PLATFORM_LABELS,
        platform_metrics_system()?,
        vec![50.0, 100.0, 2.0, 80.0, 5.0, 7.0, -5.0, -0.2, 8.0, 0.0],
        TimeGrid::linspace(0.0, 5.0, 100)?,
    )
}

/// Struggling platform: high toil, incidents and downtime, little automation.
pub fn negative_outcome() -> DynResult<Scenario> {
    Scenario::new(
        "negative-outcome",
        &PLATFORM_LABELS,
        platform_metrics_system()?,
        vec![50.0, 200.0, 5.0, 100.0, 10.0, 5.0, 20.0, 0.5, 10.0, 1.0],
        TimeGrid::linspace(0.0, 5.0, 100)?,
    )
}

/// Every preset, in a stable order.
pub fn all() -> DynResult<Vec<Scenario>> {
    Ok(vec![
        features_vs_bugs()?,
        deployment_resolution()?,
        positive_outcome()?,
        negative_outcome()?,
    ])
}
