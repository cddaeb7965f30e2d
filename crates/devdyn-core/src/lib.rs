//! Hamiltonian process-dynamics engine.
//!
//! Process metrics are generalized coordinates with conjugate momenta,
//! coupled through a quadratic potential. [`HamiltonianSystem`] holds the
//! model, [`TrajectorySolver`] integrates it over a time grid and derives
//! the kinetic, potential and Lagrangian series.

pub mod presets;
pub mod solver;
pub mod system;

pub use solver::{IntegrationJob, TrajectorySolver};
pub use system::{CouplingBuilder, HamiltonianSystem};
