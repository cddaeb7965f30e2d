//! Numerical integrators for DevDyn.

pub mod ode;
pub mod symplectic;
