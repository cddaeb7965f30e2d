// ─────────────────────────────────────────────────────────────────────
// DevDyn Hamiltonian Process Dynamics — Errors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DynError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Numerical divergence at t={time}: {reason}")]
    NumericalDivergence {
        /// Last time the integrator reached with a finite state.
        time: f64,
        /// State at `time`, laid out `[q.., p..]`.
        last_state: Vec<f64>,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DynError {
    pub fn divergence(time: f64, last_state: &[f64], reason: impl Into<String>) -> Self {
        DynError::NumericalDivergence {
            time,
            last_state: last_state.to_vec(),
            reason: reason.into(),
        }
    }
}

pub type DynResult<T> = Result<T, DynError>;
