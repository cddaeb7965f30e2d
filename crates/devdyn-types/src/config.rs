// ─────────────────────────────────────────────────────────────────────
// DevDyn Hamiltonian Process Dynamics — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{DynError, DynResult};
use crate::state::TimeGrid;
use serde::{Deserialize, Serialize};

/// Complete model definition: coupling structure, initial condition,
/// sampling grid and solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Human-readable coordinate names, e.g. "features", "bugs".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Coefficient of p_i^2 in the kinetic energy.
    pub kinetic_weights: Vec<f64>,
    /// Coupling matrix K, row-major.
    pub coupling: Vec<Vec<f64>>,
    /// `[q_1..q_n, p_1..p_n]`
    pub initial_state: Vec<f64>,
    pub time_grid: TimeGridConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGridConfig {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    /// Adaptive Dormand-Prince 5(4).
    #[default]
    DormandPrince,
    /// Fixed-step symplectic velocity-Verlet.
    VelocityVerlet,
    /// Fixed-step classical RK4.
    Rk4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub method: IntegratorKind,
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
    /// Budget of step attempts (accepted + rejected) per integration.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Adaptive step size below which the run is declared divergent.
    #[serde(default = "default_min_step")]
    pub min_step: f64,
    /// First trial step; estimated from the initial derivative when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_step: Option<f64>,
    /// Equal substeps per grid interval for the fixed-step methods.
    #[serde(default = "default_fixed_substeps")]
    pub fixed_substeps: usize,
}

fn default_rtol() -> f64 {
    1e-10
}
fn default_atol() -> f64 {
    1e-10
}
fn default_max_steps() -> usize {
    100_000
}
fn default_min_step() -> f64 {
    1e-12
}
fn default_fixed_substeps() -> usize {
    20
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: IntegratorKind::default(),
            rtol: default_rtol(),
            atol: default_atol(),
            max_steps: default_max_steps(),
            min_step: default_min_step(),
            initial_step: None,
            fixed_substeps: default_fixed_substeps(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> DynResult<()> {
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(DynError::ConfigError(format!(
                "rtol must be finite and > 0, got {}",
                self.rtol
            )));
        }
        if !(self.atol.is_finite() && self.atol > 0.0) {
            return Err(DynError::ConfigError(format!(
                "atol must be finite and > 0, got {}",
                self.atol
            )));
        }
        if self.max_steps == 0 {
            return Err(DynError::ConfigError(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if !(self.min_step.is_finite() && self.min_step > 0.0) {
            return Err(DynError::ConfigError(format!(
                "min_step must be finite and > 0, got {}",
                self.min_step
            )));
        }
        if let Some(h) = self.initial_step {
            if !(h.is_finite() && h > 0.0) {
                return Err(DynError::ConfigError(format!(
                    "initial_step must be finite and > 0, got {h}"
                )));
            }
        }
        if self.fixed_substeps == 0 {
            return Err(DynError::ConfigError(
                "fixed_substeps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl ModelConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> DynResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> DynResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of generalized coordinates.
    pub fn dimension(&self) -> usize {
        self.kinetic_weights.len()
    }

    /// Shape checks only; physical validity is left to the model.
    pub fn validate(&self) -> DynResult<()> {
        let n = self.dimension();
        if n == 0 {
            return Err(DynError::ConfigError(format!(
                "model '{}' has no coordinates",
                self.name
            )));
        }
        if self.coupling.len() != n || self.coupling.iter().any(|row| row.len() != n) {
            return Err(DynError::ConfigError(format!(
                "model '{}': coupling must be {n}x{n}",
                self.name
            )));
        }
        if self.initial_state.len() != 2 * n {
            return Err(DynError::ConfigError(format!(
                "model '{}': initial_state has {} entries, expected {}",
                self.name,
                self.initial_state.len(),
                2 * n
            )));
        }
        if !self.labels.is_empty() && self.labels.len() != n {
            return Err(DynError::ConfigError(format!(
                "model '{}': {} labels for {n} coordinates",
                self.name,
                self.labels.len()
            )));
        }
        if self.time_grid.points == 0 {
            return Err(DynError::ConfigError(format!(
                "model '{}': time grid needs at least one point",
                self.name
            )));
        }
        self.solver.validate()
    }

    pub fn time_grid(&self) -> DynResult<TimeGrid> {
        TimeGrid::linspace(
            self.time_grid.start,
            self.time_grid.end,
            self.time_grid.points,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// CARGO_MANIFEST_DIR is crates/devdyn-types/; configs/ sits two levels up.
    fn config_path(name: &str) -> String {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("configs")
            .join(name)
            .to_string_lossy()
            .to_string()
    }

    const FEATURES_VS_BUGS: &str = r#"{
        "name": "features-vs-bugs",
        "labels": ["features", "bugs"],
        "kinetic_weights": [0.5, 0.3333333333333333],
        "coupling": [[1.0, 0.5], [0.5, 2.0]],
        "initial_state": [5.0, 2.0, 1.0, 0.75],
        "time_grid": { "start": 0.0, "end": 10.0, "points": 100 }
    }"#;

    #[test]
    fn test_parse_with_default_solver() {
        let cfg = ModelConfig::from_json_str(FEATURES_VS_BUGS).unwrap();
        assert_eq!(cfg.dimension(), 2);
        assert_eq!(cfg.labels, vec!["features", "bugs"]);
        assert_eq!(cfg.solver.method, IntegratorKind::DormandPrince);
        assert!((cfg.solver.rtol - 1e-10).abs() < 1e-20);
        assert_eq!(cfg.solver.max_steps, 100_000);
        assert!(cfg.solver.initial_step.is_none());
        let grid = cfg.time_grid().unwrap();
        assert_eq!(grid.len(), 100);
        assert_eq!(grid.end(), 10.0);
    }

    #[test]
    fn test_method_snake_case() {
        let json = FEATURES_VS_BUGS.replace(
            r#""time_grid""#,
            r#""solver": { "method": "velocity_verlet", "fixed_substeps": 50 }, "time_grid""#,
        );
        let cfg = ModelConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg.solver.method, IntegratorKind::VelocityVerlet);
        assert_eq!(cfg.solver.fixed_substeps, 50);
        assert!((cfg.solver.atol - 1e-10).abs() < 1e-20);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let short_state = FEATURES_VS_BUGS.replace("[5.0, 2.0, 1.0, 0.75]", "[5.0, 2.0, 1.0]");
        assert!(matches!(
            ModelConfig::from_json_str(&short_state),
            Err(DynError::ConfigError(_))
        ));

        let ragged = FEATURES_VS_BUGS.replace("[0.5, 2.0]]", "[0.5]]");
        assert!(matches!(
            ModelConfig::from_json_str(&ragged),
            Err(DynError::ConfigError(_))
        ));

        let labels = FEATURES_VS_BUGS.replace(r#"["features", "bugs"]"#, r#"["features"]"#);
        assert!(ModelConfig::from_json_str(&labels).is_err());
    }

    #[test]
    fn test_rejects_bad_solver_settings() {
        let mut solver = SolverConfig::default();
        assert!(solver.validate().is_ok());
        solver.rtol = 0.0;
        assert!(solver.validate().is_err());
        solver = SolverConfig {
            fixed_substeps: 0,
            ..SolverConfig::default()
        };
        assert!(solver.validate().is_err());
        solver = SolverConfig {
            initial_step: Some(f64::NAN),
            ..SolverConfig::default()
        };
        assert!(solver.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(
            ModelConfig::from_json_str("{ not json"),
            Err(DynError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            ModelConfig::from_file("/nonexistent/devdyn/model.json"),
            Err(DynError::Io(_))
        ));
    }

    #[test]
    fn test_load_all_shipped_configs() {
        let configs = [
            ("features_vs_bugs.json", 2),
            ("deployment_resolution.json", 2),
            ("positive_outcome.json", 5),
            ("negative_outcome.json", 5),
        ];
        for (name, n) in configs {
            let path = config_path(name);
            let cfg = ModelConfig::from_file(&path)
                .unwrap_or_else(|e| panic!("Failed to load config {path}: {e}"));
            assert_eq!(cfg.dimension(), n, "{name}");
        }
    }

    #[test]
    fn test_roundtrip_through_file() {
        let cfg = ModelConfig::from_json_str(FEATURES_VS_BUGS).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let cfg2 = ModelConfig::from_file(&file.path().to_string_lossy()).unwrap();
        assert_eq!(cfg.name, cfg2.name);
        assert_eq!(cfg.coupling, cfg2.coupling);
        assert_eq!(cfg.initial_state, cfg2.initial_state);
        assert_eq!(cfg.solver.method, cfg2.solver.method);
    }
}
