//! Configuration for covariance validation and combination.

use std::env;

use serde::{Deserialize, Serialize};

/// Engine options for [`Combiner`](crate::Combiner).
///
/// Data-level options (log transform, global correlation factor) belong to
/// the input and live on [`Globals`](crate::Globals) instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sources whose name contains this marker are statistical and are left
    /// out of the systematic sum (default: `"stat"`).
    pub stat_marker: String,

    /// Smallest accepted squared Cholesky pivot, relative to the largest
    /// diagonal element, before a matrix is declared singular (default: 1e-12).
    pub singularity_tolerance: f64,

    /// Smallest accepted eigenvalue of a covariance matrix, relative to the
    /// largest diagonal element (default: 1e-9). Anything below `-tol` fails
    /// the positive semi-definite check.
    pub psd_tolerance: f64,

    /// Maximum absolute asymmetry of explicit correlation and per-cell
    /// matrices (default: 1e-9).
    pub symmetry_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stat_marker: "stat".to_string(),
            singularity_tolerance: 1e-12,
            psd_tolerance: 1e-9,
            symmetry_tolerance: 1e-9,
        }
    }
}

impl Config {
    /// Tight tolerances, for inputs that are expected to be well conditioned.
    pub fn strict() -> Self {
        Self {
            singularity_tolerance: 1e-9,
            psd_tolerance: 1e-12,
            symmetry_tolerance: 1e-12,
            ..Self::default()
        }
    }

    /// Loose tolerances, for nearly degenerate inputs (e.g. many almost fully
    /// correlated sources).
    pub fn lenient() -> Self {
        Self {
            singularity_tolerance: 1e-15,
            psd_tolerance: 1e-6,
            symmetry_tolerance: 1e-6,
            ..Self::default()
        }
    }

    /// Default configuration with environment overrides applied.
    ///
    /// Reads:
    /// - `BLUE_AVERAGE_STAT_MARKER`
    /// - `BLUE_AVERAGE_SINGULARITY_TOLERANCE`
    /// - `BLUE_AVERAGE_PSD_TOLERANCE`
    /// - `BLUE_AVERAGE_SYMMETRY_TOLERANCE`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(marker) = env::var("BLUE_AVERAGE_STAT_MARKER") {
            if !marker.is_empty() {
                self.stat_marker = marker;
            }
        }
        if let Some(tol) = parse_f64_env("BLUE_AVERAGE_SINGULARITY_TOLERANCE") {
            self.singularity_tolerance = tol;
        }
        if let Some(tol) = parse_f64_env("BLUE_AVERAGE_PSD_TOLERANCE") {
            self.psd_tolerance = tol;
        }
        if let Some(tol) = parse_f64_env("BLUE_AVERAGE_SYMMETRY_TOLERANCE") {
            self.symmetry_tolerance = tol;
        }
        self
    }

    /// Whether a source name marks a statistical (non-systematic) source.
    pub fn is_statistical(&self, name: &str) -> bool {
        name.contains(self.stat_marker.as_str())
    }
}

fn parse_f64_env(key: &str) -> Option<f64> {
    env::var(key)
        .ok()?
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_keep_stat_marker() {
        assert_eq!(Config::strict().stat_marker, "stat");
        assert_eq!(Config::lenient().stat_marker, "stat");
        assert!(Config::strict().psd_tolerance < Config::default().psd_tolerance);
    }

    #[test]
    fn test_is_statistical() {
        let config = Config::default();
        assert!(config.is_statistical("stat"));
        assert!(config.is_statistical("stat_mc"));
        assert!(!config.is_statistical("jes"));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = Config::strict();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
