use rigcal_core::Real;
use rigcal_optim::SolveOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::selection::Selector;

/// Perturbation applied to the initial sensor extrinsics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Translation magnitude in meters.
    pub translation: Real,
    /// Rotation magnitude in radians.
    pub rotation: Real,
}

impl NoiseConfig {
    pub fn is_zero(&self) -> bool {
        self.translation == 0.0 && self.rotation == 0.0
    }
}

/// Options of one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Fraction of labelled cloud points used for plane residuals, clamped to `[0.1, 1]`.
    pub sample_fraction: Real,
    /// Seed of the run RNG; drawn and logged when absent.
    pub seed: Option<u64>,
    pub optimize_intrinsics: bool,
    pub collection_selection: Selector,
    pub sensor_selection: Selector,
    pub noise: NoiseConfig,
    /// Keep collections in which some sensor missed the pattern.
    pub use_incomplete_collections: bool,
    /// Drop camera detections that miss some pattern corners.
    pub remove_partial_detections: bool,
    pub refine_corners: bool,
    /// Directory image filenames are resolved against.
    pub image_root: Option<PathBuf>,
    pub solver: SolveOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sample_fraction: 1.0,
            seed: None,
            optimize_intrinsics: false,
            collection_selection: Selector::All,
            sensor_selection: Selector::All,
            noise: NoiseConfig::default(),
            use_incomplete_collections: false,
            remove_partial_detections: false,
            refine_corners: false,
            image_root: None,
            solver: SolveOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{ "seed": 9, "sensor_selection": { "name_in": ["camera"] }, "solver": { "max_iters": 7 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.seed, Some(9));
        assert!(cfg.sensor_selection.matches("camera"));
        assert!(!cfg.sensor_selection.matches("lidar"));
        assert_eq!(cfg.solver.max_iters, 7);
        assert_eq!(cfg.solver.ftol, SolveOptions::default().ftol);
        assert_eq!(cfg.sample_fraction, 1.0);
        assert!(cfg.noise.is_zero());
    }
}
