//! High-level entry crate for the `rigcal` toolbox.
//!
//! `rigcal` estimates the extrinsics of a robot's sensors (cameras, planar
//! range scanners, multi-beam LiDARs), and optionally camera intrinsics, from
//! a dataset of collections in which the sensors observe a known calibration
//! pattern.
//!
//! ## One-call runs
//!
//! ```no_run
//! use rigcal::pipeline::{load_dataset, run_calibration, save_dataset, RunConfig};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut dataset = load_dataset(Path::new("dataset.json"))?;
//! let report = run_calibration(&mut dataset, &RunConfig::default())?;
//! println!("cost {} -> {}", report.solve.initial_cost, report.solve.final_cost);
//! save_dataset(&dataset, Path::new("calibrated.json"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Building blocks
//!
//! The residual model can be driven by any solver that writes a flat
//! parameter vector back into the dataset:
//!
//! ```
//! use rigcal::core::synthetic::{scene, SceneOptions};
//! use rigcal::optim::{run_rng, CalibrationProblem, ProblemOptions};
//! # fn main() -> anyhow::Result<()> {
//! let mut dataset = scene(&SceneOptions::default());
//! let (mut rng, _seed) = run_rng(Some(0));
//! let problem = CalibrationProblem::build(&mut dataset, &ProblemOptions::default(), &mut rng)?;
//! let x = problem.params.values(&dataset)?;
//! let residuals = problem.evaluate_at(&mut dataset, &x)?;
//! println!("{} residuals over {} parameters", residuals.len(), problem.num_params());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`core`]**: math aliases, dataset model, frames, camera and pattern geometry
//! - **[`features`]**: per-modality feature extraction
//! - **[`optim`]**: parameter vector, residuals, objective, LM backend
//! - **[`pipeline`]**: configuration, filtering, reports and file I/O
//! - **[`prelude`]**: convenient re-exports for common use cases

/// Core math types, dataset model and geometry.
pub mod core {
    pub use rigcal_core::*;
}

/// Feature extraction for camera, range-scan and point-cloud observations.
pub mod features {
    pub use rigcal_features::*;
}

/// Parameterization, residual model and solver adapter.
pub mod optim {
    pub use rigcal_optim::*;
}

/// End-to-end calibration runs.
pub mod pipeline {
    pub use rigcal_pipeline::*;
}

/// Convenient re-exports for common use cases.
///
/// Import with `use rigcal::prelude::*;` to get started quickly.
pub mod prelude {
    pub use crate::core::{Dataset, Iso3, Modality, Pt3, Real, Sensor, Vec3};
    pub use crate::optim::{CalibrationProblem, LmBackend, ProblemOptions, SolveOptions};
    pub use crate::pipeline::{
        load_dataset, run_calibration, save_dataset, CalibrationReport, RunConfig, Selector,
    };
}
