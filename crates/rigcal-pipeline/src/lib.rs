//! End-to-end calibration runs.
//!
//! [`run_calibration`] chains the stages of one run over an owned dataset:
//! filtering, noise injection, feature extraction, pattern pose seeding,
//! problem construction, optimization and reporting. Every stage reads and
//! writes only the dataset passed in.

pub mod config;
pub mod description;
pub mod filter;
pub mod initial_estimate;
pub mod io;
pub mod noise;
pub mod report;
pub mod selection;

pub use config::{NoiseConfig, RunConfig};
pub use description::{
    calibrated_joints, update_description, CalibratedJoint, Joint, KinematicDescription,
};
pub use filter::{filter_dataset, FilterSummary};
pub use initial_estimate::estimate_pattern_poses;
pub use io::{load_config, load_dataset, load_description, save_dataset, save_description};
pub use noise::add_noise;
pub use report::{ErrorReport, ErrorStats};
pub use selection::{CmpOp, Selector};

use anyhow::Result;
use log::info;
use rigcal_core::Dataset;
use rigcal_features::{extract_features, ExtractOptions};
use rigcal_optim::{
    run_rng, CalibrationProblem, LmBackend, ModalityNormalizer, ProblemOptions, SolveReport,
    TransformRegistry,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Seed of the run RNG, for reproduction.
    pub seed: u64,
    pub filter: FilterSummary,
    pub noisy_transforms: Vec<String>,
    pub estimated_pattern_poses: usize,
    pub num_params: usize,
    pub num_residuals: usize,
    pub normalizer: ModalityNormalizer,
    pub initial_errors: ErrorReport,
    pub final_errors: ErrorReport,
    pub solve: SolveReport,
    pub joints: Vec<CalibratedJoint>,
}

/// Calibrate `dataset` in place.
pub fn run_calibration(dataset: &mut Dataset, config: &RunConfig) -> Result<CalibrationReport> {
    let filter = filter_dataset(dataset, config)?;
    let (mut rng, seed) = run_rng(config.seed);

    let registry = TransformRegistry::resolve(&dataset.sensors, &dataset.calibration_config)?;
    let noisy_transforms = add_noise(dataset, &registry, &config.noise, &mut rng)?;

    let extraction = extract_features(
        dataset,
        &ExtractOptions {
            refine_corners: config.refine_corners,
            image_root: config.image_root.clone(),
            ..ExtractOptions::default()
        },
    )?;
    info!("feature extraction: {extraction:?}");
    let estimated_pattern_poses = estimate_pattern_poses(dataset)?;

    let problem = CalibrationProblem::build(
        dataset,
        &ProblemOptions {
            optimize_intrinsics: config.optimize_intrinsics,
            sample_fraction: config.sample_fraction,
        },
        &mut rng,
    )?;
    let residuals = &problem.objective.residuals;

    let initial = problem.evaluate(dataset)?;
    let normalizer = ModalityNormalizer::from_residuals(residuals, &initial);
    let initial_errors = ErrorReport::compute(residuals, &initial, &normalizer);
    initial_errors.log("errors before optimization");

    let solve = LmBackend.solve(&problem, dataset, &config.solver)?;

    let last = problem.evaluate(dataset)?;
    let final_errors = ErrorReport::compute(residuals, &last, &normalizer);
    final_errors.log("errors after optimization");

    let joints = calibrated_joints(dataset, &problem.registry)?;
    Ok(CalibrationReport {
        seed,
        filter,
        noisy_transforms,
        estimated_pattern_poses,
        num_params: problem.num_params(),
        num_residuals: problem.num_residuals(),
        normalizer,
        initial_errors,
        final_errors,
        solve,
        joints,
    })
}
