//! Calibration parameterization, residual model and objective.
//!
//! A [`CalibrationProblem`] is built once per run from a [`rigcal_core::Dataset`]:
//! the [`TransformRegistry`] deduplicates the transforms to optimize, the
//! [`ParameterVector`] lays them out as named groups with bounds, and the
//! residual builder turns every detected observation into named scalar
//! residuals with explicit parameter dependencies. The [`Objective`] then
//! recomputes residuals from dataset state only, so any solver that can
//! write a flat vector into the dataset can drive it. [`LmBackend`] is the
//! bundled Levenberg-Marquardt adapter.

pub mod backend_lm;
pub mod jacobian;
pub mod normalize;
pub mod objective;
pub mod params;
pub mod problem;
pub mod registry;
pub mod residuals;
pub mod sampling;

pub use backend_lm::{LmBackend, SolveOptions, SolveReport};
pub use jacobian::{numeric_jacobian, SparsityPattern};
pub use normalize::ModalityNormalizer;
pub use objective::Objective;
pub use params::{
    build_parameters, intrinsics_group_name, CollectionScope, GroupId, GroupKind, ParamGroup,
    ParameterOptions, ParameterVector,
};
pub use problem::{CalibrationProblem, ProblemOptions};
pub use registry::{TransformLink, TransformRegistry};
pub use residuals::{
    build_residuals, Residual, ResidualBlock, ResidualFeature, ResidualOptions, ResidualSet,
    ScanExtremity,
};
pub use sampling::{run_rng, sample_indices};
