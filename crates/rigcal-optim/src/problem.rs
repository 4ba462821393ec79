//! Assembled calibration problem.

use anyhow::{ensure, Context, Result};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rigcal_core::{Dataset, PatternGeometry, Real};
use serde::{Deserialize, Serialize};

use crate::jacobian::{numeric_jacobian, SparsityPattern};
use crate::params::{build_parameters, ParameterOptions, ParameterVector};
use crate::registry::TransformRegistry;
use crate::residuals::{build_residuals, ResidualOptions};
use crate::Objective;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemOptions {
    pub optimize_intrinsics: bool,
    pub sample_fraction: Real,
}

impl Default for ProblemOptions {
    fn default() -> Self {
        Self {
            optimize_intrinsics: false,
            sample_fraction: 1.0,
        }
    }
}

/// Registry, parameter layout, residual layout and sparsity of one run.
///
/// Holds no parameter values: those live in the dataset.
#[derive(Debug, Clone)]
pub struct CalibrationProblem {
    pub registry: TransformRegistry,
    pub params: ParameterVector,
    pub objective: Objective,
    pub sparsity: SparsityPattern,
    blocks_by_group: Vec<Vec<usize>>,
}

impl CalibrationProblem {
    /// Build the problem. Writes cloud sample indices into the dataset labels.
    pub fn build(dataset: &mut Dataset, opts: &ProblemOptions, rng: &mut StdRng) -> Result<Self> {
        ensure!(!dataset.collections.is_empty(), "dataset has no collections");
        let pattern =
            PatternGeometry::from_config(dataset.pattern()).context("invalid calibration pattern")?;
        let registry = TransformRegistry::resolve(&dataset.sensors, &dataset.calibration_config)?;
        let params = build_parameters(
            dataset,
            &registry,
            &ParameterOptions {
                optimize_intrinsics: opts.optimize_intrinsics,
            },
        )?;
        let residuals = build_residuals(
            dataset,
            &registry,
            &params,
            &ResidualOptions {
                sample_fraction: opts.sample_fraction,
            },
            rng,
        )?;
        ensure!(!residuals.is_empty(), "no residuals to optimize");

        let sparsity = SparsityPattern::from_layout(&residuals, &params);
        let blocks_by_group = residuals.blocks_by_group(params.len());
        log::info!(
            "problem: {} parameters in {} groups, {} residuals, {} jacobian entries",
            params.dim(),
            params.len(),
            residuals.len(),
            sparsity.nnz()
        );
        Ok(Self {
            registry,
            params,
            objective: Objective::new(residuals, pattern),
            sparsity,
            blocks_by_group,
        })
    }

    pub fn num_params(&self) -> usize {
        self.params.dim()
    }

    pub fn num_residuals(&self) -> usize {
        self.objective.num_residuals()
    }

    pub fn residual_names(&self) -> Vec<String> {
        self.objective.residuals.names().map(str::to_string).collect()
    }

    pub fn evaluate(&self, dataset: &Dataset) -> Result<DVector<Real>> {
        self.objective.evaluate(dataset)
    }

    /// Write `x` into the dataset and evaluate.
    pub fn evaluate_at(&self, dataset: &mut Dataset, x: &DVector<Real>) -> Result<DVector<Real>> {
        self.params.apply(dataset, x)?;
        self.objective.evaluate(dataset)
    }

    /// Finite-difference Jacobian at `x`; leaves `dataset` holding `x`.
    pub fn jacobian_at(&self, dataset: &mut Dataset, x: &DVector<Real>) -> Result<DMatrix<Real>> {
        let r0 = self.evaluate_at(dataset, x)?;
        numeric_jacobian(
            &self.objective,
            &self.params,
            &self.blocks_by_group,
            dataset,
            x,
            &r0,
        )
    }
}
