use anyhow::{ensure, Result};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use rigcal_core::{Dataset, Real};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use crate::CalibrationProblem;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Maximum number of solver iterations before termination.
    ///
    /// The LM backend follows the MINPACK convention and caps function
    /// evaluations at `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// Half the squared residual norm before optimization.
    pub initial_cost: Real,
    pub final_cost: Real,
    pub converged: bool,
    pub termination: String,
}

struct LmWrapper<'a> {
    problem: &'a CalibrationProblem,
    dataset: &'a mut Dataset,
    params: DVector<Real>,
    error: RefCell<Option<anyhow::Error>>,
}

impl LmWrapper<'_> {
    fn record(&self, err: anyhow::Error) {
        self.error.borrow_mut().get_or_insert(err);
    }
}

impl LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params = self.problem.params.clamp(x);
        if let Err(err) = self.problem.params.apply(self.dataset, &self.params) {
            self.record(err);
        }
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        self.problem
            .evaluate(&*self.dataset)
            .map_err(|err| self.record(err))
            .ok()
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let mut scratch = self.dataset.clone();
        self.problem
            .jacobian_at(&mut scratch, &self.params)
            .map_err(|err| self.record(err))
            .ok()
    }
}

/// Levenberg-Marquardt over a [`CalibrationProblem`] with bound projection.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl LmBackend {
    /// Optimize the parameters stored in `dataset` in place.
    pub fn solve(
        &self,
        problem: &CalibrationProblem,
        dataset: &mut Dataset,
        opts: &SolveOptions,
    ) -> Result<SolveReport> {
        let x0 = problem.params.clamp(&problem.params.values(dataset)?);
        let r0 = problem.evaluate_at(dataset, &x0)?;
        let initial_cost = 0.5 * r0.norm_squared();

        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let wrapper = LmWrapper {
            problem,
            dataset,
            params: x0,
            error: RefCell::new(None),
        };
        let (wrapper, report) = lm.minimize(wrapper);
        if let Some(err) = wrapper.error.into_inner() {
            return Err(err.context("objective evaluation failed during optimization"));
        }

        // The solver may leave the last trial step in the dataset.
        let x = wrapper.params;
        let dataset = wrapper.dataset;
        problem.params.apply(dataset, &x)?;
        let final_cost = 0.5 * problem.evaluate(dataset)?.norm_squared();
        ensure!(final_cost.is_finite(), "optimization diverged");

        let report = SolveReport {
            iterations: report.number_of_evaluations,
            initial_cost,
            final_cost,
            converged: report.termination.was_successful(),
            termination: format!("{:?}", report.termination),
        };
        log::info!(
            "LM finished after {} evaluations: cost {:.6e} -> {:.6e} ({})",
            report.iterations,
            report.initial_cost,
            report.final_cost,
            report.termination
        );
        Ok(report)
    }
}
