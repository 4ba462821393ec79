//! Declared sparsity and finite-difference Jacobian.

use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use rigcal_core::{Dataset, Real};

use crate::params::ParameterVector;
use crate::residuals::ResidualSet;
use crate::Objective;

/// Scalar parameter columns each residual row may depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityPattern {
    pub rows: usize,
    pub cols: usize,
    /// Sorted column indices per row.
    pub row_cols: Vec<Vec<usize>>,
}

impl SparsityPattern {
    pub fn from_layout(residuals: &ResidualSet, params: &ParameterVector) -> Self {
        let row_cols = (0..residuals.len())
            .map(|row| {
                let mut cols: Vec<usize> = residuals
                    .dependencies(row)
                    .iter()
                    .flat_map(|&id| {
                        let g = params.group(id);
                        g.offset..g.offset + g.dim()
                    })
                    .collect();
                cols.sort_unstable();
                cols
            })
            .collect();
        Self {
            rows: residuals.len(),
            cols: params.dim(),
            row_cols,
        }
    }

    pub fn nnz(&self) -> usize {
        self.row_cols.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.row_cols[row].binary_search(&col).is_ok()
    }
}

/// Forward-difference step for a parameter value.
pub fn fd_step(x: Real) -> Real {
    Real::EPSILON.sqrt() * x.abs().max(1.0)
}

/// Jacobian of the objective at `x` by forward differences.
///
/// `dataset` must already hold the state `x`; it is perturbed one scalar at a
/// time and restored. Only blocks depending on the perturbed group are
/// recomputed. Columns whose bound interval is narrower than the step stay zero.
pub fn numeric_jacobian(
    objective: &Objective,
    params: &ParameterVector,
    blocks_by_group: &[Vec<usize>],
    dataset: &mut Dataset,
    x: &DVector<Real>,
    r0: &DVector<Real>,
) -> Result<DMatrix<Real>> {
    let mut jac = DMatrix::zeros(objective.num_residuals(), params.dim());
    let mut scratch = DVector::zeros(objective.num_residuals());

    for id in params.ids() {
        let group = params.group(id);
        let blocks = &blocks_by_group[id.0];
        if blocks.is_empty() {
            continue;
        }
        let base: Vec<Real> = x.rows(group.offset, group.dim()).iter().copied().collect();
        for k in 0..group.dim() {
            let (lo, hi) = (group.lower[k], group.upper[k]);
            let mut h = fd_step(base[k]);
            if hi - lo < h {
                continue;
            }
            if base[k] + h > hi {
                h = -h;
            }

            let mut perturbed = base.clone();
            perturbed[k] += h;
            params.set_group_values(dataset, id, &perturbed)?;
            for &b in blocks {
                objective.evaluate_block(b, dataset, scratch.as_mut_slice())?;
                for row in objective.residuals.blocks[b].rows.clone() {
                    jac[(row, group.offset + k)] = (scratch[row] - r0[row]) / h;
                }
            }
        }
        params.set_group_values(dataset, id, &base)?;
    }
    Ok(jac)
}
