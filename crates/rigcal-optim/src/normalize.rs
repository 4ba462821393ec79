//! Per-modality residual scales for comparable reporting.

use nalgebra::DVector;
use rigcal_core::{Modality, Real};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::residuals::ResidualSet;

/// Mean absolute residual per modality, measured once on the initial state.
///
/// Scales only feed reports; the optimized cost is never normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityNormalizer {
    pub scales: BTreeMap<Modality, Real>,
}

impl ModalityNormalizer {
    pub fn from_residuals(set: &ResidualSet, values: &DVector<Real>) -> Self {
        let mut sums: BTreeMap<Modality, (Real, usize)> = BTreeMap::new();
        for block in &set.blocks {
            let entry = sums.entry(block.modality).or_default();
            for row in block.rows.clone() {
                entry.0 += values[row].abs();
                entry.1 += 1;
            }
        }
        let scales = sums
            .into_iter()
            .filter(|(_, (_, n))| *n > 0)
            .map(|(m, (sum, n))| (m, sum / n as Real))
            .collect();
        Self { scales }
    }

    /// Scale of a modality; 1 when unknown or degenerate.
    pub fn scale(&self, modality: Modality) -> Real {
        match self.scales.get(&modality) {
            Some(&s) if s > 0.0 && s.is_finite() => s,
            _ => 1.0,
        }
    }

    pub fn normalize(&self, modality: Modality, value: Real) -> Real {
        value / self.scale(modality)
    }
}
