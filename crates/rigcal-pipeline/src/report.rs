//! Residual statistics per sensor and per collection.

use log::info;
use nalgebra::DVector;
use rigcal_core::{Modality, Real};
use rigcal_optim::{ModalityNormalizer, ResidualSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub count: usize,
    /// Mean absolute residual in the modality's unit (pixels or meters).
    pub mean: Real,
    pub max: Real,
    /// Mean divided by the modality's initial scale.
    pub normalized_mean: Real,
}

impl ErrorStats {
    fn add(&mut self, value: Real, scale: Real) {
        let value = value.abs();
        let n = self.count as Real;
        self.mean = (self.mean * n + value) / (n + 1.0);
        self.normalized_mean = (self.normalized_mean * n + value / scale) / (n + 1.0);
        self.max = self.max.max(value);
        self.count += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub sensors: BTreeMap<String, ErrorStats>,
    /// Collection key, then sensor key.
    pub collections: BTreeMap<String, BTreeMap<String, ErrorStats>>,
    pub modalities: BTreeMap<Modality, ErrorStats>,
}

impl ErrorReport {
    pub fn compute(
        residuals: &ResidualSet,
        values: &DVector<Real>,
        normalizer: &ModalityNormalizer,
    ) -> Self {
        let mut report = Self::default();
        for block in &residuals.blocks {
            let scale = normalizer.scale(block.modality);
            let sensor = report.sensors.entry(block.sensor.clone()).or_default();
            let collection = report
                .collections
                .entry(block.collection.clone())
                .or_default()
                .entry(block.sensor.clone())
                .or_default();
            let modality = report.modalities.entry(block.modality).or_default();
            for row in block.rows.clone() {
                sensor.add(values[row], scale);
                collection.add(values[row], scale);
                modality.add(values[row], scale);
            }
        }
        report
    }

    pub fn log(&self, title: &str) {
        info!("{title}");
        for (sensor, stats) in &self.sensors {
            info!(
                "  {sensor:<16} n={:<6} mean={:.6} max={:.6} normalized={:.4}",
                stats.count, stats.mean, stats.max, stats.normalized_mean
            );
        }
        for (collection, sensors) in &self.collections {
            let line: Vec<String> = sensors
                .iter()
                .map(|(s, stats)| format!("{s}={:.6}", stats.mean))
                .collect();
            log::debug!("  collection {collection}: {}", line.join(" "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::FramePath;
    use rigcal_optim::{Residual, ResidualBlock, ResidualFeature};

    fn block(collection: &str, sensor: &str, rows: std::ops::Range<usize>) -> ResidualBlock {
        ResidualBlock {
            collection: collection.into(),
            sensor: sensor.into(),
            modality: Modality::Image,
            path: FramePath {
                target: sensor.into(),
                source: "pattern".into(),
                steps: Vec::new(),
            },
            groups: Vec::new(),
            rows,
        }
    }

    #[test]
    fn aggregates_per_sensor_and_collection() {
        let set = ResidualSet {
            blocks: vec![block("0", "cam", 0..2), block("1", "cam", 2..3)],
            residuals: (0..3)
                .map(|i| Residual {
                    name: format!("r{i}"),
                    block: usize::from(i == 2),
                    feature: ResidualFeature::Corner { index: i },
                })
                .collect(),
        };
        let values = DVector::from_vec(vec![1.0, -3.0, 2.0]);
        let normalizer = ModalityNormalizer::from_residuals(&set, &values);
        let report = ErrorReport::compute(&set, &values, &normalizer);

        let cam = report.sensors["cam"];
        assert_eq!(cam.count, 3);
        assert!((cam.mean - 2.0).abs() < 1e-12);
        assert_eq!(cam.max, 3.0);
        assert!((cam.normalized_mean - 1.0).abs() < 1e-12);
        assert!((report.collections["0"]["cam"].mean - 2.0).abs() < 1e-12);
        assert_eq!(report.collections["1"]["cam"].count, 1);
        assert_eq!(report.modalities[&Modality::Image].count, 3);
    }
}
