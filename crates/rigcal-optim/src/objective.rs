//! Pure objective: residual values as a function of dataset state.

use anyhow::{anyhow, bail, ensure, Context, Result};
use nalgebra::DVector;
use rigcal_core::{Dataset, Iso3, PatternGeometry, Pt3, Real, SensorData, Vec2, Vec3};
use rigcal_features::laser::scan_points;
use rigcal_features::lidar::from_homogeneous;
use std::collections::BTreeMap;

use crate::residuals::{ResidualFeature, ResidualSet, ScanExtremity};

/// Rays closer than this to the pattern plane (cosine) are treated as parallel.
pub const PARALLEL_RAY_COSINE: Real = 1e-9;

#[derive(Debug, Clone)]
pub struct Objective {
    pub residuals: ResidualSet,
    pub pattern: PatternGeometry,
}

impl Objective {
    pub fn new(residuals: ResidualSet, pattern: PatternGeometry) -> Self {
        Self { residuals, pattern }
    }

    pub fn num_residuals(&self) -> usize {
        self.residuals.len()
    }

    /// Every residual, recomputed from the dataset.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<DVector<Real>> {
        let mut out = DVector::zeros(self.residuals.len());
        for block in 0..self.residuals.blocks.len() {
            self.evaluate_block(block, dataset, out.as_mut_slice())?;
        }
        Ok(out)
    }

    /// Residual values keyed by name.
    pub fn evaluate_named(&self, dataset: &Dataset) -> Result<BTreeMap<String, Real>> {
        let values = self.evaluate(dataset)?;
        Ok(self
            .residuals
            .names()
            .map(str::to_string)
            .zip(values.iter().copied())
            .collect())
    }

    /// Write the rows of one block into `out` (indexed like the full vector).
    pub fn evaluate_block(
        &self,
        block: usize,
        dataset: &Dataset,
        out: &mut [Real],
    ) -> Result<()> {
        let block = &self.residuals.blocks[block];
        let collection = dataset
            .collections
            .get(&block.collection)
            .ok_or_else(|| anyhow!("collection {} is gone", block.collection))?;
        let label = collection
            .labels
            .get(&block.sensor)
            .ok_or_else(|| anyhow!("{} has no label in {}", block.sensor, block.collection))?;
        let t_sensor_pattern = block
            .path
            .compose(&collection.transforms)
            .with_context(|| format!("collection {}", block.collection))?;
        let rows = &self.residuals.residuals[block.rows.clone()];
        let values = &mut out[block.rows.clone()];

        match collection.data.get(&block.sensor) {
            Some(SensorData::Image { .. }) => {
                let camera = dataset
                    .sensors
                    .get(&block.sensor)
                    .and_then(|s| s.camera_info.as_ref())
                    .ok_or_else(|| anyhow!("camera {} has no camera info", block.sensor))?
                    .camera();
                for (value, residual) in values.iter_mut().zip(rows) {
                    let ResidualFeature::Corner { index } = residual.feature else {
                        bail!("{}: not a camera residual", residual.name);
                    };
                    let corner = &label.corners[index];
                    let p = self
                        .pattern
                        .corner(corner.id)
                        .ok_or_else(|| anyhow!("corner id {} outside the pattern", corner.id))?;
                    let uv = camera.project_clamped(&t_sensor_pattern.transform_point(p).coords);
                    *value = (uv - Vec2::new(corner.x, corner.y)).norm();
                }
            }
            Some(SensorData::LaserScan {
                angle_min,
                angle_increment,
                ranges,
            }) => {
                let points = scan_points(*angle_min, *angle_increment, ranges, &label.idxs);
                let t_pattern_sensor = t_sensor_pattern.inverse();
                for (value, residual) in values.iter_mut().zip(rows) {
                    *value = match residual.feature {
                        ResidualFeature::ScanExtremity(side) => {
                            let p = match side {
                                ScanExtremity::Right => points.first(),
                                ScanExtremity::Left => points.last(),
                            };
                            let p = p.ok_or_else(|| anyhow!("{}: empty scan", residual.name))?;
                            self.pattern
                                .outline_distance(&t_pattern_sensor.transform_point(p))
                        }
                        ResidualFeature::ScanInnerEdge { position } => {
                            let p = t_pattern_sensor.transform_point(&points[position]);
                            self.pattern.transition_distance(&p)
                        }
                        ResidualFeature::ScanBeam { position } => {
                            beam_range_error(&t_sensor_pattern, &points[position])
                                .with_context(|| residual.name.clone())?
                        }
                        _ => bail!("{}: not a scan residual", residual.name),
                    };
                }
            }
            Some(SensorData::PointCloud2 { .. }) => {
                let t_pattern_sensor = t_sensor_pattern.inverse();
                for (value, residual) in values.iter_mut().zip(rows) {
                    *value = match residual.feature {
                        ResidualFeature::CloudLimit { index } => {
                            let p = from_homogeneous(&label.limit_points[index]);
                            self.pattern
                                .outline_distance(&t_pattern_sensor.transform_point(&p))
                        }
                        ResidualFeature::CloudPlane { index } => {
                            let p = from_homogeneous(&label.labelled_points[index]);
                            t_pattern_sensor.transform_point(&p).z.abs()
                        }
                        _ => bail!("{}: not a point-cloud residual", residual.name),
                    };
                }
            }
            None => bail!("{} has no data in {}", block.sensor, block.collection),
        }
        Ok(())
    }
}

/// Difference between the range to the pattern plane along the ray through
/// `p` and the measured range `|p|`.
fn beam_range_error(t_sensor_pattern: &Iso3, p: &Pt3) -> Result<Real> {
    let normal = t_sensor_pattern.rotation * Vec3::z();
    let origin = t_sensor_pattern.translation.vector;
    let measured = p.coords.norm();
    ensure!(
        measured.is_finite() && measured > 0.0,
        "laser range {measured} is not a positive finite distance"
    );
    let dir = p.coords / measured;
    let cosine = normal.dot(&dir);
    ensure!(
        cosine.abs() > PARALLEL_RAY_COSINE,
        "laser beam is parallel to the pattern plane"
    );
    let expected = (normal.dot(&origin) / cosine).abs();
    Ok((expected - measured).abs())
}
