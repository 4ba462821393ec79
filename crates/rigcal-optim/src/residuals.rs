//! Residual layout: one named scalar per (collection, sensor, feature).

use anyhow::{bail, ensure, Context, Result};
use rand::rngs::StdRng;
use rigcal_core::{Dataset, FramePath, Modality, PatternGeometry, Real, SensorData};
use rigcal_features::laser::scan_points;
use std::collections::BTreeSet;
use std::ops::Range;

use crate::params::{intrinsics_group_name, GroupId, ParameterVector};
use crate::registry::TransformRegistry;
use crate::sampling::sample_indices;

/// End of a scan segment on the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanExtremity {
    /// First labelled point.
    Right,
    /// Last labelled point.
    Left,
}

/// Observation a residual is computed from.
///
/// Indices refer into the label of the owning block, so residual values are
/// always recomputed from the current dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualFeature {
    /// Pixel distance of `label.corners[index]` to its projected pattern corner.
    Corner { index: usize },
    /// Planar distance of a scan extremity to the pattern outline.
    ScanExtremity(ScanExtremity),
    /// Planar distance of `idxs[position]` to the nearest square transition.
    ScanInnerEdge { position: usize },
    /// Range error of `idxs[position]` against the pattern plane.
    ScanBeam { position: usize },
    /// Planar distance of `limit_points[index]` to the pattern outline.
    CloudLimit { index: usize },
    /// Distance of `labelled_points[index]` to the pattern plane.
    CloudPlane { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub name: String,
    pub block: usize,
    pub feature: ResidualFeature,
}

/// Residuals of one sensor in one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualBlock {
    pub collection: String,
    pub sensor: String,
    pub modality: Modality,
    /// Path from the pattern frame to the sensor data frame.
    pub path: FramePath,
    /// Parameter groups the block depends on, sorted.
    pub groups: Vec<GroupId>,
    pub rows: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualSet {
    pub blocks: Vec<ResidualBlock>,
    pub residuals: Vec<Residual>,
}

impl ResidualSet {
    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.residuals.iter().map(|r| r.name.as_str())
    }

    /// Parameter groups residual `row` depends on.
    pub fn dependencies(&self, row: usize) -> &[GroupId] {
        &self.blocks[self.residuals[row].block].groups
    }

    /// Blocks depending on each parameter group, indexed by group id.
    pub fn blocks_by_group(&self, num_groups: usize) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); num_groups];
        for (b, block) in self.blocks.iter().enumerate() {
            for g in &block.groups {
                out[g.0].push(b);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResidualOptions {
    /// Fraction of labelled cloud points kept for plane residuals.
    pub sample_fraction: Real,
}

impl Default for ResidualOptions {
    fn default() -> Self {
        Self {
            sample_fraction: 1.0,
        }
    }
}

/// Build the residual layout of a dataset.
///
/// Walks collections then sensors in key order. Point-cloud plane residuals
/// are subsampled with `rng` and the drawn indices are written to
/// `label.samples`.
pub fn build_residuals(
    dataset: &mut Dataset,
    registry: &TransformRegistry,
    params: &ParameterVector,
    opts: &ResidualOptions,
    rng: &mut StdRng,
) -> Result<ResidualSet> {
    let pattern =
        PatternGeometry::from_config(dataset.pattern()).context("invalid calibration pattern")?;
    let pattern_link = dataset.pattern().link.clone();
    let Dataset {
        sensors,
        collections,
        ..
    } = dataset;

    let mut set = ResidualSet::default();
    for (collection_key, collection) in collections.iter_mut() {
        for (sensor_key, sensor) in sensors.iter() {
            if !collection.detected(sensor_key) {
                continue;
            }
            let path = FramePath::resolve(&collection.transforms, &sensor.link, &pattern_link)
                .with_context(|| format!("collection {collection_key}, sensor {sensor_key}"))?;

            let mut groups = Vec::new();
            for key in path.keys() {
                let Some(name) = registry.group_name(key, collection_key) else {
                    continue;
                };
                match params.group_id(&name) {
                    Some(id) => groups.push(id),
                    None => bail!("transform {key} has no parameter group {name}"),
                }
            }
            if let Some(id) = params.group_id(&intrinsics_group_name(sensor_key)) {
                groups.push(id);
            }
            groups.sort();
            groups.dedup();

            let Some(label) = collection.labels.get_mut(sensor_key) else {
                continue;
            };
            let block = set.blocks.len();
            let start = set.residuals.len();
            let prefix = format!("{collection_key}_{sensor_key}");
            let mut push = |suffix: String, feature: ResidualFeature| {
                set.residuals.push(Residual {
                    name: format!("{prefix}_{suffix}"),
                    block,
                    feature,
                });
            };

            match (sensor.modality, collection.data.get(sensor_key)) {
                (Modality::Image, Some(SensorData::Image { .. })) => {
                    ensure!(
                        sensor.camera_info.is_some(),
                        "camera {sensor_key} has no camera info"
                    );
                    let mut seen = BTreeSet::new();
                    for (index, corner) in label.corners.iter().enumerate() {
                        ensure!(
                            pattern.corner(corner.id).is_some(),
                            "collection {collection_key}, sensor {sensor_key}: corner id {} \
                             outside the pattern",
                            corner.id
                        );
                        ensure!(
                            seen.insert(corner.id),
                            "collection {collection_key}, sensor {sensor_key}: corner id {} \
                             labelled twice",
                            corner.id
                        );
                        push(format!("corner{}", corner.id), ResidualFeature::Corner { index });
                    }
                }
                (
                    Modality::LaserScan,
                    Some(SensorData::LaserScan {
                        angle_min,
                        angle_increment,
                        ranges,
                    }),
                ) => {
                    let points = scan_points(*angle_min, *angle_increment, ranges, &label.idxs);
                    ensure!(
                        points.len() == label.idxs.len(),
                        "collection {collection_key}, sensor {sensor_key}: labelled rays \
                         outside the scan"
                    );
                    for &ray in &label.idxs {
                        let range = ranges[ray];
                        ensure!(
                            range.is_finite() && range > 0.0,
                            "collection {collection_key}, sensor {sensor_key}: labelled ray \
                             {ray} has invalid range {range}"
                        );
                    }
                    if !label.idxs.is_empty() {
                        let right = ResidualFeature::ScanExtremity(ScanExtremity::Right);
                        let left = ResidualFeature::ScanExtremity(ScanExtremity::Left);
                        push("eright".into(), right);
                        push("eleft".into(), left);
                    }
                    for &position in &label.edge_idxs {
                        ensure!(
                            position < label.idxs.len(),
                            "collection {collection_key}, sensor {sensor_key}: edge position \
                             {position} out of range"
                        );
                        push(
                            format!("inner_{position}"),
                            ResidualFeature::ScanInnerEdge { position },
                        );
                    }
                    for position in 0..label.idxs.len() {
                        push(format!("beam_{position}"), ResidualFeature::ScanBeam { position });
                    }
                }
                (Modality::PointCloud2, Some(SensorData::PointCloud2 { .. })) => {
                    for index in 0..label.limit_points.len() {
                        push(format!("ld_{index}"), ResidualFeature::CloudLimit { index });
                    }
                    let samples =
                        sample_indices(rng, label.labelled_points.len(), opts.sample_fraction);
                    for &index in &samples {
                        push(format!("oe_{index}"), ResidualFeature::CloudPlane { index });
                    }
                    label.samples = Some(samples);
                }
                (modality, _) => bail!(
                    "collection {collection_key}, sensor {sensor_key}: data does not match \
                     modality {modality}"
                ),
            }

            let rows = start..set.residuals.len();
            log::debug!(
                "{prefix}: {} residuals over {} groups",
                rows.len(),
                groups.len()
            );
            set.blocks.push(ResidualBlock {
                collection: collection_key.clone(),
                sensor: sensor_key.clone(),
                modality: sensor.modality,
                path,
                groups,
                rows,
            });
        }
    }

    log::info!(
        "built {} residuals in {} blocks",
        set.len(),
        set.blocks.len()
    );
    Ok(set)
}
