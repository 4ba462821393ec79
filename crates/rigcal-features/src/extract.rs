//! Dataset-level feature extraction.

use image::ImageReader;
use log::{debug, warn};
use rigcal_core::{Dataset, Label, Modality, Pt2, Pt3, Sensor, SensorData};
use std::path::{Path, PathBuf};

use crate::laser::detect_inner_edges;
use crate::lidar::{beam_features, to_homogeneous};
use crate::subpix::{corner_subpix, SubPixOptions};
use crate::FeatureError;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Refine camera corners on their images.
    pub refine_corners: bool,
    pub subpix: SubPixOptions,
    /// Directory image filenames are resolved against.
    pub image_root: Option<PathBuf>,
}

/// Counters describing one extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub refined_images: usize,
    pub scan_edges: usize,
    /// Labelled scan rays dropped for a non-finite or non-positive range.
    pub dropped_rays: usize,
    pub cloud_points: usize,
    /// Observations whose extraction failed and kept empty or raw features.
    pub skipped: usize,
}

/// Enrich every detected label of the dataset with its modality features.
///
/// Per-observation failures are logged and skipped; only numerical degeneracy
/// in point clouds aborts the pass.
pub fn extract_features(
    dataset: &mut Dataset,
    opts: &ExtractOptions,
) -> Result<ExtractionSummary, FeatureError> {
    let mut summary = ExtractionSummary::default();
    let Dataset {
        sensors,
        collections,
        ..
    } = dataset;

    for (collection_key, collection) in collections.iter_mut() {
        for (sensor_key, sensor) in sensors.iter() {
            let Some(data) = collection.data.get(sensor_key).cloned() else {
                if collection.detected(sensor_key) {
                    warn!("{collection_key}/{sensor_key}: detected but no sensor data");
                    summary.skipped += 1;
                }
                continue;
            };
            let Some(label) = collection.labels.get_mut(sensor_key) else {
                continue;
            };
            if !label.detected {
                continue;
            }
            extract_one(
                collection_key,
                sensor_key,
                sensor,
                &data,
                label,
                opts,
                &mut summary,
            )?;
        }
    }
    Ok(summary)
}

fn extract_one(
    collection_key: &str,
    sensor_key: &str,
    sensor: &Sensor,
    data: &SensorData,
    label: &mut Label,
    opts: &ExtractOptions,
    summary: &mut ExtractionSummary,
) -> Result<(), FeatureError> {
    match (sensor.modality, data) {
        (Modality::Image, SensorData::Image { filename }) => {
            if !opts.refine_corners {
                return Ok(());
            }
            let Some(root) = &opts.image_root else {
                return Ok(());
            };
            match refine_label_corners(&root.join(filename), label, &opts.subpix) {
                Ok(()) => summary.refined_images += 1,
                Err(err) => {
                    warn!("{collection_key}/{sensor_key}: keeping raw corners ({err})");
                    summary.skipped += 1;
                }
            }
        }
        (Modality::LaserScan, SensorData::LaserScan { ranges, .. }) => {
            label.idxs.sort_unstable();
            label.idxs.dedup();
            label.idxs.retain(|&i| i < ranges.len());
            let invalid: Vec<usize> = label
                .idxs
                .iter()
                .copied()
                .filter(|&i| !(ranges[i].is_finite() && ranges[i] > 0.0))
                .collect();
            if !invalid.is_empty() {
                warn!(
                    "{collection_key}/{sensor_key}: dropping labelled rays {invalid:?} \
                     without a valid range"
                );
                label.idxs.retain(|i| !invalid.contains(i));
                summary.dropped_rays += invalid.len();
            }
            label.edge_idxs = detect_inner_edges(&label.idxs);
            debug!(
                "{collection_key}/{sensor_key}: {} inner edges in {} rays",
                label.edge_idxs.len(),
                label.idxs.len()
            );
            summary.scan_edges += label.edge_idxs.len();
        }
        (Modality::PointCloud2, SensorData::PointCloud2 { points }) => {
            let labelled: Vec<Pt3> = label
                .idxs
                .iter()
                .filter_map(|&i| points.get(i).map(|p| Pt3::new(p[0], p[1], p[2])))
                .collect();
            if labelled.len() != label.idxs.len() {
                warn!(
                    "{collection_key}/{sensor_key}: {} labelled indices outside the cloud",
                    label.idxs.len() - labelled.len()
                );
            }
            let features = beam_features(&labelled, collection_key, sensor_key)?;
            label.labelled_points = features.labelled.iter().map(to_homogeneous).collect();
            label.limit_points = features.extrema.iter().map(to_homogeneous).collect();
            label.middle_points = features.middle.iter().map(to_homogeneous).collect();
            summary.cloud_points += label.labelled_points.len();
        }
        (modality, _) => {
            warn!("{collection_key}/{sensor_key}: data does not match modality {modality}");
            summary.skipped += 1;
        }
    }
    Ok(())
}

fn refine_label_corners(
    path: &Path,
    label: &mut Label,
    opts: &SubPixOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = ImageReader::open(path)?.decode()?.to_luma8();
    let mut corners: Vec<Pt2> = label.corners.iter().map(|c| Pt2::new(c.x, c.y)).collect();
    corner_subpix(&image, &mut corners, opts)?;
    for (corner, refined) in label.corners.iter_mut().zip(&corners) {
        corner.x = refined.x;
        corner.y = refined.y;
    }
    Ok(())
}
