//! Pattern pose seeding for collections without a pattern transform.

use anyhow::{anyhow, bail, ensure, Context, Result};
use rigcal_core::{
    lookup_transform, Collection, Dataset, Iso3, Modality, PatternGeometry, Pt2, TransformEntry,
    Vec2,
};
use rigcal_features::planar_pose::planar_pose;

/// Minimum number of corners for a homography.
pub const MIN_CORNERS: usize = 4;

/// Pose `parent_link -> pattern` from the first camera detecting the pattern.
fn estimate_from_cameras(
    dataset: &Dataset,
    collection_key: &str,
    collection: &Collection,
    pattern: &PatternGeometry,
) -> Result<Iso3> {
    let config = dataset.pattern();
    for (sensor_key, sensor) in &dataset.sensors {
        if sensor.modality != Modality::Image || !collection.detected(sensor_key) {
            continue;
        }
        let (Some(info), Some(label)) = (&sensor.camera_info, collection.labels.get(sensor_key))
        else {
            continue;
        };
        if label.corners.len() < MIN_CORNERS {
            continue;
        }
        let camera = info.camera();
        let mut plane = Vec::with_capacity(label.corners.len());
        let mut normalized = Vec::with_capacity(label.corners.len());
        for corner in &label.corners {
            let p = pattern
                .corner(corner.id)
                .ok_or_else(|| anyhow!("corner id {} outside the pattern", corner.id))?;
            plane.push(Pt2::new(p.x, p.y));
            let n = camera.pixel_to_normalized(&Vec2::new(corner.x, corner.y));
            normalized.push(Pt2::new(n.x, n.y));
        }
        let t_camera_pattern = planar_pose(&plane, &normalized)
            .with_context(|| format!("{collection_key}/{sensor_key}: pattern pose"))?;
        let t_parent_camera =
            lookup_transform(&collection.transforms, &config.parent_link, &sensor.link)
                .with_context(|| format!("{collection_key}/{sensor_key}"))?;
        log::debug!("{collection_key}: pattern pose estimated from {sensor_key}");
        return Ok(t_parent_camera * t_camera_pattern);
    }
    bail!("collection {collection_key}: no camera detects the pattern to estimate its pose")
}

/// Insert estimated pattern transforms where a collection lacks one.
///
/// Existing entries are kept but must link the pattern parent to the pattern.
/// A fixed pattern takes its pose from the first existing entry, or else from
/// the first collection where a camera can estimate it, and reuses that pose
/// in every collection. Returns the number of inserted transforms.
pub fn estimate_pattern_poses(dataset: &mut Dataset) -> Result<usize> {
    let config = dataset.pattern().clone();
    let key = config.transform_key();
    let geometry = PatternGeometry::from_config(&config).context("invalid calibration pattern")?;

    let mut missing = Vec::new();
    let mut shared: Option<Iso3> = None;
    for (collection_key, collection) in &dataset.collections {
        match collection.transforms.get(&key) {
            Some(entry) => {
                ensure!(
                    entry.parent == config.parent_link && entry.child == config.link,
                    "collection {collection_key}: transform {key} links {} -> {}, expected {} -> {}",
                    entry.parent,
                    entry.child,
                    config.parent_link,
                    config.link
                );
                if shared.is_none() {
                    shared = Some(entry.pose());
                }
            }
            None => missing.push(collection_key.clone()),
        }
    }
    if missing.is_empty() {
        return Ok(0);
    }

    let mut estimates = Vec::with_capacity(missing.len());
    if config.fixed {
        let pose = match shared {
            Some(pose) => pose,
            None => shared_estimate(dataset, &geometry)?,
        };
        estimates.extend(missing.into_iter().map(|k| (k, pose)));
    } else {
        for collection_key in missing {
            let collection = &dataset.collections[&collection_key];
            let pose = estimate_from_cameras(dataset, &collection_key, collection, &geometry)?;
            estimates.push((collection_key, pose));
        }
    }

    let inserted = estimates.len();
    for (collection_key, pose) in estimates {
        if let Some(collection) = dataset.collections.get_mut(&collection_key) {
            collection.transforms.insert(
                key.clone(),
                TransformEntry::from_pose(&config.parent_link, &config.link, &pose),
            );
        }
    }
    log::info!("estimated the pattern pose in {inserted} collections");
    Ok(inserted)
}

/// Pose of a fixed pattern from the first collection a camera can resolve.
fn shared_estimate(dataset: &Dataset, pattern: &PatternGeometry) -> Result<Iso3> {
    for (collection_key, collection) in &dataset.collections {
        match estimate_from_cameras(dataset, collection_key, collection, pattern) {
            Ok(pose) => return Ok(pose),
            Err(err) => log::debug!("fixed pattern pose not available: {err:#}"),
        }
    }
    bail!("no collection has a camera detecting the fixed pattern")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::{pattern_pose, scene, SceneOptions};

    #[test]
    fn recovers_removed_pattern_poses() {
        let mut ds = scene(&SceneOptions::default());
        for collection in ds.collections.values_mut() {
            collection.transforms.remove("world-pattern");
        }
        assert_eq!(estimate_pattern_poses(&mut ds).unwrap(), 3);
        for (i, collection) in ds.collections.values().enumerate() {
            let entry = &collection.transforms["world-pattern"];
            assert_eq!(entry.parent, "world");
            let truth = pattern_pose(i);
            let pose = entry.pose();
            assert!((pose.translation.vector - truth.translation.vector).norm() < 1e-6);
            assert!(pose.rotation.angle_to(&truth.rotation) < 1e-6);
        }
    }

    #[test]
    fn existing_poses_are_kept() {
        let mut ds = scene(&SceneOptions::default());
        let before = ds.clone();
        assert_eq!(estimate_pattern_poses(&mut ds).unwrap(), 0);
        assert_eq!(ds, before);
    }

    #[test]
    fn fixed_pattern_broadcasts_one_estimate() {
        let mut ds = scene(&SceneOptions {
            fixed_pattern: true,
            ..SceneOptions::default()
        });
        ds.collections.get_mut("1").unwrap().transforms.remove("world-pattern");
        ds.collections.get_mut("2").unwrap().transforms.remove("world-pattern");
        assert_eq!(estimate_pattern_poses(&mut ds).unwrap(), 2);
        let first = ds.collections["0"].transforms["world-pattern"].pose();
        let last = ds.collections["2"].transforms["world-pattern"].pose();
        assert!((first.translation.vector - last.translation.vector).norm() < 1e-12);
        assert!(first.rotation.angle_to(&last.rotation) < 1e-9);
    }

    #[test]
    fn fixed_pattern_is_estimated_from_any_collection() {
        let mut ds = scene(&SceneOptions {
            fixed_pattern: true,
            lidar: false,
            ..SceneOptions::default()
        });
        for collection in ds.collections.values_mut() {
            collection.transforms.remove("world-pattern");
        }
        let first = ds.collections.get_mut("0").unwrap();
        first.labels.get_mut("camera").unwrap().detected = false;

        assert_eq!(estimate_pattern_poses(&mut ds).unwrap(), 3);
        let truth = pattern_pose(0);
        for collection in ds.collections.values() {
            let pose = collection.transforms["world-pattern"].pose();
            assert!((pose.translation.vector - truth.translation.vector).norm() < 1e-6);
            assert!(pose.rotation.angle_to(&truth.rotation) < 1e-6);
        }

        for collection in ds.collections.values_mut() {
            collection.transforms.remove("world-pattern");
            collection.labels.get_mut("camera").unwrap().detected = false;
        }
        let err = estimate_pattern_poses(&mut ds).unwrap_err();
        assert!(err.to_string().contains("fixed pattern"), "{err}");
    }

    #[test]
    fn missing_camera_or_mismatched_entry_is_fatal() {
        let mut ds = scene(&SceneOptions {
            camera: false,
            ..SceneOptions::default()
        });
        ds.collections.get_mut("0").unwrap().transforms.remove("world-pattern");
        assert!(estimate_pattern_poses(&mut ds).is_err());

        let mut ds = scene(&SceneOptions::default());
        let collection = ds.collections.get_mut("0").unwrap();
        let entry = collection.transforms.get_mut("world-pattern").unwrap();
        entry.parent = "base_link".into();
        assert!(estimate_pattern_poses(&mut ds).is_err());
    }
}
