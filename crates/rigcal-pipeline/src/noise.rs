//! Initial-guess perturbation for robustness experiments.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::Rng;
use rigcal_core::{Dataset, Iso3, Real, Vec3};
use rigcal_optim::TransformRegistry;

use crate::config::NoiseConfig;

/// Uniformly distributed unit vector.
fn random_direction(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        let norm = v.norm();
        if norm > 1e-6 && norm <= 1.0 {
            return v / norm;
        }
    }
}

/// Perturb every non-anchored sensor transform by `noise`.
///
/// Each transform gets one random offset shared by all collections. Returns
/// the keys that were perturbed, in key order.
pub fn add_noise(
    dataset: &mut Dataset,
    registry: &TransformRegistry,
    noise: &NoiseConfig,
    rng: &mut StdRng,
) -> Result<Vec<String>> {
    if noise.is_zero() {
        return Ok(Vec::new());
    }
    let mut perturbed = Vec::new();
    for key in registry.sensor_transform_keys() {
        if registry.is_anchored(key) {
            continue;
        }
        let translation = random_direction(rng) * noise.translation;
        let rotation = random_direction(rng) * noise.rotation;
        let delta = Iso3::new(translation, rotation);
        for (collection_key, collection) in dataset.collections.iter_mut() {
            let entry = collection
                .transforms
                .get_mut(key)
                .ok_or_else(|| anyhow!("transform {key} missing in collection {collection_key}"))?;
            let pose = entry.pose();
            entry.set_pose(&Iso3::from_parts(
                (pose.translation.vector + delta.translation.vector).into(),
                delta.rotation * pose.rotation,
            ));
        }
        log::debug!(
            "{key}: added {:.4} m / {:.4} rad of noise",
            translation.norm(),
            rotation.norm()
        );
        perturbed.push(key.to_string());
    }
    Ok(perturbed)
}

pub fn pose_distance(a: &Iso3, b: &Iso3) -> (Real, Real) {
    (
        (a.translation.vector - b.translation.vector).norm(),
        a.rotation.angle_to(&b.rotation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::{scene, SceneOptions};
    use rigcal_optim::run_rng;

    #[test]
    fn noise_has_requested_magnitude_and_spares_anchor() {
        let mut ds = scene(&SceneOptions {
            anchored_sensor: "camera".into(),
            ..SceneOptions::default()
        });
        let original = ds.clone();
        let registry = TransformRegistry::resolve(&ds.sensors, &ds.calibration_config).unwrap();
        let (mut rng, _) = run_rng(Some(5));
        let noise = NoiseConfig {
            translation: 0.1,
            rotation: 0.05,
        };
        let keys = add_noise(&mut ds, &registry, &noise, &mut rng).unwrap();
        assert_eq!(keys, ["base_link-laser", "base_link-lidar"]);

        for (collection_key, collection) in &ds.collections {
            let before = &original.collections[collection_key].transforms;
            for (key, entry) in &collection.transforms {
                let (dt, dr) = pose_distance(&entry.pose(), &before[key].pose());
                if keys.contains(key) {
                    assert!((dt - 0.1).abs() < 1e-9, "{key}: {dt}");
                    assert!((dr - 0.05).abs() < 1e-9, "{key}: {dr}");
                } else {
                    assert!(dt < 1e-12 && dr < 1e-12, "{key} moved");
                }
            }
        }
    }

    #[test]
    fn same_seed_same_noise() {
        let base = scene(&SceneOptions::default());
        let registry = TransformRegistry::resolve(&base.sensors, &base.calibration_config).unwrap();
        let noise = NoiseConfig {
            translation: 0.05,
            rotation: 0.0,
        };
        let mut a = base.clone();
        let mut b = base;
        add_noise(&mut a, &registry, &noise, &mut run_rng(Some(1)).0).unwrap();
        add_noise(&mut b, &registry, &noise, &mut run_rng(Some(1)).0).unwrap();
        assert_eq!(a.collections, b.collections);
    }
}
