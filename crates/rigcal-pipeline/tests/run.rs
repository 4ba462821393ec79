use rigcal_core::synthetic::{laser_pose, lidar_pose, scene, SceneOptions};
use rigcal_core::Dataset;
use rigcal_pipeline::noise::pose_distance;
use rigcal_pipeline::{
    load_dataset, run_calibration, save_dataset, NoiseConfig, RunConfig, Selector,
};
use tempfile::tempdir;

fn anchored_scene() -> Dataset {
    scene(&SceneOptions {
        anchored_sensor: "camera".into(),
        ..SceneOptions::default()
    })
}

fn noisy_config(seed: u64) -> RunConfig {
    RunConfig {
        seed: Some(seed),
        sample_fraction: 0.5,
        noise: NoiseConfig {
            translation: 0.02,
            rotation: 0.01,
        },
        ..RunConfig::default()
    }
}

#[test]
fn noisy_extrinsics_are_refined() {
    let mut ds = anchored_scene();
    let report = run_calibration(&mut ds, &noisy_config(17)).unwrap();

    assert_eq!(report.seed, 17);
    assert_eq!(report.noisy_transforms, ["base_link-laser", "base_link-lidar"]);
    assert!(report.solve.converged, "solver did not converge: {:?}", report.solve);
    assert!(report.solve.final_cost < 1e-6 * report.solve.initial_cost);
    for sensor in ["laser", "lidar"] {
        let before = report.initial_errors.sensors[sensor].mean;
        let after = report.final_errors.sensors[sensor].mean;
        assert!(after < before, "{sensor}: {before} -> {after}");
    }
    for (key, truth) in [("base_link-laser", laser_pose()), ("base_link-lidar", lidar_pose())] {
        let (dt, dr) = pose_distance(&ds.collections["0"].transforms[key].pose(), &truth);
        assert!(dt < 1e-4 && dr < 1e-4, "{key} ended {dt} m / {dr} rad from the truth");
    }
    assert_eq!(report.joints.len(), 3);
    assert_eq!(report.num_params, 6 * 3 + 6 * 3);

    for collection in ds.collections.values() {
        assert!(collection.labels["lidar"].samples.is_some());
    }
}

#[test]
fn same_seed_reproduces_the_run() {
    let mut a = anchored_scene();
    let mut b = anchored_scene();
    let ra = run_calibration(&mut a, &noisy_config(3)).unwrap();
    let rb = run_calibration(&mut b, &noisy_config(3)).unwrap();
    assert_eq!(ra, rb);
    assert_eq!(a, b);
}

#[test]
fn missing_pattern_poses_are_seeded_from_the_camera() {
    let mut ds = anchored_scene();
    for collection in ds.collections.values_mut() {
        collection.transforms.remove("world-pattern");
    }
    let config = RunConfig {
        seed: Some(1),
        sensor_selection: Selector::parse("name in {camera}").unwrap(),
        ..RunConfig::default()
    };
    let report = run_calibration(&mut ds, &config).unwrap();
    assert_eq!(report.estimated_pattern_poses, 3);
    assert_eq!(report.filter.removed_sensors, ["laser", "lidar"]);
    assert!(report.final_errors.sensors["camera"].mean < 1e-3);
}

#[test]
fn calibrated_dataset_can_be_saved_and_reloaded() {
    let mut ds = anchored_scene();
    let config = RunConfig {
        seed: Some(2),
        collection_selection: Selector::parse("index <= 1").unwrap(),
        ..RunConfig::default()
    };
    run_calibration(&mut ds, &config).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("calibrated.json");
    save_dataset(&ds, &path).unwrap();
    let back = load_dataset(&path).unwrap();
    assert_eq!(back.collections.len(), 2);
    assert_eq!(
        back.collections["0"].labels["laser"].edge_idxs,
        ds.collections["0"].labels["laser"].edge_idxs
    );
    assert_eq!(
        back.collections["1"].labels["lidar"].samples,
        ds.collections["1"].labels["lidar"].samples
    );
}
