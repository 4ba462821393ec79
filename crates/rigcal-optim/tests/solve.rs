use rigcal_core::synthetic::{laser_pose, lidar_pose, scene, SceneOptions};
use rigcal_core::{Dataset, Iso3, Vec3};
use rigcal_features::{extract_features, ExtractOptions};
use rigcal_optim::{run_rng, CalibrationProblem, LmBackend, ProblemOptions, SolveOptions};

fn nudge(ds: &mut Dataset, key: &str, delta: &Iso3) {
    for collection in ds.collections.values_mut() {
        let entry = collection.transforms.get_mut(key).unwrap();
        let pose = entry.pose() * delta;
        entry.set_pose(&pose);
    }
}

fn anchored_scene() -> Dataset {
    let mut ds = scene(&SceneOptions {
        anchored_sensor: "camera".into(),
        ..SceneOptions::default()
    });
    extract_features(&mut ds, &ExtractOptions::default()).unwrap();
    ds
}

fn pose_error(ds: &Dataset, key: &str, truth: &Iso3) -> (f64, f64) {
    let pose = ds.collections["0"].transforms[key].pose();
    (
        (pose.translation.vector - truth.translation.vector).norm(),
        pose.rotation.angle_to(&truth.rotation),
    )
}

#[test]
fn lm_recovers_perturbed_extrinsics() {
    let mut ds = anchored_scene();
    nudge(
        &mut ds,
        "base_link-laser",
        &Iso3::new(Vec3::new(0.02, -0.01, 0.0), Vec3::new(0.0, 0.0, 0.02)),
    );
    nudge(
        &mut ds,
        "base_link-lidar",
        &Iso3::new(Vec3::new(-0.015, 0.0, 0.01), Vec3::new(0.01, -0.01, 0.0)),
    );
    let sensors = [("base_link-laser", laser_pose()), ("base_link-lidar", lidar_pose())];
    let before: Vec<(f64, f64)> = sensors
        .iter()
        .map(|(key, truth)| pose_error(&ds, key, truth))
        .collect();

    let (mut rng, _) = run_rng(Some(11));
    let problem = CalibrationProblem::build(&mut ds, &ProblemOptions::default(), &mut rng).unwrap();
    let camera = problem.params.group_id("base_link-camera").unwrap();
    let anchored_before = problem.params.group_values(&ds, camera).unwrap();

    let opts = SolveOptions {
        max_iters: 30,
        xtol: 1e-8,
        ..SolveOptions::default()
    };
    let report = LmBackend.solve(&problem, &mut ds, &opts).unwrap();
    assert!(report.converged, "solver did not converge: {report:?}");
    assert!(report.final_cost < 1e-6, "cost stayed high: {report:?}");

    for ((key, truth), (dt0, dr0)) in sensors.iter().zip(&before) {
        let (dt, dr) = pose_error(&ds, key, truth);
        assert!(dt < 1e-4 && dt < *dt0, "{key}: translation error {dt0} -> {dt}");
        assert!(dr < 1e-4 && dr < *dr0, "{key}: rotation error {dr0} -> {dr}");
    }

    let anchored_after = problem.params.group_values(&ds, camera).unwrap();
    for (a, b) in anchored_before.iter().zip(&anchored_after) {
        assert!((a - b).abs() < 1e-12, "anchored transform moved: {a} -> {b}");
    }
}

#[test]
fn solution_stays_inside_bounds() {
    let mut ds = anchored_scene();
    nudge(
        &mut ds,
        "base_link-laser",
        &Iso3::new(Vec3::new(0.01, 0.0, 0.0), Vec3::zeros()),
    );
    let (mut rng, _) = run_rng(Some(12));
    let problem = CalibrationProblem::build(&mut ds, &ProblemOptions::default(), &mut rng).unwrap();
    LmBackend
        .solve(
            &problem,
            &mut ds,
            &SolveOptions {
                max_iters: 5,
                ..SolveOptions::default()
            },
        )
        .unwrap();

    let x = problem.params.values(&ds).unwrap();
    let lo = problem.params.lower_bounds();
    let hi = problem.params.upper_bounds();
    for i in 0..x.len() {
        let slack = 1e-12 * x[i].abs().max(1.0);
        assert!(x[i] >= lo[i] - slack && x[i] <= hi[i] + slack, "parameter {i} left its bounds");
    }
}
