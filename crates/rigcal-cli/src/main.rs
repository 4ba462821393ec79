use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use rigcal_pipeline::{
    load_config, load_dataset, load_description, run_calibration, save_dataset,
    save_description, update_description, CalibrationReport, RunConfig, Selector,
};

/// Extrinsic calibration of a multi-sensor rig from pattern observations.
#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-sensor extrinsic calibration")]
struct Args {
    /// Labelled dataset JSON.
    #[arg(long)]
    dataset: PathBuf,

    /// Where to write the calibrated dataset.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Optional RunConfig JSON; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fraction of labelled cloud points used for plane residuals.
    #[arg(long)]
    sample_fraction: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    optimize_intrinsics: bool,

    /// Collection predicate, e.g. "index < 10 && !name in {3}".
    #[arg(long)]
    collection_selection: Option<Selector>,

    /// Sensor predicate, e.g. "name in {left_camera, lidar}".
    #[arg(long)]
    sensor_selection: Option<Selector>,

    /// Noise added to the initial sensor translations, meters.
    #[arg(long)]
    noise_translation: Option<f64>,

    /// Noise added to the initial sensor rotations, radians.
    #[arg(long)]
    noise_rotation: Option<f64>,

    #[arg(long)]
    use_incomplete_collections: bool,

    #[arg(long)]
    remove_partial_detections: bool,

    #[arg(long)]
    max_iters: Option<usize>,

    /// Kinematic description JSON whose joints receive the calibrated origins.
    #[arg(long)]
    description: Option<PathBuf>,

    /// Where to write the updated description (defaults to overwriting it).
    #[arg(long)]
    joints_output: Option<PathBuf>,
}

impl Args {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => RunConfig::default(),
        };
        if let Some(f) = self.sample_fraction {
            config.sample_fraction = f;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.optimize_intrinsics |= self.optimize_intrinsics;
        if let Some(s) = &self.collection_selection {
            config.collection_selection = s.clone();
        }
        if let Some(s) = &self.sensor_selection {
            config.sensor_selection = s.clone();
        }
        if let Some(t) = self.noise_translation {
            config.noise.translation = t;
        }
        if let Some(r) = self.noise_rotation {
            config.noise.rotation = r;
        }
        config.use_incomplete_collections |= self.use_incomplete_collections;
        config.remove_partial_detections |= self.remove_partial_detections;
        if let Some(n) = self.max_iters {
            config.solver.max_iters = n;
        }
        if config.image_root.is_none() {
            config.image_root = self.dataset.parent().map(Path::to_path_buf);
        }
        Ok(config)
    }
}

fn calibrate_from_files(args: &Args) -> Result<CalibrationReport> {
    let config = args.run_config()?;
    let mut dataset = load_dataset(&args.dataset)?;
    let report = run_calibration(&mut dataset, &config)?;

    if let Some(output) = &args.output {
        save_dataset(&dataset, output)?;
        log::info!("calibrated dataset written to {}", output.display());
    }
    if let Some(path) = &args.description {
        let mut description = load_description(path)?;
        update_description(&mut description, &report.joints)?;
        let target = args.joints_output.as_deref().unwrap_or(path);
        save_description(&description, target)?;
        log::info!("description written to {}", target.display());
    }
    Ok(report)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let report = calibrate_from_files(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_core::synthetic::{scene, SceneOptions};
    use rigcal_pipeline::{Joint, KinematicDescription};
    use tempfile::tempdir;

    fn joint(name: &str, child: &str) -> Joint {
        Joint {
            name: name.into(),
            parent: "base_link".into(),
            child: child.into(),
            xyz: [0.0; 3],
            rpy: [0.0; 3],
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "seed": 1, "sample_fraction": 0.2 }"#).unwrap();

        let args = Args::parse_from([
            "rigcal",
            "--dataset",
            "data/dataset.json",
            "--config",
            config_path.to_str().unwrap(),
            "--seed",
            "5",
            "--sensor-selection",
            "!name in {lidar}",
            "--noise-rotation",
            "0.1",
        ]);
        let config = args.run_config().unwrap();
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.sample_fraction, 0.2);
        assert!(!config.sensor_selection.matches("lidar"));
        assert_eq!(config.noise.rotation, 0.1);
        assert_eq!(config.image_root.as_deref(), Some(Path::new("data")));
    }

    #[test]
    fn malformed_selection_is_rejected_by_the_parser() {
        let res = Args::try_parse_from([
            "rigcal",
            "--dataset",
            "d.json",
            "--collection-selection",
            "index <",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn end_to_end_from_files() {
        let dir = tempdir().unwrap();
        let dataset_path = dir.path().join("dataset.json");
        let output_path = dir.path().join("calibrated.json");
        let description_path = dir.path().join("robot.json");
        let joints_path = dir.path().join("robot_calibrated.json");

        let ds = scene(&SceneOptions {
            anchored_sensor: "camera".into(),
            ..SceneOptions::default()
        });
        save_dataset(&ds, &dataset_path).unwrap();
        let description = KinematicDescription {
            joints: vec![
                joint("camera_joint", "camera"),
                joint("laser_joint", "laser"),
                joint("lidar_joint", "lidar"),
            ],
        };
        save_description(&description, &description_path).unwrap();

        let args = Args::parse_from([
            "rigcal",
            "--dataset",
            dataset_path.to_str().unwrap(),
            "--output",
            output_path.to_str().unwrap(),
            "--seed",
            "4",
            "--noise-translation",
            "0.01",
            "--max-iters",
            "20",
            "--description",
            description_path.to_str().unwrap(),
            "--joints-output",
            joints_path.to_str().unwrap(),
        ]);
        let report = calibrate_from_files(&args).expect("cli helper should succeed");
        assert!(report.solve.final_cost <= report.solve.initial_cost);

        let calibrated = load_dataset(&output_path).unwrap();
        assert_eq!(calibrated.collections.len(), 3);
        let updated = load_description(&joints_path).unwrap();
        let laser = &report.joints[1];
        assert_eq!(updated.joints[1].xyz, laser.trans);
        assert_eq!(load_description(&description_path).unwrap(), description);
    }
}
