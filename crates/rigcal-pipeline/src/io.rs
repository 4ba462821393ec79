//! JSON file helpers.

use anyhow::{Context, Result};
use rigcal_core::Dataset;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::config::RunConfig;
use crate::description::KinematicDescription;

pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

pub fn write_json_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let dataset: Dataset = load_json_file(path)?;
    log::info!(
        "loaded {}: {} sensors, {} collections",
        path.display(),
        dataset.sensors.len(),
        dataset.collections.len()
    );
    Ok(dataset)
}

pub fn save_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    write_json_file(dataset, path)
}

pub fn load_config(path: &Path) -> Result<RunConfig> {
    load_json_file(path)
}

pub fn load_description(path: &Path) -> Result<KinematicDescription> {
    load_json_file(path)
}

pub fn save_description(description: &KinematicDescription, path: &Path) -> Result<()> {
    write_json_file(description, path)
}
