//! Dataset filtering before a run.

use anyhow::{ensure, Result};
use log::{debug, info};
use rigcal_core::{Dataset, Modality};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub removed_sensors: Vec<String>,
    pub removed_collections: Vec<String>,
    /// `(collection, sensor)` camera detections dropped as partial.
    pub partial_detections: Vec<(String, String)>,
}

/// Apply the selection and completeness policies of `config` in place.
///
/// An empty result is an error.
pub fn filter_dataset(dataset: &mut Dataset, config: &RunConfig) -> Result<FilterSummary> {
    let mut summary = FilterSummary::default();

    let removed: Vec<String> = dataset
        .sensors
        .keys()
        .filter(|name| !config.sensor_selection.matches(name))
        .cloned()
        .collect();
    for name in &removed {
        dataset.sensors.remove(name);
        for collection in dataset.collections.values_mut() {
            collection.data.remove(name);
            collection.labels.remove(name);
        }
        debug!("sensor {name} deselected");
    }
    summary.removed_sensors = removed;
    ensure!(!dataset.sensors.is_empty(), "no sensors left after selection");

    dataset.collections.retain(|key, _| {
        let keep = config.collection_selection.matches(key);
        if !keep {
            summary.removed_collections.push(key.clone());
        }
        keep
    });

    if config.remove_partial_detections {
        let num_corners = dataset.pattern().num_corners();
        for (collection_key, collection) in dataset.collections.iter_mut() {
            for (sensor_key, sensor) in &dataset.sensors {
                if sensor.modality != Modality::Image {
                    continue;
                }
                let Some(label) = collection.labels.get_mut(sensor_key) else {
                    continue;
                };
                if label.detected && label.corners.len() < num_corners {
                    debug!(
                        "{collection_key}/{sensor_key}: partial detection ({} of {num_corners} corners)",
                        label.corners.len()
                    );
                    label.detected = false;
                    summary
                        .partial_detections
                        .push((collection_key.clone(), sensor_key.clone()));
                }
            }
        }
    }

    let sensors = &dataset.sensors;
    dataset.collections.retain(|key, collection| {
        let detections = sensors.keys().filter(|s| collection.detected(s)).count();
        let keep = if config.use_incomplete_collections {
            detections > 0
        } else {
            detections == sensors.len()
        };
        if !keep {
            debug!(
                "collection {key} dropped ({detections} of {} sensors detect the pattern)",
                sensors.len()
            );
            summary.removed_collections.push(key.clone());
        }
        keep
    });
    summary.removed_collections.sort();

    ensure!(
        !dataset.collections.is_empty(),
        "no collections left after filtering"
    );
    info!(
        "filtered dataset: {} sensors, {} collections ({} removed)",
        dataset.sensors.len(),
        dataset.collections.len(),
        summary.removed_collections.len()
    );
    Ok(summary)
}
