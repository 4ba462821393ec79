//! Resolution of the unique transforms a calibration optimizes.

use anyhow::{bail, Result};
use rigcal_core::{collection_scoped_key, CalibrationConfig, Sensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformLink {
    pub parent: String,
    pub child: String,
}

/// Deduplicated set of optimized transforms.
///
/// Several sensors may share one transform key; the pattern transform is
/// either shared by all collections (`fixed`) or replicated per collection
/// under a scoped key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRegistry {
    pub transforms: BTreeMap<String, TransformLink>,
    pub sensor_keys: BTreeMap<String, String>,
    pub pattern_key: String,
    pub pattern_fixed: bool,
    pub anchored_key: Option<String>,
}

impl TransformRegistry {
    pub fn resolve(
        sensors: &BTreeMap<String, Sensor>,
        config: &CalibrationConfig,
    ) -> Result<Self> {
        let mut transforms = BTreeMap::new();
        let mut sensor_keys = BTreeMap::new();
        for (name, sensor) in sensors {
            let key = sensor.transform_key();
            transforms.insert(
                key.clone(),
                TransformLink {
                    parent: sensor.parent.clone(),
                    child: sensor.child.clone(),
                },
            );
            sensor_keys.insert(name.clone(), key);
        }

        let pattern = &config.calibration_pattern;
        let pattern_key = pattern.transform_key();
        transforms.insert(
            pattern_key.clone(),
            TransformLink {
                parent: pattern.parent_link.clone(),
                child: pattern.link.clone(),
            },
        );

        let anchored_key = if config.anchored_sensor.is_empty() {
            None
        } else {
            match sensor_keys.get(&config.anchored_sensor) {
                Some(key) => Some(key.clone()),
                None => bail!(
                    "anchored sensor {} is not among the calibrated sensors",
                    config.anchored_sensor
                ),
            }
        };

        Ok(Self {
            transforms,
            sensor_keys,
            pattern_key,
            pattern_fixed: pattern.fixed,
            anchored_key,
        })
    }

    /// Keys of sensor transforms, without the pattern transform.
    pub fn sensor_transform_keys(&self) -> impl Iterator<Item = &str> {
        self.transforms
            .keys()
            .map(String::as_str)
            .filter(|key| *key != self.pattern_key)
    }

    pub fn is_anchored(&self, key: &str) -> bool {
        self.anchored_key.as_deref() == Some(key)
    }

    /// Parameter group name of the pattern transform for one collection.
    pub fn pattern_group_name(&self, collection_key: &str) -> String {
        if self.pattern_fixed {
            self.pattern_key.clone()
        } else {
            collection_scoped_key(collection_key, &self.pattern_key)
        }
    }

    /// Name of the group optimizing transform `key` in a collection, if any.
    pub fn group_name(&self, key: &str, collection_key: &str) -> Option<String> {
        if key == self.pattern_key {
            Some(self.pattern_group_name(collection_key))
        } else if self.transforms.contains_key(key) {
            Some(key.to_string())
        } else {
            None
        }
    }
}
