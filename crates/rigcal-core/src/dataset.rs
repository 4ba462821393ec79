use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::camera::PinholeCamera;
use crate::frames::transform_key;
use crate::math::{iso3_from_parts, iso3_to_parts, Iso3, Real};

/// Sensor modality, serialized with the ROS message type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// Camera observing pattern corners.
    Image,
    /// Planar range scanner.
    LaserScan,
    /// 3D point cloud (multi-beam LiDAR).
    PointCloud2,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Image => "Image",
            Modality::LaserScan => "LaserScan",
            Modality::PointCloud2 => "PointCloud2",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera intrinsics with OpenCV-ordered distortion `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub distortion: [Real; 5],
}

impl CameraInfo {
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera {
            fx: self.fx,
            fy: self.fy,
            cx: self.cx,
            cy: self.cy,
            dist: self.distortion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Frame in which the sensor data is expressed.
    pub link: String,
    /// Parent frame of the calibrated transform.
    pub parent: String,
    /// Child frame of the calibrated transform.
    pub child: String,
    #[serde(rename = "msg_type")]
    pub modality: Modality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_info: Option<CameraInfo>,
}

impl Sensor {
    /// Key of the transform optimized for this sensor.
    pub fn transform_key(&self) -> String {
        transform_key(&self.parent, &self.child)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSize {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BorderSize {
    pub x: Real,
    pub y: Real,
}

/// Calibration pattern description.
///
/// `dimension` counts inner corners; `size` is the square side in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub link: String,
    pub parent_link: String,
    /// `true` if the pattern does not move between collections.
    #[serde(default)]
    pub fixed: bool,
    pub dimension: GridSize,
    pub size: Real,
    #[serde(default)]
    pub border_size: BorderSize,
}

impl PatternConfig {
    pub fn transform_key(&self) -> String {
        transform_key(&self.parent_link, &self.link)
    }

    pub fn num_corners(&self) -> usize {
        self.dimension.x * self.dimension.y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub world_link: String,
    /// Sensor whose transform is pinned; empty for none.
    #[serde(default)]
    pub anchored_sensor: String,
    pub calibration_pattern: PatternConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_file: Option<String>,
}

/// Raw sensor measurement for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SensorData {
    Image {
        /// Image path, relative to the dataset file.
        filename: String,
    },
    LaserScan {
        angle_min: Real,
        angle_increment: Real,
        ranges: Vec<Real>,
    },
    PointCloud2 {
        points: Vec<[Real; 3]>,
    },
}

/// Labelled pattern corner in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub id: usize,
    pub x: Real,
    pub y: Real,
}

/// Detection result for one sensor in one collection, with derived features.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Label {
    pub detected: bool,
    /// Camera corners.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corners: Vec<Corner>,
    /// Range-scan ray indices or point-cloud point indices on the pattern.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub idxs: Vec<usize>,
    /// Positions into the sorted `idxs` of inner pattern edges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edge_idxs: Vec<usize>,
    /// Homogeneous points `[x, y, z, 1]` in the sensor frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labelled_points: Vec<[Real; 4]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limit_points: Vec<[Real; 4]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middle_points: Vec<[Real; 4]>,
    /// Indices into `labelled_points` used by the orthogonal residuals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<usize>>,
}

/// One edge of the transform tree of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformEntry {
    pub parent: String,
    pub child: String,
    pub trans: [Real; 3],
    /// Quaternion `[x, y, z, w]`.
    pub quat: [Real; 4],
}

impl TransformEntry {
    pub fn from_pose(parent: &str, child: &str, pose: &Iso3) -> Self {
        let (trans, quat) = iso3_to_parts(pose);
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
            trans,
            quat,
        }
    }

    /// Pose mapping child-frame points into the parent frame.
    pub fn pose(&self) -> Iso3 {
        iso3_from_parts(&self.trans, &self.quat)
    }

    pub fn set_pose(&mut self, pose: &Iso3) {
        let (trans, quat) = iso3_to_parts(pose);
        self.trans = trans;
        self.quat = quat;
    }
}

/// One synchronized snapshot across all sensors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub data: BTreeMap<String, SensorData>,
    #[serde(default)]
    pub labels: BTreeMap<String, Label>,
    pub transforms: BTreeMap<String, TransformEntry>,
}

impl Collection {
    /// `true` if the sensor has a label with a positive detection.
    pub fn detected(&self, sensor_key: &str) -> bool {
        self.labels.get(sensor_key).is_some_and(|l| l.detected)
    }
}

/// Root aggregate of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub calibration_config: CalibrationConfig,
    pub sensors: BTreeMap<String, Sensor>,
    pub collections: BTreeMap<String, Collection>,
}

impl Dataset {
    /// Key of the first collection, used as the representative for shared values.
    pub fn first_collection_key(&self) -> Option<&str> {
        self.collections.keys().next().map(String::as_str)
    }

    pub fn pattern(&self) -> &PatternConfig {
        &self.calibration_config.calibration_pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_uses_message_type_names() {
        let json = serde_json::to_string(&Modality::PointCloud2).unwrap();
        assert_eq!(json, "\"PointCloud2\"");
        let m: Modality = serde_json::from_str("\"LaserScan\"").unwrap();
        assert_eq!(m, Modality::LaserScan);
    }

    #[test]
    fn label_omits_empty_features() {
        let label = Label {
            detected: true,
            idxs: vec![1, 2, 3],
            ..Label::default()
        };
        let json = serde_json::to_string(&label).unwrap();
        assert!(!json.contains("edge_idxs"));
        assert!(!json.contains("samples"));
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }

    #[test]
    fn sensor_data_is_tagged() {
        let data = SensorData::LaserScan {
            angle_min: -1.0,
            angle_increment: 0.01,
            ranges: vec![1.0, 2.0],
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["type"], "LaserScan");
    }

    #[test]
    fn pattern_config_ignores_the_board_kind() {
        let json = r#"{
            "link": "pattern",
            "parent_link": "world",
            "pattern_type": "chessboard",
            "dimension": {"x": 9, "y": 6},
            "size": 0.1
        }"#;
        let pattern: PatternConfig = serde_json::from_str(json).unwrap();
        assert!(!pattern.fixed);
        assert_eq!(pattern.num_corners(), 54);
        assert_eq!(pattern.border_size, BorderSize::default());
    }
}
