use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

use crate::dataset::TransformEntry;
use crate::math::Iso3;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("no transform path from {source_frame} to {target_frame}")]
    NoPath {
        source_frame: String,
        target_frame: String,
    },
    #[error("transform {0} is missing")]
    MissingTransform(String),
}

/// Deterministic key of the transform `parent -> child`.
///
/// The key is order-sensitive: `transform_key(a, b) != transform_key(b, a)`.
pub fn transform_key(parent: &str, child: &str) -> String {
    format!("{parent}-{child}")
}

/// Key of a transform replicated per collection (e.g. a moving pattern).
pub fn collection_scoped_key(collection_key: &str, key: &str) -> String {
    format!("c{collection_key}_{key}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub key: String,
    /// `true` when the step goes from the transform's parent to its child.
    pub forward: bool,
}

/// Sequence of transform-tree edges linking two frames.
///
/// The topology is resolved once against one collection and then evaluated
/// against any collection sharing the same tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePath {
    pub target: String,
    pub source: String,
    pub steps: Vec<PathStep>,
}

impl FramePath {
    /// Find the path from `target` to `source` in a transform tree.
    pub fn resolve(
        transforms: &BTreeMap<String, TransformEntry>,
        target: &str,
        source: &str,
    ) -> Result<Self, TransformError> {
        let mut adjacency: HashMap<&str, Vec<(&str, &str, bool)>> = HashMap::new();
        for (key, entry) in transforms {
            adjacency
                .entry(entry.parent.as_str())
                .or_default()
                .push((entry.child.as_str(), key.as_str(), true));
            adjacency
                .entry(entry.child.as_str())
                .or_default()
                .push((entry.parent.as_str(), key.as_str(), false));
        }

        let mut previous: HashMap<&str, (&str, &str, bool)> = HashMap::new();
        let mut queue = VecDeque::from([target]);
        let mut found = target == source;
        while let Some(frame) = queue.pop_front() {
            if found {
                break;
            }
            for &(next, key, forward) in adjacency.get(frame).into_iter().flatten() {
                if next == target || previous.contains_key(next) {
                    continue;
                }
                previous.insert(next, (frame, key, forward));
                if next == source {
                    found = true;
                    break;
                }
                queue.push_back(next);
            }
        }

        if !found {
            return Err(TransformError::NoPath {
                source_frame: source.to_string(),
                target_frame: target.to_string(),
            });
        }

        let mut steps = Vec::new();
        let mut frame = source;
        while frame != target {
            let (prev, key, forward) = previous[frame];
            steps.push(PathStep {
                key: key.to_string(),
                forward,
            });
            frame = prev;
        }
        steps.reverse();

        Ok(Self {
            target: target.to_string(),
            source: source.to_string(),
            steps,
        })
    }

    /// Pose mapping points in `source` into `target`.
    pub fn compose(
        &self,
        transforms: &BTreeMap<String, TransformEntry>,
    ) -> Result<Iso3, TransformError> {
        let mut pose = Iso3::identity();
        for step in &self.steps {
            let entry = transforms
                .get(&step.key)
                .ok_or_else(|| TransformError::MissingTransform(step.key.clone()))?;
            let edge = entry.pose();
            pose *= if step.forward { edge } else { edge.inverse() };
        }
        Ok(pose)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.key.as_str())
    }
}

/// Pose mapping points in `source` into `target` for a single lookup.
pub fn lookup_transform(
    transforms: &BTreeMap<String, TransformEntry>,
    target: &str,
    source: &str,
) -> Result<Iso3, TransformError> {
    FramePath::resolve(transforms, target, source)?.compose(transforms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Pt3, Vec3};

    fn entry(parent: &str, child: &str, t: [f64; 3], yaw: f64) -> (String, TransformEntry) {
        let pose = Iso3::new(Vec3::from(t), Vec3::new(0.0, 0.0, yaw));
        (
            transform_key(parent, child),
            TransformEntry::from_pose(parent, child, &pose),
        )
    }

    fn tree() -> BTreeMap<String, TransformEntry> {
        BTreeMap::from([
            entry("world", "base", [1.0, 0.0, 0.0], 0.0),
            entry("base", "camera", [0.0, 0.5, 0.2], 0.3),
            entry("base", "lidar", [0.1, 0.0, 0.8], -0.2),
            entry("world", "pattern", [3.0, 0.0, 0.5], 1.2),
        ])
    }

    #[test]
    fn keys_are_deterministic_and_ordered() {
        assert_eq!(transform_key("base", "camera"), "base-camera");
        assert_eq!(transform_key("base", "camera"), transform_key("base", "camera"));
        assert_ne!(transform_key("a", "b"), transform_key("b", "a"));
        assert_eq!(collection_scoped_key("3", "world-pattern"), "c3_world-pattern");
    }

    #[test]
    fn path_crosses_common_ancestor() {
        let tf = tree();
        let path = FramePath::resolve(&tf, "camera", "pattern").unwrap();
        let keys: Vec<&str> = path.keys().collect();
        assert_eq!(keys, ["base-camera", "world-base", "world-pattern"]);
        assert_eq!(
            path.steps.iter().map(|s| s.forward).collect::<Vec<_>>(),
            [false, false, true]
        );
    }

    #[test]
    fn composed_pose_matches_manual_chain() {
        let tf = tree();
        let t_cam_pattern = lookup_transform(&tf, "camera", "pattern").unwrap();
        let expected = tf["base-camera"].pose().inverse()
            * tf["world-base"].pose().inverse()
            * tf["world-pattern"].pose();
        let p = Pt3::new(0.2, -0.1, 0.0);
        let err = (t_cam_pattern.transform_point(&p) - expected.transform_point(&p)).norm();
        assert!(err < 1e-12);
    }

    #[test]
    fn identity_for_same_frame() {
        let path = FramePath::resolve(&tree(), "lidar", "lidar").unwrap();
        assert!(path.steps.is_empty());
    }

    #[test]
    fn disconnected_frames_error() {
        let err = FramePath::resolve(&tree(), "camera", "nowhere").unwrap_err();
        assert!(matches!(err, TransformError::NoPath { .. }));
    }
}
