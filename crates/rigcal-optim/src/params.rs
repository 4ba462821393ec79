//! Flat parameter vector over named groups.
//!
//! Each group knows how to read its values from a [`Dataset`] and write them
//! back, so an optimizer only ever deals with a flat `DVector`.

use anyhow::{anyhow, ensure, Context, Result};
use nalgebra::DVector;
use rigcal_core::{
    quat_to_rotation_vector, rotation_vector_to_quat, Dataset, Modality, PinholeCamera, Real,
    Vec3,
};
use std::collections::HashMap;

use crate::registry::TransformRegistry;

/// Suffixes of a transform group: translation then rotation vector.
pub const POSE_SUFFIXES: [&str; 6] = ["_x", "_y", "_z", "_r1", "_r2", "_r3"];

/// Suffixes of a camera intrinsics group.
pub const INTRINSICS_SUFFIXES: [&str; 9] = [
    "_fx", "_fy", "_cx", "_cy", "_k1", "_k2", "_p1", "_p2", "_k3",
];

/// Collections a transform group reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionScope {
    /// Shared by every collection; read from the first one.
    All,
    Collection(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    Transform { key: String, scope: CollectionScope },
    Intrinsics { sensor: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

#[derive(Debug, Clone)]
pub struct ParamGroup {
    pub name: String,
    pub kind: GroupKind,
    pub suffixes: Vec<&'static str>,
    pub lower: Vec<Real>,
    pub upper: Vec<Real>,
    /// Position of the first scalar in the flat vector.
    pub offset: usize,
}

impl ParamGroup {
    pub fn dim(&self) -> usize {
        self.suffixes.len()
    }

    pub fn param_names(&self) -> impl Iterator<Item = String> + '_ {
        self.suffixes.iter().map(|s| format!("{}{}", self.name, s))
    }
}

pub fn intrinsics_group_name(sensor: &str) -> String {
    format!("{sensor}_intrinsics")
}

#[derive(Debug, Clone, Default)]
pub struct ParameterVector {
    groups: Vec<ParamGroup>,
    by_name: HashMap<String, GroupId>,
    dim: usize,
}

impl ParameterVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group. Group names must be unique.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        kind: GroupKind,
        suffixes: &[&'static str],
        lower: Vec<Real>,
        upper: Vec<Real>,
    ) -> Result<GroupId> {
        let name = name.into();
        ensure!(
            !self.by_name.contains_key(&name),
            "parameter group {name} already exists"
        );
        ensure!(
            lower.len() == suffixes.len() && upper.len() == suffixes.len(),
            "group {name}: bounds have {}/{} entries, expected {}",
            lower.len(),
            upper.len(),
            suffixes.len()
        );
        ensure!(
            lower.iter().zip(&upper).all(|(lo, hi)| lo <= hi),
            "group {name}: lower bound exceeds upper bound"
        );

        let id = GroupId(self.groups.len());
        self.groups.push(ParamGroup {
            name: name.clone(),
            kind,
            suffixes: suffixes.to_vec(),
            lower,
            upper,
            offset: self.dim,
        });
        self.dim += suffixes.len();
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of scalar parameters.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> &ParamGroup {
        &self.groups[id.0]
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.by_name.get(name).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.groups.len()).map(GroupId)
    }

    /// Flat parameter names in vector order.
    pub fn names(&self) -> Vec<String> {
        self.groups.iter().flat_map(|g| g.param_names()).collect()
    }

    pub fn lower_bounds(&self) -> DVector<Real> {
        DVector::from_iterator(self.dim, self.groups.iter().flat_map(|g| g.lower.clone()))
    }

    pub fn upper_bounds(&self) -> DVector<Real> {
        DVector::from_iterator(self.dim, self.groups.iter().flat_map(|g| g.upper.clone()))
    }

    /// Project `x` onto the bound box.
    pub fn clamp(&self, x: &DVector<Real>) -> DVector<Real> {
        let lo = self.lower_bounds();
        let hi = self.upper_bounds();
        DVector::from_iterator(
            self.dim,
            x.iter()
                .zip(lo.iter().zip(hi.iter()))
                .map(|(v, (l, h))| v.max(*l).min(*h)),
        )
    }

    /// Read the current value of one group from the dataset.
    pub fn group_values(&self, dataset: &Dataset, id: GroupId) -> Result<Vec<Real>> {
        read_group(dataset, &self.group(id).kind)
    }

    /// Write the value of one group into the dataset.
    pub fn set_group_values(
        &self,
        dataset: &mut Dataset,
        id: GroupId,
        values: &[Real],
    ) -> Result<()> {
        let group = self.group(id);
        ensure!(
            values.len() == group.dim(),
            "group {}: got {} values, expected {}",
            group.name,
            values.len(),
            group.dim()
        );
        write_group(dataset, &group.kind, values).with_context(|| format!("group {}", group.name))
    }

    /// Current flat parameter vector.
    pub fn values(&self, dataset: &Dataset) -> Result<DVector<Real>> {
        let mut x = DVector::zeros(self.dim);
        for id in self.ids() {
            let group = self.group(id);
            let v = self.group_values(dataset, id)?;
            x.rows_mut(group.offset, group.dim()).copy_from_slice(&v);
        }
        Ok(x)
    }

    /// Write a flat parameter vector into the dataset.
    pub fn apply(&self, dataset: &mut Dataset, x: &DVector<Real>) -> Result<()> {
        ensure!(
            x.len() == self.dim,
            "parameter vector has {} entries, expected {}",
            x.len(),
            self.dim
        );
        for id in self.ids() {
            let group = self.group(id);
            let v: Vec<Real> = x.rows(group.offset, group.dim()).iter().copied().collect();
            self.set_group_values(dataset, id, &v)?;
        }
        Ok(())
    }
}

fn read_group(dataset: &Dataset, kind: &GroupKind) -> Result<Vec<Real>> {
    match kind {
        GroupKind::Transform { key, scope } => {
            let collection_key = match scope {
                CollectionScope::All => dataset
                    .first_collection_key()
                    .ok_or_else(|| anyhow!("dataset has no collections"))?,
                CollectionScope::Collection(c) => c.as_str(),
            };
            let entry = dataset
                .collections
                .get(collection_key)
                .and_then(|c| c.transforms.get(key))
                .ok_or_else(|| anyhow!("transform {key} missing in collection {collection_key}"))?;
            let rv = quat_to_rotation_vector(&entry.quat);
            Ok(vec![
                entry.trans[0],
                entry.trans[1],
                entry.trans[2],
                rv.x,
                rv.y,
                rv.z,
            ])
        }
        GroupKind::Intrinsics { sensor } => {
            let info = dataset
                .sensors
                .get(sensor)
                .and_then(|s| s.camera_info.as_ref())
                .ok_or_else(|| anyhow!("sensor {sensor} has no camera info"))?;
            Ok(info.camera().to_params().to_vec())
        }
    }
}

fn write_group(dataset: &mut Dataset, kind: &GroupKind, values: &[Real]) -> Result<()> {
    match kind {
        GroupKind::Transform { key, scope } => {
            let trans = [values[0], values[1], values[2]];
            let quat = rotation_vector_to_quat(&Vec3::new(values[3], values[4], values[5]));
            let mut written = 0;
            for (collection_key, collection) in dataset.collections.iter_mut() {
                if let CollectionScope::Collection(c) = scope {
                    if c != collection_key {
                        continue;
                    }
                }
                let entry = collection.transforms.get_mut(key).ok_or_else(|| {
                    anyhow!("transform {key} missing in collection {collection_key}")
                })?;
                entry.trans = trans;
                entry.quat = quat;
                written += 1;
            }
            ensure!(written > 0, "no collection holds transform {key}");
            Ok(())
        }
        GroupKind::Intrinsics { sensor } => {
            let info = dataset
                .sensors
                .get_mut(sensor)
                .and_then(|s| s.camera_info.as_mut())
                .ok_or_else(|| anyhow!("sensor {sensor} has no camera info"))?;
            let cam = PinholeCamera::from_params(values);
            info.fx = cam.fx;
            info.fy = cam.fy;
            info.cx = cam.cx;
            info.cy = cam.cy;
            info.distortion = cam.dist;
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterOptions {
    pub optimize_intrinsics: bool,
}

/// Register every optimized quantity of a dataset.
///
/// Sensor transforms come first, then the pattern transform(s), then
/// camera intrinsics when requested. The anchored sensor's transform gets
/// bounds of one machine epsilon around its initial value.
pub fn build_parameters(
    dataset: &Dataset,
    registry: &TransformRegistry,
    opts: &ParameterOptions,
) -> Result<ParameterVector> {
    let free = || (vec![Real::NEG_INFINITY; 6], vec![Real::INFINITY; 6]);
    let mut params = ParameterVector::new();

    for key in registry.sensor_transform_keys() {
        let kind = GroupKind::Transform {
            key: key.to_string(),
            scope: CollectionScope::All,
        };
        let (lower, upper) = if registry.is_anchored(key) {
            let v = read_group(dataset, &kind)?;
            (
                v.iter().map(|x| x - Real::EPSILON).collect(),
                v.iter().map(|x| x + Real::EPSILON).collect(),
            )
        } else {
            free()
        };
        params.push(key, kind, &POSE_SUFFIXES, lower, upper)?;
    }

    if registry.pattern_fixed {
        let (lower, upper) = free();
        params.push(
            registry.pattern_key.clone(),
            GroupKind::Transform {
                key: registry.pattern_key.clone(),
                scope: CollectionScope::All,
            },
            &POSE_SUFFIXES,
            lower,
            upper,
        )?;
    } else {
        for collection_key in dataset.collections.keys() {
            let (lower, upper) = free();
            params.push(
                registry.pattern_group_name(collection_key),
                GroupKind::Transform {
                    key: registry.pattern_key.clone(),
                    scope: CollectionScope::Collection(collection_key.clone()),
                },
                &POSE_SUFFIXES,
                lower,
                upper,
            )?;
        }
    }

    if opts.optimize_intrinsics {
        for (name, sensor) in &dataset.sensors {
            if sensor.modality != Modality::Image || sensor.camera_info.is_none() {
                continue;
            }
            params.push(
                intrinsics_group_name(name),
                GroupKind::Intrinsics {
                    sensor: name.clone(),
                },
                &INTRINSICS_SUFFIXES,
                vec![Real::NEG_INFINITY; INTRINSICS_SUFFIXES.len()],
                vec![Real::INFINITY; INTRINSICS_SUFFIXES.len()],
            )?;
        }
    }

    log::debug!(
        "registered {} parameter groups ({} scalars)",
        params.len(),
        params.dim()
    );
    Ok(params)
}
