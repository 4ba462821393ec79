//! Export of calibrated transforms to a kinematic description.

use anyhow::{anyhow, Result};
use rigcal_core::{quat_to_rpy, Dataset, Real};
use rigcal_optim::TransformRegistry;
use serde::{Deserialize, Serialize};

/// Joint of a robot description, origin given as `xyz` + static-axes `rpy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub parent: String,
    pub child: String,
    pub xyz: [Real; 3],
    pub rpy: [Real; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicDescription {
    pub joints: Vec<Joint>,
}

/// Final value of one optimized transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedJoint {
    pub key: String,
    pub parent: String,
    pub child: String,
    pub trans: [Real; 3],
    /// `[x, y, z, w]`.
    pub quat: [Real; 4],
    pub rpy: [Real; 3],
}

/// Calibrated sensor transforms, read from the first collection.
pub fn calibrated_joints(
    dataset: &Dataset,
    registry: &TransformRegistry,
) -> Result<Vec<CalibratedJoint>> {
    let collection = dataset
        .collections
        .values()
        .next()
        .ok_or_else(|| anyhow!("dataset has no collections"))?;
    registry
        .sensor_transform_keys()
        .map(|key| {
            let entry = collection
                .transforms
                .get(key)
                .ok_or_else(|| anyhow!("transform {key} missing"))?;
            Ok(CalibratedJoint {
                key: key.to_string(),
                parent: entry.parent.clone(),
                child: entry.child.clone(),
                trans: entry.trans,
                quat: entry.quat,
                rpy: quat_to_rpy(&entry.quat),
            })
        })
        .collect()
}

/// Overwrite the origins of the joints matching calibrated transforms.
///
/// A calibrated transform without a joint of the same parent and child is
/// an error.
pub fn update_description(
    description: &mut KinematicDescription,
    calibrated: &[CalibratedJoint],
) -> Result<()> {
    for joint in calibrated {
        let target = description
            .joints
            .iter_mut()
            .find(|j| j.parent == joint.parent && j.child == joint.child)
            .ok_or_else(|| {
                anyhow!(
                    "description has no joint from {} to {}",
                    joint.parent,
                    joint.child
                )
            })?;
        target.xyz = joint.trans;
        target.rpy = joint.rpy;
        log::debug!("joint {} updated", target.name);
    }
    Ok(())
}
