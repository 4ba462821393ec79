use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Quaternion, Translation3, UnitQuaternion, Vector2,
    Vector3,
};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Iso3 = Isometry3<Real>;

/// Build a pose from a translation and a quaternion stored as `[x, y, z, w]`.
pub fn iso3_from_parts(trans: &[Real; 3], quat: &[Real; 4]) -> Iso3 {
    let q = UnitQuaternion::from_quaternion(Quaternion::new(quat[3], quat[0], quat[1], quat[2]));
    Iso3::from_parts(Translation3::new(trans[0], trans[1], trans[2]), q)
}

/// Split a pose into a translation and a quaternion stored as `[x, y, z, w]`.
pub fn iso3_to_parts(pose: &Iso3) -> ([Real; 3], [Real; 4]) {
    let t = pose.translation.vector;
    let q = pose.rotation.coords;
    ([t.x, t.y, t.z], [q[0], q[1], q[2], q[3]])
}

/// Rotation vector (axis scaled by angle) of a quaternion stored as `[x, y, z, w]`.
pub fn quat_to_rotation_vector(quat: &[Real; 4]) -> Vec3 {
    UnitQuaternion::from_quaternion(Quaternion::new(quat[3], quat[0], quat[1], quat[2]))
        .scaled_axis()
}

/// Quaternion `[x, y, z, w]` from a rotation vector.
pub fn rotation_vector_to_quat(rv: &Vec3) -> [Real; 4] {
    let q = UnitQuaternion::from_scaled_axis(*rv);
    [q.i, q.j, q.k, q.w]
}

/// Static-axes XYZ Euler angles `(roll, pitch, yaw)` of a quaternion `[x, y, z, w]`.
///
/// This is the convention used by URDF joint origins.
pub fn quat_to_rpy(quat: &[Real; 4]) -> [Real; 3] {
    let (roll, pitch, yaw) =
        UnitQuaternion::from_quaternion(Quaternion::new(quat[3], quat[0], quat[1], quat[2]))
            .euler_angles();
    [roll, pitch, yaw]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_vector_round_trip() {
        let rv = Vec3::new(0.3, -0.2, 1.1);
        let back = quat_to_rotation_vector(&rotation_vector_to_quat(&rv));
        assert!((back - rv).norm() < 1e-12, "round trip drifted: {back:?}");
    }

    #[test]
    fn rpy_matches_static_xyz() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.4, 0.7);
        let rpy = quat_to_rpy(&[q.i, q.j, q.k, q.w]);
        assert!((rpy[0] - 0.1).abs() < 1e-12);
        assert!((rpy[1] + 0.4).abs() < 1e-12);
        assert!((rpy[2] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn parts_round_trip() {
        let pose = Iso3::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.5, 0.0));
        let (t, q) = iso3_to_parts(&pose);
        let back = iso3_from_parts(&t, &q);
        assert!((back.translation.vector - pose.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&pose.rotation) < 1e-12);
    }
}
