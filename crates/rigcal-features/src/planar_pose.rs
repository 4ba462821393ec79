//! Pose of a planar target from its homography.

use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};
use rigcal_core::{Iso3, Mat3, Pt2, Real};

use crate::homography::dlt_homography;
use crate::FeatureError;

/// Decompose `H` (plane `z = 0` to pixels) into the pose `T_camera_plane`.
pub fn planar_pose_from_homography(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, FeatureError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(FeatureError::DegenerateHomography("intrinsics matrix is singular"))?;
    let m = k_inv * hmtx;
    let h1 = m.column(0).into_owned();
    let h2 = m.column(1).into_owned();
    let h3 = m.column(2).into_owned();

    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm <= Real::EPSILON {
        return Err(FeatureError::DegenerateHomography("vanishing rotation columns"));
    }
    // The target must be in front of the camera.
    let lambda = if h3.z >= 0.0 { 1.0 / norm } else { -1.0 / norm };

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let t = h3 * lambda;

    let r_approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r_approx.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(FeatureError::DegenerateHomography("svd failed"));
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

/// Pose `T_camera_plane` from plane points and their normalized image coordinates.
pub fn planar_pose(plane: &[Pt2], normalized: &[Pt2]) -> Result<Iso3, FeatureError> {
    let h = dlt_homography(plane, normalized)?;
    planar_pose_from_homography(&Mat3::identity(), &h)
}
