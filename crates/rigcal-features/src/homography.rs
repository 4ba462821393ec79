//! Plane-to-image homography by normalized DLT.

use nalgebra::{DMatrix, Matrix3};
use rigcal_core::{Mat3, Pt2, Real};

use crate::FeatureError;

/// Similarity moving points to zero mean and mean distance `sqrt(2)`.
fn normalizing_transform(points: &[Pt2]) -> Mat3 {
    let n = points.len() as Real;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let (mx, my) = (sx / n, sy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    let s = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0)
}

fn apply(h: &Mat3, p: &Pt2) -> Pt2 {
    let v = h * p.to_homogeneous();
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Estimate `H` such that `image ~ H * plane`.
pub fn dlt_homography(plane: &[Pt2], image: &[Pt2]) -> Result<Mat3, FeatureError> {
    let n = plane.len();
    if n < 4 || image.len() != n {
        return Err(FeatureError::NotEnoughPoints(n.min(image.len())));
    }

    let t_plane = normalizing_transform(plane);
    let t_image = normalizing_transform(image);

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in plane.iter().zip(image).enumerate() {
        let w = apply(&t_plane, pw);
        let u = apply(&t_image, pi);
        let (r0, r1) = (2 * i, 2 * i + 1);
        a[(r0, 0)] = -w.x;
        a[(r0, 1)] = -w.y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u.x * w.x;
        a[(r0, 7)] = u.x * w.y;
        a[(r0, 8)] = u.x;
        a[(r1, 3)] = -w.x;
        a[(r1, 4)] = -w.y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = u.y * w.x;
        a[(r1, 7)] = u.y * w.y;
        a[(r1, 8)] = u.y;
    }

    // The null vector of A is the eigenvector of A^T A with the smallest eigenvalue.
    let ata = a.transpose() * &a;
    let eig = ata.symmetric_eigen();
    let (min_idx, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.total_cmp(y.1))
        .ok_or(FeatureError::DegenerateHomography("empty eigen decomposition"))?;
    let h: Vec<Real> = eig.eigenvectors.column(min_idx).iter().copied().collect();
    let h_norm = Matrix3::from_row_slice(&h);

    let t_image_inv = t_image
        .try_inverse()
        .ok_or(FeatureError::DegenerateHomography("image normalization is singular"))?;
    let h = t_image_inv * h_norm * t_plane;
    let scale = h[(2, 2)];
    if scale.abs() < Real::EPSILON {
        return Err(FeatureError::DegenerateHomography("h33 vanishes"));
    }
    Ok(h / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_known_homography() {
        let h_gt = Matrix3::new(1.2, 0.1, 30.0, -0.05, 0.9, 12.0, 1e-4, -2e-4, 1.0);
        let plane: Vec<Pt2> = (0..3)
            .flat_map(|r| (0..4).map(move |c| Pt2::new(c as Real * 10.0, r as Real * 10.0)))
            .collect();
        let image: Vec<Pt2> = plane.iter().map(|p| apply(&h_gt, p)).collect();
        let h = dlt_homography(&plane, &image).unwrap();
        assert!((h - h_gt).norm() < 1e-6, "h = {h}");
    }

    #[test]
    fn needs_four_points() {
        let pts = [Pt2::origin(); 3];
        assert!(matches!(
            dlt_homography(&pts, &pts),
            Err(FeatureError::NotEnoughPoints(3))
        ));
    }
}
