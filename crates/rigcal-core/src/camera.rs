use serde::{Deserialize, Serialize};

use crate::math::{Real, Vec2, Vec3};

/// Smallest depth used when projecting points at or behind the image plane.
pub const MIN_PROJECTION_DEPTH: Real = 1e-6;

const UNDISTORT_ITERS: usize = 20;

/// Pinhole camera with Brown-Conrady distortion `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub dist: [Real; 5],
}

impl PinholeCamera {
    /// Apply radial-tangential distortion to normalized coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let [k1, k2, p1, p2, k3] = self.dist;
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let xy = x * y;
        Vec2::new(
            x * radial + 2.0 * p1 * xy + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * xy,
        )
    }

    /// Invert [`Self::distort`] by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut n = *n_dist;
        for _ in 0..UNDISTORT_ITERS {
            let err = self.distort(&n) - n_dist;
            n -= err;
        }
        n
    }

    /// Normalized, undistorted coordinates of a pixel.
    pub fn pixel_to_normalized(&self, px: &Vec2) -> Vec2 {
        let n_dist = Vec2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy);
        self.undistort(&n_dist)
    }

    /// Project a camera-frame point; `None` if it lies at or behind the camera.
    pub fn project(&self, p_c: &Vec3) -> Option<Vec2> {
        if p_c.z <= 0.0 {
            return None;
        }
        Some(self.project_clamped(p_c))
    }

    /// Project a camera-frame point, flooring its depth at [`MIN_PROJECTION_DEPTH`].
    ///
    /// Always finite, so it can be used inside objective functions that are
    /// evaluated at arbitrary parameter states.
    pub fn project_clamped(&self, p_c: &Vec3) -> Vec2 {
        let z = p_c.z.max(MIN_PROJECTION_DEPTH);
        let n = self.distort(&Vec2::new(p_c.x / z, p_c.y / z));
        Vec2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    /// Pack as `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
    pub fn to_params(&self) -> [Real; 9] {
        let [k1, k2, p1, p2, k3] = self.dist;
        [self.fx, self.fy, self.cx, self.cy, k1, k2, p1, p2, k3]
    }

    pub fn from_params(p: &[Real]) -> Self {
        Self {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
            dist: [p[4], p[5], p[6], p[7], p[8]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> PinholeCamera {
        PinholeCamera {
            fx: 800.0,
            fy: 780.0,
            cx: 640.0,
            cy: 360.0,
            dist: [0.0; 5],
        }
    }

    #[test]
    fn projects_optical_axis_to_principal_point() {
        let uv = camera().project(&Vec3::new(0.0, 0.0, 2.0)).unwrap();
        assert!((uv - Vec2::new(640.0, 360.0)).norm() < 1e-12);
    }

    #[test]
    fn rejects_points_behind_camera() {
        assert!(camera().project(&Vec3::new(0.1, 0.0, -1.0)).is_none());
        let uv = camera().project_clamped(&Vec3::new(0.0, 0.0, -1.0));
        assert!(uv.x.is_finite() && uv.y.is_finite());
    }

    #[test]
    fn params_round_trip() {
        let mut cam = camera();
        cam.dist = [-0.2, 0.05, 0.001, -0.002, 0.01];
        assert_eq!(PinholeCamera::from_params(&cam.to_params()), cam);
    }

    #[test]
    fn normalized_inverts_projection() {
        let mut cam = camera();
        cam.dist = [-0.2, 0.04, 0.001, 0.0005, 0.0];
        let p = Vec3::new(0.2, -0.1, 1.5);
        let uv = cam.project(&p).unwrap();
        let n = cam.pixel_to_normalized(&uv);
        assert!((n - Vec2::new(p.x / p.z, p.y / p.z)).norm() < 1e-9);
    }

    #[test]
    fn distortion_moves_off_axis_points() {
        let mut cam = camera();
        cam.dist = [-0.25, 0.0, 0.0, 0.0, 0.0];
        let n = cam.distort(&Vec2::new(0.3, 0.2));
        assert!(n.norm() < Vec2::new(0.3, 0.2).norm());
    }
}
