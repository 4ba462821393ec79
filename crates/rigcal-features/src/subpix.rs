//! Sub-pixel corner refinement.
//!
//! Iteratively moves each corner to the point `q` that minimizes the weighted
//! sum of `(g_i · (p_i - q))²` over a window, where `g_i` is the image
//! gradient at `p_i`. At a true corner every gradient is orthogonal to the
//! vector from the corner to its sample point.

use image::GrayImage;
use rigcal_core::{Pt2, Real};

use crate::FeatureError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPixOptions {
    /// Half-size of the search window; the window spans `2 * win_half + 1` samples.
    pub win_half: usize,
    pub max_iters: usize,
    /// Stop once an update moves the corner by at most this many pixels.
    pub eps: Real,
}

impl Default for SubPixOptions {
    fn default() -> Self {
        Self {
            win_half: 3,
            max_iters: 500,
            eps: 1e-4,
        }
    }
}

/// Refine corner positions in place.
///
/// Corners whose refinement is ill-conditioned or leaves the search window
/// keep their initial position.
pub fn corner_subpix(
    image: &GrayImage,
    corners: &mut [Pt2],
    opts: &SubPixOptions,
) -> Result<(), FeatureError> {
    if opts.win_half == 0 {
        return Err(FeatureError::InvalidParameter(
            "win_half must be >= 1".to_string(),
        ));
    }
    if image.width() < 3 || image.height() < 3 {
        return Err(FeatureError::InvalidParameter(format!(
            "image {}x{} too small for gradients",
            image.width(),
            image.height()
        )));
    }

    let half = opts.win_half as i64;
    let sigma2 = (opts.win_half * opts.win_half) as Real;
    let mut mask = Vec::with_capacity(((2 * half + 1) * (2 * half + 1)) as usize);
    for dy in -half..=half {
        for dx in -half..=half {
            let d2 = (dx * dx + dy * dy) as Real;
            mask.push((dx as Real, dy as Real, (-d2 / (2.0 * sigma2)).exp()));
        }
    }

    for corner in corners.iter_mut() {
        let start = *corner;
        let mut q = start;
        for _ in 0..opts.max_iters {
            let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
            let (mut bb1, mut bb2) = (0.0, 0.0);
            for &(dx, dy, w) in &mask {
                let px = q.x + dx;
                let py = q.y + dy;
                let gx = 0.5 * (sample(image, px + 1.0, py) - sample(image, px - 1.0, py));
                let gy = 0.5 * (sample(image, px, py + 1.0) - sample(image, px, py - 1.0));
                let gxx = gx * gx * w;
                let gxy = gx * gy * w;
                let gyy = gy * gy * w;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
            let det = a * c - b * b;
            if det.abs() <= Real::EPSILON * (a * c).abs().max(1.0) {
                break;
            }
            let next = Pt2::new((c * bb1 - b * bb2) / det, (a * bb2 - b * bb1) / det);
            let shift = (next - q).norm();
            q = next;
            if shift <= opts.eps {
                break;
            }
        }
        let moved = q - start;
        if q.x.is_finite()
            && q.y.is_finite()
            && moved.x.abs() <= opts.win_half as Real
            && moved.y.abs() <= opts.win_half as Real
        {
            *corner = q;
        }
    }
    Ok(())
}

/// Bilinear intensity lookup with edge clamping.
fn sample(image: &GrayImage, x: Real, y: Real) -> Real {
    let max_x = (image.width() - 1) as Real;
    let max_y = (image.height() - 1) as Real;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);
    let fx = x - x0;
    let fy = y - y0;
    let at = |u: Real, v: Real| image.get_pixel(u as u32, v as u32)[0] as Real;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}
