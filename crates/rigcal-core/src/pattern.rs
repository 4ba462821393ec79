use thiserror::Error;

use crate::dataset::PatternConfig;
use crate::math::{Pt2, Pt3, Real};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatternError {
    #[error("pattern square size must be positive and finite, got {0}")]
    InvalidSize(Real),
    #[error("pattern needs at least one inner corner per axis, got {x}x{y}")]
    EmptyGrid { x: usize, y: usize },
    #[error("pattern border must be non-negative and finite, got ({x}, {y})")]
    InvalidBorder { x: Real, y: Real },
}

/// Line segment in the pattern plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: Pt2,
    pub b: Pt2,
}

impl Segment {
    pub fn new(a: (Real, Real), b: (Real, Real)) -> Self {
        Self {
            a: Pt2::new(a.0, a.1),
            b: Pt2::new(b.0, b.1),
        }
    }

    /// Euclidean distance from `p` to the closest point of the segment.
    pub fn distance(&self, p: &Pt2) -> Real {
        let ab = self.b - self.a;
        let len2 = ab.norm_squared();
        let t = if len2 > 0.0 {
            ((p - self.a).dot(&ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (p - (self.a + ab * t)).norm()
    }
}

/// Reference geometry of the calibration pattern in its own frame (z = 0 plane).
#[derive(Debug, Clone, PartialEq)]
pub struct PatternGeometry {
    /// Inner corners indexed by corner id (`row * dimension.x + col`).
    pub corners: Vec<Pt3>,
    /// Physical board outline, borders included.
    pub outline: Vec<Segment>,
    /// Inner square transition lines.
    pub transitions: Vec<Segment>,
}

impl PatternGeometry {
    pub fn from_config(config: &PatternConfig) -> Result<Self, PatternError> {
        let nx = config.dimension.x;
        let ny = config.dimension.y;
        let size = config.size;
        if !(size.is_finite() && size > 0.0) {
            return Err(PatternError::InvalidSize(size));
        }
        if nx == 0 || ny == 0 {
            return Err(PatternError::EmptyGrid { x: nx, y: ny });
        }
        let border = config.border_size;
        if !(border.x.is_finite() && border.y.is_finite() && border.x >= 0.0 && border.y >= 0.0) {
            return Err(PatternError::InvalidBorder {
                x: border.x,
                y: border.y,
            });
        }

        let corners = (0..ny)
            .flat_map(|row| {
                (0..nx).map(move |col| Pt3::new(col as Real * size, row as Real * size, 0.0))
            })
            .collect();

        // The outer squares extend one square beyond the inner corners.
        let min_x = -size - border.x;
        let max_x = nx as Real * size + border.x;
        let min_y = -size - border.y;
        let max_y = ny as Real * size + border.y;
        let outline = vec![
            Segment::new((min_x, min_y), (max_x, min_y)),
            Segment::new((max_x, min_y), (max_x, max_y)),
            Segment::new((max_x, max_y), (min_x, max_y)),
            Segment::new((min_x, max_y), (min_x, min_y)),
        ];

        let squares_max_x = nx as Real * size;
        let squares_max_y = ny as Real * size;
        let mut transitions = Vec::with_capacity(nx + ny);
        for col in 0..nx {
            let x = col as Real * size;
            transitions.push(Segment::new((x, -size), (x, squares_max_y)));
        }
        for row in 0..ny {
            let y = row as Real * size;
            transitions.push(Segment::new((-size, y), (squares_max_x, y)));
        }

        Ok(Self {
            corners,
            outline,
            transitions,
        })
    }

    pub fn corner(&self, id: usize) -> Option<&Pt3> {
        self.corners.get(id)
    }

    /// Planar distance from `p` (pattern frame, z ignored) to the board outline.
    pub fn outline_distance(&self, p: &Pt3) -> Real {
        nearest(&self.outline, p)
    }

    /// Planar distance from `p` (pattern frame, z ignored) to the closest
    /// square transition line.
    pub fn transition_distance(&self, p: &Pt3) -> Real {
        nearest(&self.transitions, p)
    }
}

fn nearest(segments: &[Segment], p: &Pt3) -> Real {
    let q = Pt2::new(p.x, p.y);
    segments
        .iter()
        .map(|s| s.distance(&q))
        .fold(Real::INFINITY, Real::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{BorderSize, GridSize};

    fn config() -> PatternConfig {
        PatternConfig {
            link: "pattern".into(),
            parent_link: "world".into(),
            fixed: false,
            dimension: GridSize { x: 4, y: 3 },
            size: 0.1,
            border_size: BorderSize { x: 0.05, y: 0.02 },
        }
    }

    #[test]
    fn corners_follow_row_major_ids() {
        let g = PatternGeometry::from_config(&config()).unwrap();
        assert_eq!(g.corners.len(), 12);
        let c = g.corner(5).unwrap();
        assert!((c.x - 0.1).abs() < 1e-12 && (c.y - 0.1).abs() < 1e-12);
    }

    #[test]
    fn outline_distance_is_exact() {
        let g = PatternGeometry::from_config(&config()).unwrap();
        // Outline spans x in [-0.15, 0.45], y in [-0.12, 0.32].
        assert!(g.outline_distance(&Pt3::new(-0.15, 0.1234, 0.7)) < 1e-15);
        assert!(g.outline_distance(&Pt3::new(0.3141, 0.32, 0.0)) < 1e-15);
        let d = g.outline_distance(&Pt3::new(0.40, 0.10, 0.0));
        assert!((d - 0.05).abs() < 1e-12);
        // Beyond a corner the distance is to the corner itself.
        let d = g.outline_distance(&Pt3::new(0.48, 0.36, 0.0));
        assert!((d - 0.05).abs() < 1e-12);
    }

    #[test]
    fn transition_distance_uses_the_closest_line() {
        let g = PatternGeometry::from_config(&config()).unwrap();
        assert_eq!(g.transitions.len(), 4 + 3);
        assert!(g.transition_distance(&Pt3::new(0.2, 0.137, 0.0)) < 1e-15);
        let d = g.transition_distance(&Pt3::new(0.13, 0.05, 0.0));
        assert!((d - 0.03).abs() < 1e-12);
    }

    #[test]
    fn degenerate_segment_measures_to_its_point() {
        let s = Segment::new((1.0, 1.0), (1.0, 1.0));
        assert!((s.distance(&Pt2::new(4.0, 5.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let mut cfg = config();
        cfg.size = 0.0;
        assert_eq!(
            PatternGeometry::from_config(&cfg),
            Err(PatternError::InvalidSize(0.0))
        );
        cfg.size = Real::NAN;
        assert!(matches!(
            PatternGeometry::from_config(&cfg),
            Err(PatternError::InvalidSize(_))
        ));

        let mut cfg = config();
        cfg.dimension = GridSize { x: 0, y: 3 };
        assert_eq!(
            PatternGeometry::from_config(&cfg),
            Err(PatternError::EmptyGrid { x: 0, y: 3 })
        );

        let mut cfg = config();
        cfg.border_size.y = -0.1;
        assert!(matches!(
            PatternGeometry::from_config(&cfg),
            Err(PatternError::InvalidBorder { .. })
        ));
    }
}
