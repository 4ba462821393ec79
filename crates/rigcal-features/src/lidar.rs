//! Point-cloud beam features.

use rigcal_core::{Pt3, Real};
use std::collections::BTreeMap;

use crate::FeatureError;

/// Polar angles are grouped into beams after rounding to this many decimals.
pub const BEAM_ROUNDING_DECIMALS: i32 = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamFeatures {
    /// All labelled points, in input order.
    pub labelled: Vec<Pt3>,
    /// Minimum and maximum azimuth point of each beam.
    pub extrema: Vec<Pt3>,
    /// Remaining points of each beam.
    pub middle: Vec<Pt3>,
}

/// Spherical coordinates `(r, polar, azimuth)` of a point.
///
/// Returns `None` for a zero-length point.
pub fn to_spherical(p: &Pt3) -> Option<(Real, Real, Real)> {
    let r = p.coords.norm();
    if r <= 0.0 || !r.is_finite() {
        return None;
    }
    let polar = (p.z / r).clamp(-1.0, 1.0).acos();
    let azimuth = p.y.atan2(p.x);
    Some((r, polar, azimuth))
}

/// Cluster points into beams of equal rounded polar angle and split each beam
/// into its longitudinal extrema and its middle points.
///
/// The error carries the index of the first zero-length point; callers add
/// the collection and sensor context.
pub fn cluster_beams(points: &[Pt3]) -> Result<BeamFeatures, usize> {
    let scale = 10f64.powi(BEAM_ROUNDING_DECIMALS);
    let mut beams: BTreeMap<i64, Vec<(Real, Pt3)>> = BTreeMap::new();
    for (idx, p) in points.iter().enumerate() {
        let (_, polar, azimuth) = to_spherical(p).ok_or(idx)?;
        let key = (polar * scale).round() as i64;
        beams.entry(key).or_default().push((azimuth, *p));
    }

    let mut features = BeamFeatures {
        labelled: points.to_vec(),
        ..BeamFeatures::default()
    };
    for beam in beams.values() {
        let min = beam.iter().enumerate().min_by(|a, b| a.1 .0.total_cmp(&b.1 .0));
        let max = beam.iter().enumerate().max_by(|a, b| a.1 .0.total_cmp(&b.1 .0));
        let (Some((min_idx, &(_, p_min))), Some((max_idx, &(_, p_max)))) = (min, max) else {
            continue;
        };
        features.extrema.push(p_min);
        if max_idx != min_idx {
            features.extrema.push(p_max);
        }
        features.middle.extend(
            beam.iter()
                .enumerate()
                .filter(|(i, _)| *i != min_idx && *i != max_idx)
                .map(|(_, (_, p))| *p),
        );
    }
    Ok(features)
}

/// Beam features with dataset context on failure.
pub fn beam_features(
    points: &[Pt3],
    collection: &str,
    sensor: &str,
) -> Result<BeamFeatures, FeatureError> {
    cluster_beams(points).map_err(|index| FeatureError::ZeroLengthPoint {
        collection: collection.to_string(),
        sensor: sensor.to_string(),
        index,
    })
}

pub fn to_homogeneous(p: &Pt3) -> [Real; 4] {
    [p.x, p.y, p.z, 1.0]
}

pub fn from_homogeneous(p: &[Real; 4]) -> Pt3 {
    Pt3::new(p[0], p[1], p[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(polar: Real, azimuths: &[Real], r: Real) -> Vec<Pt3> {
        azimuths
            .iter()
            .map(|&az| {
                Pt3::new(
                    r * polar.sin() * az.cos(),
                    r * polar.sin() * az.sin(),
                    r * polar.cos(),
                )
            })
            .collect()
    }

    #[test]
    fn two_beams_split_into_extrema_and_middle() {
        let mut points = ring(1.0, &[0.10, -0.20, 0.30, 0.05], 5.0);
        points.extend(ring(1.5, &[0.4, -0.1, 0.2], 4.0));

        let f = cluster_beams(&points).unwrap();
        assert_eq!(f.labelled.len(), 7);
        assert_eq!(f.extrema.len(), 4);
        assert_eq!(f.middle.len(), (4 - 2) + (3 - 2));

        // First beam extrema are the -0.20 and 0.30 azimuth points.
        let az: Vec<Real> = f.extrema.iter().map(|p| p.y.atan2(p.x)).collect();
        assert!((az[0] + 0.20).abs() < 1e-9 && (az[1] - 0.30).abs() < 1e-9);
        assert!((az[2] + 0.1).abs() < 1e-9 && (az[3] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn single_point_beam_has_one_extremum() {
        let f = cluster_beams(&ring(0.7, &[0.2], 2.0)).unwrap();
        assert_eq!(f.extrema.len(), 1);
        assert!(f.middle.is_empty());
    }

    #[test]
    fn empty_cloud_yields_empty_features() {
        assert_eq!(cluster_beams(&[]).unwrap(), BeamFeatures::default());
    }

    #[test]
    fn zero_length_point_is_rejected() {
        let points = [Pt3::new(1.0, 0.0, 0.0), Pt3::origin()];
        assert_eq!(cluster_beams(&points).unwrap_err(), 1);
        let err = beam_features(&points, "0", "lidar").unwrap_err();
        assert!(matches!(err, FeatureError::ZeroLengthPoint { index: 1, .. }));
    }
}
