//! Range-scan features.

use rigcal_core::{Pt3, Real};

/// Detect inner pattern edges in a sorted list of labelled ray indices.
///
/// Every jump between consecutive indices marks both sides as edges, stored
/// as positions into `idxs`. A point between two jumps is one edge. The first
/// and last detected edges are the pattern silhouette and are dropped.
pub fn detect_inner_edges(idxs: &[usize]) -> Vec<usize> {
    let mut edges = Vec::new();
    for (pos, pair) in idxs.windows(2).enumerate() {
        if pair[1].abs_diff(pair[0]) != 1 {
            edges.push(pos);
            edges.push(pos + 1);
        }
    }
    edges.dedup();
    if edges.len() <= 2 {
        return Vec::new();
    }
    edges[1..edges.len() - 1].to_vec()
}

/// Cartesian points (scanner frame, z = 0) for the given ray indices.
///
/// Indices outside the scan are skipped.
pub fn scan_points(
    angle_min: Real,
    angle_increment: Real,
    ranges: &[Real],
    idxs: &[usize],
) -> Vec<Pt3> {
    idxs.iter()
        .filter_map(|&i| {
            let rho = *ranges.get(i)?;
            let theta = angle_min + angle_increment * i as Real;
            Some(Pt3::new(rho * theta.cos(), rho * theta.sin(), 0.0))
        })
        .collect()
}
