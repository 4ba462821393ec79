//! Synthetic calibration scenes with exact observations.
//!
//! A base frame carries a camera, a planar scanner and a multi-beam LiDAR, all
//! looking along the world +x axis at a pattern placed about two meters away.
//! Observations are generated from ground-truth transforms. The outermost scan
//! ray and the first and last point of every LiDAR beam are placed exactly on
//! the board outline, so the ground truth is a zero-cost configuration for
//! every residual except scan inner edges, which land on the ray closest to
//! a square transition.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use std::collections::BTreeMap;

use crate::camera::PinholeCamera;
use crate::dataset::{
    BorderSize, CalibrationConfig, CameraInfo, Collection, Corner, Dataset, GridSize, Label,
    Modality, PatternConfig, Sensor, SensorData, TransformEntry,
};
use crate::frames::{lookup_transform, transform_key};
use crate::math::{Iso3, Pt3, Real, Vec3};

/// Range reported by the scanner when a ray misses the pattern.
pub const NO_RETURN_RANGE: Real = 10.0;
/// Scan rays spanning the board, edge to edge.
pub const SCAN_RAYS_ON_BOARD: usize = 60;
/// Scan rays recorded beyond each board edge.
pub const SCAN_MARGIN_RAYS: usize = 10;
/// Rays blanked next to each transition when scan gaps are requested.
pub const SCAN_GAP_RAYS: usize = 3;
pub const CLOUD_POINTS_PER_BEAM: usize = 25;

/// Half-width and step of the coarse angular search for the board.
const SEARCH_HALF_ANGLE: Real = 0.8;
const SEARCH_STEP: Real = 0.005;
const BISECTION_STEPS: usize = 80;

/// Per-collection `(roll, pitch, yaw)` of the pattern in the world frame.
const PATTERN_TILTS: [[Real; 3]; 4] = [
    [0.0, 0.2, 0.1],
    [0.15, -0.2, -0.15],
    [-0.1, 0.1, 0.25],
    [0.05, -0.3, 0.0],
];

#[derive(Debug, Clone)]
pub struct SceneOptions {
    pub num_collections: usize,
    pub camera: bool,
    pub laser: bool,
    pub lidar: bool,
    pub fixed_pattern: bool,
    /// Sensor whose transform is anchored (empty for none).
    pub anchored_sensor: String,
    /// Leave the scanner without returns next to the first and last square
    /// transition it crosses, which yields two inner edges per scan.
    pub scan_gaps: bool,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            num_collections: 3,
            camera: true,
            laser: true,
            lidar: true,
            fixed_pattern: false,
            anchored_sensor: String::new(),
            scan_gaps: false,
        }
    }
}

pub fn pattern_config(fixed: bool) -> PatternConfig {
    PatternConfig {
        link: "pattern".to_string(),
        parent_link: "world".to_string(),
        fixed,
        dimension: GridSize { x: 6, y: 4 },
        size: 0.1,
        border_size: BorderSize { x: 0.05, y: 0.05 },
    }
}

pub fn camera_info() -> CameraInfo {
    CameraInfo {
        width: 640,
        height: 480,
        fx: 600.0,
        fy: 600.0,
        cx: 320.0,
        cy: 240.0,
        distortion: [0.0; 5],
    }
}

/// Rotation whose z axis looks along the parent's +x axis (optical convention).
fn forward_looking() -> UnitQuaternion<Real> {
    let m = Matrix3::from_columns(&[
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(1.0, 0.0, 0.0),
    ]);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m))
}

pub fn camera_pose() -> Iso3 {
    Iso3::from_parts(Vec3::new(0.0, 0.1, 0.6).into(), forward_looking())
}

pub fn laser_pose() -> Iso3 {
    Iso3::new(Vec3::new(0.05, 0.0, 0.8), Vec3::new(0.0, 0.0, 0.02))
}

pub fn lidar_pose() -> Iso3 {
    Iso3::new(Vec3::new(0.0, -0.1, 0.85), Vec3::new(0.0, 0.0, -0.03))
}

/// Ground-truth pattern pose (`world -> pattern`) of collection `idx`.
pub fn pattern_pose(idx: usize) -> Iso3 {
    let i = idx as Real;
    let [roll, pitch, yaw] = PATTERN_TILTS[idx % PATTERN_TILTS.len()];
    let wobble = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    Iso3::from_parts(
        Vec3::new(2.0 + 0.1 * i, 0.25 - 0.04 * i, 1.0 - 0.02 * i).into(),
        wobble * forward_looking(),
    )
}

/// Build a scene with exact observations.
pub fn scene(opts: &SceneOptions) -> Dataset {
    let pattern = pattern_config(opts.fixed_pattern);
    let mut sensors = BTreeMap::new();
    let mut sensor_poses = Vec::new();
    if opts.camera {
        sensors.insert(
            "camera".to_string(),
            Sensor {
                link: "camera".into(),
                parent: "base_link".into(),
                child: "camera".into(),
                modality: Modality::Image,
                camera_info: Some(camera_info()),
            },
        );
        sensor_poses.push(("camera", camera_pose()));
    }
    if opts.laser {
        sensors.insert(
            "laser".to_string(),
            Sensor {
                link: "laser".into(),
                parent: "base_link".into(),
                child: "laser".into(),
                modality: Modality::LaserScan,
                camera_info: None,
            },
        );
        sensor_poses.push(("laser", laser_pose()));
    }
    if opts.lidar {
        sensors.insert(
            "lidar".to_string(),
            Sensor {
                link: "lidar".into(),
                parent: "base_link".into(),
                child: "lidar".into(),
                modality: Modality::PointCloud2,
                camera_info: None,
            },
        );
        sensor_poses.push(("lidar", lidar_pose()));
    }

    let mut collections = BTreeMap::new();
    for idx in 0..opts.num_collections {
        let pattern_idx = if opts.fixed_pattern { 0 } else { idx };
        let mut transforms = BTreeMap::new();
        let base = Iso3::translation(0.0, 0.0, 0.0);
        transforms.insert(
            transform_key("world", "base_link"),
            TransformEntry::from_pose("world", "base_link", &base),
        );
        transforms.insert(
            pattern.transform_key(),
            TransformEntry::from_pose("world", "pattern", &pattern_pose(pattern_idx)),
        );
        for (name, pose) in &sensor_poses {
            transforms.insert(
                transform_key("base_link", name),
                TransformEntry::from_pose("base_link", name, pose),
            );
        }

        let mut collection = Collection {
            transforms,
            ..Collection::default()
        };
        for (sensor_key, sensor) in &sensors {
            let t_sensor_pattern = lookup_transform(&collection.transforms, &sensor.link, "pattern")
                .expect("synthetic tree is connected");
            let (data, label) = match sensor.modality {
                Modality::Image => observe_camera(idx, &pattern, &t_sensor_pattern),
                Modality::LaserScan => observe_scan(&pattern, &t_sensor_pattern, opts.scan_gaps),
                Modality::PointCloud2 => observe_cloud(&pattern, &t_sensor_pattern),
            };
            collection.data.insert(sensor_key.clone(), data);
            collection.labels.insert(sensor_key.clone(), label);
        }
        collections.insert(idx.to_string(), collection);
    }

    Dataset {
        calibration_config: CalibrationConfig {
            world_link: "world".into(),
            anchored_sensor: opts.anchored_sensor.clone(),
            calibration_pattern: pattern,
            description_file: None,
        },
        sensors,
        collections,
    }
}

/// Board outline `(min_x, max_x, min_y, max_y)` in the pattern frame.
fn canvas(pattern: &PatternConfig) -> (Real, Real, Real, Real) {
    let s = pattern.size;
    (
        -s - pattern.border_size.x,
        pattern.dimension.x as Real * s + pattern.border_size.x,
        -s - pattern.border_size.y,
        pattern.dimension.y as Real * s + pattern.border_size.y,
    )
}

/// Distance along `dir` from the sensor origin to the pattern plane.
fn plane_range(t_sensor_pattern: &Iso3, dir: &Vec3) -> Option<Real> {
    let normal = t_sensor_pattern.rotation * Vec3::z();
    let origin = t_sensor_pattern.translation.vector;
    let denom = normal.dot(dir);
    if denom.abs() < 1e-9 {
        return None;
    }
    let t = normal.dot(&origin) / denom;
    (t > 0.0).then_some(t)
}

/// Distance along `dir` from the sensor origin to the board, if the ray hits it.
fn ray_hit(pattern: &PatternConfig, t_sensor_pattern: &Iso3, dir: &Vec3) -> Option<Real> {
    let t = plane_range(t_sensor_pattern, dir)?;
    let p = t_sensor_pattern.inverse_transform_point(&Pt3::from(dir * t));
    let (min_x, max_x, min_y, max_y) = canvas(pattern);
    (p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y).then_some(t)
}

/// Angles `[lo, hi]` over which the rays `dir(angle)` hit the board, with
/// both ends moved onto the outline by bisection.
fn board_interval(
    pattern: &PatternConfig,
    t_sensor_pattern: &Iso3,
    dir: impl Fn(Real) -> Vec3,
) -> Option<(Real, Real)> {
    let steps = (2.0 * SEARCH_HALF_ANGLE / SEARCH_STEP).round() as usize;
    let angle = |i: usize| -SEARCH_HALF_ANGLE + SEARCH_STEP * i as Real;
    let hits = |a: Real| ray_hit(pattern, t_sensor_pattern, &dir(a)).is_some();
    let first = (0..=steps).find(|&i| hits(angle(i)))?;
    let last = (first..=steps).rev().find(|&i| hits(angle(i)))?;
    let lo = if first == 0 {
        angle(0)
    } else {
        bisect(&hits, angle(first - 1), angle(first))
    };
    let hi = if last == steps {
        angle(steps)
    } else {
        bisect(&hits, angle(last + 1), angle(last))
    };
    Some((lo, hi))
}

/// Boundary between a missing and a hitting angle, returned on the hit side.
fn bisect(hits: &impl Fn(Real) -> bool, mut miss: Real, mut hit: Real) -> Real {
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (miss + hit);
        if hits(mid) {
            hit = mid;
        } else {
            miss = mid;
        }
    }
    hit
}

fn observe_camera(idx: usize, pattern: &PatternConfig, t_cam_pattern: &Iso3) -> (SensorData, Label) {
    let cam: PinholeCamera = camera_info().camera();
    let mut corners = Vec::new();
    for row in 0..pattern.dimension.y {
        for col in 0..pattern.dimension.x {
            let id = row * pattern.dimension.x + col;
            let p = Pt3::new(col as Real * pattern.size, row as Real * pattern.size, 0.0);
            if let Some(uv) = cam.project(&t_cam_pattern.transform_point(&p).coords) {
                corners.push(Corner { id, x: uv.x, y: uv.y });
            }
        }
    }
    (
        SensorData::Image {
            filename: format!("{idx}_camera.png"),
        },
        Label {
            detected: !corners.is_empty(),
            corners,
            ..Label::default()
        },
    )
}

fn scan_direction(theta: Real) -> Vec3 {
    Vec3::new(theta.cos(), theta.sin(), 0.0)
}

fn observe_scan(
    pattern: &PatternConfig,
    t_laser_pattern: &Iso3,
    gaps: bool,
) -> (SensorData, Label) {
    let Some((lo, hi)) = board_interval(pattern, t_laser_pattern, scan_direction) else {
        return (
            SensorData::LaserScan {
                angle_min: -0.5,
                angle_increment: 0.005,
                ranges: vec![NO_RETURN_RANGE; 201],
            },
            Label::default(),
        );
    };
    // The first and last labelled rays fall on the board edges.
    let angle_increment = (hi - lo) / SCAN_RAYS_ON_BOARD as Real;
    let angle_min = lo - SCAN_MARGIN_RAYS as Real * angle_increment;
    let num_rays = SCAN_RAYS_ON_BOARD + 2 * SCAN_MARGIN_RAYS + 1;
    let on_board = SCAN_MARGIN_RAYS..=SCAN_MARGIN_RAYS + SCAN_RAYS_ON_BOARD;

    let mut ranges = Vec::with_capacity(num_rays);
    let mut idxs = Vec::new();
    for i in 0..num_rays {
        let dir = scan_direction(angle_min + angle_increment * i as Real);
        match plane_range(t_laser_pattern, &dir).filter(|_| on_board.contains(&i)) {
            Some(range) => {
                ranges.push(range);
                idxs.push(i);
            }
            None => ranges.push(NO_RETURN_RANGE),
        }
    }

    if gaps {
        let crossings = transition_rays(
            pattern,
            t_laser_pattern,
            angle_min,
            angle_increment,
            &ranges,
            &idxs,
        );
        if let [first, .., last] = crossings[..] {
            // Rays before the first crossing and after the last one see dark squares.
            let blank: Vec<usize> = (first - SCAN_GAP_RAYS..first)
                .chain(last + 1..=last + SCAN_GAP_RAYS)
                .collect();
            for &i in &blank {
                ranges[i] = NO_RETURN_RANGE;
            }
            idxs.retain(|i| !blank.contains(i));
        }
    }

    (
        SensorData::LaserScan {
            angle_min,
            angle_increment,
            ranges,
        },
        Label {
            detected: !idxs.is_empty(),
            idxs,
            ..Label::default()
        },
    )
}

/// Labelled rays closest to each vertical square transition the scan crosses,
/// in scan order. Crossings too close to the board edges to fit a gap are skipped.
fn transition_rays(
    pattern: &PatternConfig,
    t_laser_pattern: &Iso3,
    angle_min: Real,
    angle_increment: Real,
    ranges: &[Real],
    idxs: &[usize],
) -> Vec<usize> {
    let x_of = |i: usize| {
        let dir = scan_direction(angle_min + angle_increment * i as Real);
        t_laser_pattern.inverse_transform_point(&Pt3::from(dir * ranges[i])).x
    };
    let margin = SCAN_GAP_RAYS + 1;
    let mut rays = Vec::new();
    for pair in idxs.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (xa, xb) = (x_of(a), x_of(b));
        for col in 0..pattern.dimension.x {
            let x = col as Real * pattern.size;
            if (xa - x) * (xb - x) > 0.0 {
                continue;
            }
            let ray = if (xa - x).abs() <= (xb - x).abs() { a } else { b };
            let inside = ray >= idxs[0] + margin && ray + margin <= idxs[idxs.len() - 1];
            if inside && rays.last() != Some(&ray) {
                rays.push(ray);
            }
        }
    }
    rays
}

fn observe_cloud(pattern: &PatternConfig, t_lidar_pattern: &Iso3) -> (SensorData, Label) {
    let mut points = Vec::new();
    let mut idxs = Vec::new();
    for beam in -2..=2 {
        let polar = std::f64::consts::FRAC_PI_2 + 0.04 * beam as Real;
        let dir = |azimuth: Real| {
            Vec3::new(
                polar.sin() * azimuth.cos(),
                polar.sin() * azimuth.sin(),
                polar.cos(),
            )
        };
        let Some((lo, hi)) = board_interval(pattern, t_lidar_pattern, &dir) else {
            continue;
        };
        for k in 0..CLOUD_POINTS_PER_BEAM {
            let azimuth = lo + (hi - lo) * k as Real / (CLOUD_POINTS_PER_BEAM - 1) as Real;
            let d = dir(azimuth);
            if let Some(range) = plane_range(t_lidar_pattern, &d) {
                let p = d * range;
                idxs.push(points.len());
                points.push([p.x, p.y, p.z]);
            }
        }
    }
    // Background returns that are not labelled.
    points.push([6.0, 3.0, 0.5]);
    points.push([6.0, -3.0, 0.5]);
    (
        SensorData::PointCloud2 { points },
        Label {
            detected: !idxs.is_empty(),
            idxs,
            ..Label::default()
        },
    )
}
