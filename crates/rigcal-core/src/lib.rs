//! Core data model and geometry primitives for `rigcal`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec3`, `Pt3`, `Iso3`, ...),
//! - the serde dataset model (sensors, collections, labels, transforms),
//! - deterministic transform keys and frame-path composition,
//! - the pinhole camera model with 5-coefficient Brown-Conrady distortion,
//! - calibration pattern geometry (corners, outline, transitions).

/// Pinhole camera model.
pub mod camera;
/// Serializable dataset model.
pub mod dataset;
/// Transform keys and frame paths through a collection's transform tree.
pub mod frames;
/// Linear algebra type aliases and pose helpers.
pub mod math;
/// Calibration pattern geometry.
pub mod pattern;
/// Synthetic scenes for tests and examples.
pub mod synthetic;

pub use camera::*;
pub use dataset::*;
pub use frames::*;
pub use math::*;
pub use pattern::*;
