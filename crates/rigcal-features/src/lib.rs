//! Geometric feature extraction for calibration observations.
//!
//! Every sensor modality turns its raw labelled observation into the features
//! consumed by the residual model:
//!
//! - cameras: sub-pixel refined pattern corners ([`subpix`]),
//! - range scanners: inner pattern edges ([`laser`]),
//! - point clouds: beam extrema and middle points ([`lidar`]).
//!
//! [`homography`] and [`planar_pose`] provide the linear pattern pose used to
//! seed collections that lack a pattern transform.

pub mod extract;
pub mod homography;
pub mod laser;
pub mod lidar;
pub mod planar_pose;
pub mod subpix;

mod error;

pub use error::FeatureError;
pub use extract::{extract_features, ExtractOptions, ExtractionSummary};
