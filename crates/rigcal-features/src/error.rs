use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("zero-length point {index} in {collection}/{sensor} cannot be converted to spherical coordinates")]
    ZeroLengthPoint {
        collection: String,
        sensor: String,
        index: usize,
    },
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("degenerate homography: {0}")]
    DegenerateHomography(&'static str),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
