use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Latitude {0} is outside the Mercator domain (|lat| < 85)")]
    LatitudeOutOfRange(f64),

    #[error("Unsupported region type: {0}")]
    UnsupportedRegion(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Coverage mismatch: {0}")]
    CoverageMismatch(String),

    #[error("Boundary data error: {0}")]
    Boundary(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GeoError>;
