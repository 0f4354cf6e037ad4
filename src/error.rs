use thiserror::Error;

/// Failures reported by a [`Camera`](crate::capture::Camera) implementation.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera stream already released")]
    StreamReleased,
    #[error("still capture failed: {0}")]
    Capture(String),
}

/// Anything that keeps the quality oracle from producing a usable verdict.
/// The controller treats every variant the same way.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle transport failure: {0}")]
    Transport(String),
    #[error("oracle timed out after {0}ms")]
    Timeout(u64),
    #[error("malformed oracle verdict: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum AngleError {
    #[error("orientation sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("orientation sensor returned a non-finite heading")]
    NonFiniteHeading,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sector count must be in 1..=360, got {0}")]
    SectorCount(u16),
    #[error("angle step {step} must divide 360 and be at most one sector wide ({sector_width}°)")]
    AngleStep { step: u16, sector_width: f64 },
    #[error("acceptance threshold must be within 0..=100, got {0}")]
    AcceptanceThreshold(f64),
    #[error("jpeg quality must be within 1..=100, got {0}")]
    JpegQuality(u8),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}
