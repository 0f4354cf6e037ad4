//! Coverage-tracking capture controller for handheld scans of dental plaster
//! models.
//!
//! A [`SessionController`] walks the user through three rotations (upper
//! arch, lower arch, bite registration). Each rotation is split into equal
//! angular sectors; a timed capture loop grabs one still per tick, grades its
//! lighting, assigns it an angle and marks the matching sector. Once every
//! sector of every stage has been seen, one frame per stage goes to an
//! external [`QualityOracle`] whose verdict decides whether the scan is
//! complete.

pub mod capture;
pub mod config;
pub mod coverage;
pub mod error;
pub mod lighting;
pub mod models;
pub mod oracle;
pub mod session;
mod utils;

pub use capture::{Camera, Facing};
pub use config::CaptureConfig;
pub use coverage::{AngleSource, SectorCoverage, SectorUpdate};
pub use error::{AngleError, CameraError, ConfigError, OracleError};
pub use lighting::{LightingReading, LightingStatus};
pub use models::{Frame, ScanResult};
pub use oracle::{Locale, QualityOracle, QualityRequest, QualityVerdict};
pub use session::{
    ScanStage, ScannerState, SessionController, SessionEvent, SessionSnapshot, StageProgress,
};

/// Installs `env_logger` at info level; `RUST_LOG` still takes precedence.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
