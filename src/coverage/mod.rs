pub mod angle;
pub mod sectors;

pub use angle::{AngleSource, AngleSourceFactory, OrientationSensor, SensorAngleSource, TickAngleSource};
pub use sectors::{SectorCoverage, SectorUpdate, DEFAULT_SECTOR_COUNT};
