pub mod controller;
pub mod events;
pub mod stage;
pub mod state;

pub use controller::SessionController;
pub use events::SessionEvent;
pub use stage::{ScanStage, StageProgress, StageSequencer};
pub use state::{ScannerState, SessionFailure, SessionSnapshot, SessionState, StatusMessage};
