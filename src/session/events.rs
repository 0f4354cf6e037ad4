use serde::Serialize;
use uuid::Uuid;

use crate::coverage::SectorUpdate;
use crate::lighting::LightingReading;
use crate::models::ScanResult;

use super::stage::ScanStage;
use super::state::ScannerState;

/// Capacity of the broadcast channel behind
/// [`SessionController::subscribe`](super::SessionController::subscribe).
pub const EVENT_CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    LifecycleChanged { epoch: u64, lifecycle: ScannerState },
    #[serde(rename_all = "camelCase")]
    StageStarted { epoch: u64, stage: ScanStage },
    #[serde(rename_all = "camelCase")]
    LightingSampled { epoch: u64, reading: LightingReading },
    #[serde(rename_all = "camelCase")]
    FrameCaptured {
        epoch: u64,
        frame_id: Uuid,
        stage: ScanStage,
        angle: u16,
        update: SectorUpdate,
    },
    #[serde(rename_all = "camelCase")]
    DeviceUnavailable { epoch: u64, reason: String },
    #[serde(rename_all = "camelCase")]
    CaptureFailed { epoch: u64, reason: String },
    #[serde(rename_all = "camelCase")]
    Completed { epoch: u64, result: ScanResult },
    #[serde(rename_all = "camelCase")]
    Failed { epoch: u64, reason: String },
}

impl SessionEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            SessionEvent::LifecycleChanged { epoch, .. }
            | SessionEvent::StageStarted { epoch, .. }
            | SessionEvent::LightingSampled { epoch, .. }
            | SessionEvent::FrameCaptured { epoch, .. }
            | SessionEvent::DeviceUnavailable { epoch, .. }
            | SessionEvent::CaptureFailed { epoch, .. }
            | SessionEvent::Completed { epoch, .. }
            | SessionEvent::Failed { epoch, .. } => *epoch,
        }
    }
}
