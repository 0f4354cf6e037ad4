use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coverage::{SectorCoverage, SectorUpdate};
use crate::lighting::LightingReading;
use crate::models::{Frame, ScanResult};

use super::stage::{ScanStage, StageProgress, StageSequencer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScannerState {
    #[default]
    Idle,
    Scanning,
    Processing,
    Completed,
}

impl ScannerState {
    pub fn is_active(&self) -> bool {
        matches!(self, ScannerState::Scanning | ScannerState::Processing)
    }
}

/// Prompt shown next to the viewfinder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum StatusMessage {
    Ready,
    Stage(ScanStage),
    Processing,
    Reconstructing,
    Complete,
    Failed(String),
    Connectivity,
    DeviceUnavailable(String),
    CaptureFailed(String),
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Ready => write!(f, "Ready to scan"),
            StatusMessage::Stage(ScanStage::Upper) => {
                write!(f, "Step 1: rotate slowly around the upper arch")
            }
            StatusMessage::Stage(ScanStage::Lower) => {
                write!(f, "Step 2: rotate slowly around the lower arch")
            }
            StatusMessage::Stage(ScanStage::Bite) => {
                write!(f, "Step 3: capture both models in occlusion")
            }
            StatusMessage::Processing => write!(f, "Analyzing capture quality"),
            StatusMessage::Reconstructing => write!(f, "Reconstructing model"),
            StatusMessage::Complete => write!(f, "Scan complete"),
            StatusMessage::Failed(feedback) => write!(f, "Scan failed: {feedback}"),
            StatusMessage::Connectivity => {
                write!(f, "Connectivity error: the quality service could not be reached")
            }
            StatusMessage::DeviceUnavailable(reason) => write!(f, "Camera unavailable: {reason}"),
            StatusMessage::CaptureFailed(reason) => write!(f, "Capture failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionFailure {
    QualityRejected {
        score: f64,
        feedback: String,
        missing_angles: Option<Vec<f64>>,
    },
    OracleUnavailable {
        detail: String,
    },
    NoFrames,
    CaptureAborted {
        detail: String,
    },
}

impl SessionFailure {
    pub fn status(&self) -> StatusMessage {
        match self {
            SessionFailure::QualityRejected { feedback, .. } => StatusMessage::Failed(feedback.clone()),
            SessionFailure::OracleUnavailable { .. } => StatusMessage::Connectivity,
            SessionFailure::NoFrames => StatusMessage::Failed("no frames were captured".into()),
            SessionFailure::CaptureAborted { detail } => StatusMessage::Failed(detail.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub epoch: u64,
    pub lifecycle: ScannerState,
    pub progress: StageProgress,
    pub coverage_fraction: f64,
    pub covered_sectors: Vec<u16>,
    pub next_target_sector: Option<u16>,
    pub frame_count: usize,
    pub lighting: Option<LightingReading>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub result: Option<ScanResult>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Everything the controller knows about the current session.
///
/// Mutations coming from background work carry the epoch they were started
/// under and are ignored once the session has been restarted.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub lifecycle: ScannerState,
    pub epoch: u64,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub frames: Vec<Frame>,
    pub lighting: Option<LightingReading>,
    pub status: StatusMessage,
    pub failure: Option<SessionFailure>,
    pub result: Option<ScanResult>,
    sequencer: StageSequencer,
    coverage: SectorCoverage,
}

impl SessionState {
    pub fn new(sector_count: u16) -> Self {
        Self {
            lifecycle: ScannerState::Idle,
            epoch: 0,
            session_id: None,
            started_at: None,
            frames: Vec::new(),
            lighting: None,
            status: StatusMessage::Ready,
            failure: None,
            result: None,
            sequencer: StageSequencer::new(),
            coverage: SectorCoverage::new(sector_count),
        }
    }

    pub fn progress(&self) -> StageProgress {
        self.sequencer.progress()
    }

    pub fn coverage(&self) -> &SectorCoverage {
        &self.coverage
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Starts a fresh session at the upper arch and returns its epoch.
    pub fn begin_session(&mut self, now: DateTime<Utc>) -> u64 {
        self.clear();
        self.lifecycle = ScannerState::Scanning;
        self.session_id = Some(Uuid::new_v4());
        self.started_at = Some(now);
        self.status = StatusMessage::Stage(ScanStage::Upper);
        self.epoch
    }

    /// Drops all frames and progress and returns to Idle. Outstanding work
    /// from the previous epoch becomes stale.
    pub fn restart(&mut self) -> u64 {
        self.clear();
        self.lifecycle = ScannerState::Idle;
        self.session_id = None;
        self.started_at = None;
        self.status = StatusMessage::Ready;
        self.epoch
    }

    fn clear(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.frames.clear();
        self.lighting = None;
        self.failure = None;
        self.result = None;
        self.sequencer.restart(&mut self.coverage);
    }

    pub fn accepts_frames(&self, epoch: u64, stage: ScanStage) -> bool {
        self.is_current(epoch)
            && self.lifecycle == ScannerState::Scanning
            && self.sequencer.current_stage() == Some(stage)
            && !self.coverage.is_complete()
    }

    pub fn record_lighting(&mut self, reading: LightingReading) {
        self.lighting = Some(reading);
    }

    /// Appends `frame` and records its angle. Callers check
    /// [`accepts_frames`](Self::accepts_frames) first.
    pub fn record_frame(&mut self, frame: Frame) -> SectorUpdate {
        let update = self.coverage.record_angle(i32::from(frame.angle));
        if matches!(self.status, StatusMessage::CaptureFailed(_)) {
            self.status = StatusMessage::Stage(frame.stage);
        }
        self.frames.push(frame);
        update
    }

    /// Moves to the next stage, or to Processing after the bite stage.
    /// Returns `None` when `epoch` is stale or the session is not scanning.
    pub fn complete_stage(&mut self, epoch: u64) -> Option<StageProgress> {
        if !self.is_current(epoch) || self.lifecycle != ScannerState::Scanning {
            return None;
        }

        let progress = self.sequencer.advance(&mut self.coverage);
        match progress {
            StageProgress::Capturing(stage) => {
                self.status = StatusMessage::Stage(stage);
            }
            StageProgress::Finished => {
                self.lifecycle = ScannerState::Processing;
                self.status = StatusMessage::Processing;
            }
        }
        Some(progress)
    }

    pub fn set_status(&mut self, epoch: u64, status: StatusMessage) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        self.status = status;
        true
    }

    pub fn complete(&mut self, epoch: u64, result: ScanResult) -> bool {
        if !self.is_current(epoch) || self.lifecycle != ScannerState::Processing {
            return false;
        }
        self.lifecycle = ScannerState::Completed;
        self.status = StatusMessage::Complete;
        self.result = Some(result);
        true
    }

    /// Ends the session in Idle with `failure` as the reason. Frames stay
    /// available until the next start or restart.
    pub fn fail(&mut self, epoch: u64, failure: SessionFailure) -> bool {
        if !self.is_current(epoch) || !self.lifecycle.is_active() {
            return false;
        }
        self.lifecycle = ScannerState::Idle;
        self.status = failure.status();
        self.failure = Some(failure);
        true
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(|failure| failure.status().to_string())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            epoch: self.epoch,
            lifecycle: self.lifecycle,
            progress: self.progress(),
            coverage_fraction: self.coverage.coverage_fraction(),
            covered_sectors: self.coverage.covered_sectors(),
            next_target_sector: self.coverage.next_target_sector(),
            frame_count: self.frames.len(),
            lighting: self.lighting,
            status: self.status.to_string(),
            failure_reason: self.failure_reason(),
            result: self.result.clone(),
            started_at: self.started_at,
        }
    }
}
