use serde::{Deserialize, Serialize};

use crate::coverage::SectorCoverage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ScanStage {
    Upper,
    Lower,
    Bite,
}

impl ScanStage {
    pub const ORDER: [ScanStage; 3] = [ScanStage::Upper, ScanStage::Lower, ScanStage::Bite];

    pub fn next(self) -> Option<ScanStage> {
        match self {
            ScanStage::Upper => Some(ScanStage::Lower),
            ScanStage::Lower => Some(ScanStage::Bite),
            ScanStage::Bite => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStage::Upper => "upper arch",
            ScanStage::Lower => "lower arch",
            ScanStage::Bite => "bite registration",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "stage")]
pub enum StageProgress {
    Capturing(ScanStage),
    Finished,
}

impl StageProgress {
    pub fn stage(&self) -> Option<ScanStage> {
        match self {
            StageProgress::Capturing(stage) => Some(*stage),
            StageProgress::Finished => None,
        }
    }
}

/// Walks Upper → Lower → Bite → Finished, one step per completed stage.
#[derive(Debug, Clone)]
pub struct StageSequencer {
    progress: StageProgress,
}

impl Default for StageSequencer {
    fn default() -> Self {
        Self {
            progress: StageProgress::Capturing(ScanStage::Upper),
        }
    }
}

impl StageSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> StageProgress {
        self.progress
    }

    pub fn current_stage(&self) -> Option<ScanStage> {
        self.progress.stage()
    }

    pub fn is_finished(&self) -> bool {
        self.progress == StageProgress::Finished
    }

    /// Moves past the current stage and clears `coverage` for whatever comes
    /// next. Finished stays Finished.
    pub fn advance(&mut self, coverage: &mut SectorCoverage) -> StageProgress {
        self.progress = match self.progress {
            StageProgress::Capturing(stage) => match stage.next() {
                Some(next) => StageProgress::Capturing(next),
                None => StageProgress::Finished,
            },
            StageProgress::Finished => StageProgress::Finished,
        };
        coverage.reset();
        self.progress
    }

    /// Back to Upper with empty coverage. Only a session restart does this.
    pub fn restart(&mut self, coverage: &mut SectorCoverage) {
        self.progress = StageProgress::Capturing(ScanStage::Upper);
        coverage.reset();
    }
}
