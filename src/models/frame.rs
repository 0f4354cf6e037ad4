//! A single still captured during a scan stage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::ScanStage;

pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Immutable once built. The payload is shared so frames can be handed to
/// the oracle and the result record without copying image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: Uuid,
    #[serde(skip)]
    pub payload: Arc<Vec<u8>>,
    pub captured_at: DateTime<Utc>,
    /// Degrees in `0..360`.
    pub angle: u16,
    pub stage: ScanStage,
}

impl Frame {
    pub fn new(payload: Arc<Vec<u8>>, angle: u16, stage: ScanStage, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            captured_at,
            angle: angle % 360,
            stage,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// First frame of each stage, in stage order. Stages without frames are skipped.
pub fn representative_frames(frames: &[Frame]) -> Vec<&Frame> {
    ScanStage::ORDER
        .iter()
        .filter_map(|stage| frames.iter().find(|frame| frame.stage == *stage))
        .collect()
}
