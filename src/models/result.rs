use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::frame::Frame;

/// Stand-in for export links until a reconstruction service produces files.
pub const PLACEHOLDER_EXPORT: &str = "#";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportHandles {
    pub stl_url: Option<String>,
    pub obj_url: Option<String>,
    pub ply_url: Option<String>,
}

impl ExportHandles {
    pub fn placeholder() -> Self {
        Self {
            stl_url: Some(PLACEHOLDER_EXPORT.to_string()),
            obj_url: None,
            ply_url: Some(PLACEHOLDER_EXPORT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub id: String,
    pub preview_frame_id: Uuid,
    #[serde(skip)]
    pub preview: Option<Frame>,
    /// Fraction in `0..=1`.
    pub accuracy: f64,
    pub quality_score: f64,
    pub exports: ExportHandles,
    pub created_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(preview: Frame, accuracy: f64, quality_score: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("SCAN-{}", created_at.timestamp_millis()),
            preview_frame_id: preview.id,
            preview: Some(preview),
            accuracy,
            quality_score,
            exports: ExportHandles::placeholder(),
            created_at,
        }
    }
}
