//! Interface to the remote quality service.
//!
//! The service is opaque: it receives up to one JPEG per stage and answers
//! with a score, free-text feedback and optionally the angles it thinks are
//! missing. Implementations are handed to the session controller at
//! construction.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::models::{Frame, JPEG_MIME_TYPE};

/// At most one image per stage.
pub const MAX_ORACLE_IMAGES: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    Pt,
    En,
}

impl Locale {
    /// Language the oracle should write its feedback in.
    pub fn language_name(&self) -> &'static str {
        match self {
            Locale::Es => "Spanish",
            Locale::Pt => "Portuguese",
            Locale::En => "English",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub data: Arc<Vec<u8>>,
}

impl From<&Frame> for EncodedImage {
    fn from(frame: &Frame) -> Self {
        Self {
            mime_type: JPEG_MIME_TYPE,
            data: Arc::clone(&frame.payload),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityRequest {
    pub images: Vec<EncodedImage>,
    pub locale: Locale,
}

impl QualityRequest {
    pub fn from_frames<'a>(frames: impl IntoIterator<Item = &'a Frame>, locale: Locale) -> Self {
        Self {
            images: frames
                .into_iter()
                .take(MAX_ORACLE_IMAGES)
                .map(EncodedImage::from)
                .collect(),
            locale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityVerdict {
    pub quality_score: f64,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_angles: Option<Vec<f64>>,
}

impl QualityVerdict {
    pub fn validate(self) -> Result<Self, OracleError> {
        if !self.quality_score.is_finite() || !(0.0..=100.0).contains(&self.quality_score) {
            return Err(OracleError::Malformed(format!(
                "qualityScore {} outside 0..=100",
                self.quality_score
            )));
        }
        Ok(self)
    }

    pub fn is_accepted(&self, threshold: f64) -> bool {
        self.quality_score > threshold
    }
}

/// Parses a JSON verdict as returned by the service. Missing `qualityScore`
/// or `feedback` makes it malformed.
pub fn parse_verdict(body: &str) -> Result<QualityVerdict, OracleError> {
    serde_json::from_str::<QualityVerdict>(body)
        .map_err(|err| OracleError::Malformed(err.to_string()))?
        .validate()
}

pub trait QualityOracle: Send + Sync + 'static {
    fn assess_quality(
        &self,
        request: QualityRequest,
    ) -> impl Future<Output = Result<QualityVerdict, OracleError>> + Send;
}
