//! Runs one simulated scan session against a synthetic camera and a local
//! stand-in for the quality service, printing every session event as JSON.
//!
//! Usage: `dental-capture [config.json]`

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use log::{info, warn};
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;

use dental_capture::{
    error::{CameraError, OracleError},
    lighting::{assess_lighting, LightingStatus},
    Camera, CaptureConfig, Facing, QualityOracle, QualityRequest, QualityVerdict, ScannerState,
    SessionController, SessionEvent,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// Produces a plaster-coloured gradient whose exposure drifts a little
/// from frame to frame.
struct SyntheticCamera;

struct SyntheticStream {
    exposure: f64,
}

impl Camera for SyntheticCamera {
    type Stream = SyntheticStream;

    fn acquire_stream(&self, facing: Facing) -> Result<SyntheticStream, CameraError> {
        info!("Synthetic camera opened ({facing:?})");
        Ok(SyntheticStream { exposure: 1.0 })
    }

    fn capture_still(&self, stream: &mut SyntheticStream) -> Result<RgbImage, CameraError> {
        let drift: f64 = rand::thread_rng().gen_range(-0.08..0.08);
        stream.exposure = (stream.exposure + drift).clamp(0.4, 1.4);
        let exposure = stream.exposure;

        Ok(RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            let shade = 90.0 + 80.0 * f64::from(x + y) / f64::from(FRAME_WIDTH + FRAME_HEIGHT);
            let level = |base: f64| (base * exposure).clamp(0.0, 255.0) as u8;
            Rgb([level(shade + 30.0), level(shade + 20.0), level(shade)])
        }))
    }

    fn release(&self, _stream: SyntheticStream) {
        info!("Synthetic camera released");
    }
}

/// Grades the submitted frames by their lighting alone.
struct LocalOracle;

impl QualityOracle for LocalOracle {
    fn assess_quality(
        &self,
        request: QualityRequest,
    ) -> impl Future<Output = Result<QualityVerdict, OracleError>> + Send {
        async move {
            let mut score = 100.0;
            let mut notes = Vec::new();
            for (index, image) in request.images.iter().enumerate() {
                let decoded = image::load_from_memory(&image.data)
                    .map_err(|err| OracleError::Malformed(err.to_string()))?
                    .to_rgb8();
                match assess_lighting(&decoded).status {
                    LightingStatus::Optimal => {}
                    status => {
                        score -= 20.0;
                        notes.push(format!("frame {} lighting {status:?}", index + 1));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;

            let feedback = if notes.is_empty() {
                "consistent lighting across stages".to_string()
            } else {
                notes.join(", ")
            };
            Ok(QualityVerdict {
                quality_score: score,
                feedback,
                missing_angles: None,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dental_capture::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dental-capture.json"));
    let config = CaptureConfig::load(&config_path)?;
    info!(
        "Scanning {} sectors per stage every {}ms",
        config.sector_count, config.tick_interval_ms
    );

    let controller = SessionController::new(Arc::new(SyntheticCamera), Arc::new(LocalOracle), config);
    let mut events = controller.subscribe();
    controller.start_session().await?;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {skipped} session events");
                continue;
            }
            Err(RecvError::Closed) => bail!("session event channel closed"),
        };

        println!("{}", serde_json::to_string(&event).context("failed to serialize event")?);

        match event {
            SessionEvent::Completed { result, .. } => {
                info!(
                    "Scan {} accepted with score {} ({:.1}% nominal accuracy)",
                    result.id,
                    result.quality_score,
                    result.accuracy * 100.0
                );
                break;
            }
            SessionEvent::Failed { reason, .. } => {
                warn!("Scan failed: {reason}");
                break;
            }
            _ => {}
        }
    }

    let snapshot = controller.snapshot().await;
    if snapshot.lifecycle != ScannerState::Completed {
        controller.restart().await?;
    }
    Ok(())
}
