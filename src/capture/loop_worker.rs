use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbImage;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::coverage::AngleSource;
use crate::lighting::assess_lighting;
use crate::models::Frame;
use crate::session::{ScanStage, SessionEvent, SessionState, StatusMessage};

use super::camera::{Camera, Facing, StreamLease};
use super::encode::encode_jpeg;

// Set to true to enable per-tick logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Everything one stage's capture loop needs.
pub struct StageContext<C: Camera> {
    pub camera: Arc<C>,
    pub facing: Facing,
    pub stage: ScanStage,
    pub epoch: u64,
    pub tick_interval: Duration,
    pub capture_timeout: Duration,
    pub jpeg_quality: u8,
    pub angles: Box<dyn AngleSource>,
    pub state: Arc<Mutex<SessionState>>,
    pub events: broadcast::Sender<SessionEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    StageComplete,
    Cancelled,
}

enum TickOutcome {
    Recorded,
    StageComplete,
    /// The session moved on while this tick was in flight.
    Stale,
}

pub async fn capture_loop<C: Camera>(
    mut ctx: StageContext<C>,
    cancel_token: CancellationToken,
) -> Result<LoopExit> {
    // Not raced against cancellation: a stream handed out by the camera
    // always goes back through the lease.
    let lease = match StreamLease::acquire(Arc::clone(&ctx.camera), ctx.facing).await {
        Ok(lease) if cancel_token.is_cancelled() => {
            drop(lease);
            return Ok(LoopExit::Cancelled);
        }
        Ok(lease) => lease,
        Err(err) => {
            // No retry: the stage stays open without frames until restart.
            log_warn!(
                "camera unavailable for {} stage (epoch {}): {err}",
                ctx.stage.as_str(),
                ctx.epoch
            );
            let reason = err.to_string();
            publish_status(
                &ctx.state,
                &ctx.events,
                ctx.epoch,
                StatusMessage::DeviceUnavailable(reason.clone()),
                SessionEvent::DeviceUnavailable {
                    epoch: ctx.epoch,
                    reason,
                },
            )
            .await;
            cancel_token.cancelled().await;
            return Ok(LoopExit::Cancelled);
        }
    };

    log_info!(
        "capture loop started for {} stage (epoch {}, every {}ms)",
        ctx.stage.as_str(),
        ctx.epoch,
        ctx.tick_interval.as_millis()
    );

    let mut ticker = tokio::time::interval_at(Instant::now() + ctx.tick_interval, ctx.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("capture loop for {} stage shutting down", ctx.stage.as_str());
                return Ok(LoopExit::Cancelled);
            }
            _ = ticker.tick() => {
                tick += 1;
                let outcome = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        log_info!("capture loop cancelled during tick {tick}");
                        return Ok(LoopExit::Cancelled);
                    }
                    outcome = perform_tick(&mut ctx, &lease) => outcome,
                };

                match outcome {
                    Ok(TickOutcome::Recorded) => {}
                    Ok(TickOutcome::StageComplete) => {
                        log_info!("{} stage fully covered after {tick} ticks", ctx.stage.as_str());
                        return Ok(LoopExit::StageComplete);
                    }
                    Ok(TickOutcome::Stale) => {
                        log_info!("capture loop for epoch {} is stale, stopping", ctx.epoch);
                        return Ok(LoopExit::Cancelled);
                    }
                    Err(err) => {
                        log_error!("capture tick {tick} failed for {} stage: {err:?}", ctx.stage.as_str());
                        report_capture_failure(&ctx.state, &ctx.events, ctx.epoch, format!("{err:#}")).await;
                    }
                }
            }
        }
    }
}

async fn perform_tick<C: Camera>(
    ctx: &mut StageContext<C>,
    lease: &StreamLease<C>,
) -> Result<TickOutcome> {
    let tick_start = Instant::now();

    let image = await_still(ctx, lease).await?;
    let capture_ms = tick_start.elapsed().as_millis();

    let quality = ctx.jpeg_quality;
    let (lighting, payload) = tokio::task::spawn_blocking(move || {
        let lighting = assess_lighting(&image);
        encode_jpeg(&image, quality).map(|payload| (lighting, payload))
    })
    .await
    .context("frame analysis worker join failed")?
    .context("jpeg encoding failed")?;

    // No awaits past this point: the frame, its angle and the coverage
    // update land together or not at all.
    let mut state = ctx.state.lock().await;
    if !state.accepts_frames(ctx.epoch, ctx.stage) {
        return Ok(TickOutcome::Stale);
    }

    state.record_lighting(lighting);
    let _ = ctx.events.send(SessionEvent::LightingSampled {
        epoch: ctx.epoch,
        reading: lighting,
    });

    let angle = ctx.angles.next_angle().context("angle source failed")?;
    let frame = Frame::new(Arc::new(payload), angle, ctx.stage, Utc::now());
    let frame_id = frame.id;
    let payload_len = frame.payload_len();
    let update = state.record_frame(frame);
    drop(state);

    let _ = ctx.events.send(SessionEvent::FrameCaptured {
        epoch: ctx.epoch,
        frame_id,
        stage: ctx.stage,
        angle,
        update,
    });

    log_debug!(
        "frame {frame_id}: {angle}° -> sector {} (new: {}), coverage {:.1}%, lighting {:?}, {payload_len} bytes, capture {capture_ms}ms, total {}ms",
        update.sector_index,
        update.is_new_sector,
        update.coverage_fraction * 100.0,
        lighting.status,
        tick_start.elapsed().as_millis()
    );

    if update.is_stage_complete {
        Ok(TickOutcome::StageComplete)
    } else {
        Ok(TickOutcome::Recorded)
    }
}

/// Waits for the one still of this tick. Past the capture timeout the
/// failure is reported once and the same capture keeps being awaited; ticks
/// that fall due meanwhile are delayed by the interval, never re-issued.
async fn await_still<C: Camera>(ctx: &StageContext<C>, lease: &StreamLease<C>) -> Result<RgbImage> {
    let mut capture = lease.start_capture();
    let deadline = tokio::time::sleep(ctx.capture_timeout);
    tokio::pin!(deadline);
    let mut timed_out = false;

    let joined = loop {
        tokio::select! {
            biased;
            joined = &mut capture => break joined,
            _ = &mut deadline, if !timed_out => {
                timed_out = true;
                log_warn!(
                    "still capture for {} stage exceeded {}ms, still waiting",
                    ctx.stage.as_str(),
                    ctx.capture_timeout.as_millis()
                );
                report_capture_failure(&ctx.state, &ctx.events, ctx.epoch, "timed out".to_string()).await;
            }
        }
    };

    let image = joined
        .context("capture worker join failed")?
        .context("still capture failed")?;
    if timed_out {
        log_info!("late still arrived for {} stage", ctx.stage.as_str());
    }
    Ok(image)
}

async fn report_capture_failure(
    state: &Mutex<SessionState>,
    events: &broadcast::Sender<SessionEvent>,
    epoch: u64,
    reason: String,
) {
    publish_status(
        state,
        events,
        epoch,
        StatusMessage::CaptureFailed(reason.clone()),
        SessionEvent::CaptureFailed { epoch, reason },
    )
    .await;
}

/// Sets the status and emits `event`, unless `epoch` is stale.
async fn publish_status(
    state: &Mutex<SessionState>,
    events: &broadcast::Sender<SessionEvent>,
    epoch: u64,
    status: StatusMessage,
    event: SessionEvent,
) {
    let mut state = state.lock().await;
    if state.set_status(epoch, status) {
        let _ = events.send(event);
    }
}
