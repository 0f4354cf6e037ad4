use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::capture::{Camera, CaptureController, LoopExit, StageContext};
use crate::config::CaptureConfig;
use crate::coverage::{AngleSourceFactory, TickAngleSource};
use crate::error::OracleError;
use crate::models::{representative_frames, Frame, ScanResult};
use crate::oracle::{QualityOracle, QualityRequest, QualityVerdict};

use super::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use super::stage::{ScanStage, StageProgress};
use super::state::{ScannerState, SessionFailure, SessionSnapshot, SessionState, StatusMessage};

struct SessionWorker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Drives a scan from Idle through the three capture stages and the quality
/// check. Cheap to clone; clones share the same session.
pub struct SessionController<C, O> {
    state: Arc<Mutex<SessionState>>,
    camera: Arc<C>,
    oracle: Arc<O>,
    config: Arc<CaptureConfig>,
    angles: AngleSourceFactory,
    events: broadcast::Sender<SessionEvent>,
    worker: Arc<Mutex<Option<SessionWorker>>>,
}

impl<C, O> Clone for SessionController<C, O> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            camera: Arc::clone(&self.camera),
            oracle: Arc::clone(&self.oracle),
            config: Arc::clone(&self.config),
            angles: Arc::clone(&self.angles),
            events: self.events.clone(),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<C: Camera, O: QualityOracle> SessionController<C, O> {
    /// Uses the tick-derived angle source configured by `config`.
    pub fn new(camera: Arc<C>, oracle: Arc<O>, config: CaptureConfig) -> Self {
        let angles = TickAngleSource::factory(config.angle_step_degrees);
        Self::with_angle_source(camera, oracle, config, angles)
    }

    pub fn with_angle_source(
        camera: Arc<C>,
        oracle: Arc<O>,
        config: CaptureConfig,
        angles: AngleSourceFactory,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SessionState::new(config.sector_count))),
            camera,
            oracle,
            config: Arc::new(config),
            angles,
            events,
            worker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn lifecycle(&self) -> ScannerState {
        self.state.lock().await.lifecycle
    }

    pub async fn frames(&self) -> Vec<Frame> {
        self.state.lock().await.frames.clone()
    }

    /// Begins a new session at the upper arch. Any frames or result from a
    /// previous session are discarded.
    pub async fn start_session(&self) -> Result<SessionSnapshot> {
        let mut worker = self.worker.lock().await;

        {
            let state = self.state.lock().await;
            if state.lifecycle.is_active() {
                bail!("scan session already active");
            }
        }

        // The previous worker has already finished; reap it.
        stop_worker(&mut worker).await;

        let epoch = {
            let mut state = self.state.lock().await;
            state.begin_session(Utc::now())
        };
        info!("Starting scan session (epoch {epoch})");
        self.emit(SessionEvent::LifecycleChanged {
            epoch,
            lifecycle: ScannerState::Scanning,
        });

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().drive_session(epoch, cancel_token.clone()));
        *worker = Some(SessionWorker {
            handle,
            cancel_token,
        });

        Ok(self.snapshot().await)
    }

    /// Returns to Idle from any state, discarding frames and stopping any
    /// capture or quality check in flight. Late results are ignored.
    pub async fn restart(&self) -> Result<SessionSnapshot> {
        let mut worker = self.worker.lock().await;

        let epoch = {
            let mut state = self.state.lock().await;
            state.restart()
        };
        info!("Restarting scan session (epoch {epoch})");

        stop_worker(&mut worker).await;
        self.emit(SessionEvent::LifecycleChanged {
            epoch,
            lifecycle: ScannerState::Idle,
        });

        Ok(self.snapshot().await)
    }

    async fn drive_session(self, epoch: u64, cancel_token: CancellationToken) {
        let mut capture = CaptureController::new();

        loop {
            let stage = {
                let state = self.state.lock().await;
                if !state.is_current(epoch) {
                    return;
                }
                match state.progress() {
                    StageProgress::Capturing(stage) => stage,
                    StageProgress::Finished => break,
                }
            };

            self.emit(SessionEvent::StageStarted { epoch, stage });
            if let Err(err) = capture.start_stage(self.stage_context(stage, epoch), &cancel_token) {
                self.abort(epoch, err).await;
                return;
            }

            match capture.wait_for_stage().await {
                Ok(LoopExit::StageComplete) => {}
                Ok(LoopExit::Cancelled) => return,
                Err(err) => {
                    self.abort(epoch, err).await;
                    return;
                }
            }

            let progress = {
                let mut state = self.state.lock().await;
                state.complete_stage(epoch)
            };
            match progress {
                Some(StageProgress::Capturing(next)) => {
                    info!("{} stage complete, moving to {}", stage.as_str(), next.as_str());
                }
                Some(StageProgress::Finished) => {
                    info!("All stages captured (epoch {epoch}), checking quality");
                    self.emit(SessionEvent::LifecycleChanged {
                        epoch,
                        lifecycle: ScannerState::Processing,
                    });
                    break;
                }
                None => return,
            }
        }

        self.process(epoch, &cancel_token).await;
    }

    fn stage_context(&self, stage: ScanStage, epoch: u64) -> StageContext<C> {
        StageContext {
            camera: Arc::clone(&self.camera),
            facing: self.config.facing,
            stage,
            epoch,
            tick_interval: self.config.tick_interval(),
            capture_timeout: self.config.capture_timeout(),
            jpeg_quality: self.config.jpeg_quality,
            angles: (self.angles)(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
        }
    }

    async fn process(&self, epoch: u64, cancel_token: &CancellationToken) {
        let (request, preview) = {
            let state = self.state.lock().await;
            if !state.is_current(epoch) {
                return;
            }
            let samples = representative_frames(&state.frames);
            (
                QualityRequest::from_frames(samples, self.config.locale),
                state.frames.last().cloned(),
            )
        };

        let Some(preview) = preview else {
            self.fail(epoch, SessionFailure::NoFrames).await;
            return;
        };

        info!(
            "Submitting {} frames for quality check (locale {:?})",
            request.images.len(),
            request.locale
        );

        let verdict = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return,
            outcome = tokio::time::timeout(
                self.config.oracle_timeout(),
                self.oracle.assess_quality(request),
            ) => match outcome {
                Ok(verdict) => verdict.and_then(QualityVerdict::validate),
                Err(_) => Err(OracleError::Timeout(self.config.oracle_timeout_ms)),
            },
        };

        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!("Quality check failed (epoch {epoch}): {err}");
                self.fail(
                    epoch,
                    SessionFailure::OracleUnavailable {
                        detail: err.to_string(),
                    },
                )
                .await;
                return;
            }
        };

        if !verdict.is_accepted(self.config.acceptance_threshold) {
            info!(
                "Quality check rejected scan with score {} (threshold {})",
                verdict.quality_score, self.config.acceptance_threshold
            );
            self.fail(
                epoch,
                SessionFailure::QualityRejected {
                    score: verdict.quality_score,
                    feedback: verdict.feedback,
                    missing_angles: verdict.missing_angles,
                },
            )
            .await;
            return;
        }

        info!("Quality check accepted scan with score {}", verdict.quality_score);
        {
            let mut state = self.state.lock().await;
            if !state.set_status(epoch, StatusMessage::Reconstructing) {
                return;
            }
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return,
            _ = tokio::time::sleep(self.config.reconstruction_delay()) => {}
        }

        let result = ScanResult::new(
            preview,
            self.config.nominal_accuracy,
            verdict.quality_score,
            Utc::now(),
        );

        let completed = {
            let mut state = self.state.lock().await;
            state.complete(epoch, result.clone())
        };
        if completed {
            info!("Scan {} completed", result.id);
            self.emit(SessionEvent::LifecycleChanged {
                epoch,
                lifecycle: ScannerState::Completed,
            });
            self.emit(SessionEvent::Completed { epoch, result });
        } else {
            info!("Discarding result for stale epoch {epoch}");
        }
    }

    async fn fail(&self, epoch: u64, failure: SessionFailure) {
        let reason = failure.status().to_string();
        let applied = {
            let mut state = self.state.lock().await;
            state.fail(epoch, failure)
        };
        if applied {
            self.emit(SessionEvent::LifecycleChanged {
                epoch,
                lifecycle: ScannerState::Idle,
            });
            self.emit(SessionEvent::Failed { epoch, reason });
        }
    }

    async fn abort(&self, epoch: u64, err: anyhow::Error) {
        error!("Capture aborted (epoch {epoch}): {err:?}");
        self.fail(
            epoch,
            SessionFailure::CaptureAborted {
                detail: format!("{err:#}"),
            },
        )
        .await;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn stop_worker(worker: &mut Option<SessionWorker>) {
    if let Some(SessionWorker {
        handle,
        cancel_token,
    }) = worker.take()
    {
        cancel_token.cancel();
        if let Err(err) = handle.await.context("session worker failed to join") {
            error!("{err:?}");
        }
    }
}
