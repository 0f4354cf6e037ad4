#![allow(dead_code)]

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use image::{Rgb, RgbImage};
use tokio::sync::broadcast::{self, error::RecvError};

use dental_capture::{
    error::{CameraError, OracleError},
    Camera, CaptureConfig, Facing, QualityOracle, QualityRequest, QualityVerdict, SessionEvent,
};

pub const EVENT_WAIT: Duration = Duration::from_secs(20);

pub fn fast_config() -> CaptureConfig {
    CaptureConfig {
        tick_interval_ms: 1,
        capture_timeout_ms: 5_000,
        oracle_timeout_ms: 2_000,
        reconstruction_delay_ms: 0,
        ..CaptureConfig::default()
    }
}

pub fn verdict(score: f64, feedback: &str) -> QualityVerdict {
    QualityVerdict {
        quality_score: score,
        feedback: feedback.to_string(),
        missing_angles: None,
    }
}

/// Solid grey frames with counters for every stream it hands out.
pub struct FakeCamera {
    level: u8,
    deny_access: bool,
    capture_delay: Duration,
    failing_captures: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub captured: AtomicUsize,
    live: AtomicUsize,
    pub max_live: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeCamera {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            deny_access: false,
            capture_delay: Duration::ZERO,
            failing_captures: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            captured: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            deny_access: true,
            ..Self::new(128)
        }
    }

    /// The first `count` stills fail before the camera behaves.
    pub fn flaky(level: u8, count: usize) -> Self {
        Self {
            failing_captures: AtomicUsize::new(count),
            ..Self::new(level)
        }
    }

    /// Every still blocks for `delay` before returning.
    pub fn slow(level: u8, delay: Duration) -> Self {
        Self {
            capture_delay: delay,
            ..Self::new(level)
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn captures_started(&self) -> usize {
        self.captured.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Camera for FakeCamera {
    type Stream = usize;

    fn acquire_stream(&self, _facing: Facing) -> Result<usize, CameraError> {
        if self.deny_access {
            return Err(CameraError::PermissionDenied);
        }
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(self.acquired.fetch_add(1, Ordering::SeqCst))
    }

    fn capture_still(&self, _stream: &mut usize) -> Result<RgbImage, CameraError> {
        let pending_failures = self.failing_captures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_captures.store(pending_failures - 1, Ordering::SeqCst);
            return Err(CameraError::Capture("sensor glitch".into()));
        }
        let index = self.captured.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        // Vary one pixel so payloads differ between frames.
        let mut image = RgbImage::from_pixel(32, 24, Rgb([self.level; 3]));
        image.put_pixel(0, 0, Rgb([(index % 256) as u8, 0, 0]));
        Ok(image)
    }

    fn release(&self, _stream: usize) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub enum OracleScript {
    Verdict(QualityVerdict),
    Delayed(Duration, QualityVerdict),
    Unreachable,
}

pub struct StubOracle {
    script: OracleScript,
    pub requests: Mutex<Vec<QualityRequest>>,
}

impl StubOracle {
    pub fn new(script: OracleScript) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(score: f64, feedback: &str) -> Self {
        Self::new(OracleScript::Verdict(verdict(score, feedback)))
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl QualityOracle for StubOracle {
    fn assess_quality(
        &self,
        request: QualityRequest,
    ) -> impl Future<Output = Result<QualityVerdict, OracleError>> + Send {
        self.requests.lock().unwrap().push(request);
        let script = self.script.clone();
        async move {
            match script {
                OracleScript::Verdict(verdict) => Ok(verdict),
                OracleScript::Delayed(delay, verdict) => {
                    tokio::time::sleep(delay).await;
                    Ok(verdict)
                }
                OracleScript::Unreachable => {
                    Err(OracleError::Transport("connection refused".into()))
                }
            }
        }
    }
}

/// Collects events until `done` matches one, which is included.
pub async fn collect_until<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut done: F,
) -> Vec<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let mut seen = Vec::new();
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let stop = done(&event);
                    seen.push(event);
                    if stop {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => panic!("event receiver lagged by {skipped}"),
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event");
    seen
}

/// Polls `condition` until it holds or [`EVENT_WAIT`] passes.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + EVENT_WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
