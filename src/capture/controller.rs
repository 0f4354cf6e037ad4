use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::camera::Camera;
use super::loop_worker::{capture_loop, LoopExit, StageContext};

/// Owns the capture loop of the stage currently being scanned. At most one
/// loop, and therefore one camera stream, is alive at a time.
pub struct CaptureController {
    handle: Option<JoinHandle<Result<LoopExit>>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the loop for `ctx.stage`. Cancelling `parent` also stops it.
    pub fn start_stage<C: Camera>(
        &mut self,
        ctx: StageContext<C>,
        parent: &CancellationToken,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture loop already active");
        }

        info!(
            "Starting capture loop for {} stage (epoch {})",
            ctx.stage.as_str(),
            ctx.epoch
        );

        let cancel_token = parent.child_token();
        let handle = tokio::spawn(capture_loop(ctx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Waits for the running loop to finish its stage or be cancelled.
    pub async fn wait_for_stage(&mut self) -> Result<LoopExit> {
        let Some(handle) = self.handle.take() else {
            bail!("no capture loop running");
        };
        self.cancel_token = None;

        handle.await.context("capture loop task failed to join")?
    }

    pub async fn stop_capture(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")?
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
