use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError, TryLockError,
};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::CameraError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Facing {
    Front,
    #[default]
    Environment,
}

/// Blocking camera access. Calls are made from the blocking thread pool.
pub trait Camera: Send + Sync + 'static {
    type Stream: Send + 'static;

    fn acquire_stream(&self, facing: Facing) -> Result<Self::Stream, CameraError>;

    fn capture_still(&self, stream: &mut Self::Stream) -> Result<RgbImage, CameraError>;

    fn release(&self, stream: Self::Stream) {
        drop(stream);
    }
}

/// Exclusive hold on a live stream. The stream goes back to the camera when
/// the lease is dropped, whichever way the capture loop exits. Dropping never
/// waits for a still in flight; the capture worker hands the stream back
/// once it finishes.
pub struct StreamLease<C: Camera> {
    camera: Arc<C>,
    shared: Arc<LeaseShared<C::Stream>>,
}

struct LeaseShared<S> {
    stream: Mutex<Option<S>>,
    closed: AtomicBool,
}

impl<S> LeaseShared<S> {
    /// Takes the stream out. With `wait` false this gives up while a capture
    /// holds the lock.
    fn take_stream(&self, wait: bool) -> Option<S> {
        let guard = if wait {
            Some(self.stream.lock().unwrap_or_else(PoisonError::into_inner))
        } else {
            match self.stream.try_lock() {
                Ok(guard) => Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            }
        };
        guard.and_then(|mut guard| guard.take())
    }
}

impl<C: Camera> StreamLease<C> {
    pub async fn acquire(camera: Arc<C>, facing: Facing) -> Result<Self, CameraError> {
        let stream = tokio::task::spawn_blocking({
            let camera = Arc::clone(&camera);
            move || camera.acquire_stream(facing)
        })
        .await
        .map_err(|err| CameraError::Unavailable(format!("camera worker join failed: {err}")))??;

        Ok(Self {
            camera,
            shared: Arc::new(LeaseShared {
                stream: Mutex::new(Some(stream)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Starts one still on the blocking pool. Dropping the handle detaches
    /// the capture; it still runs to completion.
    pub fn start_capture(&self) -> JoinHandle<Result<RgbImage, CameraError>> {
        let camera = Arc::clone(&self.camera);
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let result = {
                let mut guard = shared.stream.lock().unwrap_or_else(PoisonError::into_inner);
                match guard.as_mut() {
                    Some(stream) => camera.capture_still(stream),
                    None => Err(CameraError::StreamReleased),
                }
            };
            // The lease may have been dropped while the still was in flight.
            if shared.closed.load(Ordering::SeqCst) {
                if let Some(stream) = shared.take_stream(true) {
                    camera.release(stream);
                }
            }
            result
        })
    }

    pub async fn capture_still(&self) -> Result<RgbImage, CameraError> {
        self.start_capture()
            .await
            .map_err(|err| CameraError::Capture(format!("capture worker join failed: {err}")))?
    }
}

impl<C: Camera> Drop for StreamLease<C> {
    fn drop(&mut self) {
        // Set before trying the lock so an in-flight capture sees it on exit.
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(stream) = self.shared.take_stream(false) {
            self.camera.release(stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CountingCamera {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl Camera for CountingCamera {
        type Stream = u32;

        fn acquire_stream(&self, _facing: Facing) -> Result<u32, CameraError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }

        fn capture_still(&self, stream: &mut u32) -> Result<RgbImage, CameraError> {
            *stream += 1;
            Ok(RgbImage::from_pixel(4, 4, Rgb([*stream as u8, 0, 0])))
        }

        fn release(&self, _stream: u32) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn lease_releases_on_drop() {
        let camera = Arc::new(CountingCamera::default());
        let lease = StreamLease::acquire(Arc::clone(&camera), Facing::Environment)
            .await
            .unwrap();

        let first = lease.capture_still().await.unwrap();
        let second = lease.capture_still().await.unwrap();
        assert_eq!(first.get_pixel(0, 0).0[0], 8);
        assert_eq!(second.get_pixel(0, 0).0[0], 9);
        assert_eq!(camera.released.load(Ordering::SeqCst), 0);

        drop(lease);
        assert_eq!(camera.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(camera.released.load(Ordering::SeqCst), 1);
    }

    struct DeniedCamera;

    impl Camera for DeniedCamera {
        type Stream = ();

        fn acquire_stream(&self, _facing: Facing) -> Result<(), CameraError> {
            Err(CameraError::PermissionDenied)
        }

        fn capture_still(&self, _stream: &mut ()) -> Result<RgbImage, CameraError> {
            unreachable!("never acquired")
        }
    }

    #[tokio::test]
    async fn acquisition_failure_is_reported() {
        let result = StreamLease::acquire(Arc::new(DeniedCamera), Facing::Front).await;
        assert!(matches!(result, Err(CameraError::PermissionDenied)));
    }

    struct SlowCamera {
        released: AtomicUsize,
    }

    impl Camera for SlowCamera {
        type Stream = ();

        fn acquire_stream(&self, _facing: Facing) -> Result<(), CameraError> {
            Ok(())
        }

        fn capture_still(&self, _stream: &mut ()) -> Result<RgbImage, CameraError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])))
        }

        fn release(&self, _stream: ()) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_mid_capture_does_not_wait_and_still_releases() {
        let camera = Arc::new(SlowCamera {
            released: AtomicUsize::new(0),
        });
        let lease = StreamLease::acquire(Arc::clone(&camera), Facing::Environment)
            .await
            .unwrap();

        let pending = lease.start_capture();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let dropped_at = Instant::now();
        drop(lease);
        assert!(dropped_at.elapsed() < Duration::from_millis(100));

        // Either the drop or the finishing capture hands the stream back.
        let _ = pending.await.unwrap();
        assert_eq!(camera.released.load(Ordering::SeqCst), 1);
    }
}
