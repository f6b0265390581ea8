use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use madani_core::config::CameraMode;
use madani_core::interfaces::{CaptureDevice, CaptureRequest, CaptureStream, CaptureTrack};
use madani_core::CaptureError;

/// In-process stand-in for a platform camera.
///
/// Counts live tracks so callers can check that nothing was leaked.
#[derive(Debug)]
pub struct SimulatedCamera {
    mode: CameraMode,
    latency: Duration,
    live: Arc<AtomicUsize>,
    acquisitions: AtomicUsize,
}

impl SimulatedCamera {
    pub fn new(mode: CameraMode) -> Self {
        Self {
            mode,
            latency: Duration::ZERO,
            live: Arc::new(AtomicUsize::new(0)),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Delay before the permission prompt resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    /// Tracks opened and not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Acquisition attempts, successful or not.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Open a single-track stream immediately, bypassing the mode.
    pub fn open_stream(&self) -> CaptureStream {
        self.live.fetch_add(1, Ordering::SeqCst);
        CaptureStream::new(vec![Box::new(SimulatedTrack {
            label: "Simulated front camera".into(),
            live: true,
            counter: Arc::clone(&self.live),
        })])
    }
}

#[async_trait]
impl CaptureDevice for SimulatedCamera {
    async fn acquire(&self, request: &CaptureRequest) -> Result<CaptureStream, CaptureError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Simulated camera ({}) asked for {:?} {}x{}",
            self.mode,
            request.facing,
            request.ideal_width,
            request.ideal_height
        );

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.mode {
            CameraMode::Available => Ok(self.open_stream()),
            CameraMode::Denied => Err(CaptureError::PermissionDenied),
            CameraMode::Missing => Err(CaptureError::NoDevice),
            CameraMode::Hang => std::future::pending::<Result<CaptureStream, CaptureError>>().await,
        }
    }
}

struct SimulatedTrack {
    label: String,
    live: bool,
    counter: Arc<AtomicUsize>,
}

impl CaptureTrack for SimulatedTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
