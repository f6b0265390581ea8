use madani_core::interfaces::CaptureStream;
use madani_core::{AuthPhase, CapturePurpose, CaptureStage};
use uuid::Uuid;

/// How a capture session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub purpose: CapturePurpose,
    /// Phase the close button returns to. `None` hides the close button.
    pub close_target: Option<AuthPhase>,
}

impl CaptureOptions {
    pub fn login(close_target: Option<AuthPhase>) -> Self {
        Self {
            purpose: CapturePurpose::Login,
            close_target,
        }
    }

    pub fn payment(close_target: Option<AuthPhase>) -> Self {
        Self {
            purpose: CapturePurpose::PaymentAuthorization,
            close_target,
        }
    }
}

/// Correlates an in-flight camera acquisition with the session that asked
/// for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureTicket {
    pub session: Uuid,
    pub generation: u64,
}

/// The period during which the camera may be held for one verification.
///
/// The session is the only owner of the stream. Releasing it (explicitly or
/// by dropping the session) stops every track.
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    options: CaptureOptions,
    stage: CaptureStage,
    stream: Option<CaptureStream>,
    fallback_clip: Option<String>,
}

impl CaptureSession {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            stage: CaptureStage::Initializing,
            stream: None,
            fallback_clip: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> CaptureOptions {
        self.options
    }

    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    /// Whether a live camera stream is currently held.
    pub fn holds_camera(&self) -> bool {
        self.stream.is_some()
    }

    pub fn fallback_clip(&self) -> Option<&str> {
        self.fallback_clip.as_deref()
    }

    pub(crate) fn attach(&mut self, stream: CaptureStream) {
        self.stream = Some(stream);
        self.stage = CaptureStage::Aligning;
    }

    pub(crate) fn fall_back(&mut self, clip: Option<String>) {
        self.fallback_clip = clip;
        self.stage = CaptureStage::Aligning;
    }

    pub(crate) fn fail(&mut self) {
        self.release();
        self.stage = CaptureStage::Failed;
    }

    pub(crate) fn advance(&mut self, stage: CaptureStage) {
        self.stage = stage;
    }

    /// Stop and drop the camera stream. Returns how many tracks were live.
    pub fn release(&mut self) -> usize {
        match self.stream.take() {
            Some(mut stream) => stream.stop_all(),
            None => 0,
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use madani_core::config::CameraMode;

    use super::*;
    use crate::capture::SimulatedCamera;

    #[test]
    fn attach_moves_to_aligning() {
        let camera = SimulatedCamera::new(CameraMode::Available);
        let mut session = CaptureSession::new(CaptureOptions::login(None));
        assert_eq!(session.stage(), CaptureStage::Initializing);

        session.attach(camera.open_stream());
        assert_eq!(session.stage(), CaptureStage::Aligning);
        assert!(session.holds_camera());
        assert_eq!(camera.live_tracks(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let camera = SimulatedCamera::new(CameraMode::Available);
        let mut session = CaptureSession::new(CaptureOptions::login(None));
        session.attach(camera.open_stream());

        assert_eq!(session.release(), 1);
        assert_eq!(session.release(), 0);
        assert!(!session.holds_camera());
        assert_eq!(camera.live_tracks(), 0);
    }

    #[test]
    fn dropping_session_stops_camera() {
        let camera = SimulatedCamera::new(CameraMode::Available);
        let mut session = CaptureSession::new(CaptureOptions::payment(Some(AuthPhase::Authenticated)));
        session.attach(camera.open_stream());
        drop(session);
        assert_eq!(camera.live_tracks(), 0);
    }

    #[test]
    fn fail_releases_camera() {
        let camera = SimulatedCamera::new(CameraMode::Available);
        let mut session = CaptureSession::new(CaptureOptions::login(None));
        session.attach(camera.open_stream());
        session.fail();
        assert_eq!(session.stage(), CaptureStage::Failed);
        assert_eq!(camera.live_tracks(), 0);
    }

    #[test]
    fn fallback_runs_without_camera() {
        let mut session = CaptureSession::new(CaptureOptions::login(None));
        session.fall_back(Some("/authenticate2.mp4".into()));
        assert_eq!(session.stage(), CaptureStage::Aligning);
        assert!(!session.holds_camera());
        assert_eq!(session.fallback_clip(), Some("/authenticate2.mp4"));
    }
}
