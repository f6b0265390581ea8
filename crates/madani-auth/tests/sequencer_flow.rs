use std::sync::Arc;
use std::time::Duration;

use madani_auth::{AuthController, AuthHandle, SequencerError, UserAction};
use madani_core::config::{AppConfig, CameraMode, FailurePolicy};
use madani_core::interfaces::CaptureDevice;
use madani_core::{AuthEvent, AuthPhase, CaptureStage, Landing, PendingAction};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Harness {
    handle: AuthHandle,
    events: mpsc::UnboundedReceiver<AuthEvent>,
    task: JoinHandle<()>,
    camera: Arc<madani_auth::SimulatedCamera>,
}

impl Harness {
    fn start(config: AppConfig, mode: CameraMode) -> Self {
        Self::with_camera(config, madani_auth::SimulatedCamera::new(mode))
    }

    fn with_camera(config: AppConfig, camera: madani_auth::SimulatedCamera) -> Self {
        let camera = Arc::new(camera);
        let device: Arc<dyn CaptureDevice> = camera.clone();
        let (handle, events, task) = AuthController::spawn(&config, device);
        Self {
            handle,
            events,
            task,
            camera,
        }
    }

    async fn wait_phase(&self, phase: AuthPhase) {
        self.handle.wait_for(|s| s.phase() == phase).await.unwrap();
    }

    async fn to_capture(&self) {
        self.handle.act(UserAction::Login).await.unwrap();
        self.handle.act(UserAction::Confirm).await.unwrap();
        self.wait_phase(AuthPhase::ProviderConsentPending).await;
        self.handle.act(UserAction::Confirm).await.unwrap();
    }

    /// Shut down and collect every event the controller emitted.
    async fn finish(mut self) -> (Vec<AuthEvent>, Arc<madani_auth::SimulatedCamera>) {
        self.handle.shutdown();
        self.task.await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (events, self.camera)
    }
}

fn count(events: &[AuthEvent], pred: impl Fn(&AuthEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

fn entered(events: &[AuthEvent], phase: AuthPhase) -> bool {
    events
        .iter()
        .any(|e| matches!(e, AuthEvent::PhaseChanged { to, .. } if *to == phase))
}

#[tokio::test(start_paused = true)]
async fn login_runs_to_authenticated_on_real_timers() {
    let h = Harness::start(AppConfig::default(), CameraMode::Available);

    h.handle.act(UserAction::Login).await.unwrap();
    h.handle.act(UserAction::Confirm).await.unwrap();
    let redirect_started = Instant::now();
    h.wait_phase(AuthPhase::ProviderConsentPending).await;
    assert!(redirect_started.elapsed() >= Duration::from_secs(3));

    h.handle.act(UserAction::Confirm).await.unwrap();
    let scanning = h
        .handle
        .wait_for(|s| s.capture_stage == Some(CaptureStage::Scanning))
        .await
        .unwrap();
    assert!(scanning.camera_live);
    assert_eq!(h.camera.live_tracks(), 1);

    h.wait_phase(AuthPhase::AuthSucceeded).await;
    assert_eq!(h.camera.live_tracks(), 0);

    let done = h
        .handle
        .wait_for(|s| s.phase() == AuthPhase::Authenticated)
        .await
        .unwrap();
    assert!(done.idle());
    assert_eq!(done.landing, Landing::Home);
    assert_eq!(done.pending_action, None);

    let (events, camera) = h.finish().await;
    assert_eq!(camera.live_tracks(), 0);
    assert_eq!(camera.acquisitions(), 1);
    assert_eq!(
        count(&events, |e| matches!(e, AuthEvent::VerificationComplete)),
        1
    );
    let countdown: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            AuthEvent::SuccessCountdown(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![3, 2, 1]);
}

#[tokio::test(start_paused = true)]
async fn dismiss_skips_remaining_countdown() {
    let h = Harness::start(AppConfig::default(), CameraMode::Available);
    h.to_capture().await;
    h.wait_phase(AuthPhase::AuthSucceeded).await;

    h.handle.act(UserAction::Dismiss).await.unwrap();
    let returning = Instant::now();
    h.wait_phase(AuthPhase::Authenticated).await;
    assert!(returning.elapsed() >= Duration::from_millis(2500));
    assert!(returning.elapsed() < Duration::from_secs(3));

    let (events, _) = h.finish().await;
    assert!(!events.contains(&AuthEvent::SuccessCountdown(1)));
}

#[tokio::test(start_paused = true)]
async fn denied_camera_proceeds_after_fallback_delay() {
    let h = Harness::start(AppConfig::default(), CameraMode::Denied);
    h.to_capture().await;
    let capture_started = Instant::now();

    let succeeded = h
        .handle
        .wait_for(|s| s.phase() == AuthPhase::AuthSucceeded)
        .await
        .unwrap();
    assert!(capture_started.elapsed() >= Duration::from_millis(3500));
    assert!(!succeeded.camera_live);

    h.wait_phase(AuthPhase::Authenticated).await;
    let (events, camera) = h.finish().await;
    assert_eq!(count(&events, |e| matches!(e, AuthEvent::Advisory(_))), 1);
    assert_eq!(
        count(&events, |e| matches!(e, AuthEvent::VerificationComplete)),
        1
    );
    assert_eq!(camera.live_tracks(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_permission_prompt_times_out_into_fallback() {
    let mut config = AppConfig::default();
    config.capture.acquire_timeout_ms = 2000;
    let h = Harness::start(config, CameraMode::Hang);
    h.to_capture().await;
    let capture_started = Instant::now();

    h.wait_phase(AuthPhase::AuthSucceeded).await;
    assert!(capture_started.elapsed() >= Duration::from_millis(5500));

    let (events, _) = h.finish().await;
    assert_eq!(count(&events, |e| matches!(e, AuthEvent::Advisory(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_aborts_unbounded_acquisition() {
    let mut config = AppConfig::default();
    config.capture.acquire_timeout_ms = 0;
    let h = Harness::start(config, CameraMode::Hang);
    h.to_capture().await;

    let capturing = h.handle.snapshot();
    assert_eq!(capturing.phase(), AuthPhase::BiometricCapture);
    assert_eq!(capturing.capture_stage, Some(CaptureStage::Initializing));
    assert_eq!(capturing.pending_tasks, 1);

    h.handle.reset().await.unwrap();
    let reset = h.handle.snapshot();
    assert_eq!(reset.phase(), AuthPhase::LoggedOut);
    assert_eq!(reset.pending_tasks, 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.handle.phase(), AuthPhase::LoggedOut);
}

#[tokio::test(start_paused = true)]
async fn slow_permission_grant_after_reset_is_released() {
    let camera =
        madani_auth::SimulatedCamera::new(CameraMode::Available).with_latency(Duration::from_secs(2));
    assert_eq!(camera.mode(), CameraMode::Available);
    let h = Harness::with_camera(AppConfig::default(), camera);
    h.to_capture().await;
    assert_eq!(h.handle.snapshot().capture_stage, Some(CaptureStage::Initializing));

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.handle.reset().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.handle.phase(), AuthPhase::LoggedOut);
    assert_eq!(h.camera.live_tracks(), 0);
    assert_eq!(h.camera.acquisitions(), 1);
}

#[tokio::test(start_paused = true)]
async fn unvalidated_session_countdown_does_not_stop_controller() {
    let mut config = AppConfig::default();
    config.timing.session_countdown_secs = 1_000_000_000_000_000;
    let h = Harness::start(config, CameraMode::Available);

    assert_eq!(
        h.handle.act(UserAction::Login).await,
        Ok(AuthPhase::ConsentRequested)
    );
    let consent = h.handle.snapshot();
    assert!(consent.session_expires_at.is_some());
    assert!(consent.surface.body.contains("1440 MINUTES 0 SECONDS"));
    assert_eq!(
        h.handle.act(UserAction::Confirm).await,
        Ok(AuthPhase::RedirectingToProvider)
    );
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn reset_during_redirect_never_reaches_provider() {
    let h = Harness::start(AppConfig::default(), CameraMode::Available);
    h.handle.act(UserAction::Login).await.unwrap();
    h.handle.act(UserAction::Confirm).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.handle.reset().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.phase(), AuthPhase::LoggedOut);
    assert!(snapshot.idle());

    let (events, camera) = h.finish().await;
    assert!(!entered(&events, AuthPhase::ProviderConsentPending));
    assert_eq!(camera.acquisitions(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_confirms_advance_once() {
    let h = Harness::start(AppConfig::default(), CameraMode::Available);
    h.handle.act(UserAction::Login).await.unwrap();
    let token = h.handle.snapshot().surface.token;

    let (first, second) = tokio::join!(
        h.handle.act_on(token, UserAction::Confirm),
        h.handle.act_on(token, UserAction::Confirm),
    );
    let accepted = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    assert!(matches!(
        first.and(second),
        Err(SequencerError::StaleSurface { .. })
    ));
    assert_eq!(h.handle.phase(), AuthPhase::RedirectingToProvider);

    let (events, _) = h.finish().await;
    assert_eq!(
        count(&events, |e| matches!(
            e,
            AuthEvent::PhaseChanged {
                to: AuthPhase::RedirectingToProvider,
                ..
            }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn queued_payment_lands_on_resume_payment() {
    let h = Harness::start(AppConfig::default(), CameraMode::Available);
    h.handle
        .set_pending_action(PendingAction::payment())
        .await
        .unwrap();
    h.to_capture().await;
    assert_eq!(h.handle.snapshot().surface.title, "Authorize Payment");

    let done = h
        .handle
        .wait_for(|s| s.phase() == AuthPhase::Authenticated)
        .await
        .unwrap();
    assert_eq!(done.pending_action, Some(PendingAction::payment()));
    assert_eq!(done.landing, Landing::ResumePayment);

    assert_eq!(
        h.handle.take_pending_action().await.unwrap(),
        Some(PendingAction::payment())
    );
    assert_eq!(h.handle.snapshot().landing, Landing::Home);
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn strict_policy_waits_for_retry_or_close() {
    let mut config = AppConfig::default();
    config.capture.failure_policy = FailurePolicy::Strict;
    config.capture.login_close_target = Some(AuthPhase::LoggedOut);
    let h = Harness::start(config, CameraMode::Denied);
    h.to_capture().await;

    let failed = h
        .handle
        .wait_for(|s| s.capture_stage == Some(CaptureStage::Failed))
        .await
        .unwrap();
    assert!(failed.idle());
    assert!(failed.offers(UserAction::Retry));

    h.handle.act(UserAction::Retry).await.unwrap();
    h.handle
        .wait_for(|s| s.capture_stage == Some(CaptureStage::Failed))
        .await
        .unwrap();
    assert_eq!(h.camera.acquisitions(), 2);

    h.handle.act(UserAction::Close).await.unwrap();
    assert_eq!(h.handle.phase(), AuthPhase::LoggedOut);

    let (events, _) = h.finish().await;
    assert!(!events.contains(&AuthEvent::VerificationComplete));
    assert_eq!(count(&events, |e| matches!(e, AuthEvent::Advisory(_))), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_held_camera() {
    let h = Harness::start(AppConfig::default(), CameraMode::Available);
    h.to_capture().await;
    h.handle
        .wait_for(|s| s.camera_live)
        .await
        .unwrap();
    assert_eq!(h.camera.live_tracks(), 1);

    let handle = h.handle.clone();
    let (events, camera) = h.finish().await;
    assert_eq!(camera.live_tracks(), 0);
    assert!(entered(&events, AuthPhase::LoggedOut));
    assert_eq!(
        handle.act(UserAction::Login).await,
        Err(SequencerError::ControllerClosed)
    );
}
