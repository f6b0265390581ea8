//! Sign-in sequencer: the single owner of the current [`AuthPhase`].
//!
//! Screens send intents through [`Sequencer::apply`]; timers and camera
//! acquisitions report back through [`Sequencer::timer_elapsed`] and
//! [`Sequencer::capture_acquired`]. Every transition goes through one
//! private `transition` call, which cancels the old phase's timers and
//! releases the camera before the new phase is entered.

use std::time::Duration;

use madani_core::config::{AppConfig, FailurePolicy};
use madani_core::interfaces::{CaptureRequest, CaptureStream};
use madani_core::{
    ActionKind, AuthEvent, AuthPhase, CaptureError, CaptureStage, Landing, PendingAction,
};

use crate::capture::{CaptureOptions, CaptureSession, CaptureTicket, FallbackClips};
use crate::countdown::{format_remaining, SessionDeadline};
use crate::error::SequencerError;
use crate::scheduler::{Scheduler, TimerKey, TimerKind};
use crate::surface::{Surface, SurfaceToken, UserAction};

const FALLBACK_ADVISORY: &str = "Camera unavailable. Continuing with a recorded sample.";
const STRICT_ADVISORY: &str = "Camera unavailable. Check camera permissions and retry.";

/// Delays and capture behavior, resolved from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SequencerSettings {
    pub redirect: Duration,
    pub success_countdown: u32,
    pub success_tick: Duration,
    pub return_to_app: Duration,
    pub align: Duration,
    pub scan: Duration,
    pub session_countdown: Duration,
    pub capture_request: CaptureRequest,
    pub failure_policy: FailurePolicy,
    pub fallback_clips: Vec<String>,
    pub login_close_target: Option<AuthPhase>,
}

impl SequencerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let timing = &config.timing;
        Self {
            redirect: timing.redirect(),
            success_countdown: timing.success_countdown_secs.max(1),
            success_tick: timing.success_tick(),
            return_to_app: timing.return_to_app(),
            align: timing.align(),
            scan: timing.scan(),
            session_countdown: timing.session_countdown(),
            capture_request: config.capture.request(),
            failure_policy: config.capture.failure_policy,
            fallback_clips: config.capture.fallback_clips.clone(),
            login_close_target: config.capture.login_close_target,
        }
    }
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct Sequencer<S: Scheduler> {
    phase: AuthPhase,
    /// Bumped on every transition and capture retry; stamps surface tokens
    /// and timer keys.
    generation: u64,
    pending_action: Option<PendingAction>,
    session_deadline: Option<SessionDeadline>,
    capture: Option<CaptureSession>,
    next_capture: Option<CaptureOptions>,
    success_remaining: u32,
    sessions_opened: u64,
    settings: SequencerSettings,
    clips: FallbackClips,
    scheduler: S,
    events: Vec<AuthEvent>,
}

impl<S: Scheduler> Sequencer<S> {
    pub fn new(settings: SequencerSettings, scheduler: S) -> Self {
        let clips = FallbackClips::new(settings.fallback_clips.clone());
        Self {
            phase: AuthPhase::LoggedOut,
            generation: 0,
            pending_action: None,
            session_deadline: None,
            capture: None,
            next_capture: None,
            success_remaining: 0,
            sessions_opened: 0,
            settings,
            clips,
            scheduler,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn token(&self) -> SurfaceToken {
        SurfaceToken::new(self.phase, self.generation)
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending_action
    }

    pub fn landing(&self) -> Landing {
        Landing::for_action(self.pending_action)
    }

    pub fn session_deadline(&self) -> Option<&SessionDeadline> {
        self.session_deadline.as_ref()
    }

    pub fn capture(&self) -> Option<&CaptureSession> {
        self.capture.as_ref()
    }

    pub fn capture_stage(&self) -> Option<CaptureStage> {
        self.capture.as_ref().map(|s| s.stage())
    }

    /// Value on the success modal's "OK (n)" button, while it is shown.
    pub fn success_countdown(&self) -> Option<u32> {
        (self.phase == AuthPhase::AuthSucceeded).then_some(self.success_remaining)
    }

    /// Capture sessions opened since this sequencer was created.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn drain_events(&mut self) -> Vec<AuthEvent> {
        std::mem::take(&mut self.events)
    }

    /// Apply an intent sent by the screen identified by `token`.
    pub fn apply(
        &mut self,
        token: SurfaceToken,
        action: UserAction,
    ) -> Result<AuthPhase, SequencerError> {
        if token != self.token() {
            tracing::debug!(
                %action,
                stale = %token.phase(),
                current = %self.phase,
                "Ignoring intent from superseded screen"
            );
            return Err(SequencerError::StaleSurface {
                action,
                phase: token.phase(),
            });
        }

        let outcome = match (self.phase, action) {
            (AuthPhase::LoggedOut, UserAction::Login) => {
                self.transition(AuthPhase::ConsentRequested);
                Ok(())
            }
            (AuthPhase::ConsentRequested, UserAction::Confirm) => {
                self.transition(AuthPhase::RedirectingToProvider);
                Ok(())
            }
            (AuthPhase::ProviderConsentPending, UserAction::Confirm) => {
                let close = self.settings.login_close_target;
                let options = match self.pending_action.map(|a| a.kind) {
                    Some(ActionKind::Payment) => CaptureOptions::payment(close),
                    _ => CaptureOptions::login(close),
                };
                self.enter_capture(options);
                Ok(())
            }
            (AuthPhase::ProviderConsentPending, UserAction::Decline) => {
                self.transition(AuthPhase::LoggedOut);
                Ok(())
            }
            (AuthPhase::BiometricCapture, UserAction::Close) => self.close_capture(),
            (AuthPhase::BiometricCapture, UserAction::Retry) => self.retry_capture(),
            (AuthPhase::AuthSucceeded, UserAction::Dismiss) => {
                self.transition(AuthPhase::ReturningToApp);
                Ok(())
            }
            (AuthPhase::Authenticated, UserAction::SignOut) => {
                self.transition(AuthPhase::LoggedOut);
                Ok(())
            }
            (AuthPhase::Authenticated, UserAction::AuthorizePayment) => {
                self.pending_action = Some(PendingAction::payment());
                self.enter_capture(CaptureOptions::payment(Some(AuthPhase::Authenticated)));
                Ok(())
            }
            (phase, action) => Err(SequencerError::NotApplicable { action, phase }),
        };

        outcome.map(|()| self.phase)
    }

    /// Queue work to resume after sign-in. Only allowed before capture.
    pub fn set_pending_action(&mut self, action: PendingAction) -> Result<(), SequencerError> {
        if !self.phase.is_pre_capture() {
            return Err(SequencerError::PendingActionLocked(self.phase));
        }
        tracing::debug!(?action, "Pending action queued");
        self.pending_action = Some(action);
        Ok(())
    }

    /// Hand the pending action to the post-auth router.
    pub fn take_pending_action(&mut self) -> Option<PendingAction> {
        self.pending_action.take()
    }

    /// Return to `LoggedOut` from anywhere (sign-out, navigation away, reload).
    pub fn reset(&mut self) {
        if self.phase == AuthPhase::LoggedOut {
            self.pending_action = None;
            return;
        }
        tracing::info!(from = %self.phase, "Resetting sign-in flow");
        self.transition(AuthPhase::LoggedOut);
    }

    pub fn timer_elapsed(&mut self, key: TimerKey) {
        self.scheduler.timer_fired(key);
        if key.generation != self.generation || key.phase != self.phase {
            tracing::debug!(?key, current = %self.phase, "Ignoring stale timer");
            return;
        }

        match key.kind {
            TimerKind::Redirect => self.transition(AuthPhase::ProviderConsentPending),
            TimerKind::SuccessTick => {
                self.success_remaining = self.success_remaining.saturating_sub(1);
                if self.success_remaining == 0 {
                    self.transition(AuthPhase::ReturningToApp);
                } else {
                    self.events
                        .push(AuthEvent::SuccessCountdown(self.success_remaining));
                    self.schedule(TimerKind::SuccessTick, self.settings.success_tick);
                }
            }
            TimerKind::Return => self.transition(AuthPhase::Authenticated),
            TimerKind::Align => {
                if self.capture_stage() == Some(CaptureStage::Aligning) {
                    self.enter_stage(CaptureStage::Scanning);
                }
            }
            TimerKind::Scan => {
                if self.capture_stage() == Some(CaptureStage::Scanning) {
                    self.complete_capture();
                }
            }
        }
    }

    pub fn capture_acquired(
        &mut self,
        ticket: CaptureTicket,
        result: Result<CaptureStream, CaptureError>,
    ) {
        self.scheduler.acquire_finished(ticket);

        let awaiting = ticket.generation == self.generation
            && self.capture.as_ref().is_some_and(|s| {
                s.id() == ticket.session && s.stage() == CaptureStage::Initializing
            });
        if !awaiting {
            // Dropping a late stream stops its tracks.
            tracing::debug!(session = %ticket.session, "Discarding acquisition for a closed session");
            return;
        }

        match result {
            Ok(stream) => {
                tracing::info!(
                    session = %ticket.session,
                    tracks = stream.track_count(),
                    "Camera acquired"
                );
                if let Some(session) = self.capture.as_mut() {
                    session.attach(stream);
                }
                self.enter_stage(CaptureStage::Aligning);
            }
            Err(err) => {
                tracing::warn!(session = %ticket.session, "Camera acquisition failed: {err}");
                match self.settings.failure_policy {
                    FailurePolicy::Proceed => {
                        let clip = self.clips.pick();
                        tracing::info!(
                            clip = clip.as_deref().unwrap_or("none"),
                            "Continuing verification on fallback clip"
                        );
                        if let Some(session) = self.capture.as_mut() {
                            session.fall_back(clip);
                        }
                        self.events
                            .push(AuthEvent::Advisory(FALLBACK_ADVISORY.into()));
                        self.enter_stage(CaptureStage::Aligning);
                    }
                    FailurePolicy::Strict => {
                        if let Some(session) = self.capture.as_mut() {
                            session.fail();
                        }
                        self.events.push(AuthEvent::Advisory(STRICT_ADVISORY.into()));
                        self.events.push(AuthEvent::CaptureStage(CaptureStage::Failed));
                    }
                }
            }
        }
    }

    /// Describe the one screen that should be shown right now.
    pub fn surface(&self) -> Surface {
        let (title, body, actions) = match self.phase {
            AuthPhase::LoggedOut => (
                "MyMadani".to_string(),
                "Log in with MyDigital ID to view your subsidies".to_string(),
                vec![UserAction::Login],
            ),
            AuthPhase::ConsentRequested => {
                let remaining = self
                    .session_deadline
                    .map(|d| d.label())
                    .unwrap_or_else(|| format_remaining(Duration::ZERO));
                (
                    "MyGOV Login".to_string(),
                    format!("Connecting to MyDigital ID... Session expires in {remaining}"),
                    vec![UserAction::Confirm],
                )
            }
            AuthPhase::RedirectingToProvider => (
                "MyDigital ID".to_string(),
                "Secured Identity Platform".to_string(),
                Vec::new(),
            ),
            AuthPhase::ProviderConsentPending => (
                "MyGOV".to_string(),
                "Send your MyDigital ID details to MyGOV to log in?".to_string(),
                vec![UserAction::Confirm, UserAction::Decline],
            ),
            AuthPhase::BiometricCapture => match &self.capture {
                Some(session) => {
                    let mut actions = Vec::new();
                    if session.stage() == CaptureStage::Failed {
                        actions.push(UserAction::Retry);
                    }
                    if session.options().close_target.is_some() {
                        actions.push(UserAction::Close);
                    }
                    (
                        session.options().purpose.title().to_string(),
                        session.stage().status_text().to_string(),
                        actions,
                    )
                }
                None => (
                    "Identity Verification".to_string(),
                    CaptureStage::Initializing.status_text().to_string(),
                    Vec::new(),
                ),
            },
            AuthPhase::AuthSucceeded => (
                "Congratulations".to_string(),
                format!(
                    "Your Digital ID has been successfully submitted. OK ({})",
                    self.success_remaining
                ),
                vec![UserAction::Dismiss],
            ),
            AuthPhase::ReturningToApp => (
                "MyMadani".to_string(),
                "Returning to application...".to_string(),
                Vec::new(),
            ),
            AuthPhase::Authenticated => (
                "MyMadani".to_string(),
                "Welcome back".to_string(),
                vec![UserAction::AuthorizePayment, UserAction::SignOut],
            ),
        };

        Surface {
            token: self.token(),
            title,
            body,
            actions,
        }
    }

    fn transition(&mut self, to: AuthPhase) {
        let from = self.phase;
        self.leave(from);
        self.phase = to;
        self.generation += 1;
        tracing::info!(%from, %to, generation = self.generation, "Auth phase changed");
        self.events.push(AuthEvent::PhaseChanged { from, to });
        self.enter(to);
    }

    fn leave(&mut self, phase: AuthPhase) {
        self.scheduler.cancel_timers(phase);
        if let Some(mut session) = self.capture.take() {
            self.scheduler.cancel_acquire();
            let stopped = session.release();
            tracing::info!(
                session = %session.id(),
                stage = %session.stage(),
                stopped,
                "Capture session closed"
            );
        }
    }

    fn enter(&mut self, phase: AuthPhase) {
        match phase {
            AuthPhase::LoggedOut => {
                self.pending_action = None;
                self.session_deadline = None;
                self.next_capture = None;
                self.success_remaining = 0;
            }
            AuthPhase::ConsentRequested => {
                self.session_deadline = Some(SessionDeadline::start(self.settings.session_countdown));
            }
            AuthPhase::RedirectingToProvider => {
                self.schedule(TimerKind::Redirect, self.settings.redirect);
            }
            AuthPhase::ProviderConsentPending | AuthPhase::Authenticated => {}
            AuthPhase::BiometricCapture => {
                let options = self
                    .next_capture
                    .take()
                    .unwrap_or(CaptureOptions::login(None));
                self.open_capture(options);
            }
            AuthPhase::AuthSucceeded => {
                self.success_remaining = self.settings.success_countdown;
                self.events
                    .push(AuthEvent::SuccessCountdown(self.success_remaining));
                self.schedule(TimerKind::SuccessTick, self.settings.success_tick);
            }
            AuthPhase::ReturningToApp => {
                self.success_remaining = 0;
                self.schedule(TimerKind::Return, self.settings.return_to_app);
            }
        }
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        let key = TimerKey {
            phase: self.phase,
            kind,
            generation: self.generation,
        };
        self.scheduler.start_timer(key, delay);
    }

    fn enter_capture(&mut self, options: CaptureOptions) {
        self.next_capture = Some(options);
        self.transition(AuthPhase::BiometricCapture);
    }

    fn open_capture(&mut self, options: CaptureOptions) {
        let session = CaptureSession::new(options);
        let ticket = CaptureTicket {
            session: session.id(),
            generation: self.generation,
        };
        tracing::info!(
            session = %ticket.session,
            purpose = %options.purpose,
            "Capture session opened"
        );
        self.capture = Some(session);
        self.sessions_opened += 1;
        self.events
            .push(AuthEvent::CaptureStage(CaptureStage::Initializing));
        self.scheduler
            .start_acquire(ticket, self.settings.capture_request.clone());
    }

    fn enter_stage(&mut self, stage: CaptureStage) {
        if let Some(session) = self.capture.as_mut() {
            session.advance(stage);
        }
        self.events.push(AuthEvent::CaptureStage(stage));
        match stage {
            CaptureStage::Aligning => self.schedule(TimerKind::Align, self.settings.align),
            CaptureStage::Scanning => self.schedule(TimerKind::Scan, self.settings.scan),
            _ => {}
        }
    }

    fn complete_capture(&mut self) {
        if let Some(session) = self.capture.as_mut() {
            session.advance(CaptureStage::Completed);
        }
        self.events
            .push(AuthEvent::CaptureStage(CaptureStage::Completed));
        self.events.push(AuthEvent::VerificationComplete);
        tracing::info!("Biometric verification complete");
        self.transition(AuthPhase::AuthSucceeded);
    }

    fn close_capture(&mut self) -> Result<(), SequencerError> {
        let target = self
            .capture
            .as_ref()
            .and_then(|s| s.options().close_target)
            .ok_or(SequencerError::CaptureNotCancellable)?;
        // Nothing was authorized, so there is nothing to resume.
        self.pending_action = None;
        self.transition(target);
        Ok(())
    }

    fn retry_capture(&mut self) -> Result<(), SequencerError> {
        let options = match &self.capture {
            Some(session) if session.stage() == CaptureStage::Failed => session.options(),
            _ => return Err(SequencerError::NothingToRetry),
        };
        self.leave(AuthPhase::BiometricCapture);
        self.generation += 1;
        tracing::info!(generation = self.generation, "Retrying biometric capture");
        self.open_capture(options);
        Ok(())
    }
}
