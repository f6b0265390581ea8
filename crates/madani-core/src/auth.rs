//! Shared vocabulary of the digital-ID sign-in flow.
//!
//! These types are read by the presentation layer and the post-auth router;
//! only `madani-auth` ever changes them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One discrete step of the sign-in sequence, in the order a user walks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    LoggedOut,
    ConsentRequested,
    RedirectingToProvider,
    ProviderConsentPending,
    BiometricCapture,
    AuthSucceeded,
    ReturningToApp,
    Authenticated,
}

impl AuthPhase {
    pub const ALL: [AuthPhase; 8] = [
        AuthPhase::LoggedOut,
        AuthPhase::ConsentRequested,
        AuthPhase::RedirectingToProvider,
        AuthPhase::ProviderConsentPending,
        AuthPhase::BiometricCapture,
        AuthPhase::AuthSucceeded,
        AuthPhase::ReturningToApp,
        AuthPhase::Authenticated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::ConsentRequested => "consent_requested",
            Self::RedirectingToProvider => "redirecting_to_provider",
            Self::ProviderConsentPending => "provider_consent_pending",
            Self::BiometricCapture => "biometric_capture",
            Self::AuthSucceeded => "auth_succeeded",
            Self::ReturningToApp => "returning_to_app",
            Self::Authenticated => "authenticated",
        }
    }

    /// Phases that come before biometric capture has been entered.
    pub fn is_pre_capture(self) -> bool {
        matches!(
            self,
            Self::LoggedOut
                | Self::ConsentRequested
                | Self::RedirectingToProvider
                | Self::ProviderConsentPending
        )
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("Unknown auth phase: {s}"))
    }
}

/// What the user was doing when capture was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    View,
    Payment,
}

/// Work to resume once the user is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: ActionKind,
}

impl PendingAction {
    pub fn view() -> Self {
        Self { kind: ActionKind::View }
    }

    pub fn payment() -> Self {
        Self {
            kind: ActionKind::Payment,
        }
    }
}

/// Why the camera is being opened. Only changes the copy shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePurpose {
    Login,
    PaymentAuthorization,
}

impl CapturePurpose {
    pub fn title(self) -> &'static str {
        match self {
            Self::Login => "Identity Verification",
            Self::PaymentAuthorization => "Authorize Payment",
        }
    }
}

impl fmt::Display for CapturePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("login"),
            Self::PaymentAuthorization => f.write_str("payment_authorization"),
        }
    }
}

/// Progress of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    Initializing,
    Aligning,
    Scanning,
    Completed,
    Failed,
}

impl CaptureStage {
    /// Status line shown under the camera circle.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing Camera...",
            Self::Aligning => "Align your face within the circle",
            Self::Scanning => "Verifying Identity...",
            Self::Completed => "Verified",
            Self::Failed => "Camera unavailable. Retry or close to go back.",
        }
    }
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Aligning => "aligning",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where the post-auth router lands the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landing {
    Home,
    ResumePayment,
}

impl Landing {
    pub fn for_action(action: Option<PendingAction>) -> Self {
        match action.map(|a| a.kind) {
            Some(ActionKind::Payment) => Self::ResumePayment,
            Some(ActionKind::View) | None => Self::Home,
        }
    }
}

impl fmt::Display for Landing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => f.write_str("home"),
            Self::ResumePayment => f.write_str("resume_payment"),
        }
    }
}

/// Events emitted by the sign-in sequencer for the UI to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    PhaseChanged { from: AuthPhase, to: AuthPhase },
    CaptureStage(CaptureStage),
    /// Non-blocking notice, shown without interrupting the flow.
    Advisory(String),
    /// Biometric verification finished. Carries no template or score.
    VerificationComplete,
    /// Seconds left on the success modal's "OK (n)" button.
    SuccessCountdown(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips_through_str() {
        for phase in AuthPhase::ALL {
            assert_eq!(phase.as_str().parse::<AuthPhase>().unwrap(), phase);
        }
        assert!("signed_in".parse::<AuthPhase>().is_err());
    }

    #[test]
    fn landing_follows_pending_action() {
        assert_eq!(Landing::for_action(None), Landing::Home);
        assert_eq!(Landing::for_action(Some(PendingAction::view())), Landing::Home);
        assert_eq!(
            Landing::for_action(Some(PendingAction::payment())),
            Landing::ResumePayment
        );
    }

    #[test]
    fn purpose_controls_title_only() {
        assert_eq!(CapturePurpose::Login.title(), "Identity Verification");
        assert_eq!(CapturePurpose::PaymentAuthorization.title(), "Authorize Payment");
    }

    #[test]
    fn auth_event_is_send_and_clone() {
        fn assert_send<T: Send>() {}
        assert_send::<AuthEvent>();

        let event = AuthEvent::PhaseChanged {
            from: AuthPhase::LoggedOut,
            to: AuthPhase::ConsentRequested,
        };
        assert_eq!(event.clone(), event);
    }
}
