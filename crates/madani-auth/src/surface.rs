//! Presentation contract: what the single active screen shows and which
//! intents it may send back.
//!
//! Screens never touch sequencer state. They render a [`Surface`] and reply
//! with a [`UserAction`] stamped with the surface's [`SurfaceToken`]; once the
//! sequencer moves on, that token no longer matches and the intent is
//! rejected.

use std::fmt;
use std::str::FromStr;

use madani_core::AuthPhase;

/// Identifies one rendering of one screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceToken {
    phase: AuthPhase,
    generation: u64,
}

impl SurfaceToken {
    pub(crate) fn new(phase: AuthPhase, generation: u64) -> Self {
        Self { phase, generation }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }
}

/// Zero-argument intents a screen can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAction {
    Login,
    Confirm,
    Decline,
    Close,
    Dismiss,
    Retry,
    SignOut,
    AuthorizePayment,
}

impl UserAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Confirm => "confirm",
            Self::Decline => "decline",
            Self::Close => "close",
            Self::Dismiss => "dismiss",
            Self::Retry => "retry",
            Self::SignOut => "sign-out",
            Self::AuthorizePayment => "pay",
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "confirm" | "yes" => Ok(Self::Confirm),
            "decline" | "no" => Ok(Self::Decline),
            "close" => Ok(Self::Close),
            "dismiss" | "ok" => Ok(Self::Dismiss),
            "retry" => Ok(Self::Retry),
            "sign-out" | "logout" => Ok(Self::SignOut),
            "pay" => Ok(Self::AuthorizePayment),
            other => Err(format!("Unknown action: {other}")),
        }
    }
}

/// Everything a stateless renderer needs for the active screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub token: SurfaceToken,
    pub title: String,
    pub body: String,
    pub actions: Vec<UserAction>,
}

impl Surface {
    pub fn phase(&self) -> AuthPhase {
        self.token.phase
    }

    pub fn offers(&self, action: UserAction) -> bool {
        self.actions.contains(&action)
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.title, self.body)?;
        if !self.actions.is_empty() {
            let actions: Vec<&str> = self.actions.iter().map(|a| a.as_str()).collect();
            write!(f, " ({})", actions.join(" | "))?;
        }
        Ok(())
    }
}
