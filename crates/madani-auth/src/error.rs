use madani_core::AuthPhase;
use thiserror::Error;

use crate::surface::UserAction;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    #[error("'{action}' is not available while {phase}")]
    NotApplicable { action: UserAction, phase: AuthPhase },

    #[error("'{action}' came from a superseded {phase} screen")]
    StaleSurface { action: UserAction, phase: AuthPhase },

    #[error("This verification cannot be closed")]
    CaptureNotCancellable,

    #[error("No failed verification to retry")]
    NothingToRetry,

    #[error("Pending action can only be set before verification (currently {0})")]
    PendingActionLocked(AuthPhase),

    #[error("Sign-in controller has shut down")]
    ControllerClosed,
}
