use std::time::Duration;

use thiserror::Error;

/// Reasons a camera could not be handed to a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device available")]
    NoDevice,

    #[error("Camera permission prompt unanswered after {0:?}")]
    Timeout(Duration),

    #[error("Camera error: {0}")]
    Device(String),
}
