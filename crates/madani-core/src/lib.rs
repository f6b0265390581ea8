pub mod auth;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod lifecycle;

pub use auth::{ActionKind, AuthEvent, AuthPhase, CapturePurpose, CaptureStage, Landing, PendingAction};
pub use config::AppConfig;
pub use error::CaptureError;
