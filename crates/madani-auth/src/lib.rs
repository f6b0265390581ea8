pub mod capture;
pub mod controller;
pub mod countdown;
pub mod error;
pub mod scheduler;
pub mod sequencer;
pub mod surface;

pub use capture::{CaptureOptions, CaptureSession, SimulatedCamera};
pub use controller::{AuthController, AuthHandle, Snapshot};
pub use error::SequencerError;
pub use scheduler::{Scheduler, TimerKey, TimerKind, TokioScheduler};
pub use sequencer::{Sequencer, SequencerSettings};
pub use surface::{Surface, SurfaceToken, UserAction};
