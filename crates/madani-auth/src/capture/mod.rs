pub mod fallback;
pub mod session;
pub mod simulated;

pub use fallback::FallbackClips;
pub use session::{CaptureOptions, CaptureSession, CaptureTicket};
pub use simulated::SimulatedCamera;
