//! Contracts between the sign-in sequencer and the platform camera.
//!
//! The sequencer never talks to hardware directly; it asks a
//! [`CaptureDevice`] for a [`CaptureStream`] and owns whatever comes back.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

/// Which camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front-facing (selfie) camera.
    User,
    Environment,
}

/// Constraints passed to the device when opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            facing: Facing::User,
            ideal_width: 640,
            ideal_height: 640,
        }
    }
}

/// One live media track (video) inside a stream.
pub trait CaptureTrack: Send {
    fn label(&self) -> &str;
    fn is_live(&self) -> bool;
    /// Stop the track and turn off the device indicator. Must be idempotent.
    fn stop(&mut self);
}

/// Exclusive handle on an acquired camera stream.
///
/// Dropping the handle stops every track, so holding it in an `Option` and
/// taking it out is enough to release the camera on any exit path.
pub struct CaptureStream {
    tracks: Vec<Box<dyn CaptureTrack>>,
}

impl CaptureStream {
    pub fn new(tracks: Vec<Box<dyn CaptureTrack>>) -> Self {
        Self { tracks }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// Stop all tracks, returning how many were still live.
    pub fn stop_all(&mut self) -> usize {
        let mut stopped = 0;
        for track in &mut self.tracks {
            if track.is_live() {
                track.stop();
                stopped += 1;
            }
        }
        stopped
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        let stopped = self.stop_all();
        if stopped > 0 {
            tracing::debug!("Stopped {stopped} camera track(s) on release");
        }
    }
}

impl fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.tracks.iter().map(|t| t.label()).collect();
        f.debug_struct("CaptureStream")
            .field("tracks", &labels)
            .field("live", &self.live_tracks())
            .finish()
    }
}

/// Platform camera. Acquisition may suspend on a permission prompt.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn acquire(&self, request: &CaptureRequest) -> Result<CaptureStream, CaptureError>;
}
