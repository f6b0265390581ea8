//! Cancellable delays and camera acquisitions on behalf of the sequencer.
//!
//! Every timer is keyed by the phase and generation that started it. The
//! sequencer cancels a phase's timers when it leaves that phase and ignores
//! any key that no longer matches, so a late timer cannot move the flow.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use madani_core::interfaces::{CaptureDevice, CaptureRequest, CaptureStream};
use madani_core::{AuthPhase, CaptureError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capture::CaptureTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Redirect,
    SuccessTick,
    Return,
    Align,
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub phase: AuthPhase,
    pub kind: TimerKind,
    pub generation: u64,
}

/// Side effects the sequencer delegates. Implementations report back by
/// calling `Sequencer::timer_elapsed` / `Sequencer::capture_acquired`.
pub trait Scheduler {
    fn start_timer(&mut self, key: TimerKey, delay: Duration);
    /// Cancel every outstanding timer started by `phase`.
    fn cancel_timers(&mut self, phase: AuthPhase);
    /// Forget a timer that has fired.
    fn timer_fired(&mut self, key: TimerKey);
    fn start_acquire(&mut self, ticket: CaptureTicket, request: CaptureRequest);
    fn cancel_acquire(&mut self);
    /// Forget an acquisition that has reported back.
    fn acquire_finished(&mut self, ticket: CaptureTicket);
    /// Outstanding timers plus in-flight acquisitions.
    fn pending(&self) -> usize;
}

/// Completion messages from spawned timer and acquisition tasks.
pub enum Signal {
    TimerElapsed(TimerKey),
    Acquired {
        ticket: CaptureTicket,
        result: Result<CaptureStream, CaptureError>,
    },
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerElapsed(key) => f.debug_tuple("TimerElapsed").field(key).finish(),
            Self::Acquired { ticket, result } => f
                .debug_struct("Acquired")
                .field("ticket", ticket)
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

/// Runs timers and acquisitions as tokio tasks.
pub struct TokioScheduler {
    signals: mpsc::UnboundedSender<Signal>,
    device: Arc<dyn CaptureDevice>,
    acquire_timeout: Option<Duration>,
    timers: HashMap<TimerKey, JoinHandle<()>>,
    acquisition: Option<(CaptureTicket, JoinHandle<()>)>,
}

impl TokioScheduler {
    pub fn new(
        signals: mpsc::UnboundedSender<Signal>,
        device: Arc<dyn CaptureDevice>,
        acquire_timeout: Option<Duration>,
    ) -> Self {
        Self {
            signals,
            device,
            acquire_timeout,
            timers: HashMap::new(),
            acquisition: None,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn start_timer(&mut self, key: TimerKey, delay: Duration) {
        let tx = self.signals.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Signal::TimerElapsed(key));
        });
        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    fn cancel_timers(&mut self, phase: AuthPhase) {
        self.timers.retain(|key, handle| {
            if key.phase == phase {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    fn timer_fired(&mut self, key: TimerKey) {
        self.timers.remove(&key);
    }

    fn start_acquire(&mut self, ticket: CaptureTicket, request: CaptureRequest) {
        self.cancel_acquire();

        let tx = self.signals.clone();
        let device = Arc::clone(&self.device);
        let limit = self.acquire_timeout;
        let handle = tokio::spawn(async move {
            let result = match limit {
                Some(limit) => tokio::time::timeout(limit, device.acquire(&request))
                    .await
                    .unwrap_or(Err(CaptureError::Timeout(limit))),
                None => device.acquire(&request).await,
            };
            // If the controller is gone the stream is dropped here, which
            // stops its tracks.
            let _ = tx.send(Signal::Acquired { ticket, result });
        });
        self.acquisition = Some((ticket, handle));
    }

    fn cancel_acquire(&mut self) {
        if let Some((ticket, handle)) = self.acquisition.take() {
            handle.abort();
            tracing::debug!(session = %ticket.session, "Camera acquisition cancelled");
        }
    }

    fn acquire_finished(&mut self, ticket: CaptureTicket) {
        if matches!(&self.acquisition, Some((current, _)) if *current == ticket) {
            self.acquisition = None;
        }
    }

    fn pending(&self) -> usize {
        self.timers.len() + usize::from(self.acquisition.is_some())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        self.cancel_acquire();
    }
}

#[cfg(test)]
mod tests {
    use madani_core::config::CameraMode;
    use uuid::Uuid;

    use super::*;
    use crate::capture::SimulatedCamera;

    fn key(phase: AuthPhase, kind: TimerKind) -> TimerKey {
        TimerKey {
            phase,
            kind,
            generation: 1,
        }
    }

    fn scheduler(mode: CameraMode) -> (TokioScheduler, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let device: Arc<dyn CaptureDevice> = Arc::new(SimulatedCamera::new(mode));
        (TokioScheduler::new(tx, device, Some(Duration::from_secs(5))), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let (mut sched, mut rx) = scheduler(CameraMode::Available);
        let k = key(AuthPhase::RedirectingToProvider, TimerKind::Redirect);
        sched.start_timer(k, Duration::from_secs(3));
        assert_eq!(sched.pending(), 1);

        match rx.recv().await {
            Some(Signal::TimerElapsed(fired)) => assert_eq!(fired, k),
            other => panic!("unexpected signal: {other:?}"),
        }
        sched.timer_fired(k);
        assert_eq!(sched.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (mut sched, mut rx) = scheduler(CameraMode::Available);
        sched.start_timer(
            key(AuthPhase::RedirectingToProvider, TimerKind::Redirect),
            Duration::from_secs(3),
        );
        sched.start_timer(
            key(AuthPhase::ReturningToApp, TimerKind::Return),
            Duration::from_secs(1),
        );
        sched.cancel_timers(AuthPhase::RedirectingToProvider);
        assert_eq!(sched.pending(), 1);

        match rx.recv().await {
            Some(Signal::TimerElapsed(fired)) => assert_eq!(fired.kind, TimerKind::Return),
            other => panic!("unexpected signal: {other:?}"),
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_acquisition_times_out() {
        let (mut sched, mut rx) = scheduler(CameraMode::Hang);
        let ticket = CaptureTicket {
            session: Uuid::new_v4(),
            generation: 7,
        };
        sched.start_acquire(ticket, CaptureRequest::default());

        match rx.recv().await {
            Some(Signal::Acquired { ticket: got, result }) => {
                assert_eq!(got, ticket);
                assert_eq!(result.unwrap_err(), CaptureError::Timeout(Duration::from_secs(5)));
            }
            other => panic!("unexpected signal: {other:?}"),
        }
        sched.acquire_finished(ticket);
        assert_eq!(sched.pending(), 0);
    }
}
