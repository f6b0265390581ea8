//! Async front end for the sequencer.
//!
//! [`AuthController`] owns the [`Sequencer`] on a single tokio task. Handles
//! send it commands, the [`TokioScheduler`] feeds it timer and camera
//! completions, and every change is published as a [`Snapshot`] on a watch
//! channel plus a stream of [`AuthEvent`]s.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use madani_core::config::AppConfig;
use madani_core::interfaces::CaptureDevice;
use madani_core::{AuthEvent, AuthPhase, CaptureStage, Landing, PendingAction};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::SequencerError;
use crate::scheduler::{Scheduler, Signal, TokioScheduler};
use crate::sequencer::{Sequencer, SequencerSettings};
use crate::surface::{Surface, SurfaceToken, UserAction};

/// Published view of the sequencer after each change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub surface: Surface,
    pub pending_action: Option<PendingAction>,
    pub landing: Landing,
    pub capture_stage: Option<CaptureStage>,
    pub camera_live: bool,
    /// Outstanding timers and camera acquisitions.
    pub pending_tasks: usize,
    pub success_countdown: Option<u32>,
    /// Wall-clock end of the display-only session countdown.
    pub session_expires_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn of<S: Scheduler>(sequencer: &Sequencer<S>) -> Self {
        Self {
            surface: sequencer.surface(),
            pending_action: sequencer.pending_action(),
            landing: sequencer.landing(),
            capture_stage: sequencer.capture_stage(),
            camera_live: sequencer.capture().is_some_and(|s| s.holds_camera()),
            pending_tasks: sequencer.scheduler().pending(),
            success_countdown: sequencer.success_countdown(),
            session_expires_at: sequencer.session_deadline().map(|d| d.at),
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.surface.phase()
    }

    pub fn offers(&self, action: UserAction) -> bool {
        self.surface.offers(action)
    }

    /// Nothing is scheduled; the flow is waiting on the user.
    pub fn idle(&self) -> bool {
        self.pending_tasks == 0
    }
}

#[derive(Debug)]
enum Command {
    Act {
        token: SurfaceToken,
        action: UserAction,
        reply: oneshot::Sender<Result<AuthPhase, SequencerError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    SetPendingAction {
        action: PendingAction,
        reply: oneshot::Sender<Result<(), SequencerError>>,
    },
    TakePendingAction {
        reply: oneshot::Sender<Option<PendingAction>>,
    },
    Shutdown,
}

pub struct AuthController {
    sequencer: Sequencer<TokioScheduler>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    event_tx: mpsc::UnboundedSender<AuthEvent>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl AuthController {
    /// Start the controller task. Dropping every handle (or calling
    /// [`AuthHandle::shutdown`]) stops it, after releasing the camera.
    pub fn spawn(
        config: &AppConfig,
        device: Arc<dyn CaptureDevice>,
    ) -> (AuthHandle, mpsc::UnboundedReceiver<AuthEvent>, JoinHandle<()>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(signal_tx, device, config.capture.acquire_timeout());
        let sequencer = Sequencer::new(SequencerSettings::from_config(config), scheduler);

        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::of(&sequencer));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let controller = Self {
            sequencer,
            command_rx,
            signal_rx,
            event_tx,
            snapshot_tx,
        };
        let task = tokio::spawn(controller.run());

        let handle = AuthHandle {
            command_tx,
            snapshot_rx,
        };
        (handle, event_rx, task)
    }

    async fn run(mut self) {
        tracing::info!("Sign-in controller started");
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(signal) = self.signal_rx.recv() => {
                    self.handle_signal(signal);
                }
            }
        }

        self.sequencer.reset();
        self.publish();
        tracing::info!("Sign-in controller stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Act {
                token,
                action,
                reply,
            } => {
                let result = self.sequencer.apply(token, action);
                if let Err(e) = &result {
                    tracing::debug!("Intent rejected: {e}");
                }
                // Publish before replying so the caller never sees a stale
                // snapshot after its intent was accepted.
                self.publish();
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                self.sequencer.reset();
                self.publish();
                let _ = reply.send(());
            }
            Command::SetPendingAction { action, reply } => {
                let result = self.sequencer.set_pending_action(action);
                self.publish();
                let _ = reply.send(result);
            }
            Command::TakePendingAction { reply } => {
                let action = self.sequencer.take_pending_action();
                self.publish();
                let _ = reply.send(action);
            }
            Command::Shutdown => unreachable!("handled in run()"),
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::TimerElapsed(key) => self.sequencer.timer_elapsed(key),
            Signal::Acquired { ticket, result } => {
                self.sequencer.capture_acquired(ticket, result)
            }
        }
        self.publish();
    }

    fn publish(&mut self) {
        for event in self.sequencer.drain_events() {
            let _ = self.event_tx.send(event);
        }
        self.snapshot_tx.send_replace(Snapshot::of(&self.sequencer));
    }
}

/// Cloneable handle used by screens and the CLI.
#[derive(Debug, Clone)]
pub struct AuthHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<Snapshot>,
}

impl AuthHandle {
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.snapshot_rx.borrow().phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }

    /// Send `action` from the screen currently published.
    pub async fn act(&self, action: UserAction) -> Result<AuthPhase, SequencerError> {
        let token = self.snapshot_rx.borrow().surface.token;
        self.act_on(token, action).await
    }

    /// Send `action` from the screen identified by `token`.
    pub async fn act_on(
        &self,
        token: SurfaceToken,
        action: UserAction,
    ) -> Result<AuthPhase, SequencerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Act {
            token,
            action,
            reply,
        })?;
        rx.await.map_err(|_| SequencerError::ControllerClosed)?
    }

    pub async fn reset(&self) -> Result<(), SequencerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply })?;
        rx.await.map_err(|_| SequencerError::ControllerClosed)
    }

    pub async fn set_pending_action(&self, action: PendingAction) -> Result<(), SequencerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetPendingAction { action, reply })?;
        rx.await.map_err(|_| SequencerError::ControllerClosed)?
    }

    pub async fn take_pending_action(&self) -> Result<Option<PendingAction>, SequencerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::TakePendingAction { reply })?;
        rx.await.map_err(|_| SequencerError::ControllerClosed)
    }

    /// Wait until a published snapshot satisfies `pred`.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&Snapshot) -> bool,
    ) -> Result<Snapshot, SequencerError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| SequencerError::ControllerClosed)?;
        Ok(snapshot.clone())
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }

    fn send(&self, cmd: Command) -> Result<(), SequencerError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| SequencerError::ControllerClosed)
    }
}
