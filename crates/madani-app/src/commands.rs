use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use madani_auth::{AuthController, AuthHandle, SequencerError, SimulatedCamera, Snapshot, UserAction};
use madani_core::config::AppConfig;
use madani_core::interfaces::CaptureDevice;
use madani_core::{AuthEvent, PendingAction};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One entry of a `simulate --steps` script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Act(UserAction),
    Reset,
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reset" => Ok(Self::Reset),
            other => other.parse().map(Self::Act),
        }
    }
}

struct Session {
    handle: AuthHandle,
    task: JoinHandle<()>,
    printer: JoinHandle<()>,
    camera: Arc<SimulatedCamera>,
}

impl Session {
    fn start(config: &AppConfig) -> Self {
        let camera = Arc::new(SimulatedCamera::new(config.camera.mode));
        let device: Arc<dyn CaptureDevice> = camera.clone();
        let (handle, events, task) = AuthController::spawn(config, device);
        let printer = tokio::spawn(print_events(events));
        tracing::info!("Simulated camera: {}", camera.mode());
        Self {
            handle,
            task,
            printer,
            camera,
        }
    }

    /// Stop the controller and wait for its last events to be printed.
    async fn close(self) -> Result<Arc<SimulatedCamera>> {
        self.handle.shutdown();
        self.task.await?;
        self.printer.await?;
        Ok(self.camera)
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<AuthEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            AuthEvent::PhaseChanged { to, .. } => println!("phase: {to}"),
            AuthEvent::CaptureStage(stage) => println!("capture: {stage}"),
            AuthEvent::Advisory(msg) => println!("advisory: {msg}"),
            AuthEvent::VerificationComplete => println!("verification complete"),
            AuthEvent::SuccessCountdown(n) => println!("OK ({n})"),
        }
    }
}

pub async fn simulate(
    config: &AppConfig,
    steps: &[String],
    pending: Option<PendingAction>,
    timeout: Duration,
) -> Result<()> {
    let steps = steps
        .iter()
        .map(|s| s.parse::<Step>().map_err(anyhow::Error::msg))
        .collect::<Result<Vec<_>>>()?;

    let session = Session::start(config);
    let handle = session.handle.clone();

    if let Some(action) = pending {
        handle.set_pending_action(action).await?;
    }

    for step in steps {
        match step {
            Step::Reset => handle.reset().await?,
            Step::Act(action) => {
                // Let timed phases run until the screen offers this action or
                // nothing else is going to happen on its own.
                let ready = tokio::time::timeout(
                    timeout,
                    handle.wait_for(|s| s.offers(action) || s.idle()),
                )
                .await
                .map_err(|_| {
                    anyhow!("timed out waiting for '{action}' in {}", handle.phase())
                })??;

                match handle.act_on(ready.surface.token, action).await {
                    Ok(_) => {}
                    Err(SequencerError::ControllerClosed) => bail!("sign-in controller stopped"),
                    Err(e) => println!("ignored: {e}"),
                }
            }
        }
    }

    let settled = tokio::time::timeout(timeout, handle.wait_for(Snapshot::idle))
        .await
        .map_err(|_| anyhow!("timed out waiting in {}", handle.phase()))??;

    let camera = session.close().await?;
    println!("final: {} landing: {}", settled.phase(), settled.landing);
    println!("camera tracks live: {}", camera.live_tracks());
    Ok(())
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let session = Session::start(config);
    let handle = session.handle.clone();

    println!("{}", handle.snapshot().surface);
    let screens = tokio::spawn(print_surfaces(handle.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("quit" | "exit"), _) => break,
            (Some("status"), _) => print_status(&handle.snapshot()),
            (Some("reset"), _) => handle.reset().await?,
            (Some("pending"), Some(kind)) => {
                let action = match kind {
                    "payment" => PendingAction::payment(),
                    "view" => PendingAction::view(),
                    other => {
                        println!("Unknown pending action: {other}");
                        continue;
                    }
                };
                if let Err(e) = handle.set_pending_action(action).await {
                    println!("{e}");
                }
            }
            (Some("resume"), _) => match handle.take_pending_action().await? {
                Some(action) => println!("resuming {:?}", action.kind),
                None => println!("nothing to resume"),
            },
            (Some(word), _) => match word.parse::<UserAction>() {
                Ok(action) => {
                    if let Err(e) = handle.act(action).await {
                        println!("{e}");
                    }
                }
                Err(e) => println!("{e}"),
            },
        }
    }

    let camera = session.close().await?;
    screens.await?;
    tracing::info!("Camera tracks still live: {}", camera.live_tracks());
    Ok(())
}

async fn print_surfaces(mut rx: watch::Receiver<Snapshot>) {
    let mut last = rx.borrow().surface.clone();
    while rx.changed().await.is_ok() {
        let surface = rx.borrow_and_update().surface.clone();
        if surface != last {
            println!("{surface}");
            last = surface;
        }
    }
}

fn print_status(snapshot: &Snapshot) {
    println!("phase: {}", snapshot.phase());
    println!("landing: {}", snapshot.landing);
    match snapshot.pending_action {
        Some(action) => println!("pending action: {:?}", action.kind),
        None => println!("pending action: none"),
    }
    if let Some(stage) = snapshot.capture_stage {
        println!("capture: {stage} (camera live: {})", snapshot.camera_live);
    }
    println!("scheduled tasks: {}", snapshot.pending_tasks);
    if let Some(at) = snapshot.session_expires_at {
        let local = at.with_timezone(&chrono::Local);
        println!("session expires at: {}", local.format("%H:%M:%S"));
    }
}

pub fn show_config(config: &AppConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
