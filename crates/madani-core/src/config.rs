use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::AuthPhase;
use crate::interfaces::{CaptureRequest, Facing};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Longest session countdown `validate` accepts (one day).
pub const MAX_SESSION_COUNTDOWN_SECS: u64 = 86_400;

/// Delays that drive the timed phases and the capture stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Splash shown while "redirecting" to the identity provider.
    #[serde(default = "default_redirect_ms")]
    pub redirect_ms: u64,
    /// Starting value of the success modal's "OK (n)" countdown.
    #[serde(default = "default_success_countdown_secs")]
    pub success_countdown_secs: u32,
    /// Length of one countdown step.
    #[serde(default = "default_success_tick_ms")]
    pub success_tick_ms: u64,
    #[serde(default = "default_return_ms")]
    pub return_ms: u64,
    #[serde(default = "default_align_ms")]
    pub align_ms: u64,
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,
    /// Display-only session countdown on the consent screen.
    #[serde(default = "default_session_countdown_secs")]
    pub session_countdown_secs: u64,
}

fn default_redirect_ms() -> u64 {
    3000
}
fn default_success_countdown_secs() -> u32 {
    3
}
fn default_success_tick_ms() -> u64 {
    1000
}
fn default_return_ms() -> u64 {
    2500
}
fn default_align_ms() -> u64 {
    1000
}
fn default_scan_ms() -> u64 {
    2500
}
fn default_session_countdown_secs() -> u64 {
    177
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            redirect_ms: default_redirect_ms(),
            success_countdown_secs: default_success_countdown_secs(),
            success_tick_ms: default_success_tick_ms(),
            return_ms: default_return_ms(),
            align_ms: default_align_ms(),
            scan_ms: default_scan_ms(),
            session_countdown_secs: default_session_countdown_secs(),
        }
    }
}

impl TimingConfig {
    pub fn redirect(&self) -> Duration {
        Duration::from_millis(self.redirect_ms)
    }
    pub fn success_tick(&self) -> Duration {
        Duration::from_millis(self.success_tick_ms)
    }
    pub fn return_to_app(&self) -> Duration {
        Duration::from_millis(self.return_ms)
    }
    pub fn align(&self) -> Duration {
        Duration::from_millis(self.align_ms)
    }
    pub fn scan(&self) -> Duration {
        Duration::from_millis(self.scan_ms)
    }
    pub fn session_countdown(&self) -> Duration {
        Duration::from_secs(self.session_countdown_secs)
    }

    /// Upper bound between an acquisition failure and the fallback
    /// verification signal.
    pub fn fallback_delay(&self) -> Duration {
        self.align() + self.scan()
    }
}

/// What a capture session does when the camera cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Demo behavior: play a recorded clip and report success anyway.
    Proceed,
    /// Stop at a failed stage and let the user retry or close.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bound on the camera permission prompt (0 = wait forever).
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_ideal_side")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_side")]
    pub ideal_height: u32,
    #[serde(default = "default_facing")]
    pub facing: Facing,
    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_fallback_clips")]
    pub fallback_clips: Vec<String>,
    /// Where closing the login capture goes. Unset means login capture
    /// offers no close button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_close_target: Option<AuthPhase>,
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}
fn default_ideal_side() -> u32 {
    640
}
fn default_facing() -> Facing {
    Facing::User
}
fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Proceed
}
fn default_fallback_clips() -> Vec<String> {
    vec!["/authenticate1.mp4".into(), "/authenticate2.mp4".into()]
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: default_acquire_timeout_ms(),
            ideal_width: default_ideal_side(),
            ideal_height: default_ideal_side(),
            facing: default_facing(),
            failure_policy: default_failure_policy(),
            fallback_clips: default_fallback_clips(),
            login_close_target: None,
        }
    }
}

impl CaptureConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        (self.acquire_timeout_ms > 0).then(|| Duration::from_millis(self.acquire_timeout_ms))
    }

    pub fn request(&self) -> CaptureRequest {
        CaptureRequest {
            facing: self.facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }
}

/// Behavior of the simulated camera used by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    Available,
    Denied,
    Missing,
    /// Permission prompt that is never answered.
    Hang,
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Denied => "denied",
            Self::Missing => "missing",
            Self::Hang => "hang",
        };
        f.write_str(s)
    }
}

impl FromStr for CameraMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "denied" => Ok(Self::Denied),
            "missing" => Ok(Self::Missing),
            "hang" => Ok(Self::Hang),
            other => Err(format!("Unknown camera mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_mode")]
    pub mode: CameraMode,
}

fn default_camera_mode() -> CameraMode {
    CameraMode::Available
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            mode: default_camera_mode(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with fallback chain: explicit path → ./config/default.toml → hardcoded defaults.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Self {
        if let Some(path) = explicit_path {
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {e}", path.display());
                }
            }
        }

        let default_path = Path::new("config/default.toml");
        if default_path.exists() {
            match Self::load(default_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!("Failed to load default config: {e}");
                }
            }
        }

        tracing::info!("Using hardcoded default configuration");
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timing.session_countdown_secs > MAX_SESSION_COUNTDOWN_SECS {
            anyhow::bail!(
                "timing.session_countdown_secs must be at most {MAX_SESSION_COUNTDOWN_SECS}, got {}",
                self.timing.session_countdown_secs
            );
        }
        if self.timing.success_countdown_secs == 0 {
            anyhow::bail!("timing.success_countdown_secs must be at least 1");
        }
        if self.capture.fallback_clips.is_empty() {
            anyhow::bail!("capture.fallback_clips must list at least one clip");
        }
        match self.capture.login_close_target {
            None | Some(AuthPhase::ConsentRequested) | Some(AuthPhase::LoggedOut) => {}
            Some(other) => anyhow::bail!(
                "capture.login_close_target must be consent_requested or logged_out, got {other}"
            ),
        }
        Ok(())
    }
}
