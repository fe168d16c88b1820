//! Seams to the process host: foreground visibility and lifecycle signals.

use std::sync::atomic::{AtomicBool, Ordering};

use gt_core::config::NotificationConfig;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("foreground request rejected: {0}")]
    Foreground(String),
}

/// The persistent status notice shown while tracking runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundNotice {
    pub title: String,
    pub text: String,
}

impl From<&NotificationConfig> for ForegroundNotice {
    fn from(cfg: &NotificationConfig) -> Self {
        Self {
            title: cfg.title.clone(),
            text: cfg.text.clone(),
        }
    }
}

/// The host that keeps the daemon alive while it is visibly running.
pub trait ServiceHost: Send + Sync {
    /// Show the status notice and mark the process as foreground-visible.
    /// Called before any blocking work in a start transition.
    fn enter_foreground(&self, notice: &ForegroundNotice) -> Result<(), HostError>;

    /// Withdraw the status notice.
    fn exit_foreground(&self);
}

/// Host for headless runs: the notice goes to the log.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    visible: AtomicBool,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

impl ServiceHost for HeadlessHost {
    fn enter_foreground(&self, notice: &ForegroundNotice) -> Result<(), HostError> {
        if !self.visible.swap(true, Ordering::SeqCst) {
            info!(title = %notice.title, text = %notice.text, "foreground notice shown");
        }
        Ok(())
    }

    fn exit_foreground(&self) {
        if self.visible.swap(false, Ordering::SeqCst) {
            info!("foreground notice removed");
        }
    }
}

/// Lifecycle events delivered by the host. Each converges on a
/// `TrackingService` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// The daemon process was (re)created; resume if tracking was running.
    ProcessStarted,
    /// The device finished booting.
    BootCompleted,
    /// A restart alarm went off.
    AlarmFired { alarm_id: Uuid },
    /// Opportunistic wake-up: fetch one fix without a long-lived subscription.
    Wake,
    /// The host is tearing the service down; not a user action.
    Teardown,
}
