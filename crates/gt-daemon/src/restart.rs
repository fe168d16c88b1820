//! Restart alarm scheduling.
//!
//! The daemon cannot prevent the host from killing it, so every successful
//! start arms a single wake-up roughly fifteen minutes out. When it fires,
//! the host relaunches the service in restart mode. Arming always cancels
//! first, so two starts in a row leave exactly one live alarm.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use gt_core::types::{AlarmPrecision, ScheduledAlarm};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::host::HostSignal;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlarmError {
    /// The host refused an exact alarm; an inexact one may still be allowed.
    #[error("exact alarms are not permitted")]
    ExactDenied,

    #[error("alarm host error: {0}")]
    Host(String),
}

// ---------------------------------------------------------------------------
// AlarmClock
// ---------------------------------------------------------------------------

/// Host timer service. Holds at most one alarm for this process identity.
pub trait AlarmClock: Send + Sync {
    /// Whether exact alarms are currently granted.
    fn can_schedule_exact(&self) -> bool;

    /// Schedule `alarm`, replacing any alarm already held.
    fn set(&self, alarm: &ScheduledAlarm) -> Result<(), AlarmError>;

    /// Cancel the held alarm, if any.
    fn cancel(&self) -> Result<(), AlarmError>;
}

// ---------------------------------------------------------------------------
// RestartScheduler
// ---------------------------------------------------------------------------

pub struct RestartScheduler {
    clock: Arc<dyn AlarmClock>,
    armed: Mutex<Option<ScheduledAlarm>>,
}

impl RestartScheduler {
    pub fn new(clock: Arc<dyn AlarmClock>) -> Self {
        Self {
            clock,
            armed: Mutex::new(None),
        }
    }

    /// Cancel any existing alarm, then schedule one wake-up `delay` from now.
    ///
    /// Exact when the host grants it, inexact otherwise. The inexact fallback
    /// is logged and returned as success.
    pub fn arm(&self, delay: Duration) -> Result<ScheduledAlarm, AlarmError> {
        let mut armed = self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = armed.take() {
            debug!(alarm_id = %previous.id, "superseding restart alarm");
        }
        // The host may still hold an alarm set by an earlier process.
        if let Err(e) = self.clock.cancel() {
            warn!(error = %e, "failed to cancel previous restart alarm");
        }

        let fires_at = i64::try_from(delay.as_millis())
            .ok()
            .and_then(|delay_ms| Utc::now().timestamp_millis().checked_add(delay_ms))
            .ok_or_else(|| AlarmError::Host(format!("restart delay {delay:?} out of range")))?;
        let precision = if self.clock.can_schedule_exact() {
            AlarmPrecision::Exact
        } else {
            info!("exact alarms unavailable, scheduling inexact restart alarm");
            AlarmPrecision::Inexact
        };
        let mut alarm = ScheduledAlarm::new(fires_at, precision);

        match self.clock.set(&alarm) {
            Ok(()) => {}
            Err(AlarmError::ExactDenied) if precision == AlarmPrecision::Exact => {
                warn!("exact alarm permission missing, using inexact fallback");
                alarm = alarm.with_precision(AlarmPrecision::Inexact);
                self.clock.set(&alarm)?;
            }
            Err(e) => return Err(e),
        }

        info!(
            alarm_id = %alarm.id,
            precision = ?alarm.precision,
            delay_secs = delay.as_secs(),
            "restart alarm scheduled"
        );
        *armed = Some(alarm);
        Ok(alarm)
    }

    /// Cancel the pending alarm. Returns `true` if one was armed.
    pub fn cancel(&self) -> bool {
        let mut armed = self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = self.clock.cancel() {
            warn!(error = %e, "failed to cancel restart alarm");
        }
        match armed.take() {
            Some(alarm) => {
                info!(alarm_id = %alarm.id, "restart alarm cancelled");
                true
            }
            None => false,
        }
    }

    /// The live alarm, if any.
    pub fn armed(&self) -> Option<ScheduledAlarm> {
        *self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Consume a fire notification.
    ///
    /// Returns `false` when a newer alarm has superseded `alarm_id`; the
    /// notification is stale and must be ignored. Otherwise the armed record
    /// is cleared and the fire should be acted on. An alarm this process never
    /// armed (set before a process death) is acted on too.
    pub fn take_fired(&self, alarm_id: Uuid) -> bool {
        let mut armed = self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match *armed {
            Some(live) if live.id != alarm_id => false,
            Some(_) => {
                *armed = None;
                true
            }
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// TokioAlarmClock
// ---------------------------------------------------------------------------

/// In-process alarm clock: a sleeping task that posts
/// [`HostSignal::AlarmFired`] on the host signal channel.
///
/// Inexact alarms fire after an extra slack window, mimicking a host that
/// batches non-exact wake-ups.
pub struct TokioAlarmClock {
    signals: flume::Sender<HostSignal>,
    exact_permitted: bool,
    inexact_slack: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioAlarmClock {
    pub fn new(signals: flume::Sender<HostSignal>, exact_permitted: bool, inexact_slack: Duration) -> Self {
        Self {
            signals,
            exact_permitted,
            inexact_slack,
            pending: Mutex::new(None),
        }
    }

    /// Whether an alarm task is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl AlarmClock for TokioAlarmClock {
    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted
    }

    fn set(&self, alarm: &ScheduledAlarm) -> Result<(), AlarmError> {
        if alarm.precision == AlarmPrecision::Exact && !self.exact_permitted {
            return Err(AlarmError::ExactDenied);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AlarmError::Host(e.to_string()))?;

        let mut delay = Duration::from_millis(alarm.remaining_ms(Utc::now().timestamp_millis()));
        if alarm.precision == AlarmPrecision::Inexact {
            delay = delay.saturating_add(self.inexact_slack);
        }
        let signals = self.signals.clone();
        let alarm_id = alarm.id;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(alarm_id = %alarm_id, "restart alarm fired");
            if signals.send_async(HostSignal::AlarmFired { alarm_id }).await.is_err() {
                warn!(alarm_id = %alarm_id, "restart alarm fired but nobody is listening");
            }
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    fn cancel(&self) -> Result<(), AlarmError> {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = previous {
            task.abort();
        }
        Ok(())
    }
}
