use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fix
// ---------------------------------------------------------------------------

/// A single timestamped position reading produced by the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub captured_at_epoch_ms: i64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, captured_at_epoch_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            captured_at_epoch_ms,
        }
    }

    /// Build a fix stamped with the current wall-clock time.
    pub fn now(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self::new(latitude, longitude, accuracy_meters, Utc::now().timestamp_millis())
    }

    /// The record shape delivered across the event boundary.
    pub fn record(&self) -> FixRecord {
        FixRecord {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy_meters,
            timestamp_ms: self.captured_at_epoch_ms,
        }
    }
}

/// Wire record pushed to the attached UI listener.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// TrackingIntent
// ---------------------------------------------------------------------------

/// Durable control-state: should tracking run, and did the user turn it off.
///
/// `is_manually_stopped == true` means no restart alarm may be armed. Fields
/// added later must default to `false` so older records keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackingIntent {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_manually_stopped: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TrackingIntent {
    /// Whether a restart alarm is allowed to relaunch the service.
    pub fn allows_auto_restart(&self) -> bool {
        !self.is_manually_stopped
    }
}

// ---------------------------------------------------------------------------
// ScheduledAlarm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmPrecision {
    /// Fires at the requested instant, even when the device is idle.
    Exact,
    /// The host may defer delivery to batch wake-ups.
    Inexact,
}

/// The single outstanding restart wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAlarm {
    pub id: Uuid,
    pub fires_at_epoch_ms: i64,
    pub precision: AlarmPrecision,
}

impl ScheduledAlarm {
    pub fn new(fires_at_epoch_ms: i64, precision: AlarmPrecision) -> Self {
        Self {
            id: Uuid::new_v4(),
            fires_at_epoch_ms,
            precision,
        }
    }

    /// Copy of this alarm with a different precision, keeping its identity.
    pub fn with_precision(mut self, precision: AlarmPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Milliseconds until the alarm fires, clamped at zero.
    pub fn remaining_ms(&self, now_epoch_ms: i64) -> u64 {
        (self.fires_at_epoch_ms - now_epoch_ms).max(0) as u64
    }
}

// ---------------------------------------------------------------------------
// ServiceState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Idle,
    Starting,
    ForegroundRunning,
    Stopping,
}

impl ServiceState {
    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// `Starting -> Idle` and `Stopping -> ForegroundRunning` cover a
    /// transition that is rolled back because its persistence write failed.
    pub fn can_transition_to(&self, target: &ServiceState) -> bool {
        matches!(
            (self, target),
            (ServiceState::Idle, ServiceState::Starting)
                | (ServiceState::Starting, ServiceState::ForegroundRunning)
                | (ServiceState::Starting, ServiceState::Idle)
                | (ServiceState::ForegroundRunning, ServiceState::Starting)
                | (ServiceState::ForegroundRunning, ServiceState::Stopping)
                | (ServiceState::Stopping, ServiceState::Idle)
                | (ServiceState::Stopping, ServiceState::ForegroundRunning)
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServiceState::ForegroundRunning)
    }
}
